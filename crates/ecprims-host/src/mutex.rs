use std::ffi::CString;
use std::time::Duration;

use tracing::debug;
use windows_sys::Win32::Foundation::{
    CloseHandle, HANDLE, WAIT_ABANDONED, WAIT_FAILED, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::System::Threading::{
    CreateMutexA, ReleaseMutex, WaitForSingleObject, INFINITE,
};

use crate::lock::{AcquireStatus, ExchangeLock, LockError, LockTimeout, ReleaseStatus};

/// System-wide named mutex shared with other EC tools.
pub struct NamedMutexLock {
    name: String,
    handle: HANDLE,
    held: bool,
}

impl NamedMutexLock {
    /// Mutex name used by the ChromeOS EC tooling.
    pub const DEFAULT_NAME: &'static str = "CrosEC";

    /// Open or create `Global\<name>`.
    pub fn open(name: &str) -> Result<Self, LockError> {
        let full = format!("Global\\{name}");
        let c_name = CString::new(full.clone()).map_err(|e| LockError::Open {
            name: full.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
        })?;
        // SAFETY: c_name is NUL-terminated and outlives the call; null
        // security attributes are permitted.
        let handle = unsafe { CreateMutexA(std::ptr::null(), 0, c_name.as_ptr().cast()) };
        if handle.is_null() {
            return Err(LockError::Open {
                name: full,
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(Self {
            name: full,
            handle,
            held: false,
        })
    }
}

fn wait_millis(timeout: LockTimeout) -> u32 {
    match timeout {
        LockTimeout::Forever => INFINITE,
        LockTimeout::NoWait => 0,
        LockTimeout::Within(d) => u32::try_from(d.as_millis()).unwrap_or(INFINITE - 1),
    }
}

impl ExchangeLock for NamedMutexLock {
    fn acquire(&mut self, timeout: LockTimeout) -> Result<AcquireStatus, LockError> {
        if self.held {
            return Ok(AcquireStatus::AlreadyHeld);
        }
        let millis = wait_millis(timeout);
        // SAFETY: handle is a live mutex handle owned by self.
        let rc = unsafe { WaitForSingleObject(self.handle, millis) };
        match rc {
            WAIT_OBJECT_0 | WAIT_ABANDONED => {
                if rc == WAIT_ABANDONED {
                    debug!(name = %self.name, "previous EC lock owner exited without releasing");
                }
                self.held = true;
                Ok(AcquireStatus::Acquired)
            }
            WAIT_TIMEOUT => Err(LockError::Busy {
                name: self.name.clone(),
                waited: Duration::from_millis(u64::from(millis)),
            }),
            WAIT_FAILED => Err(LockError::Failed {
                name: self.name.clone(),
                source: std::io::Error::last_os_error(),
            }),
            other => Err(LockError::Failed {
                name: self.name.clone(),
                source: std::io::Error::other(format!("unexpected wait result {other:#x}")),
            }),
        }
    }

    fn release(&mut self) -> ReleaseStatus {
        if !std::mem::take(&mut self.held) {
            return ReleaseStatus::NotHeld;
        }
        // SAFETY: this thread owns the mutex (held was set by a successful wait).
        unsafe { ReleaseMutex(self.handle) };
        ReleaseStatus::Released
    }

    fn is_held(&self) -> bool {
        self.held
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for NamedMutexLock {
    fn drop(&mut self) {
        self.release();
        // SAFETY: handle came from CreateMutexA and is closed exactly once.
        unsafe { CloseHandle(self.handle) };
    }
}

impl std::fmt::Debug for NamedMutexLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedMutexLock")
            .field("name", &self.name)
            .field("held", &self.held)
            .finish()
    }
}
