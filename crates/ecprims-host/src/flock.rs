use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::lock::{poll_acquire, AcquireStatus, ExchangeLock, LockError, LockTimeout, ReleaseStatus};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Advisory `flock(2)` lock on a file shared with other EC tools.
///
/// The file is created on first acquire and kept open while held.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    name: String,
    file: Option<File>,
}

impl FileLock {
    /// Lock file used by the ChromeOS EC tooling.
    pub const DEFAULT_PATH: &'static str = "/run/lock/cros_ec_lock";

    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            name: path.display().to_string(),
            path,
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<File, LockError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(&self.path)
            .map_err(|source| LockError::Open {
                name: self.name.clone(),
                source,
            })
    }

    fn failed(&self, source: std::io::Error) -> LockError {
        LockError::Failed {
            name: self.name.clone(),
            source,
        }
    }
}

/// One `flock` call. `Ok(false)` means a non-blocking attempt found the lock
/// taken.
fn flock(file: &File, operation: libc::c_int) -> std::io::Result<bool> {
    loop {
        // SAFETY: the descriptor belongs to `file`, which outlives the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
        if rc == 0 {
            return Ok(true);
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(libc::EWOULDBLOCK) => return Ok(false),
            _ => return Err(err),
        }
    }
}

impl ExchangeLock for FileLock {
    fn acquire(&mut self, timeout: LockTimeout) -> Result<AcquireStatus, LockError> {
        if self.file.is_some() {
            return Ok(AcquireStatus::AlreadyHeld);
        }
        let file = self.open()?;
        let try_once = || flock(&file, libc::LOCK_EX | libc::LOCK_NB).map_err(|e| self.failed(e));

        match timeout {
            LockTimeout::Forever => {
                flock(&file, libc::LOCK_EX).map_err(|e| self.failed(e))?;
            }
            LockTimeout::NoWait => {
                if !try_once()? {
                    return Err(LockError::Busy {
                        name: self.name.clone(),
                        waited: Duration::ZERO,
                    });
                }
            }
            LockTimeout::Within(limit) => {
                poll_acquire(&self.name, limit, POLL_INTERVAL, try_once)?;
            }
        }

        debug!(path = %self.path.display(), "acquired EC lock");
        self.file = Some(file);
        Ok(AcquireStatus::Acquired)
    }

    fn release(&mut self) -> ReleaseStatus {
        let Some(file) = self.file.take() else {
            return ReleaseStatus::NotHeld;
        };
        // Closing the descriptor drops the lock even if LOCK_UN fails.
        let _ = flock(&file, libc::LOCK_UN);
        drop(file);
        debug!(path = %self.path.display(), "released EC lock");
        ReleaseStatus::Released
    }

    fn is_held(&self) -> bool {
        self.file.is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.release();
    }
}
