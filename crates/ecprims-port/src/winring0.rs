use std::ffi::c_void;
use std::mem::size_of;

use tracing::debug;
use windows_sys::Win32::Foundation::{
    CloseHandle, GENERIC_READ, GENERIC_WRITE, HANDLE, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{CreateFileA, FILE_ATTRIBUTE_NORMAL, OPEN_EXISTING};
use windows_sys::Win32::System::IO::DeviceIoControl;

use crate::error::{PortError, Result};
use crate::traits::ByteChannel;

const DEVICE_PATH: &[u8] = b"\\\\.\\WinRing0_1_2_0\0";
const IOCTL_OLS_READ_IO_PORT_BYTE: u32 = 2_621_464_780;
const IOCTL_OLS_WRITE_IO_PORT_BYTE: u32 = 2_621_481_176;

#[repr(C, packed)]
struct WriteByteData {
    port: u32,
    value: u8,
}

/// Port I/O through the WinRing0 1.2.0 kernel driver.
///
/// The driver must already be running (it ships with tools such as
/// Libre Hardware Monitor) and the process needs administrator rights.
pub struct WinRing0 {
    handle: HANDLE,
}

impl WinRing0 {
    /// Open the WinRing0 device.
    pub fn load() -> Result<Self> {
        // SAFETY: DEVICE_PATH is NUL-terminated and outlives the call; null
        // security attributes and template handle are permitted.
        let handle = unsafe {
            CreateFileA(
                DEVICE_PATH.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                0,
                std::ptr::null(),
                OPEN_EXISTING,
                FILE_ATTRIBUTE_NORMAL,
                std::ptr::null_mut(),
            )
        };
        if handle.is_null() || handle == INVALID_HANDLE_VALUE {
            return Err(PortError::NotLoaded(format!(
                "cannot open WinRing0 device ({}); run as administrator with the WinRing0 1.2.0 driver loaded",
                std::io::Error::last_os_error()
            )));
        }
        debug!("opened WinRing0 driver");
        Ok(Self { handle })
    }
}

impl ByteChannel for WinRing0 {
    fn read_byte(&mut self, addr: u16) -> Result<u8> {
        let input = u32::from(addr);
        let mut output: u32 = 0;
        let mut returned: u32 = 0;
        // SAFETY: input/output point at live locals of the advertised sizes and
        // the handle is open for the lifetime of `self`.
        let ok = unsafe {
            DeviceIoControl(
                self.handle,
                IOCTL_OLS_READ_IO_PORT_BYTE,
                (&input as *const u32).cast::<c_void>(),
                size_of::<u32>() as u32,
                (&mut output as *mut u32).cast::<c_void>(),
                size_of::<u32>() as u32,
                &mut returned,
                std::ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(PortError::Read {
                addr,
                source: std::io::Error::last_os_error(),
            });
        }
        Ok((output & 0xFF) as u8)
    }

    fn write_byte(&mut self, addr: u16, value: u8) -> Result<()> {
        let input = WriteByteData {
            port: u32::from(addr),
            value,
        };
        let mut returned: u32 = 0;
        // SAFETY: `input` is a live packed struct of the advertised size; no
        // output buffer is requested.
        let ok = unsafe {
            DeviceIoControl(
                self.handle,
                IOCTL_OLS_WRITE_IO_PORT_BYTE,
                (&input as *const WriteByteData).cast::<c_void>(),
                size_of::<WriteByteData>() as u32,
                std::ptr::null_mut(),
                0,
                &mut returned,
                std::ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(PortError::Write {
                addr,
                value,
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "winring0"
    }
}

impl Drop for WinRing0 {
    fn drop(&mut self) {
        // SAFETY: the handle was returned by CreateFileA and is closed once.
        unsafe {
            CloseHandle(self.handle);
        }
    }
}

impl std::fmt::Debug for WinRing0 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WinRing0").finish_non_exhaustive()
    }
}
