use std::ffi::c_void;

use tracing::{debug, trace};
use windows_sys::Win32::Foundation::{
    CloseHandle, GENERIC_READ, GENERIC_WRITE, HANDLE, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileA, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows_sys::Win32::System::IO::DeviceIoControl;

use crate::error::{PortError, Result};
use crate::traits::{CommandDevice, DeviceReply};

const FILE_DEVICE_CROS_EMBEDDED_CONTROLLER: u32 = 0x80EC;
const METHOD_BUFFERED: u32 = 0;
const FILE_READ_DATA: u32 = 0x0001;
const FILE_WRITE_DATA: u32 = 0x0002;

const fn ctl_code(device: u32, function: u32, method: u32, access: u32) -> u32 {
    (device << 16) | (access << 14) | (function << 2) | method
}

const IOCTL_CROSEC_XCMD: u32 = ctl_code(
    FILE_DEVICE_CROS_EMBEDDED_CONTROLLER,
    0x801,
    METHOD_BUFFERED,
    FILE_READ_DATA | FILE_WRITE_DATA,
);
const IOCTL_CROSEC_RDMEM: u32 = ctl_code(
    FILE_DEVICE_CROS_EMBEDDED_CONTROLLER,
    0x802,
    METHOD_BUFFERED,
    FILE_READ_DATA,
);

/// `version, command, outsize, insize, result`, each a little-endian u32.
const COMMAND_HEADER_SIZE: usize = 20;
/// `offset, bytes`, each a little-endian u32, then the buffer.
const READMEM_HEADER_SIZE: usize = 8;
const READMEM_BUFFER_SIZE: usize = 0xFF;

/// Host commands through the CrosEC kernel driver.
///
/// The driver frames commands and waits on the EC itself, so this device
/// works at command granularity instead of port I/O.
pub struct CrosEcDevice {
    handle: HANDLE,
}

impl CrosEcDevice {
    /// Device namespace path the CrosEC driver registers.
    pub const DEFAULT_PATH: &'static str = r"\\.\GLOBALROOT\Device\CrosEC";

    /// Open the driver at [`Self::DEFAULT_PATH`].
    pub fn open() -> Result<Self> {
        Self::open_path(Self::DEFAULT_PATH)
    }

    /// Open the driver at `path`.
    pub fn open_path(path: &str) -> Result<Self> {
        let mut name = path.as_bytes().to_vec();
        name.push(0);
        // SAFETY: `name` is NUL-terminated and outlives the call; null
        // security attributes and template handle are permitted.
        let handle = unsafe {
            CreateFileA(
                name.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                std::ptr::null(),
                OPEN_EXISTING,
                0,
                std::ptr::null_mut(),
            )
        };
        if handle.is_null() || handle == INVALID_HANDLE_VALUE {
            return Err(PortError::NotLoaded(format!(
                "cannot open CrosEC driver at {path} ({})",
                std::io::Error::last_os_error()
            )));
        }
        debug!(path, "opened CrosEC driver");
        Ok(Self { handle })
    }

    /// Issue `code` with `buffer` as both input and output. Returns the
    /// number of bytes the driver wrote back.
    fn ioctl(&mut self, code: u32, buffer: &mut [u8]) -> std::io::Result<usize> {
        let len = buffer.len() as u32;
        let mut returned: u32 = 0;
        // SAFETY: the same live buffer is passed as input and output with its
        // real length; the handle is open for the lifetime of `self`.
        let ok = unsafe {
            DeviceIoControl(
                self.handle,
                code,
                buffer.as_ptr().cast::<c_void>(),
                len,
                buffer.as_mut_ptr().cast::<c_void>(),
                len,
                &mut returned,
                std::ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(returned as usize)
    }
}

fn put_u32(buffer: &mut [u8], at: usize, value: u32) {
    buffer[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn get_u32(buffer: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buffer[at..at + 4]);
    u32::from_le_bytes(raw)
}

impl CommandDevice for CrosEcDevice {
    fn command(
        &mut self,
        command: u16,
        version: u8,
        output: &[u8],
        input: &mut [u8],
    ) -> Result<DeviceReply> {
        let mut buffer =
            vec![0u8; COMMAND_HEADER_SIZE + output.len().max(input.len())];
        put_u32(&mut buffer, 0, u32::from(version));
        put_u32(&mut buffer, 4, u32::from(command));
        put_u32(&mut buffer, 8, output.len() as u32);
        put_u32(&mut buffer, 12, input.len() as u32);
        put_u32(&mut buffer, 16, 0xFF);
        buffer[COMMAND_HEADER_SIZE..COMMAND_HEADER_SIZE + output.len()].copy_from_slice(output);

        let returned = self
            .ioctl(IOCTL_CROSEC_XCMD, &mut buffer)
            .map_err(|source| PortError::Device {
                op: "command",
                source,
            })?;
        let result = get_u32(&buffer, 16);
        let len = returned.saturating_sub(COMMAND_HEADER_SIZE);
        let copied = len.min(input.len());
        input[..copied]
            .copy_from_slice(&buffer[COMMAND_HEADER_SIZE..COMMAND_HEADER_SIZE + copied]);
        trace!(command, result, len, "CrosEC command complete");
        Ok(DeviceReply { result, len })
    }

    fn read_memmap(&mut self, offset: u8, out: &mut [u8]) -> Result<bool> {
        let len = out.len().min(READMEM_BUFFER_SIZE);
        let mut buffer = vec![0u8; READMEM_HEADER_SIZE + READMEM_BUFFER_SIZE];
        put_u32(&mut buffer, 0, u32::from(offset));
        put_u32(&mut buffer, 4, len as u32);

        // Older drivers lack RDMEM; the caller falls back to a host command.
        if let Err(err) = self.ioctl(IOCTL_CROSEC_RDMEM, &mut buffer) {
            debug!(error = %err, "CrosEC memory-map read unavailable");
            return Ok(false);
        }
        out[..len].copy_from_slice(&buffer[READMEM_HEADER_SIZE..READMEM_HEADER_SIZE + len]);
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "crosec"
    }
}

impl Drop for CrosEcDevice {
    fn drop(&mut self) {
        // SAFETY: the handle was returned by CreateFileA and is closed once.
        unsafe {
            CloseHandle(self.handle);
        }
    }
}

impl std::fmt::Debug for CrosEcDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrosEcDevice").finish_non_exhaustive()
    }
}
