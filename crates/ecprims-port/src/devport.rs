use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PortError, Result};
use crate::traits::ByteChannel;

/// Port I/O through the Linux `/dev/port` character device.
///
/// Each byte is a positioned read or write at the port number's file
/// offset. Requires `CAP_SYS_RAWIO` (normally root).
#[derive(Debug)]
pub struct DevPort {
    file: File,
    path: PathBuf,
}

impl DevPort {
    /// Default device path.
    pub const DEFAULT_PATH: &'static str = "/dev/port";

    /// Open `/dev/port` for reading and writing.
    pub fn open() -> Result<Self> {
        Self::open_path(Self::DEFAULT_PATH)
    }

    /// Open an explicit device path.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| PortError::Open {
                path: path.clone(),
                source,
            })?;
        debug!(?path, "opened port device");
        Ok(Self { file, path })
    }

    /// The device path this channel was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteChannel for DevPort {
    fn read_byte(&mut self, addr: u16) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.file
            .read_exact_at(&mut buf, u64::from(addr))
            .map_err(|source| PortError::Read { addr, source })?;
        Ok(buf[0])
    }

    fn write_byte(&mut self, addr: u16, value: u8) -> Result<()> {
        self.file
            .write_all_at(&[value], u64::from(addr))
            .map_err(|source| PortError::Write {
                addr,
                value,
                source,
            })
    }

    fn name(&self) -> &'static str {
        "dev-port"
    }
}
