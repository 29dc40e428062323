use std::path::PathBuf;

/// Errors that can occur in byte channel operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// Failed to open the device backing the channel.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Reading a single byte failed.
    #[error("failed to read port {addr:#06x}: {source}")]
    Read { addr: u16, source: std::io::Error },

    /// Writing a single byte failed.
    #[error("failed to write {value:#04x} to port {addr:#06x}: {source}")]
    Write {
        addr: u16,
        value: u8,
        source: std::io::Error,
    },

    /// A command-level driver request failed.
    #[error("EC driver {op} request failed: {source}")]
    Device {
        op: &'static str,
        source: std::io::Error,
    },

    /// The kernel driver providing port access is not available.
    #[error("port driver not loaded: {0}")]
    NotLoaded(String),

    /// No byte channel implementation exists for this platform.
    #[error("port I/O is not supported on this platform")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, PortError>;
