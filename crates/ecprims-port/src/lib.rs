//! Byte-addressable I/O channels for embedded controller access.
//!
//! Provides a unified interface over the primitives that can reach the EC's
//! host interface registers:
//! - `/dev/port` positioned reads and writes (Linux)
//! - The WinRing0 kernel driver's port I/O IOCTLs (Windows)
//!
//! The CrosEC kernel driver (Windows) works a level higher and carries whole
//! host commands; it implements [`CommandDevice`] instead.
//!
//! This is the lowest layer of ecprims. Everything else builds on top of
//! the traits provided here.

pub mod error;
pub mod traits;

#[cfg(target_os = "linux")]
pub mod devport;

#[cfg(windows)]
pub mod crosec;
#[cfg(windows)]
pub mod winring0;

pub use error::{PortError, Result};
pub use traits::{ByteChannel, CommandDevice, DeviceReply};

#[cfg(target_os = "linux")]
pub use devport::DevPort;

#[cfg(windows)]
pub use crosec::CrosEcDevice;
#[cfg(windows)]
pub use winring0::WinRing0;
