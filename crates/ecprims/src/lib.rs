//! Host-side transport for embedded controller host commands.
//!
//! ecprims talks to a ChromeOS-style EC over its LPC host interface:
//! checksummed command/response framing over raw port I/O, with the wire
//! protocol picked automatically at startup.
//!
//! # Crate Structure
//!
//! - [`port`]: Byte channels (`/dev/port`, WinRing0) and the CrosEC command driver
//! - [`proto`]: Protocol v2/v3 framing, checksums, backoff, memory map
//! - [`host`]: Negotiation, exchange locking, and the `Transport` entry point
//!
//! ```no_run
//! use ecprims::host::{negotiate, FileLock, TransportConfig};
//! use ecprims::port::DevPort;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let channel = DevPort::open()?;
//! let lock = FileLock::new(FileLock::DEFAULT_PATH);
//! let mut ec = negotiate(channel, lock, TransportConfig::default())?;
//! let reply = ec.send_command(0x0001, 0, &0xA0B0_C0D0u32.to_le_bytes(), 4)?;
//! assert_eq!(reply.len(), 4);
//! # Ok(())
//! # }
//! ```

/// Re-export byte channel types.
pub mod port {
    pub use ecprims_port::*;
}

/// Re-export protocol framing types.
pub mod proto {
    pub use ecprims_proto::*;
}

/// Re-export transport types.
pub mod host {
    pub use ecprims_host::*;
}
