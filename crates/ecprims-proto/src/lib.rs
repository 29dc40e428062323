//! EC host command framing over a byte channel.
//!
//! This is the core layer of ecprims. Every exchange is one request and one
//! response, framed in one of two wire formats:
//! - Protocol v2: a 4-byte argument block plus a parameter window, with an
//!   additive checksum seeded by the command code
//! - Protocol v3: an 8-byte header plus payload in a 256-byte packet window,
//!   checksummed so the whole packet sums to zero
//!
//! Completion is detected by polling the busy flag with exponential backoff.

pub mod backoff;
pub mod checksum;
pub mod driver;
pub mod error;
pub mod layout;
pub mod memmap;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod v2;
pub mod v3;

pub use backoff::{Backoff, BackoffConfig, Sleeper, ThreadSleeper, WaitStatus};
pub use checksum::Checksum;
pub use driver::{Exchange, Limits, Protocol};
pub use error::{ProtocolError, Result};
pub use layout::result_name;
pub use memmap::{check_region, MemoryMap};
