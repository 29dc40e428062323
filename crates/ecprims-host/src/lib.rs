//! Host-side EC transport.
//!
//! This is the "just works" layer. Point it at a byte channel and an
//! exchange lock, and [`negotiate`] probes the EC, picks the host command
//! protocol it speaks and hands back a [`Transport`] whose
//! [`send_command`](Transport::send_command) is the single entry point for
//! every exchange.
//!
//! Kernel drivers that carry whole commands skip negotiation and go through
//! [`DeviceTransport`] instead.

pub mod config;
pub mod device;
pub mod error;
#[cfg(unix)]
pub mod flock;
pub mod lock;
#[cfg(windows)]
pub mod mutex;
pub mod negotiate;
pub mod transport;

pub use config::TransportConfig;
pub use device::{DeviceTransport, MemmapAccess, DEVICE_LIMITS};
pub use error::{Result, TransportError};
#[cfg(unix)]
pub use flock::FileLock;
pub use lock::{AcquireStatus, ExchangeLock, LockError, LockTimeout, NoLock, ReleaseStatus};
#[cfg(windows)]
pub use mutex::NamedMutexLock;
pub use negotiate::{negotiate, probe, select_protocol, Negotiated};
pub use transport::{MapRead, Transport};
