use std::fmt;
use std::io;

use ecprims_host::{LockError, TransportError};
use ecprims_port::PortError;
use ecprims_proto::ProtocolError;

pub const SUCCESS: i32 = 0;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
/// No EC answered on the configured channel (EX_UNAVAILABLE).
pub const EC_NOT_PRESENT: i32 = 69;
/// The EC executed the command and reported a nonzero result (EX_SOFTWARE).
pub const EC_ERROR: i32 = 70;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

fn io_code(kind: io::ErrorKind) -> i32 {
    match kind {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => EC_NOT_PRESENT,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        _ => TRANSPORT_ERROR,
    }
}

pub fn port_error(context: &str, err: PortError) -> CliError {
    match err {
        PortError::Open { ref source, .. } => {
            CliError::new(io_code(source.kind()), format!("{context}: {err}"))
        }
        PortError::NotLoaded(_) => CliError::new(PERMISSION_DENIED, format!("{context}: {err}")),
        PortError::Unsupported => CliError::new(USAGE, format!("{context}: {err}")),
        PortError::Device { ref source, .. } => {
            CliError::new(io_code(source.kind()), format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn protocol_error(context: &str, err: ProtocolError) -> CliError {
    match err {
        ProtocolError::Channel(err) => port_error(context, err),
        ProtocolError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ProtocolError::EcError { .. } => CliError::new(EC_ERROR, format!("{context}: {err}")),
        ProtocolError::RequestTruncated { .. }
        | ProtocolError::MemmapOutOfRange { .. }
        | ProtocolError::MemmapBase { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        ProtocolError::ProtocolMismatch
        | ProtocolError::InvalidResponse(_)
        | ProtocolError::ResponseTooBig { .. }
        | ProtocolError::InvalidChecksum => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}

pub fn lock_error(context: &str, err: LockError) -> CliError {
    match err {
        LockError::Open { ref source, .. } if source.kind() == io::ErrorKind::PermissionDenied => {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        LockError::Busy { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Protocol(err) => protocol_error(context, err),
        TransportError::Lock(err) => lock_error(context, err),
        TransportError::EcNotPresent(_) => {
            CliError::new(EC_NOT_PRESENT, format!("{context}: {err}"))
        }
        TransportError::MemmapUnavailable => {
            CliError::new(EC_NOT_PRESENT, format!("{context}: {err}"))
        }
        TransportError::UnsupportedProtocol { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
    }
}
