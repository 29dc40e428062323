use ecprims_port::PortError;
use ecprims_proto::ProtocolError;

use crate::lock::LockError;

/// Errors that can occur while negotiating or using a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An exchange or memory-map read failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Nothing that looks like an EC answered.
    #[error("EC not present: {0}")]
    EcNotPresent(String),

    /// The EC advertises neither protocol v2 nor v3.
    #[error("EC supports no known host command protocol (flags {flags:#04x})")]
    UnsupportedProtocol { flags: u8 },

    /// The driver path found no readable memory map.
    #[error("EC memory map is not readable through this driver")]
    MemmapUnavailable,

    /// The exchange lock could not be taken.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),
}

impl From<PortError> for TransportError {
    fn from(err: PortError) -> Self {
        TransportError::Protocol(ProtocolError::Channel(err))
    }
}

impl TransportError {
    /// Legacy integer form of an EC-reported result, if this is one.
    pub fn raw_ec_code(&self) -> Option<i32> {
        match self {
            TransportError::Protocol(err) => err.raw_ec_code(),
            _ => None,
        }
    }

    /// The EC result code, if the EC executed the command and rejected it.
    pub fn ec_result(&self) -> Option<u8> {
        match self {
            TransportError::Protocol(ProtocolError::EcError { code }) => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
