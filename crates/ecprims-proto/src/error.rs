use std::time::Duration;

use ecprims_port::PortError;

use crate::layout::{result_name, EECRESULT};

/// Errors that can occur during a host command exchange or memory-map read.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The byte channel failed. Never retried.
    #[error("channel failure: {0}")]
    Channel(#[from] PortError),

    /// The busy flag did not clear within the exchange timeout.
    #[error("timeout waiting for EC response after {0:?}")]
    Timeout(Duration),

    /// The EC executed the command and reported a nonzero result.
    #[error("EC returned error result {code} ({})", result_name(*code))]
    EcError { code: u8 },

    /// The EC did not answer with the v2 argument block (TO_HOST unset).
    #[error("EC protocol mismatch (response args missing TO_HOST flag)")]
    ProtocolMismatch,

    /// The response header failed structural validation.
    #[error("invalid EC response: {0}")]
    InvalidResponse(String),

    /// The request does not fit the protocol's parameter window.
    #[error("request too large ({size} bytes, max {max})")]
    RequestTruncated { size: usize, max: usize },

    /// The EC returned more data than the caller can accept.
    #[error("EC returned too much data ({size} bytes, capacity {capacity})")]
    ResponseTooBig { size: usize, capacity: usize },

    /// The response checksum did not verify.
    #[error("EC response has invalid checksum")]
    InvalidChecksum,

    /// A memory-map read falls outside the mapped region.
    #[error("memory map read out of range (offset {offset:#04x}, {len} bytes)")]
    MemmapOutOfRange { offset: usize, len: usize },

    /// The memory map would run past the last I/O port.
    #[error("memory map base {base:#06x} runs past the end of port space")]
    MemmapBase { base: u16 },
}

impl ProtocolError {
    /// Legacy integer form: `-(EECRESULT + code)` for EC-reported results,
    /// `None` for transport-side failures.
    pub fn raw_ec_code(&self) -> Option<i32> {
        match self {
            ProtocolError::EcError { code } => Some(-(EECRESULT + i32::from(*code))),
            _ => None,
        }
    }

    /// Whether retrying the whole exchange could succeed. The core never
    /// retries on its own; this only informs the caller.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProtocolError::Timeout(_) | ProtocolError::InvalidChecksum
        )
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ec_error_message_names_the_code() {
        let err = ProtocolError::EcError { code: 3 };
        assert_eq!(err.to_string(), "EC returned error result 3 (INVALID_PARAM)");
        assert_eq!(err.raw_ec_code(), Some(-1003));
    }

    #[test]
    fn transport_failures_have_no_ec_code() {
        assert_eq!(ProtocolError::InvalidChecksum.raw_ec_code(), None);
        assert_eq!(ProtocolError::ProtocolMismatch.raw_ec_code(), None);
    }

    #[test]
    fn only_timeout_and_checksum_are_transient() {
        assert!(ProtocolError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ProtocolError::InvalidChecksum.is_transient());
        assert!(!ProtocolError::EcError { code: 1 }.is_transient());
        assert!(!ProtocolError::RequestTruncated { size: 300, max: 248 }.is_transient());
        assert!(!ProtocolError::Channel(PortError::Unsupported).is_transient());
    }
}
