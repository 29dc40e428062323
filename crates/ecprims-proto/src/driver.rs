use std::fmt;

use bytes::Bytes;
use ecprims_port::ByteChannel;
use tracing::trace;

use crate::backoff::{Backoff, Sleeper, WaitStatus};
use crate::error::{ProtocolError, Result};
use crate::layout::{
    HOST_CMD, HOST_DATA, PACKET_SIZE, PROTO2_MAX_PARAM_SIZE, REQUEST_HEADER_SIZE,
    RESPONSE_HEADER_SIZE, STATUS_BUSY_MASK,
};
use crate::{v2, v3};

/// One request/response round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exchange<'a> {
    /// Host command code.
    pub command: u16,
    /// Command version.
    pub version: u8,
    /// Host-to-EC payload.
    pub output: &'a [u8],
    /// Largest EC-to-host payload the caller accepts. The drivers also hold
    /// a reply to their own window, so `usize::MAX` means "whatever fits".
    pub input_capacity: usize,
}

impl<'a> Exchange<'a> {
    /// Describe an exchange.
    pub fn new(command: u16, version: u8, output: &'a [u8], input_capacity: usize) -> Self {
        Self {
            command,
            version,
            output,
            input_capacity,
        }
    }
}

/// Payload size limits of a protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Largest host-to-EC payload.
    pub max_output: usize,
    /// Largest EC-to-host payload.
    pub max_input: usize,
}

/// Host command protocol selected at negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Legacy argument block + parameter window.
    V2,
    /// Header + payload packet summing to zero.
    V3,
}

impl Protocol {
    /// Payload limits for this protocol.
    pub fn limits(self) -> Limits {
        match self {
            Protocol::V2 => Limits {
                max_output: PROTO2_MAX_PARAM_SIZE,
                max_input: PROTO2_MAX_PARAM_SIZE,
            },
            Protocol::V3 => Limits {
                max_output: PACKET_SIZE - REQUEST_HEADER_SIZE,
                max_input: PACKET_SIZE - RESPONSE_HEADER_SIZE,
            },
        }
    }

    /// Run one exchange with this protocol.
    pub fn execute<C, S>(
        self,
        channel: &mut C,
        backoff: &mut Backoff<S>,
        exchange: &Exchange<'_>,
    ) -> Result<Bytes>
    where
        C: ByteChannel + ?Sized,
        S: Sleeper,
    {
        match self {
            Protocol::V2 => v2::execute(channel, backoff, exchange),
            Protocol::V3 => v3::execute(channel, backoff, exchange),
        }
    }

    /// Short name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Protocol::V2 => "v2",
            Protocol::V3 => "v3",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Write `bytes` to consecutive ports starting at `base`.
pub(crate) fn write_block<C: ByteChannel + ?Sized>(
    channel: &mut C,
    base: u16,
    bytes: &[u8],
) -> Result<()> {
    for (addr, &byte) in (base..).zip(bytes) {
        channel.write_byte(addr, byte)?;
    }
    Ok(())
}

/// Read `N` consecutive ports starting at `base`.
pub(crate) fn read_array<const N: usize, C: ByteChannel + ?Sized>(
    channel: &mut C,
    base: u16,
) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    for (addr, slot) in (base..).zip(out.iter_mut()) {
        *slot = channel.read_byte(addr)?;
    }
    Ok(out)
}

/// Block until the EC clears its busy flag.
pub(crate) fn wait_for_ec<C, S>(channel: &mut C, backoff: &mut Backoff<S>) -> Result<()>
where
    C: ByteChannel + ?Sized,
    S: Sleeper,
{
    let status = backoff.wait(|| {
        let status = channel.read_byte(HOST_CMD)?;
        Ok::<_, ProtocolError>(status & STATUS_BUSY_MASK == 0)
    })?;
    match status {
        WaitStatus::Ready => Ok(()),
        WaitStatus::TimedOut => Err(ProtocolError::Timeout(backoff.config().timeout)),
    }
}

/// Read the result code left on the data port.
pub(crate) fn check_result<C: ByteChannel + ?Sized>(channel: &mut C) -> Result<()> {
    let code = channel.read_byte(HOST_DATA)?;
    if code != 0 {
        trace!(code, "EC reported error result");
        return Err(ProtocolError::EcError { code });
    }
    Ok(())
}
