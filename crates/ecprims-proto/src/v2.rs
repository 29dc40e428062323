//! Protocol v2: argument block + parameter window.
//!
//! ```text
//! 0x800 ┌───────┬─────────────────┬───────────┬──────────┐
//!       │ flags │ command_version │ data_size │ checksum │
//! 0x804 ├───────┴─────────────────┴───────────┴──────────┤
//!       │ params (data_size bytes, max 0xFC)             │
//!       └────────────────────────────────────────────────┘
//! ```
//!
//! The checksum is the low byte of `command + flags + command_version +
//! data_size + Σ params`, computed independently for each direction.
//! Writing the command code to the command port starts execution.

use bytes::{BufMut, Bytes, BytesMut};
use ecprims_port::ByteChannel;
use tracing::{trace, warn};

use crate::backoff::{Backoff, Sleeper};
use crate::checksum::Checksum;
use crate::driver::{check_result, read_array, wait_for_ec, write_block, Exchange};
use crate::error::{ProtocolError, Result};
use crate::layout::{
    ARGS_FLAG_FROM_HOST, ARGS_FLAG_TO_HOST, ARGS_SIZE, HOST_ARGS, HOST_CMD, HOST_PARAM,
    PROTO2_MAX_PARAM_SIZE,
};

/// The v2 argument block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostArgs {
    pub flags: u8,
    pub command_version: u8,
    pub data_size: u8,
    pub checksum: u8,
}

impl HostArgs {
    /// Request args for a payload of `data_size` bytes. Checksum left zero.
    pub fn request(command_version: u8, data_size: u8) -> Self {
        Self {
            flags: ARGS_FLAG_FROM_HOST,
            command_version,
            data_size,
            checksum: 0,
        }
    }

    /// Checksum seeded with the command and every field except `checksum`.
    pub fn seed(&self, command: u16) -> Checksum {
        let mut sum = Checksum::seeded(command as u8);
        sum.add(self.flags);
        sum.add(self.command_version);
        sum.add(self.data_size);
        sum
    }

    pub fn to_bytes(self) -> [u8; ARGS_SIZE] {
        [
            self.flags,
            self.command_version,
            self.data_size,
            self.checksum,
        ]
    }

    pub fn from_bytes(raw: [u8; ARGS_SIZE]) -> Self {
        Self {
            flags: raw[0],
            command_version: raw[1],
            data_size: raw[2],
            checksum: raw[3],
        }
    }
}

/// Run one v2 exchange.
pub fn execute<C, S>(
    channel: &mut C,
    backoff: &mut Backoff<S>,
    exchange: &Exchange<'_>,
) -> Result<Bytes>
where
    C: ByteChannel + ?Sized,
    S: Sleeper,
{
    let output = exchange.output;
    if output.len() > PROTO2_MAX_PARAM_SIZE {
        return Err(ProtocolError::RequestTruncated {
            size: output.len(),
            max: PROTO2_MAX_PARAM_SIZE,
        });
    }

    let mut args = HostArgs::request(exchange.version, output.len() as u8);
    let mut csum = args.seed(exchange.command);
    for (addr, &byte) in (HOST_PARAM..).zip(output) {
        channel.write_byte(addr, byte)?;
        csum.add(byte);
    }
    args.checksum = csum.value();

    write_block(channel, HOST_ARGS, &args.to_bytes())?;
    channel.write_byte(HOST_CMD, exchange.command as u8)?;
    trace!(command = exchange.command, size = output.len(), "v2 command started");

    wait_for_ec(channel, backoff)?;
    check_result(channel)?;

    let reply = HostArgs::from_bytes(read_array(channel, HOST_ARGS)?);

    // Without TO_HOST the EC treated the request as an older format and read
    // its params from the wrong place.
    if reply.flags & ARGS_FLAG_TO_HOST == 0 {
        warn!(flags = reply.flags, "EC protocol mismatch");
        return Err(ProtocolError::ProtocolMismatch);
    }

    let size = usize::from(reply.data_size);
    // Never read past the window, whatever the caller can accept.
    let capacity = exchange.input_capacity.min(PROTO2_MAX_PARAM_SIZE);
    if size > capacity {
        warn!(size, capacity, "EC returned too much data");
        return Err(ProtocolError::ResponseTooBig { size, capacity });
    }

    let mut csum = reply.seed(exchange.command);
    let mut payload = BytesMut::with_capacity(size);
    for addr in (HOST_PARAM..).take(size) {
        let byte = channel.read_byte(addr)?;
        csum.add(byte);
        payload.put_u8(byte);
    }

    if csum.value() != reply.checksum {
        warn!(
            expected = reply.checksum,
            actual = csum.value(),
            "EC response has invalid checksum"
        );
        return Err(ProtocolError::InvalidChecksum);
    }

    Ok(payload.freeze())
}
