//! Protocol v3: header + payload packet.
//!
//! Request (little-endian):
//! ```text
//! ┌────────────────┬──────────┬─────────┬─────────────────┬──────────┬──────────┐
//! │ struct_version │ checksum │ command │ command_version │ reserved │ data_len │
//! │ (1B) = 3       │ (1B)     │ (2B)    │ (1B)            │ (1B) = 0 │ (2B)     │
//! └────────────────┴──────────┴─────────┴─────────────────┴──────────┴──────────┘
//! ```
//! Response (little-endian):
//! ```text
//! ┌────────────────┬──────────┬────────┬──────────┬──────────┐
//! │ struct_version │ checksum │ result │ data_len │ reserved │
//! │ (1B) = 3       │ (1B)     │ (2B)   │ (2B)     │ (2B) = 0 │
//! └────────────────┴──────────┴────────┴──────────┴──────────┘
//! ```
//! Header and payload share the 256-byte packet window at 0x800. The
//! checksum byte makes the whole packet sum to zero modulo 256.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ecprims_port::ByteChannel;
use tracing::{trace, warn};

use crate::backoff::{Backoff, Sleeper};
use crate::checksum::Checksum;
use crate::driver::{check_result, read_array, wait_for_ec, write_block, Exchange};
use crate::error::{ProtocolError, Result};
use crate::layout::{
    COMMAND_PROTOCOL_3, HOST_CMD, HOST_PACKET, HOST_REQUEST_VERSION, HOST_RESPONSE_VERSION,
    PACKET_SIZE, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE,
};

/// v3 request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub struct_version: u8,
    pub checksum: u8,
    pub command: u16,
    pub command_version: u8,
    pub reserved: u8,
    pub data_len: u16,
}

impl RequestHeader {
    /// Header with a zero checksum placeholder.
    pub fn new(command: u16, command_version: u8, data_len: u16) -> Self {
        Self {
            struct_version: HOST_REQUEST_VERSION,
            checksum: 0,
            command,
            command_version,
            reserved: 0,
            data_len,
        }
    }

    pub fn to_bytes(&self) -> [u8; REQUEST_HEADER_SIZE] {
        let mut out = [0u8; REQUEST_HEADER_SIZE];
        let mut buf = &mut out[..];
        buf.put_u8(self.struct_version);
        buf.put_u8(self.checksum);
        buf.put_u16_le(self.command);
        buf.put_u8(self.command_version);
        buf.put_u8(self.reserved);
        buf.put_u16_le(self.data_len);
        out
    }

    pub fn from_bytes(raw: [u8; REQUEST_HEADER_SIZE]) -> Self {
        let mut buf = &raw[..];
        Self {
            struct_version: buf.get_u8(),
            checksum: buf.get_u8(),
            command: buf.get_u16_le(),
            command_version: buf.get_u8(),
            reserved: buf.get_u8(),
            data_len: buf.get_u16_le(),
        }
    }
}

/// v3 response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub struct_version: u8,
    pub checksum: u8,
    pub result: u16,
    pub data_len: u16,
    pub reserved: u16,
}

impl ResponseHeader {
    pub fn to_bytes(&self) -> [u8; RESPONSE_HEADER_SIZE] {
        let mut out = [0u8; RESPONSE_HEADER_SIZE];
        let mut buf = &mut out[..];
        buf.put_u8(self.struct_version);
        buf.put_u8(self.checksum);
        buf.put_u16_le(self.result);
        buf.put_u16_le(self.data_len);
        buf.put_u16_le(self.reserved);
        out
    }

    pub fn from_bytes(raw: [u8; RESPONSE_HEADER_SIZE]) -> Self {
        let mut buf = &raw[..];
        Self {
            struct_version: buf.get_u8(),
            checksum: buf.get_u8(),
            result: buf.get_u16_le(),
            data_len: buf.get_u16_le(),
            reserved: buf.get_u16_le(),
        }
    }
}

/// Encode a complete request packet (header followed by payload).
///
/// Fails with [`ProtocolError::RequestTruncated`] if the packet would not
/// fit the packet window.
pub fn encode_request(exchange: &Exchange<'_>) -> Result<BytesMut> {
    let output = exchange.output;
    if REQUEST_HEADER_SIZE + output.len() > PACKET_SIZE {
        return Err(ProtocolError::RequestTruncated {
            size: output.len(),
            max: PACKET_SIZE - REQUEST_HEADER_SIZE,
        });
    }

    let mut header = RequestHeader::new(exchange.command, exchange.version, output.len() as u16);
    let mut csum = Checksum::new();
    csum.add_slice(output);
    csum.add_slice(&header.to_bytes());
    header.checksum = csum.complement();

    let mut packet = BytesMut::with_capacity(REQUEST_HEADER_SIZE + output.len());
    packet.put_slice(&header.to_bytes());
    packet.put_slice(output);
    Ok(packet)
}

/// Run one v3 exchange.
pub fn execute<C, S>(
    channel: &mut C,
    backoff: &mut Backoff<S>,
    exchange: &Exchange<'_>,
) -> Result<Bytes>
where
    C: ByteChannel + ?Sized,
    S: Sleeper,
{
    let packet = encode_request(exchange)?;
    let (header, payload) = packet.split_at(REQUEST_HEADER_SIZE);

    // Payload first, then header, then the trigger.
    write_block(channel, HOST_PACKET + REQUEST_HEADER_SIZE as u16, payload)?;
    write_block(channel, HOST_PACKET, header)?;
    channel.write_byte(HOST_CMD, COMMAND_PROTOCOL_3)?;
    trace!(
        command = exchange.command,
        size = payload.len(),
        "v3 command started"
    );

    wait_for_ec(channel, backoff)?;
    check_result(channel)?;

    let raw: [u8; RESPONSE_HEADER_SIZE] = read_array(channel, HOST_PACKET)?;
    let mut csum = Checksum::new();
    csum.add_slice(&raw);
    let response = ResponseHeader::from_bytes(raw);

    if response.struct_version != HOST_RESPONSE_VERSION {
        warn!(
            version = response.struct_version,
            "EC response version mismatch"
        );
        return Err(ProtocolError::InvalidResponse(format!(
            "struct version {} (expected {HOST_RESPONSE_VERSION})",
            response.struct_version
        )));
    }

    if response.reserved != 0 {
        warn!(reserved = response.reserved, "EC response reserved != 0");
        return Err(ProtocolError::InvalidResponse(format!(
            "reserved field is {:#06x}",
            response.reserved
        )));
    }

    let size = usize::from(response.data_len);
    // Never read past the window, whatever the caller can accept.
    let capacity = exchange.input_capacity.min(PACKET_SIZE - RESPONSE_HEADER_SIZE);
    if size > capacity {
        warn!(size, capacity, "EC returned too much data");
        return Err(ProtocolError::ResponseTooBig { size, capacity });
    }

    let mut data = BytesMut::with_capacity(size);
    let payload_start = HOST_PACKET + RESPONSE_HEADER_SIZE as u16;
    for addr in (payload_start..).take(size) {
        let byte = channel.read_byte(addr)?;
        csum.add(byte);
        data.put_u8(byte);
    }

    if !csum.is_zero() {
        warn!(residue = csum.value(), "EC response has invalid checksum");
        return Err(ProtocolError::InvalidChecksum);
    }

    Ok(data.freeze())
}
