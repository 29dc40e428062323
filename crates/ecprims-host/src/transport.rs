use std::fmt;
use std::time::Instant;

use bytes::Bytes;
use ecprims_port::ByteChannel;
use ecprims_proto::{Backoff, Exchange, Limits, MemoryMap, Protocol, ProtocolError};
use tracing::debug;

use crate::config::TransportConfig;
use crate::error::Result;
use crate::lock::{ExchangeLock, LockGuard, LockTimeout, NoLock};
use crate::negotiate::Negotiated;

/// How many bytes [`Transport::read_mapped`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapRead {
    /// Exactly this many bytes.
    Fixed(usize),
    /// Up to the first NUL or the end of the map.
    String,
}

/// A negotiated connection to the EC.
///
/// Owns the byte channel and the exchange lock. The protocol, its limits and
/// the memory-map base are fixed at negotiation. Every operation takes
/// `&mut self`, so at most one exchange is in flight per transport.
pub struct Transport<C, L = NoLock> {
    channel: C,
    lock: L,
    lock_timeout: LockTimeout,
    backoff: Backoff,
    protocol: Protocol,
    memmap: MemoryMap,
    flags: u8,
}

impl<C: ByteChannel, L: ExchangeLock> Transport<C, L> {
    /// Assemble a transport from an already completed probe.
    pub fn from_parts(channel: C, lock: L, negotiated: Negotiated, config: &TransportConfig) -> Self {
        Self {
            channel,
            lock,
            lock_timeout: config.lock_timeout,
            backoff: Backoff::new(config.backoff_config()),
            protocol: negotiated.protocol,
            memmap: MemoryMap::new(negotiated.memmap_base),
            flags: negotiated.flags,
        }
    }

    /// Send one host command and return the EC's response payload.
    ///
    /// `output` larger than the protocol allows fails with
    /// [`ProtocolError::RequestTruncated`] before any channel access.
    /// `input_capacity` is clamped to the protocol's input limit.
    pub fn send_command(
        &mut self,
        command: u16,
        version: u8,
        output: &[u8],
        input_capacity: usize,
    ) -> Result<Bytes> {
        let limits = self.protocol.limits();
        if output.len() > limits.max_output {
            return Err(ProtocolError::RequestTruncated {
                size: output.len(),
                max: limits.max_output,
            }
            .into());
        }
        let exchange = Exchange::new(
            command,
            version,
            output,
            input_capacity.min(limits.max_input),
        );

        let _guard = LockGuard::acquire(&mut self.lock, self.lock_timeout)?;
        let start = Instant::now();
        let result = self
            .protocol
            .execute(&mut self.channel, &mut self.backoff, &exchange);
        match &result {
            Ok(payload) => debug!(
                command = format_args!("{command:#06x}"),
                version,
                sent = output.len(),
                received = payload.len(),
                elapsed_us = start.elapsed().as_micros() as u64,
                "EC command complete"
            ),
            Err(err) => debug!(
                command = format_args!("{command:#06x}"),
                version,
                error = %err,
                "EC command failed"
            ),
        }
        Ok(result?)
    }

    /// Read from the memory-mapped region at `offset`.
    pub fn read_mapped(&mut self, offset: usize, read: MapRead) -> Result<Bytes> {
        let _guard = LockGuard::acquire(&mut self.lock, self.lock_timeout)?;
        let bytes = match read {
            MapRead::Fixed(len) => self.memmap.read_fixed(&mut self.channel, offset, len)?,
            MapRead::String => self.memmap.read_string(&mut self.channel, offset)?,
        };
        Ok(bytes)
    }

    /// Protocol chosen at negotiation.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Payload limits of the negotiated protocol.
    pub fn limits(&self) -> Limits {
        self.protocol.limits()
    }

    /// Base port of the memory-mapped region.
    pub fn memmap_base(&self) -> u16 {
        self.memmap.base()
    }

    /// Host command capability flags read at negotiation.
    pub fn capability_flags(&self) -> u8 {
        self.flags
    }

    /// Name of the underlying byte channel.
    pub fn channel_name(&self) -> &'static str {
        self.channel.name()
    }

    /// Give back the channel and lock.
    pub fn into_parts(self) -> (C, L) {
        (self.channel, self.lock)
    }
}

impl<C: ByteChannel, L: ExchangeLock> fmt::Debug for Transport<C, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("channel", &self.channel.name())
            .field("lock", &self.lock.name())
            .field("protocol", &self.protocol)
            .field("memmap_base", &format_args!("{:#x}", self.memmap.base()))
            .field("flags", &format_args!("{:#04x}", self.flags))
            .finish()
    }
}
