use bytes::{BufMut, Bytes, BytesMut};
use ecprims_port::ByteChannel;

use crate::error::{ProtocolError, Result};
use crate::layout::{MEMMAP_ID, MEMMAP_SIGNATURE, MEMMAP_SIZE};

const PORT_SPACE: usize = 0x1_0000;

/// Reader for the EC's memory-mapped status region.
///
/// Reads go straight to the byte channel and never involve the command
/// busy-wait. Every range is validated against the region size before the
/// first byte is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMap {
    base: u16,
}

impl MemoryMap {
    /// Reader for a region starting at port `base`.
    ///
    /// A base too close to the top of port space is accepted here but every
    /// read through it fails with [`ProtocolError::MemmapBase`]. Use
    /// [`MemoryMap::try_new`] to reject it up front.
    pub const fn new(base: u16) -> Self {
        Self { base }
    }

    /// Reader for a region starting at port `base`, if the whole region fits
    /// below port 0x10000.
    pub fn try_new(base: u16) -> Result<Self> {
        if Self::fits(base) {
            Ok(Self { base })
        } else {
            Err(ProtocolError::MemmapBase { base })
        }
    }

    /// True when `base..base + MEMMAP_SIZE` stays inside port space.
    pub const fn fits(base: u16) -> bool {
        base as usize + MEMMAP_SIZE <= PORT_SPACE
    }

    /// First port of the region.
    pub fn base(&self) -> u16 {
        self.base
    }

    /// True when the `"EC"` signature is present at this base.
    pub fn has_signature<C: ByteChannel + ?Sized>(&self, channel: &mut C) -> Result<bool> {
        for (i, &expected) in MEMMAP_SIGNATURE.iter().enumerate() {
            if self.read_u8(channel, MEMMAP_ID + i)? != expected {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Read one byte at `offset`.
    pub fn read_u8<C: ByteChannel + ?Sized>(&self, channel: &mut C, offset: usize) -> Result<u8> {
        self.check_range(offset, 1)?;
        Ok(channel.read_byte(self.addr(offset))?)
    }

    /// Read exactly `len` bytes starting at `offset`.
    pub fn read_fixed<C: ByteChannel + ?Sized>(
        &self,
        channel: &mut C,
        offset: usize,
        len: usize,
    ) -> Result<Bytes> {
        self.check_range(offset, len)?;
        let mut out = BytesMut::with_capacity(len);
        for i in 0..len {
            out.put_u8(channel.read_byte(self.addr(offset + i))?);
        }
        Ok(out.freeze())
    }

    /// Read a NUL-terminated string starting at `offset`.
    ///
    /// Stops at the first zero byte or the end of the region. The terminator
    /// is not included.
    pub fn read_string<C: ByteChannel + ?Sized>(
        &self,
        channel: &mut C,
        offset: usize,
    ) -> Result<Bytes> {
        self.check_range(offset, 1)?;
        let mut out = BytesMut::new();
        for i in offset..MEMMAP_SIZE {
            let byte = channel.read_byte(self.addr(i))?;
            if byte == 0 {
                break;
            }
            out.put_u8(byte);
        }
        Ok(out.freeze())
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        if !Self::fits(self.base) {
            return Err(ProtocolError::MemmapBase { base: self.base });
        }
        check_region(offset, len)
    }

    // check_range keeps base + offset below PORT_SPACE.
    fn addr(&self, offset: usize) -> u16 {
        (usize::from(self.base) + offset) as u16
    }
}

/// Validate a memory-map read of `len` bytes at `offset`, whatever carries it.
pub fn check_region(offset: usize, len: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= MEMMAP_SIZE && offset < MEMMAP_SIZE => Ok(()),
        _ => Err(ProtocolError::MemmapOutOfRange { offset, len }),
    }
}
