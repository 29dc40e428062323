use crate::error::Result;

/// A byte-addressable channel to the EC's host interface.
///
/// Addresses are 16-bit x86 I/O port numbers. Every failure is fatal for
/// the exchange that issued it; implementations never retry.
///
/// A channel is not safe for concurrent access. Callers serialize use with
/// an external lock and `&mut` access.
pub trait ByteChannel {
    /// Read one byte from `addr`.
    fn read_byte(&mut self, addr: u16) -> Result<u8>;

    /// Write `value` to `addr`.
    fn write_byte(&mut self, addr: u16, value: u8) -> Result<()>;

    /// Channel name for diagnostics.
    fn name(&self) -> &'static str {
        "port"
    }
}

impl<C: ByteChannel + ?Sized> ByteChannel for &mut C {
    fn read_byte(&mut self, addr: u16) -> Result<u8> {
        (**self).read_byte(addr)
    }

    fn write_byte(&mut self, addr: u16, value: u8) -> Result<()> {
        (**self).write_byte(addr, value)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<C: ByteChannel + ?Sized> ByteChannel for Box<C> {
    fn read_byte(&mut self, addr: u16) -> Result<u8> {
        (**self).read_byte(addr)
    }

    fn write_byte(&mut self, addr: u16, value: u8) -> Result<()> {
        (**self).write_byte(addr, value)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// What a [`CommandDevice`] reports for one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceReply {
    /// EC result code. Zero is success.
    pub result: u32,
    /// Response length the EC produced. May exceed the caller's buffer, in
    /// which case only the buffer's worth was copied.
    pub len: usize,
}

/// A kernel driver that carries whole host commands.
///
/// The driver owns the framing, checksums and busy-waiting, so the host only
/// hands over the command and its payload. Same concurrency rules as
/// [`ByteChannel`].
pub trait CommandDevice {
    /// Run one command. The response is copied into `input`, whose length is
    /// the largest response the caller accepts.
    fn command(&mut self, command: u16, version: u8, output: &[u8], input: &mut [u8])
        -> Result<DeviceReply>;

    /// Copy memory-map bytes starting at `offset` into `out`.
    ///
    /// `Ok(false)` means the driver has no direct memory-map access and the
    /// caller should go through a host command instead.
    fn read_memmap(&mut self, offset: u8, out: &mut [u8]) -> Result<bool>;

    /// Device name for diagnostics.
    fn name(&self) -> &'static str {
        "driver"
    }
}

impl<D: CommandDevice + ?Sized> CommandDevice for &mut D {
    fn command(
        &mut self,
        command: u16,
        version: u8,
        output: &[u8],
        input: &mut [u8],
    ) -> Result<DeviceReply> {
        (**self).command(command, version, output, input)
    }

    fn read_memmap(&mut self, offset: u8, out: &mut [u8]) -> Result<bool> {
        (**self).read_memmap(offset, out)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<D: CommandDevice + ?Sized> CommandDevice for Box<D> {
    fn command(
        &mut self,
        command: u16,
        version: u8,
        output: &[u8],
        input: &mut [u8],
    ) -> Result<DeviceReply> {
        (**self).command(command, version, output, input)
    }

    fn read_memmap(&mut self, offset: u8, out: &mut [u8]) -> Result<bool> {
        (**self).read_memmap(offset, out)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
