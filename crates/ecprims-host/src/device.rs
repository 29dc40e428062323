use std::fmt;

use bytes::Bytes;
use ecprims_port::{CommandDevice, DeviceReply};
use ecprims_proto::layout::{
    CMD_READ_MEMMAP, MEMMAP_ID, MEMMAP_SIGNATURE, MEMMAP_SIZE, PROTO2_MAX_PARAM_SIZE,
};
use ecprims_proto::{check_region, Limits, ProtocolError};
use tracing::{debug, info};

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::lock::{ExchangeLock, LockGuard, LockTimeout, NoLock};
use crate::transport::MapRead;

/// Payload limits through a command-level driver. The driver frames for us,
/// so these are the conservative legacy sizes.
pub const DEVICE_LIMITS: Limits = Limits {
    max_output: PROTO2_MAX_PARAM_SIZE - 8,
    max_input: PROTO2_MAX_PARAM_SIZE,
};

/// How memory-map reads reach the EC through a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemmapAccess {
    /// The driver copies the map out itself.
    Direct,
    /// Each read is a `CMD_READ_MEMMAP` host command.
    Command,
    /// Neither path produced the `"EC"` signature.
    Unavailable,
}

impl MemmapAccess {
    /// Short name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            MemmapAccess::Direct => "direct",
            MemmapAccess::Command => "command",
            MemmapAccess::Unavailable => "unavailable",
        }
    }
}

/// An EC reached through a kernel driver that carries whole commands.
///
/// Same contract as [`Transport`](crate::Transport): every operation takes
/// the exchange lock and `&mut self`. There is no protocol negotiation; the
/// driver speaks whatever the EC does.
pub struct DeviceTransport<D, L = NoLock> {
    device: D,
    lock: L,
    lock_timeout: LockTimeout,
    memmap: MemmapAccess,
}

impl<D: CommandDevice, L: ExchangeLock> DeviceTransport<D, L> {
    /// Wrap `device` and find a way to read the memory map.
    ///
    /// Direct reads are tried first, then `CMD_READ_MEMMAP`. A map that
    /// cannot be read is not fatal; commands still work.
    pub fn open(mut device: D, mut lock: L, config: &TransportConfig) -> Result<Self> {
        let mut memmap = MemmapAccess::Direct;
        let signature = {
            let _guard = LockGuard::acquire(&mut lock, config.lock_timeout)?;
            read_region(&mut device, &mut memmap, MEMMAP_ID, MEMMAP_SIGNATURE.len())
        };
        match signature {
            Ok(sig) if sig == MEMMAP_SIGNATURE => {}
            Ok(_) => memmap = MemmapAccess::Unavailable,
            Err(TransportError::Protocol(
                ProtocolError::EcError { .. } | ProtocolError::InvalidResponse(_),
            )) => memmap = MemmapAccess::Unavailable,
            Err(err) => return Err(err),
        }
        info!(
            device = device.name(),
            memmap = memmap.name(),
            "opened EC driver transport"
        );
        Ok(Self {
            device,
            lock,
            lock_timeout: config.lock_timeout,
            memmap,
        })
    }

    /// Send one host command and return the EC's response payload.
    ///
    /// Size rules match [`Transport::send_command`](crate::Transport::send_command)
    /// with [`DEVICE_LIMITS`].
    pub fn send_command(
        &mut self,
        command: u16,
        version: u8,
        output: &[u8],
        input_capacity: usize,
    ) -> Result<Bytes> {
        if output.len() > DEVICE_LIMITS.max_output {
            return Err(ProtocolError::RequestTruncated {
                size: output.len(),
                max: DEVICE_LIMITS.max_output,
            }
            .into());
        }
        let capacity = input_capacity.min(DEVICE_LIMITS.max_input);

        let _guard = LockGuard::acquire(&mut self.lock, self.lock_timeout)?;
        let mut input = vec![0u8; capacity];
        let reply = self.device.command(command, version, output, &mut input)?;
        check_reply(reply, capacity)?;
        input.truncate(reply.len);
        debug!(
            command = format_args!("{command:#06x}"),
            version,
            sent = output.len(),
            received = reply.len,
            "EC driver command complete"
        );
        Ok(Bytes::from(input))
    }

    /// Read from the memory map at `offset`.
    pub fn read_mapped(&mut self, offset: usize, read: MapRead) -> Result<Bytes> {
        let len = match read {
            MapRead::Fixed(len) => len,
            MapRead::String => 1,
        };
        check_region(offset, len)?;
        if self.memmap == MemmapAccess::Unavailable {
            return Err(TransportError::MemmapUnavailable);
        }

        let _guard = LockGuard::acquire(&mut self.lock, self.lock_timeout)?;
        let bytes = match read {
            MapRead::Fixed(len) => read_region(&mut self.device, &mut self.memmap, offset, len)?,
            MapRead::String => {
                let mut rest =
                    read_region(&mut self.device, &mut self.memmap, offset, MEMMAP_SIZE - offset)?;
                if let Some(nul) = rest.iter().position(|&b| b == 0) {
                    rest.truncate(nul);
                }
                rest
            }
        };
        Ok(Bytes::from(bytes))
    }

    /// Payload limits of the driver path.
    pub fn limits(&self) -> Limits {
        DEVICE_LIMITS
    }

    /// How memory-map reads are carried.
    pub fn memmap_access(&self) -> MemmapAccess {
        self.memmap
    }

    /// Name of the underlying device.
    pub fn device_name(&self) -> &'static str {
        self.device.name()
    }

    /// Give back the device and lock.
    pub fn into_parts(self) -> (D, L) {
        (self.device, self.lock)
    }
}

fn check_reply(reply: DeviceReply, capacity: usize) -> Result<()> {
    if reply.result != 0 {
        let code = u8::try_from(reply.result).unwrap_or(u8::MAX);
        return Err(ProtocolError::EcError { code }.into());
    }
    if reply.len > capacity {
        return Err(ProtocolError::ResponseTooBig {
            size: reply.len,
            capacity,
        }
        .into());
    }
    Ok(())
}

/// Read `len` map bytes at `offset`, dropping from direct to command access
/// the first time the driver refuses a direct read. The range is already
/// checked.
fn read_region<D: CommandDevice + ?Sized>(
    device: &mut D,
    access: &mut MemmapAccess,
    offset: usize,
    len: usize,
) -> Result<Vec<u8>> {
    let mut out = vec![0u8; len];
    if *access == MemmapAccess::Direct {
        if device.read_memmap(offset as u8, &mut out)? {
            return Ok(out);
        }
        debug!(device = device.name(), "no direct memory-map reads, using host commands");
        *access = MemmapAccess::Command;
    }

    let mut start = 0;
    while start < len {
        let size = (len - start).min(DEVICE_LIMITS.max_input);
        let params = [(offset + start) as u8, size as u8];
        let chunk = &mut out[start..start + size];
        let reply = device.command(CMD_READ_MEMMAP, 0, &params, chunk)?;
        check_reply(reply, size)?;
        if reply.len != size {
            return Err(ProtocolError::InvalidResponse(format!(
                "memory map read returned {} of {size} bytes",
                reply.len
            ))
            .into());
        }
        start += size;
    }
    Ok(out)
}

impl<D: CommandDevice, L: ExchangeLock> fmt::Debug for DeviceTransport<D, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceTransport")
            .field("device", &self.device.name())
            .field("lock", &self.lock.name())
            .field("memmap", &self.memmap)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use ecprims_port::PortError;
    use ecprims_proto::layout::{
        result, CMD_HELLO, HOST_CMD_FLAG_VERSION_3, MEMMAP_HOST_CMD_FLAGS,
    };
    use ecprims_proto::sim::{Fault, SimReply, SimulatedEc};

    use super::*;

    fn open(ec: SimulatedEc) -> DeviceTransport<SimulatedEc> {
        DeviceTransport::open(ec, NoLock::new(), &TransportConfig::default()).unwrap()
    }

    #[test]
    fn hello_through_driver() {
        let mut t = open(SimulatedEc::new(HOST_CMD_FLAG_VERSION_3));
        let reply = t
            .send_command(CMD_HELLO, 0, &0xA0B0_C0D0u32.to_le_bytes(), 4)
            .unwrap();
        assert_eq!(reply.as_ref(), &0xA1B2_C3D4u32.to_le_bytes());
        assert_eq!(t.memmap_access(), MemmapAccess::Direct);
        assert_eq!(t.device_name(), "sim-driver");
    }

    #[test]
    fn memmap_falls_back_to_read_memmap_command() {
        let mut t = open(SimulatedEc::new(HOST_CMD_FLAG_VERSION_3).without_direct_memmap());
        assert_eq!(t.memmap_access(), MemmapAccess::Command);

        let flags = t
            .read_mapped(MEMMAP_HOST_CMD_FLAGS, MapRead::Fixed(1))
            .unwrap();
        assert_eq!(flags.as_ref(), &[HOST_CMD_FLAG_VERSION_3]);

        let (ec, _) = t.into_parts();
        assert!(ec
            .requests()
            .iter()
            .all(|req| req.command == CMD_READ_MEMMAP));
        assert_eq!(ec.requests().len(), 2);
    }

    #[test]
    fn command_path_reads_long_strings_in_chunks() {
        let mut ec = SimulatedEc::new(HOST_CMD_FLAG_VERSION_3).without_direct_memmap();
        ec.set_memmap(MEMMAP_SIZE - 3, b"xyz");
        let mut t = open(ec);
        let tail = t.read_mapped(0, MapRead::Fixed(MEMMAP_SIZE)).unwrap();
        assert_eq!(tail.len(), MEMMAP_SIZE);
        assert_eq!(&tail[MEMMAP_SIZE - 3..], b"xyz");
        assert_eq!(&tail[MEMMAP_ID..MEMMAP_ID + 2], b"EC");

        let (ec, _) = t.into_parts();
        // The signature read, then a full chunk and the remainder.
        assert_eq!(ec.requests().len(), 3);
    }

    #[test]
    fn direct_string_read_stops_at_terminator() {
        let mut ec = SimulatedEc::new(HOST_CMD_FLAG_VERSION_3);
        ec.set_memmap(0x40, b"Framework\0junk");
        let mut t = open(ec);
        let s = t.read_mapped(0x40, MapRead::String).unwrap();
        assert_eq!(s.as_ref(), b"Framework");
    }

    #[test]
    fn missing_signature_leaves_commands_usable() {
        let mut t = open(SimulatedEc::new(HOST_CMD_FLAG_VERSION_3).without_signature());
        assert_eq!(t.memmap_access(), MemmapAccess::Unavailable);
        assert!(matches!(
            t.read_mapped(0, MapRead::Fixed(1)),
            Err(TransportError::MemmapUnavailable)
        ));
        assert!(t.send_command(CMD_HELLO, 0, &[0; 4], 4).is_ok());
    }

    #[test]
    fn out_of_range_read_is_rejected_first() {
        let mut t = open(SimulatedEc::new(HOST_CMD_FLAG_VERSION_3));
        assert!(matches!(
            t.read_mapped(0xFE, MapRead::Fixed(4)),
            Err(TransportError::Protocol(ProtocolError::MemmapOutOfRange { .. }))
        ));
    }

    #[test]
    fn ec_result_and_oversize_reply_are_reported() {
        let ec = SimulatedEc::new(HOST_CMD_FLAG_VERSION_3).with_handler(|req| match req.command {
            0x10 => SimReply::Error(result::INVALID_PARAM),
            _ => SimReply::Data(vec![0; 16]),
        });
        let mut t = open(ec);
        let err = t.send_command(0x10, 0, &[], 8).unwrap_err();
        assert_eq!(err.ec_result(), Some(result::INVALID_PARAM));

        let err = t.send_command(0x11, 0, &[], 8).unwrap_err();
        assert!(matches!(
            err,
            TransportError::Protocol(ProtocolError::ResponseTooBig { size: 16, capacity: 8 })
        ));
    }

    #[test]
    fn oversized_request_never_reaches_driver() {
        let mut t = open(SimulatedEc::new(HOST_CMD_FLAG_VERSION_3));
        let err = t
            .send_command(1, 0, &[0; PROTO2_MAX_PARAM_SIZE], 0)
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Protocol(ProtocolError::RequestTruncated { size: 0xFC, max: 0xF4 })
        ));
        let (ec, _) = t.into_parts();
        assert!(ec.requests().is_empty());
    }

    #[test]
    fn broken_driver_fails_open() {
        let err = DeviceTransport::open(
            SimulatedEc::new(HOST_CMD_FLAG_VERSION_3).with_fault(Fault::FailIo),
            NoLock::new(),
            &TransportConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Protocol(ProtocolError::Channel(PortError::Device { .. }))
        ));
    }
}
