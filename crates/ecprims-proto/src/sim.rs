//! In-memory simulated EC.
//!
//! Implements [`ByteChannel`] over a 64 KiB port space and answers both host
//! command protocols the way EC firmware does: the command-port write runs
//! the request through a handler and leaves the response, result code and
//! status in the port space. Faults can be injected to exercise every
//! failure path of the drivers.
//!
//! The same EC also implements [`CommandDevice`], standing in for a kernel
//! driver that carries whole commands.

use ecprims_port::{ByteChannel, CommandDevice, DeviceReply, PortError};

use crate::checksum::Checksum;
use crate::layout::{
    result, ARGS_FLAG_FROM_HOST, ARGS_FLAG_TO_HOST, ARGS_SIZE, CMD_GET_VERSION, CMD_HELLO,
    CMD_READ_MEMMAP,
    COMMAND_PROTOCOL_3, HELLO_INCREMENT, HOST_ARGS, HOST_CMD, HOST_DATA, HOST_PACKET, HOST_PARAM,
    HOST_REQUEST_VERSION, HOST_RESPONSE_VERSION, MEMMAP_BASE, MEMMAP_EVENTS_VERSION,
    MEMMAP_HOST_CMD_FLAGS, MEMMAP_ID, MEMMAP_ID_VERSION, MEMMAP_SIGNATURE, MEMMAP_SIZE,
    PACKET_SIZE, PROTO2_MAX_PARAM_SIZE, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE,
    STATUS_BUSY_MASK,
};
use crate::v2::HostArgs;
use crate::v3::{RequestHeader, ResponseHeader};

const PORT_SPACE: usize = 0x1_0000;

/// Firmware version strings reported by [`reference_handler`].
pub const SIM_VERSION_RO: &str = "ecprims-sim-ro-v1.0";
pub const SIM_VERSION_RW: &str = "ecprims-sim-rw-v1.0";

/// A decoded host command as the simulated EC received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimRequest {
    pub command: u16,
    pub version: u8,
    pub data: Vec<u8>,
}

/// Handler answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimReply {
    /// Success with response payload.
    Data(Vec<u8>),
    /// Nonzero EC result code.
    Error(u8),
}

/// Injected misbehavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Busy flag never clears.
    StuckBusy,
    /// Busy flag stays set for this many status reads after each command.
    BusyPolls(usize),
    /// v2 responses keep FROM_HOST instead of setting TO_HOST.
    DropToHost,
    /// One response payload byte is flipped after the checksum is computed.
    CorruptPayload,
    /// v3 responses carry this struct version.
    StructVersion(u8),
    /// v3 responses carry a nonzero reserved field.
    ReservedNonzero,
    /// Every channel access fails.
    FailIo,
}

type Handler = Box<dyn FnMut(&SimRequest) -> SimReply + Send>;

/// Simulated EC behind a byte channel.
pub struct SimulatedEc {
    ports: Vec<u8>,
    reads: Vec<u32>,
    writes: usize,
    memmap_base: u16,
    responsive: bool,
    faults: Vec<Fault>,
    busy_remaining: usize,
    handler: Handler,
    requests: Vec<SimRequest>,
    checksum_failures: usize,
    direct_memmap: bool,
}

impl SimulatedEc {
    /// An EC advertising `flags` at the primary memory-map base, answering
    /// with [`reference_handler`].
    pub fn new(flags: u8) -> Self {
        let mut ec = Self {
            ports: vec![0; PORT_SPACE],
            reads: vec![0; PORT_SPACE],
            writes: 0,
            memmap_base: MEMMAP_BASE,
            responsive: true,
            faults: Vec::new(),
            busy_remaining: 0,
            handler: Box::new(reference_handler),
            requests: Vec::new(),
            checksum_failures: 0,
            direct_memmap: true,
        };
        ec.install_memmap(flags);
        ec
    }

    /// A bus with nothing attached: every port reads 0xFF.
    pub fn absent() -> Self {
        let mut ec = Self::new(0);
        ec.ports.fill(0xFF);
        ec.responsive = false;
        ec
    }

    /// Move the memory map to another base.
    pub fn with_memmap_base(mut self, base: u16) -> Self {
        let flags = self.memmap_byte(MEMMAP_HOST_CMD_FLAGS);
        let old = usize::from(self.memmap_base);
        self.ports[old..old + MEMMAP_SIZE].fill(0);
        self.memmap_base = base;
        self.install_memmap(flags);
        self
    }

    /// Erase the `"EC"` signature.
    pub fn without_signature(mut self) -> Self {
        self.set_memmap(MEMMAP_ID, &[0, 0]);
        self
    }

    /// As a [`CommandDevice`], refuse direct memory-map reads so callers
    /// must use `CMD_READ_MEMMAP`.
    pub fn without_direct_memmap(mut self) -> Self {
        self.direct_memmap = false;
        self
    }

    /// Replace the command handler.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&SimRequest) -> SimReply + Send + 'static,
    {
        self.handler = Box::new(handler);
        self
    }

    /// Inject a fault.
    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }

    /// Overwrite memory-map bytes starting at `offset`.
    pub fn set_memmap(&mut self, offset: usize, bytes: &[u8]) {
        let start = usize::from(self.memmap_base) + offset;
        self.ports[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Current value of a port, without counting a read.
    pub fn port(&self, addr: u16) -> u8 {
        self.ports[usize::from(addr)]
    }

    /// Requests the EC accepted, oldest first.
    pub fn requests(&self) -> &[SimRequest] {
        &self.requests
    }

    /// Number of requests rejected for a bad checksum.
    pub fn checksum_failures(&self) -> usize {
        self.checksum_failures
    }

    /// Total channel writes.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Total channel reads.
    pub fn reads(&self) -> usize {
        self.reads.iter().map(|&n| n as usize).sum()
    }

    /// Channel reads of ports in `start..end`.
    pub fn reads_in(&self, start: u16, end: u16) -> usize {
        self.reads[usize::from(start)..usize::from(end)]
            .iter()
            .map(|&n| n as usize)
            .sum()
    }

    fn has_fault(&self, fault: Fault) -> bool {
        self.faults.contains(&fault)
    }

    fn install_memmap(&mut self, flags: u8) {
        self.set_memmap(MEMMAP_ID, &MEMMAP_SIGNATURE);
        self.set_memmap(MEMMAP_ID_VERSION, &[1]);
        self.set_memmap(MEMMAP_EVENTS_VERSION, &[1]);
        self.set_memmap(MEMMAP_HOST_CMD_FLAGS, &[flags]);
    }

    fn memmap_byte(&self, offset: usize) -> u8 {
        self.ports[usize::from(self.memmap_base) + offset]
    }

    fn range(&self, start: u16, len: usize) -> Vec<u8> {
        let start = usize::from(start);
        self.ports[start..start + len].to_vec()
    }

    fn store(&mut self, start: u16, bytes: &[u8]) {
        let start = usize::from(start);
        self.ports[start..start + bytes.len()].copy_from_slice(bytes);
    }

    fn finish(&mut self, code: u8) {
        self.ports[usize::from(HOST_DATA)] = code;
        self.busy_remaining = self
            .faults
            .iter()
            .find_map(|f| match f {
                Fault::BusyPolls(n) => Some(*n),
                _ => None,
            })
            .unwrap_or(0);
    }

    fn trigger(&mut self, value: u8) {
        if !self.responsive {
            return;
        }
        if value == COMMAND_PROTOCOL_3 {
            self.run_v3();
        } else {
            self.run_v2(value);
        }
    }

    fn run_v2(&mut self, command: u8) {
        let mut raw = [0u8; ARGS_SIZE];
        raw.copy_from_slice(&self.range(HOST_ARGS, ARGS_SIZE));
        let args = HostArgs::from_bytes(raw);
        let size = usize::from(args.data_size).min(PROTO2_MAX_PARAM_SIZE);
        let data = self.range(HOST_PARAM, size);

        let mut csum = args.seed(u16::from(command));
        csum.add_slice(&data);
        if csum.value() != args.checksum {
            self.checksum_failures += 1;
            self.finish(result::INVALID_CHECKSUM);
            return;
        }

        let request = SimRequest {
            command: u16::from(command),
            version: args.command_version,
            data,
        };
        self.requests.push(request.clone());

        match self.dispatch(&request) {
            SimReply::Error(code) => self.finish(code),
            SimReply::Data(mut data) => {
                data.truncate(PROTO2_MAX_PARAM_SIZE);
                let flags = if self.has_fault(Fault::DropToHost) {
                    ARGS_FLAG_FROM_HOST
                } else {
                    ARGS_FLAG_TO_HOST
                };
                let mut reply = HostArgs {
                    flags,
                    command_version: args.command_version,
                    data_size: data.len() as u8,
                    checksum: 0,
                };
                let mut csum = reply.seed(request.command);
                csum.add_slice(&data);
                reply.checksum = csum.value();
                if self.has_fault(Fault::CorruptPayload) {
                    match data.first_mut() {
                        Some(first) => *first ^= 0x5A,
                        None => reply.checksum ^= 0x5A,
                    }
                }
                self.store(HOST_ARGS, &reply.to_bytes());
                self.store(HOST_PARAM, &data);
                self.finish(result::SUCCESS);
            }
        }
    }

    fn run_v3(&mut self) {
        let mut raw = [0u8; REQUEST_HEADER_SIZE];
        raw.copy_from_slice(&self.range(HOST_PACKET, REQUEST_HEADER_SIZE));
        let header = RequestHeader::from_bytes(raw);
        let size = usize::from(header.data_len);
        if header.struct_version != HOST_REQUEST_VERSION || REQUEST_HEADER_SIZE + size > PACKET_SIZE
        {
            self.finish(result::INVALID_HEADER);
            return;
        }

        let data = self.range(HOST_PACKET + REQUEST_HEADER_SIZE as u16, size);
        let mut csum = Checksum::new();
        csum.add_slice(&raw);
        csum.add_slice(&data);
        if !csum.is_zero() {
            self.checksum_failures += 1;
            self.finish(result::INVALID_CHECKSUM);
            return;
        }

        let request = SimRequest {
            command: header.command,
            version: header.command_version,
            data,
        };
        self.requests.push(request.clone());

        let (code, mut data) = match self.dispatch(&request) {
            SimReply::Error(code) => (code, Vec::new()),
            SimReply::Data(mut data) => {
                data.truncate(PACKET_SIZE - RESPONSE_HEADER_SIZE);
                (result::SUCCESS, data)
            }
        };

        let struct_version = self
            .faults
            .iter()
            .find_map(|f| match f {
                Fault::StructVersion(v) => Some(*v),
                _ => None,
            })
            .unwrap_or(HOST_RESPONSE_VERSION);
        let mut response = ResponseHeader {
            struct_version,
            checksum: 0,
            result: u16::from(code),
            data_len: data.len() as u16,
            reserved: if self.has_fault(Fault::ReservedNonzero) {
                0x0100
            } else {
                0
            },
        };
        let mut csum = Checksum::new();
        csum.add_slice(&response.to_bytes());
        csum.add_slice(&data);
        response.checksum = csum.complement();
        if self.has_fault(Fault::CorruptPayload) {
            match data.first_mut() {
                Some(first) => *first ^= 0x5A,
                None => response.checksum ^= 0x5A,
            }
        }

        self.store(HOST_PACKET, &response.to_bytes());
        self.store(HOST_PACKET + RESPONSE_HEADER_SIZE as u16, &data);
        self.finish(code);
    }

    /// Firmware-side commands first, then the handler.
    fn dispatch(&mut self, request: &SimRequest) -> SimReply {
        if request.command != CMD_READ_MEMMAP {
            return (self.handler)(request);
        }
        let [offset, size] = request.data[..] else {
            return SimReply::Error(result::INVALID_PARAM);
        };
        let (offset, size) = (usize::from(offset), usize::from(size));
        if size == 0 || offset + size > MEMMAP_SIZE {
            return SimReply::Error(result::INVALID_PARAM);
        }
        SimReply::Data(self.range(self.memmap_base + offset as u16, size))
    }

    fn device_failure(&self, op: &'static str) -> Option<PortError> {
        let why = if self.has_fault(Fault::FailIo) {
            "simulated driver failure"
        } else if !self.responsive {
            "no EC answered"
        } else if self.has_fault(Fault::StuckBusy) {
            "EC stayed busy"
        } else {
            return None;
        };
        Some(PortError::Device {
            op,
            source: std::io::Error::other(why),
        })
    }

    fn status(&mut self) -> u8 {
        if self.has_fault(Fault::StuckBusy) {
            return STATUS_BUSY_MASK;
        }
        if self.busy_remaining > 0 {
            self.busy_remaining -= 1;
            return STATUS_BUSY_MASK;
        }
        self.ports[usize::from(HOST_CMD)]
    }
}

impl ByteChannel for SimulatedEc {
    fn read_byte(&mut self, addr: u16) -> ecprims_port::Result<u8> {
        if self.has_fault(Fault::FailIo) {
            return Err(PortError::Read {
                addr,
                source: std::io::Error::other("simulated channel failure"),
            });
        }
        self.reads[usize::from(addr)] += 1;
        if addr == HOST_CMD && self.responsive {
            return Ok(self.status());
        }
        Ok(self.ports[usize::from(addr)])
    }

    fn write_byte(&mut self, addr: u16, value: u8) -> ecprims_port::Result<()> {
        if self.has_fault(Fault::FailIo) {
            return Err(PortError::Write {
                addr,
                value,
                source: std::io::Error::other("simulated channel failure"),
            });
        }
        self.writes += 1;
        if addr == HOST_CMD {
            self.trigger(value);
        } else {
            self.ports[usize::from(addr)] = value;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sim"
    }
}

impl CommandDevice for SimulatedEc {
    fn command(
        &mut self,
        command: u16,
        version: u8,
        output: &[u8],
        input: &mut [u8],
    ) -> ecprims_port::Result<DeviceReply> {
        if let Some(err) = self.device_failure("command") {
            return Err(err);
        }
        let request = SimRequest {
            command,
            version,
            data: output.to_vec(),
        };
        self.requests.push(request.clone());

        match self.dispatch(&request) {
            SimReply::Error(code) => Ok(DeviceReply {
                result: u32::from(code),
                len: 0,
            }),
            SimReply::Data(data) => {
                let copied = data.len().min(input.len());
                input[..copied].copy_from_slice(&data[..copied]);
                Ok(DeviceReply {
                    result: 0,
                    len: data.len(),
                })
            }
        }
    }

    fn read_memmap(&mut self, offset: u8, out: &mut [u8]) -> ecprims_port::Result<bool> {
        if let Some(err) = self.device_failure("memory-map read") {
            return Err(err);
        }
        if !self.direct_memmap {
            return Ok(false);
        }
        let start = usize::from(offset).min(MEMMAP_SIZE);
        let len = out.len().min(MEMMAP_SIZE - start);
        let bytes = self.range(self.memmap_base + start as u16, len);
        out[..len].copy_from_slice(&bytes);
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "sim-driver"
    }
}

impl std::fmt::Debug for SimulatedEc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedEc")
            .field("memmap_base", &self.memmap_base)
            .field("responsive", &self.responsive)
            .field("faults", &self.faults)
            .field("requests", &self.requests.len())
            .finish()
    }
}

/// Default command handler.
///
/// - `CMD_HELLO`: returns the u32 argument plus [`HELLO_INCREMENT`]
/// - `CMD_GET_VERSION`: RO/RW version strings (32 bytes each), 32 reserved
///   bytes and the active image (1 = RO, 2 = RW)
/// - anything else: echoes the request payload
pub fn reference_handler(request: &SimRequest) -> SimReply {
    match request.command {
        CMD_HELLO => {
            let Ok(arg) = <[u8; 4]>::try_from(request.data.as_slice()) else {
                return SimReply::Error(result::INVALID_PARAM);
            };
            let out = u32::from_le_bytes(arg).wrapping_add(HELLO_INCREMENT);
            SimReply::Data(out.to_le_bytes().to_vec())
        }
        CMD_GET_VERSION => {
            let mut out = vec![0u8; 100];
            out[..SIM_VERSION_RO.len()].copy_from_slice(SIM_VERSION_RO.as_bytes());
            out[32..32 + SIM_VERSION_RW.len()].copy_from_slice(SIM_VERSION_RW.as_bytes());
            out[96..].copy_from_slice(&2u32.to_le_bytes());
            SimReply::Data(out)
        }
        _ => SimReply::Data(request.data.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{HOST_CMD_FLAG_LPC_ARGS_SUPPORTED, HOST_CMD_FLAG_VERSION_3};

    #[test]
    fn memmap_is_installed_at_base() {
        let ec = SimulatedEc::new(HOST_CMD_FLAG_VERSION_3);
        assert_eq!(ec.port(MEMMAP_BASE + MEMMAP_ID as u16), b'E');
        assert_eq!(ec.port(MEMMAP_BASE + MEMMAP_ID as u16 + 1), b'C');
        assert_eq!(
            ec.port(MEMMAP_BASE + MEMMAP_HOST_CMD_FLAGS as u16),
            HOST_CMD_FLAG_VERSION_3
        );
    }

    #[test]
    fn relocated_memmap_clears_primary() {
        let ec = SimulatedEc::new(HOST_CMD_FLAG_LPC_ARGS_SUPPORTED).with_memmap_base(0xE00);
        assert_eq!(ec.port(MEMMAP_BASE + MEMMAP_ID as u16), 0);
        assert_eq!(ec.port(0xE00 + MEMMAP_ID as u16), b'E');
        assert_eq!(
            ec.port(0xE00 + MEMMAP_HOST_CMD_FLAGS as u16),
            HOST_CMD_FLAG_LPC_ARGS_SUPPORTED
        );
    }

    #[test]
    fn absent_bus_reads_saturated() {
        let mut ec = SimulatedEc::absent();
        assert_eq!(ec.read_byte(HOST_CMD).unwrap(), 0xFF);
        assert_eq!(ec.read_byte(HOST_DATA).unwrap(), 0xFF);
    }

    #[test]
    fn reference_hello_adds_increment() {
        let reply = reference_handler(&SimRequest {
            command: CMD_HELLO,
            version: 0,
            data: 0xA0B0_C0D0u32.to_le_bytes().to_vec(),
        });
        assert_eq!(
            reply,
            SimReply::Data(0xA1B2_C3D4u32.to_le_bytes().to_vec())
        );
    }

    #[test]
    fn reference_hello_rejects_short_argument() {
        let reply = reference_handler(&SimRequest {
            command: CMD_HELLO,
            version: 0,
            data: vec![1, 2],
        });
        assert_eq!(reply, SimReply::Error(result::INVALID_PARAM));
    }

    #[test]
    fn bad_v2_checksum_is_rejected_by_the_ec() {
        let mut ec = SimulatedEc::new(HOST_CMD_FLAG_LPC_ARGS_SUPPORTED);
        let args = HostArgs::request(0, 1);
        ec.write_byte(HOST_PARAM, 0x10).unwrap();
        for (i, b) in args.to_bytes().iter().enumerate() {
            ec.write_byte(HOST_ARGS + i as u16, *b).unwrap();
        }
        ec.write_byte(HOST_CMD, 0x01).unwrap();
        assert_eq!(ec.checksum_failures(), 1);
        assert_eq!(ec.read_byte(HOST_DATA).unwrap(), result::INVALID_CHECKSUM);
        assert!(ec.requests().is_empty());
    }

    #[test]
    fn device_runs_commands_through_handler() {
        let mut ec = SimulatedEc::new(HOST_CMD_FLAG_VERSION_3);
        let mut input = [0u8; 4];
        let reply = ec
            .command(CMD_HELLO, 0, &0xA0B0_C0D0u32.to_le_bytes(), &mut input)
            .unwrap();
        assert_eq!(reply, DeviceReply { result: 0, len: 4 });
        assert_eq!(u32::from_le_bytes(input), 0xA1B2_C3D4);

        let reply = ec.command(CMD_HELLO, 0, &[1], &mut input).unwrap();
        assert_eq!(reply.result, u32::from(result::INVALID_PARAM));
        assert_eq!(ec.requests().len(), 2);
    }

    #[test]
    fn read_memmap_command_answers_from_map() {
        let mut ec = SimulatedEc::new(HOST_CMD_FLAG_VERSION_3);
        let mut input = [0u8; 2];
        let reply = ec
            .command(CMD_READ_MEMMAP, 0, &[MEMMAP_ID as u8, 2], &mut input)
            .unwrap();
        assert_eq!(reply.result, 0);
        assert_eq!(&input, b"EC");

        let reply = ec
            .command(CMD_READ_MEMMAP, 0, &[0xFE, 4], &mut input)
            .unwrap();
        assert_eq!(reply.result, u32::from(result::INVALID_PARAM));
    }

    #[test]
    fn direct_memmap_can_be_withdrawn() {
        let mut ec = SimulatedEc::new(HOST_CMD_FLAG_VERSION_3);
        let mut out = [0u8; 2];
        assert!(ec.read_memmap(MEMMAP_ID as u8, &mut out).unwrap());
        assert_eq!(&out, b"EC");

        let mut ec = ec.without_direct_memmap();
        assert!(!ec.read_memmap(MEMMAP_ID as u8, &mut out).unwrap());
    }

    #[test]
    fn absent_ec_fails_device_requests() {
        let mut ec = SimulatedEc::absent();
        let err = ec.command(CMD_HELLO, 0, &[], &mut []).unwrap_err();
        assert!(matches!(err, PortError::Device { op: "command", .. }));
    }
}
