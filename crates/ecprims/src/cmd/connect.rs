use std::time::Duration;

use bytes::Bytes;
use ecprims_host::{
    negotiate, DeviceTransport, ExchangeLock, LockTimeout, MapRead, MemmapAccess, NoLock,
    Transport, TransportConfig,
};
use ecprims_port::{ByteChannel, CommandDevice};
#[cfg(feature = "sim")]
use ecprims_proto::layout::{HOST_CMD_FLAG_LPC_ARGS_SUPPORTED, HOST_CMD_FLAG_VERSION_3};
#[cfg(feature = "sim")]
use ecprims_proto::sim::SimulatedEc;
use ecprims_proto::{Limits, MemoryMap};
use tracing::debug;

use crate::cmd::ConnectArgs;
use crate::exit::{port_error, transport_error, CliError, CliResult, USAGE};

type PortTransport = Transport<Box<dyn ByteChannel>, Box<dyn ExchangeLock>>;
type DriverTransport = DeviceTransport<Box<dyn CommandDevice>, Box<dyn ExchangeLock>>;

/// An open EC, reached through raw ports or a command-level driver.
pub enum EcTransport {
    Ports(PortTransport),
    Device(DriverTransport),
}

impl EcTransport {
    pub fn send_command(
        &mut self,
        command: u16,
        version: u8,
        output: &[u8],
        input_capacity: usize,
    ) -> ecprims_host::Result<Bytes> {
        match self {
            EcTransport::Ports(t) => t.send_command(command, version, output, input_capacity),
            EcTransport::Device(t) => t.send_command(command, version, output, input_capacity),
        }
    }

    pub fn read_mapped(&mut self, offset: usize, read: MapRead) -> ecprims_host::Result<Bytes> {
        match self {
            EcTransport::Ports(t) => t.read_mapped(offset, read),
            EcTransport::Device(t) => t.read_mapped(offset, read),
        }
    }

    pub fn limits(&self) -> Limits {
        match self {
            EcTransport::Ports(t) => t.limits(),
            EcTransport::Device(t) => t.limits(),
        }
    }

    pub fn channel_name(&self) -> &'static str {
        match self {
            EcTransport::Ports(t) => t.channel_name(),
            EcTransport::Device(t) => t.device_name(),
        }
    }

    /// `v2`/`v3` over ports; the driver picks its own framing.
    pub fn protocol_name(&self) -> String {
        match self {
            EcTransport::Ports(t) => t.protocol().to_string(),
            EcTransport::Device(_) => "driver".to_string(),
        }
    }

    /// Where memory-map reads go: a port base or the driver's access path.
    pub fn memmap_location(&self) -> String {
        match self {
            EcTransport::Ports(t) => format!("{:#x}", t.memmap_base()),
            EcTransport::Device(t) => match t.memmap_access() {
                MemmapAccess::Direct => "driver".to_string(),
                MemmapAccess::Command => "driver (read command)".to_string(),
                MemmapAccess::Unavailable => "unavailable".to_string(),
            },
        }
    }

    /// Capability flags read at negotiation. Drivers skip negotiation.
    pub fn capability_flags(&self) -> Option<u8> {
        match self {
            EcTransport::Ports(t) => Some(t.capability_flags()),
            EcTransport::Device(_) => None,
        }
    }
}

#[cfg(target_os = "linux")]
const DEFAULT_DEVICE: &str = ecprims_port::DevPort::DEFAULT_PATH;
#[cfg(windows)]
const DEFAULT_DEVICE: &str = "winring0";
#[cfg(not(any(target_os = "linux", windows)))]
const DEFAULT_DEVICE: &str = "sim";

#[cfg(unix)]
const DEFAULT_LOCK: &str = ecprims_host::FileLock::DEFAULT_PATH;
#[cfg(windows)]
const DEFAULT_LOCK: &str = ecprims_host::NamedMutexLock::DEFAULT_NAME;
#[cfg(not(any(unix, windows)))]
const DEFAULT_LOCK: &str = "";

/// Open the device and lock named by `args` and connect to the EC.
///
/// Byte channels go through protocol negotiation. Command-level drivers are
/// used as they are.
pub fn open(args: &ConnectArgs) -> CliResult<EcTransport> {
    let mut config = TransportConfig {
        command_timeout: parse_timeout(&args.timeout)?,
        lock_timeout: LockTimeout::from_millis(args.lock_timeout_ms),
        ..TransportConfig::default()
    };
    if !args.memmap_base.is_empty() {
        config.memmap_bases = args.memmap_base.clone();
    }

    let device = args.device.as_deref().unwrap_or(DEFAULT_DEVICE);
    if let Some(driver) = open_command_device(device) {
        let driver = driver.map_err(|e| port_error("cannot open device", e))?;
        let lock = open_lock(args)?;
        debug!(device, lock = lock.name(), "connecting to EC driver");
        return DeviceTransport::open(driver, lock, &config)
            .map(EcTransport::Device)
            .map_err(|e| transport_error("driver setup failed", e));
    }

    let channel = open_channel(device).map_err(|e| port_error("cannot open device", e))?;
    let lock = open_lock(args)?;
    debug!(device, lock = lock.name(), "connecting to EC");

    negotiate(channel, lock, config)
        .map(EcTransport::Ports)
        .map_err(|e| transport_error("negotiation failed", e))
}

/// `None` when `device` names a byte channel rather than a driver.
fn open_command_device(device: &str) -> Option<ecprims_port::Result<Box<dyn CommandDevice>>> {
    match device {
        #[cfg(feature = "sim")]
        "sim-driver" => Some(Ok(Box::new(SimulatedEc::new(
            HOST_CMD_FLAG_LPC_ARGS_SUPPORTED | HOST_CMD_FLAG_VERSION_3,
        )))),
        #[cfg(feature = "sim")]
        "sim-driver-cmd" => Some(Ok(Box::new(
            SimulatedEc::new(HOST_CMD_FLAG_LPC_ARGS_SUPPORTED | HOST_CMD_FLAG_VERSION_3)
                .without_direct_memmap(),
        ))),
        #[cfg(windows)]
        _ if device.eq_ignore_ascii_case("crosec") => Some(
            ecprims_port::CrosEcDevice::open()
                .map(|d| Box::new(d) as Box<dyn CommandDevice>),
        ),
        _ => None,
    }
}

fn open_channel(device: &str) -> ecprims_port::Result<Box<dyn ByteChannel>> {
    match device {
        #[cfg(feature = "sim")]
        "sim" => Ok(Box::new(SimulatedEc::new(
            HOST_CMD_FLAG_LPC_ARGS_SUPPORTED | HOST_CMD_FLAG_VERSION_3,
        ))),
        #[cfg(feature = "sim")]
        "sim-v2" => Ok(Box::new(SimulatedEc::new(HOST_CMD_FLAG_LPC_ARGS_SUPPORTED))),
        #[cfg(feature = "sim")]
        "sim-absent" => Ok(Box::new(SimulatedEc::absent())),
        _ => open_hardware(device),
    }
}

#[cfg(target_os = "linux")]
fn open_hardware(device: &str) -> ecprims_port::Result<Box<dyn ByteChannel>> {
    Ok(Box::new(ecprims_port::DevPort::open_path(device)?))
}

#[cfg(windows)]
fn open_hardware(device: &str) -> ecprims_port::Result<Box<dyn ByteChannel>> {
    if device.eq_ignore_ascii_case("winring0") {
        Ok(Box::new(ecprims_port::WinRing0::load()?))
    } else {
        Err(ecprims_port::PortError::NotLoaded(format!(
            "unknown device {device}; use winring0 or crosec on Windows"
        )))
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
fn open_hardware(_device: &str) -> ecprims_port::Result<Box<dyn ByteChannel>> {
    Err(ecprims_port::PortError::Unsupported)
}

fn open_lock(args: &ConnectArgs) -> CliResult<Box<dyn ExchangeLock>> {
    if args.no_lock {
        return Ok(Box::new(NoLock::new()));
    }
    let name = args.lock.as_deref().unwrap_or(DEFAULT_LOCK);
    open_named_lock(name)
}

#[cfg(unix)]
fn open_named_lock(name: &str) -> CliResult<Box<dyn ExchangeLock>> {
    Ok(Box::new(ecprims_host::FileLock::new(name)))
}

#[cfg(windows)]
fn open_named_lock(name: &str) -> CliResult<Box<dyn ExchangeLock>> {
    let lock = ecprims_host::NamedMutexLock::open(name)
        .map_err(|e| crate::exit::lock_error("cannot open lock", e))?;
    Ok(Box::new(lock))
}

#[cfg(not(any(unix, windows)))]
fn open_named_lock(_name: &str) -> CliResult<Box<dyn ExchangeLock>> {
    Ok(Box::new(NoLock::new()))
}

pub fn parse_timeout(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix("us") {
        (num, "us")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    Ok(match unit {
        "us" => Duration::from_micros(value),
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}

fn parse_number(input: &str) -> Result<u64, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("invalid number: {input}"))
}

/// Port address in hex. A bare number is read as hex too.
pub fn parse_port(input: &str) -> Result<u16, String> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let value = u32::from_str_radix(digits, 16).map_err(|_| format!("invalid port: {input}"))?;
    u16::try_from(value).map_err(|_| format!("port out of range: {input}"))
}

/// Memory-map base in hex. The whole region must fit below port 0x10000.
pub fn parse_memmap_base(input: &str) -> Result<u16, String> {
    let base = parse_port(input)?;
    if MemoryMap::fits(base) {
        Ok(base)
    } else {
        Err(format!("memory map at {base:#x} would run past port 0xffff"))
    }
}

pub fn parse_command(input: &str) -> Result<u16, String> {
    let value = parse_number(input)?;
    u16::try_from(value).map_err(|_| format!("command out of range: {input}"))
}

pub fn parse_offset(input: &str) -> Result<usize, String> {
    let value = parse_number(input)?;
    usize::try_from(value).map_err(|_| format!("offset out of range: {input}"))
}

/// Hex bytes, optionally separated by whitespace, commas or colons.
pub fn parse_hex_bytes(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',' && *c != ':')
        .collect();
    let digits = digits.strip_prefix("0x").unwrap_or(&digits);
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CliError::new(USAGE, format!("invalid hex data: {input}")));
    }
    if digits.len() % 2 != 0 {
        return Err(CliError::new(
            USAGE,
            format!("hex data must have an even number of digits: {input}"),
        ));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| CliError::new(USAGE, format!("invalid hex data: {input}")))
        })
        .collect()
}
