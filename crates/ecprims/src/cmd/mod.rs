use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod connect;
pub mod ec_version;
pub mod hello;
pub mod probe;
pub mod raw;
pub mod readmem;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Negotiate with the EC and print the selected protocol.
    Probe,
    /// Send EC_CMD_HELLO and verify the reply.
    Hello,
    /// Print the EC firmware version strings.
    EcVersion,
    /// Send an arbitrary host command.
    Raw(RawArgs),
    /// Read from the EC memory map.
    Readmem(ReadmemArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, connect: &ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Probe => probe::run(connect, format),
        Command::Hello => hello::run(connect, format),
        Command::EcVersion => ec_version::run(connect, format),
        Command::Raw(args) => raw::run(args, connect, format),
        Command::Readmem(args) => readmem::run(args, connect, format),
        Command::Version(args) => version::run(args),
    }
}

/// How to reach the EC. Shared by every command that talks to it.
#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// EC device: a port device path, `winring0` or `crosec` on Windows, or a
    /// simulator (`sim`, `sim-v2`, `sim-absent`, `sim-driver`, `sim-driver-cmd`)
    /// in builds with the `sim` feature.
    #[arg(long, env = "ECPRIMS_DEVICE", global = true)]
    pub device: Option<String>,

    /// Lock file (Unix) or mutex name (Windows) shared with other EC tools.
    #[arg(long, env = "ECPRIMS_LOCK", global = true)]
    pub lock: Option<String>,

    /// Do not take the exchange lock.
    #[arg(long, global = true)]
    pub no_lock: bool,

    /// Lock wait in milliseconds: negative waits forever, 0 fails immediately.
    #[arg(
        long,
        value_name = "MS",
        default_value_t = -1,
        allow_negative_numbers = true,
        global = true
    )]
    pub lock_timeout_ms: i64,

    /// Busy-wait bound for one exchange (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s", global = true)]
    pub timeout: String,

    /// Memory-map base to probe (hex, repeatable). Default: 0x900 then 0xe00.
    #[arg(long, value_name = "PORT", value_parser = connect::parse_memmap_base, global = true)]
    pub memmap_base: Vec<u16>,
}

#[derive(Args, Debug)]
pub struct RawArgs {
    /// Host command code (decimal or 0x-prefixed hex).
    #[arg(value_parser = connect::parse_command)]
    pub command: u16,
    /// Command version.
    #[arg(long = "cmd-version", default_value = "0")]
    pub command_version: u8,
    /// Request payload as hex bytes (spaces allowed).
    #[arg(long, default_value = "")]
    pub data: String,
    /// Largest response accepted. Clamped to the protocol limit.
    #[arg(long, default_value = "256")]
    pub capacity: usize,
}

#[derive(Args, Debug)]
pub struct ReadmemArgs {
    /// Offset into the memory map (decimal or 0x-prefixed hex).
    #[arg(value_parser = connect::parse_offset)]
    pub offset: usize,
    /// Number of bytes to read.
    #[arg(long, conflicts_with = "string", default_value = "1")]
    pub len: usize,
    /// Read a NUL-terminated string instead of a fixed length.
    #[arg(long)]
    pub string: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
