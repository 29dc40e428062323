mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::{Command, ConnectArgs};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "ecprims", version, about = "Embedded controller host command CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(flatten)]
    connect: ConnectArgs,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, &cli.connect, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_raw_subcommand() {
        let cli = Cli::try_parse_from([
            "ecprims",
            "raw",
            "0x3e03",
            "--cmd-version",
            "1",
            "--data",
            "de ad be ef",
        ])
        .expect("raw args should parse");

        let Command::Raw(args) = cli.command else {
            panic!("expected raw subcommand");
        };
        assert_eq!(args.command, 0x3E03);
        assert_eq!(args.command_version, 1);
    }

    #[test]
    fn connection_flags_are_global() {
        let cli = Cli::try_parse_from([
            "ecprims",
            "probe",
            "--device",
            "sim",
            "--no-lock",
            "--memmap-base",
            "0xe00",
            "--memmap-base",
            "0x900",
            "--lock-timeout-ms",
            "-1",
        ])
        .expect("global flags should parse after the subcommand");

        assert!(matches!(cli.command, Command::Probe));
        assert_eq!(cli.connect.device.as_deref(), Some("sim"));
        assert!(cli.connect.no_lock);
        assert_eq!(cli.connect.memmap_base, vec![0xE00, 0x900]);
        assert_eq!(cli.connect.lock_timeout_ms, -1);
    }

    #[test]
    fn rejects_conflicting_readmem_args() {
        let err = Cli::try_parse_from(["ecprims", "readmem", "0x60", "--len", "4", "--string"])
            .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_bad_memmap_base() {
        for base in ["0x1ffff", "0xfff0"] {
            let err = Cli::try_parse_from(["ecprims", "probe", "--memmap-base", base])
                .expect_err("out of range base should fail");

            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
    }
}
