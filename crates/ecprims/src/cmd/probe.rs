use ecprims_host::{MapRead, TransportError};
use ecprims_proto::layout::{MEMMAP_EVENTS_VERSION, MEMMAP_ID_VERSION};
use serde::Serialize;

use crate::cmd::connect;
use crate::cmd::ConnectArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat, Record};

#[derive(Serialize)]
struct ProbeOutput {
    channel: &'static str,
    protocol: String,
    max_request: usize,
    max_response: usize,
    memmap_base: String,
    capability_flags: Option<u8>,
    memmap_id_version: Option<u8>,
    host_events_version: Option<u8>,
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

impl Record for ProbeOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Channel", self.channel.to_string()),
            ("Protocol", self.protocol.clone()),
            ("Max request", format!("{} bytes", self.max_request)),
            ("Max response", format!("{} bytes", self.max_response)),
            ("Memory map", self.memmap_base.clone()),
            (
                "Flags",
                or_dash(self.capability_flags.map(|f| format!("{f:#04x}"))),
            ),
            ("Map version", or_dash(self.memmap_id_version)),
            ("Events version", or_dash(self.host_events_version)),
        ]
    }

    fn raw(&self) -> Vec<u8> {
        format!("{}\n", self.protocol).into_bytes()
    }
}

pub fn run(connect: &ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let mut ec = connect::open(connect)?;
    // A driver without a readable map still answers commands.
    let mut read_byte = |offset| match ec.read_mapped(offset, MapRead::Fixed(1)) {
        Ok(b) => Ok(Some(b[0])),
        Err(TransportError::MemmapUnavailable) => Ok(None),
        Err(e) => Err(transport_error("memory map read failed", e)),
    };
    let memmap_id_version = read_byte(MEMMAP_ID_VERSION)?;
    let host_events_version = read_byte(MEMMAP_EVENTS_VERSION)?;

    let limits = ec.limits();
    let out = ProbeOutput {
        channel: ec.channel_name(),
        protocol: ec.protocol_name(),
        max_request: limits.max_output,
        max_response: limits.max_input,
        memmap_base: ec.memmap_location(),
        capability_flags: ec.capability_flags(),
        memmap_id_version,
        host_events_version,
    };

    print_record(&out, format);
    Ok(SUCCESS)
}
