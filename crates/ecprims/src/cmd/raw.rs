use bytes::Bytes;
use serde::Serialize;

use crate::cmd::connect::{self, parse_hex_bytes};
use crate::cmd::{ConnectArgs, RawArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{hex, print_record, OutputFormat, Record};

#[derive(Serialize)]
struct RawOutput {
    command: String,
    version: u8,
    protocol: String,
    request_size: usize,
    response_size: usize,
    response: String,
    #[serde(skip)]
    payload: Bytes,
}

impl Record for RawOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Command", format!("{} v{}", self.command, self.version)),
            ("Protocol", self.protocol.clone()),
            ("Sent", format!("{} bytes", self.request_size)),
            ("Received", format!("{} bytes", self.response_size)),
            ("Response", self.response.clone()),
        ]
    }

    fn raw(&self) -> Vec<u8> {
        self.payload.to_vec()
    }
}

pub fn run(args: RawArgs, connect: &ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let output = parse_hex_bytes(&args.data)?;
    let mut ec = connect::open(connect)?;
    let payload = ec
        .send_command(args.command, args.command_version, &output, args.capacity)
        .map_err(|e| transport_error(&format!("command {:#06x} failed", args.command), e))?;

    let out = RawOutput {
        command: format!("{:#06x}", args.command),
        version: args.command_version,
        protocol: ec.protocol_name(),
        request_size: output.len(),
        response_size: payload.len(),
        response: hex(&payload),
        payload,
    };
    print_record(&out, format);
    Ok(SUCCESS)
}
