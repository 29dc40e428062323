use std::time::Instant;

use ecprims_proto::layout::{CMD_HELLO, HELLO_INCREMENT};
use serde::Serialize;

use crate::cmd::connect;
use crate::cmd::ConnectArgs;
use crate::exit::{transport_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_record, OutputFormat, Record};

const HELLO_ARG: u32 = 0xA0B0_C0D0;

#[derive(Serialize)]
struct HelloOutput {
    protocol: String,
    sent: u32,
    received: u32,
    ok: bool,
    latency_us: u64,
}

impl Record for HelloOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Protocol", self.protocol.clone()),
            ("Sent", format!("{:#010x}", self.sent)),
            ("Received", format!("{:#010x}", self.received)),
            ("Result", if self.ok { "ok" } else { "mismatch" }.to_string()),
            ("Latency", format!("{}us", self.latency_us)),
        ]
    }

    fn raw(&self) -> Vec<u8> {
        self.received.to_le_bytes().to_vec()
    }
}

pub fn run(connect: &ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let mut ec = connect::open(connect)?;

    let start = Instant::now();
    let reply = ec
        .send_command(CMD_HELLO, 0, &HELLO_ARG.to_le_bytes(), 4)
        .map_err(|e| transport_error("hello failed", e))?;
    let latency = start.elapsed();

    let bytes: [u8; 4] = reply.as_ref().try_into().map_err(|_| {
        CliError::new(
            DATA_INVALID,
            format!("hello reply has {} bytes, expected 4", reply.len()),
        )
    })?;
    let received = u32::from_le_bytes(bytes);
    let expected = HELLO_ARG.wrapping_add(HELLO_INCREMENT);

    let out = HelloOutput {
        protocol: ec.protocol_name(),
        sent: HELLO_ARG,
        received,
        ok: received == expected,
        latency_us: latency.as_micros() as u64,
    };
    print_record(&out, format);

    if !out.ok {
        return Err(CliError::new(
            DATA_INVALID,
            format!("hello reply {received:#010x}, expected {expected:#010x}"),
        ));
    }
    Ok(SUCCESS)
}
