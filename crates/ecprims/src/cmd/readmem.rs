use bytes::Bytes;
use ecprims_host::MapRead;
use serde::Serialize;

use crate::cmd::connect;
use crate::cmd::{ConnectArgs, ReadmemArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{hex, print_record, OutputFormat, Record};

#[derive(Serialize)]
struct ReadmemOutput {
    base: String,
    offset: String,
    len: usize,
    bytes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip)]
    data: Bytes,
}

impl Record for ReadmemOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("Base", self.base.clone()),
            ("Offset", self.offset.clone()),
            ("Length", self.len.to_string()),
            ("Bytes", self.bytes.clone()),
        ];
        if let Some(text) = &self.text {
            rows.push(("Text", text.clone()));
        }
        rows
    }

    fn raw(&self) -> Vec<u8> {
        self.data.to_vec()
    }
}

pub fn run(args: ReadmemArgs, connect: &ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let read = if args.string {
        MapRead::String
    } else {
        MapRead::Fixed(args.len)
    };

    let mut ec = connect::open(connect)?;
    let data = ec
        .read_mapped(args.offset, read)
        .map_err(|e| transport_error("memory map read failed", e))?;

    let out = ReadmemOutput {
        base: ec.memmap_location(),
        offset: format!("{:#04x}", args.offset),
        len: data.len(),
        bytes: hex(&data),
        text: args
            .string
            .then(|| String::from_utf8_lossy(&data).into_owned()),
        data,
    };
    print_record(&out, format);
    Ok(SUCCESS)
}
