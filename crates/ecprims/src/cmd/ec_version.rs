use ecprims_proto::layout::CMD_GET_VERSION;
use serde::Serialize;

use crate::cmd::connect;
use crate::cmd::ConnectArgs;
use crate::exit::{transport_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{c_string, print_record, OutputFormat, Record};

const VERSION_FIELD: usize = 32;
const IMAGE_OFFSET: usize = 3 * VERSION_FIELD;
const REPLY_SIZE: usize = IMAGE_OFFSET + 4;

#[derive(Serialize)]
struct EcVersionOutput {
    ro_version: String,
    rw_version: String,
    current_image: &'static str,
}

impl Record for EcVersionOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("RO version", self.ro_version.clone()),
            ("RW version", self.rw_version.clone()),
            ("Firmware copy", self.current_image.to_string()),
        ]
    }

    fn raw(&self) -> Vec<u8> {
        let active = match self.current_image {
            "RO" => &self.ro_version,
            _ => &self.rw_version,
        };
        format!("{active}\n").into_bytes()
    }
}

fn image_name(image: u32) -> &'static str {
    match image {
        1 => "RO",
        2 => "RW",
        3 => "RO_B",
        4 => "RW_B",
        _ => "unknown",
    }
}

pub fn run(connect: &ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let mut ec = connect::open(connect)?;
    let reply = ec
        .send_command(CMD_GET_VERSION, 0, &[], REPLY_SIZE)
        .map_err(|e| transport_error("get version failed", e))?;
    if reply.len() < REPLY_SIZE {
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "version reply has {} bytes, expected {REPLY_SIZE}",
                reply.len()
            ),
        ));
    }

    let mut image = [0u8; 4];
    image.copy_from_slice(&reply[IMAGE_OFFSET..REPLY_SIZE]);
    let out = EcVersionOutput {
        ro_version: c_string(&reply[..VERSION_FIELD]),
        rw_version: c_string(&reply[VERSION_FIELD..2 * VERSION_FIELD]),
        current_image: image_name(u32::from_le_bytes(image)),
    };
    print_record(&out, format);
    Ok(SUCCESS)
}
