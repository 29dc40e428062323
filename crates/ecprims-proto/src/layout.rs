//! Wire layout constants for the LPC host command interface.
//!
//! Port numbers and offsets are fixed by EC firmware and must match it
//! bit for bit.

/// Data port. Holds the result code after a command completes.
pub const HOST_DATA: u16 = 0x200;

/// Command port. Writing here starts a command; reading returns status.
pub const HOST_CMD: u16 = 0x204;

/// Protocol v2 argument block (`flags`, `command_version`, `data_size`, `checksum`).
pub const HOST_ARGS: u16 = 0x800;

/// Size of the protocol v2 argument block.
pub const ARGS_SIZE: usize = 4;

/// Protocol v2 parameter window.
pub const HOST_PARAM: u16 = 0x804;

/// Largest protocol v2 parameter payload.
pub const PROTO2_MAX_PARAM_SIZE: usize = 0xFC;

/// Protocol v3 packet window (shares the range used by v2 args + params).
pub const HOST_PACKET: u16 = 0x800;

/// Protocol v3 packet window size.
pub const PACKET_SIZE: usize = 0x100;

/// Status bits meaning "EC still busy": FROM_HOST (0x02) | PROCESSING (0x04).
pub const STATUS_BUSY_MASK: u8 = 0x06;

/// v2 args flag: set by the host on the request.
pub const ARGS_FLAG_FROM_HOST: u8 = 0x01;

/// v2 args flag: set by the EC on the response.
pub const ARGS_FLAG_TO_HOST: u8 = 0x02;

/// Value written to the command port to start a protocol v3 exchange.
pub const COMMAND_PROTOCOL_3: u8 = 0xDA;

/// `struct_version` of a v3 request header.
pub const HOST_REQUEST_VERSION: u8 = 3;

/// `struct_version` expected in a v3 response header.
pub const HOST_RESPONSE_VERSION: u8 = 3;

/// Size of the v3 request header.
pub const REQUEST_HEADER_SIZE: usize = 8;

/// Size of the v3 response header.
pub const RESPONSE_HEADER_SIZE: usize = 8;

/// Primary memory-map base port.
pub const MEMMAP_BASE: u16 = 0x900;

/// Memory-map base used by boards whose window is relocated
/// (Framework Laptop 13, AMD Ryzen 7040 series).
pub const MEMMAP_FALLBACK_BASE: u16 = 0xE00;

/// Memory-map region size.
pub const MEMMAP_SIZE: usize = 0xFF;

/// Offset of the two-byte `"EC"` signature.
pub const MEMMAP_ID: usize = 0x20;

/// Signature bytes found at [`MEMMAP_ID`].
pub const MEMMAP_SIGNATURE: [u8; 2] = *b"EC";

/// Offset of the memory-map layout version.
pub const MEMMAP_ID_VERSION: usize = 0x22;

/// Offset of the host event layout version.
pub const MEMMAP_EVENTS_VERSION: usize = 0x23;

/// Offset of the host command capability flags.
pub const MEMMAP_HOST_CMD_FLAGS: usize = 0x27;

/// Capability flag: protocol v2 argument block supported.
pub const HOST_CMD_FLAG_LPC_ARGS_SUPPORTED: u8 = 0x01;

/// Capability flag: protocol v3 packets supported.
pub const HOST_CMD_FLAG_VERSION_3: u8 = 0x02;

/// Host command: echo a u32 back incremented by [`HELLO_INCREMENT`].
pub const CMD_HELLO: u16 = 0x0001;

/// Amount the EC adds to the `CMD_HELLO` argument.
pub const HELLO_INCREMENT: u32 = 0x0102_0304;

/// Host command: firmware version strings.
pub const CMD_GET_VERSION: u16 = 0x0002;

/// Host command: read `size` memory-map bytes at `offset`. Parameters are
/// two bytes, `offset` then `size`. Used where the map is not port-mapped.
pub const CMD_READ_MEMMAP: u16 = 0x0007;

/// Offset added to EC result codes to keep them apart from transport errors
/// in the legacy integer return space.
pub const EECRESULT: i32 = 1000;

const RESULT_NAMES: [&str; 21] = [
    "SUCCESS",
    "INVALID_COMMAND",
    "ERROR",
    "INVALID_PARAM",
    "ACCESS_DENIED",
    "INVALID_RESPONSE",
    "INVALID_VERSION",
    "INVALID_CHECKSUM",
    "IN_PROGRESS",
    "UNAVAILABLE",
    "TIMEOUT",
    "OVERFLOW",
    "INVALID_HEADER",
    "REQUEST_TRUNCATED",
    "RESPONSE_TOO_BIG",
    "BUS_ERROR",
    "BUSY",
    "INVALID_HEADER_VERSION",
    "INVALID_HEADER_CRC",
    "INVALID_DATA_CRC",
    "DUP_UNAVAILABLE",
];

/// Result codes the EC reports through [`HOST_DATA`].
pub mod result {
    pub const SUCCESS: u8 = 0;
    pub const INVALID_COMMAND: u8 = 1;
    pub const ERROR: u8 = 2;
    pub const INVALID_PARAM: u8 = 3;
    pub const INVALID_CHECKSUM: u8 = 7;
    pub const INVALID_HEADER: u8 = 12;
    pub const BUSY: u8 = 16;
}

/// Returns the symbolic name of an EC result code.
pub fn result_name(code: u8) -> &'static str {
    RESULT_NAMES
        .get(usize::from(code))
        .copied()
        .unwrap_or("<unknown>")
}
