use std::time::Duration;

use ecprims_host::{negotiate, MapRead, NoLock, TransportConfig, TransportError};
use ecprims_proto::layout::{
    CMD_GET_VERSION, CMD_HELLO, HELLO_INCREMENT, HOST_CMD_FLAG_LPC_ARGS_SUPPORTED,
    HOST_CMD_FLAG_VERSION_3, MEMMAP_BASE, MEMMAP_FALLBACK_BASE, MEMMAP_ID_VERSION,
};
use ecprims_proto::sim::{SimulatedEc, SIM_VERSION_RO};
use ecprims_proto::{Protocol, ProtocolError};

fn config() -> TransportConfig {
    TransportConfig {
        command_timeout: Duration::from_millis(50),
        ..TransportConfig::default()
    }
}

#[test]
fn version3_capable_ec_negotiates_v3() {
    let ec = SimulatedEc::new(HOST_CMD_FLAG_VERSION_3 | HOST_CMD_FLAG_LPC_ARGS_SUPPORTED);
    let transport = negotiate(ec, NoLock::new(), config()).expect("negotiation should succeed");
    assert_eq!(transport.protocol(), Protocol::V3);
    assert_eq!(transport.limits().max_output, 248);
    assert_eq!(transport.limits().max_input, 248);
    assert_eq!(transport.memmap_base(), MEMMAP_BASE);
}

#[test]
fn legacy_ec_negotiates_v2() {
    let ec = SimulatedEc::new(HOST_CMD_FLAG_LPC_ARGS_SUPPORTED);
    let transport = negotiate(ec, NoLock::new(), config()).expect("negotiation should succeed");
    assert_eq!(transport.protocol(), Protocol::V2);
    assert_eq!(transport.limits().max_output, 252);
    assert_eq!(transport.capability_flags(), HOST_CMD_FLAG_LPC_ARGS_SUPPORTED);
}

#[test]
fn no_protocol_flags_is_unsupported() {
    let ec = SimulatedEc::new(0x40);
    let err = negotiate(ec, NoLock::new(), config()).expect_err("negotiation should fail");
    assert!(matches!(
        err,
        TransportError::UnsupportedProtocol { flags: 0x40 }
    ));
}

#[test]
fn missing_signature_is_not_present() {
    let ec = SimulatedEc::new(HOST_CMD_FLAG_VERSION_3).without_signature();
    let err = negotiate(ec, NoLock::new(), config()).expect_err("negotiation should fail");
    assert!(matches!(err, TransportError::EcNotPresent(_)));
}

#[test]
fn saturated_bus_is_not_present() {
    let err = negotiate(SimulatedEc::absent(), NoLock::new(), config())
        .expect_err("negotiation should fail");
    assert!(matches!(err, TransportError::EcNotPresent(ref why) if why.contains("0xFF")));
}

#[test]
fn relocated_memory_map_found_at_fallback() {
    let ec = SimulatedEc::new(HOST_CMD_FLAG_VERSION_3).with_memmap_base(MEMMAP_FALLBACK_BASE);
    let mut transport = negotiate(ec, NoLock::new(), config()).expect("negotiation should succeed");
    assert_eq!(transport.memmap_base(), MEMMAP_FALLBACK_BASE);
    let id = transport
        .read_mapped(0x20, MapRead::Fixed(2))
        .expect("signature should be readable");
    assert_eq!(id.as_ref(), b"EC");
}

#[test]
fn fallback_base_is_not_probed_when_not_configured() {
    let ec = SimulatedEc::new(HOST_CMD_FLAG_VERSION_3).with_memmap_base(MEMMAP_FALLBACK_BASE);
    let config = TransportConfig {
        memmap_bases: vec![MEMMAP_BASE],
        ..config()
    };
    let err = negotiate(ec, NoLock::new(), config).expect_err("negotiation should fail");
    assert!(matches!(err, TransportError::EcNotPresent(_)));
}

#[test]
fn hello_roundtrip_over_both_protocols() {
    for flags in [HOST_CMD_FLAG_VERSION_3, HOST_CMD_FLAG_LPC_ARGS_SUPPORTED] {
        let ec = SimulatedEc::new(flags);
        let mut transport =
            negotiate(ec, NoLock::new(), config()).expect("negotiation should succeed");
        let arg: u32 = 0xA0B0_C0D0;
        let reply = transport
            .send_command(CMD_HELLO, 0, &arg.to_le_bytes(), 4)
            .expect("hello should succeed");
        let out = u32::from_le_bytes(reply.as_ref().try_into().expect("4-byte reply"));
        assert_eq!(out, arg.wrapping_add(HELLO_INCREMENT), "flags {flags:#04x}");
    }
}

#[test]
fn get_version_returns_version_strings() {
    let ec = SimulatedEc::new(HOST_CMD_FLAG_VERSION_3);
    let mut transport = negotiate(ec, NoLock::new(), config()).expect("negotiation should succeed");
    let reply = transport
        .send_command(CMD_GET_VERSION, 0, &[], 128)
        .expect("get version should succeed");
    assert_eq!(reply.len(), 100);
    assert!(reply.starts_with(SIM_VERSION_RO.as_bytes()));
}

#[test]
fn small_capacity_is_response_too_big() {
    let ec = SimulatedEc::new(HOST_CMD_FLAG_VERSION_3);
    let mut transport = negotiate(ec, NoLock::new(), config()).expect("negotiation should succeed");
    let err = transport
        .send_command(CMD_GET_VERSION, 0, &[], 16)
        .expect_err("reply should not fit");
    assert!(matches!(
        err,
        TransportError::Protocol(ProtocolError::ResponseTooBig {
            size: 100,
            capacity: 16
        })
    ));
}

#[test]
fn memory_map_layout_version_readable() {
    let ec = SimulatedEc::new(HOST_CMD_FLAG_VERSION_3);
    let mut transport = negotiate(ec, NoLock::new(), config()).expect("negotiation should succeed");
    let version = transport
        .read_mapped(MEMMAP_ID_VERSION, MapRead::Fixed(1))
        .expect("id version should be readable");
    assert_eq!(version.as_ref(), &[1]);
}

#[cfg(unix)]
#[test]
fn file_lock_guards_exchanges() {
    use ecprims_host::{ExchangeLock, FileLock, LockError, LockTimeout};

    let dir = std::env::temp_dir().join(format!(
        "ecprims-host-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    let path = dir.join("ec.lock");

    let ec = SimulatedEc::new(HOST_CMD_FLAG_VERSION_3);
    let config = TransportConfig {
        lock_timeout: LockTimeout::NoWait,
        ..config()
    };
    let mut transport =
        negotiate(ec, FileLock::new(&path), config).expect("negotiation should succeed");

    let mut other = FileLock::new(&path);
    other
        .acquire(LockTimeout::NoWait)
        .expect("lock should be free between exchanges");
    let err = transport
        .send_command(CMD_HELLO, 0, &0u32.to_le_bytes(), 4)
        .expect_err("exchange should be excluded");
    assert!(matches!(err, TransportError::Lock(LockError::Busy { .. })));

    other.release();
    transport
        .send_command(CMD_HELLO, 0, &0u32.to_le_bytes(), 4)
        .expect("exchange should succeed once the lock is free");

    let _ = std::fs::remove_dir_all(&dir);
}
