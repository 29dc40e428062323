#![cfg(all(feature = "cli", feature = "sim"))]

use std::process::{Command, Output};

fn ecprims(device: &str, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ecprims"))
        .arg("--log-level")
        .arg("error")
        .arg("--device")
        .arg(device)
        .arg("--no-lock")
        .args(args)
        .env_remove("ECPRIMS_DEVICE")
        .env_remove("ECPRIMS_LOCK")
        .output()
        .expect("ecprims should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn probe_sim_reports_v3() {
    let output = ecprims("sim", &["--format", "json", "probe"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json: serde_json::Value =
        serde_json::from_str(stdout(&output).trim()).expect("probe output should be JSON");
    assert_eq!(json["protocol"], "v3");
    assert_eq!(json["max_request"], 248);
    assert_eq!(json["memmap_base"], "0x900");
    assert_eq!(json["memmap_id_version"], 1);
}

#[test]
fn probe_legacy_sim_reports_v2() {
    let output = ecprims("sim-v2", &["--format", "json", "probe"]);
    assert!(output.status.success());
    let json: serde_json::Value =
        serde_json::from_str(stdout(&output).trim()).expect("probe output should be JSON");
    assert_eq!(json["protocol"], "v2");
    assert_eq!(json["max_response"], 252);
}

#[test]
fn probe_without_ec_exits_69() {
    let output = ecprims("sim-absent", &["probe"]);
    assert_eq!(output.status.code(), Some(69));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: negotiation failed: EC not present"));
}

#[test]
fn hello_roundtrip_succeeds() {
    for device in ["sim", "sim-v2"] {
        let output = ecprims(device, &["--format", "json", "hello"]);
        assert!(output.status.success(), "device {device}");
        let json: serde_json::Value =
            serde_json::from_str(stdout(&output).trim()).expect("hello output should be JSON");
        assert_eq!(json["ok"], true);
        assert_eq!(json["received"], 0xA1B2_C3D4u32);
    }
}

#[test]
fn ec_version_prints_strings() {
    let output = ecprims("sim", &["--format", "pretty", "ec-version"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("ecprims-sim-ro"));
    assert!(text.contains("ecprims-sim-rw"));
    assert!(text.contains("RW"));
}

#[test]
fn raw_echo_returns_payload_bytes() {
    let output = ecprims("sim", &["--format", "raw", "raw", "0x3e03", "--data", "de ad be ef"]);
    assert!(output.status.success());
    assert_eq!(output.stdout, vec![0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn raw_oversized_request_is_usage_error() {
    let data = "00".repeat(249);
    let output = ecprims("sim", &["raw", "0x10", "--data", &data]);
    assert_eq!(output.status.code(), Some(64));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("request too large (249 bytes, max 248)"));
}

#[test]
fn raw_bad_hex_is_usage_error() {
    let output = ecprims("sim", &["raw", "1", "--data", "xyz"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn readmem_reads_signature() {
    let output = ecprims("sim", &["--format", "raw", "readmem", "0x20", "--len", "2"]);
    assert!(output.status.success());
    assert_eq!(output.stdout, b"EC");
}

#[test]
fn readmem_out_of_range_is_usage_error() {
    let output = ecprims("sim", &["readmem", "0xfe", "--len", "4"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn fallback_base_only_misses_primary_map() {
    let output = ecprims("sim", &["--memmap-base", "0xe00", "probe"]);
    assert_eq!(output.status.code(), Some(69));
}

#[test]
fn memmap_base_at_top_of_port_space_is_rejected() {
    let output = ecprims("sim", &["--memmap-base", "0xfff0", "probe"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("would run past port 0xffff"));
    assert!(!stderr.contains("panicked"));
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_ecprims"))
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    assert_eq!(
        stdout(&output).trim(),
        format!("ecprims {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn driver_device_answers_hello_and_version() {
    let output = ecprims("sim-driver", &["--format", "json", "hello"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json: serde_json::Value =
        serde_json::from_str(stdout(&output).trim()).expect("hello output should be JSON");
    assert_eq!(json["ok"], true);
    assert_eq!(json["protocol"], "driver");

    let output = ecprims("sim-driver", &["--format", "raw", "ec-version"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "ecprims-sim-rw-v1.0\n");
}

#[test]
fn driver_connection_reports_memmap_access() {
    for (device, memmap) in [
        ("sim-driver", "driver"),
        ("sim-driver-cmd", "driver (read command)"),
    ] {
        let output = ecprims(device, &["--format", "json", "probe"]);
        assert!(output.status.success(), "device {device}");
        let json: serde_json::Value =
            serde_json::from_str(stdout(&output).trim()).expect("probe output should be JSON");
        assert_eq!(json["protocol"], "driver");
        assert_eq!(json["max_request"], 244);
        assert_eq!(json["memmap_base"], memmap);
        assert_eq!(json["memmap_id_version"], 1);
        assert!(json["capability_flags"].is_null());
    }
}

#[test]
fn driver_readmem_falls_back_to_read_command() {
    let output = ecprims("sim-driver-cmd", &["--format", "raw", "readmem", "0x20", "--len", "2"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(output.stdout, b"EC");
}
