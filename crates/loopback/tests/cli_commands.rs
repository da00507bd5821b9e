#![cfg(feature = "cli")]

use std::process::Command;

fn loopback() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_loopback"));
    cmd.arg("--log-level").arg("error");
    cmd
}

#[test]
fn pump_delivers_every_frame() {
    let output = loopback()
        .args(["--format", "json", "pump"])
        .args(["--pipe", "cli-pump", "--item-format", "CS8"])
        .args(["--bufflen", "4096", "--buffers", "4", "--frames", "64"])
        .args(["--read-elems", "500", "--timeout", "50ms"])
        .output()
        .expect("pump should run");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("pump should emit json");
    assert_eq!(report["channel"], "cli-pump");
    assert_eq!(report["format"], "CS8");
    assert_eq!(report["frames_sent"], 64);
    assert_eq!(report["frames_received"], 64);
    assert_eq!(report["elements"], 64 * 2048);
    assert_eq!(report["mismatches"], 0);
    assert_eq!(report["channels"], serde_json::json!(["cli-pump"]));
    assert_eq!(report["pool"]["total"], 4);
    assert_eq!(report["pool"]["free"], 4);
    assert_eq!(report["pool"]["active"], false);
}

#[test]
fn pump_rejects_unsupported_format() {
    let output = loopback()
        .args(["pump", "--item-format", "CU8", "--frames", "1"])
        .output()
        .expect("pump should run");

    assert_eq!(output.status.code(), Some(64));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported format"));
}

#[test]
fn pump_rejects_misaligned_frames() {
    let output = loopback()
        .args(["pump", "--bufflen", "1000", "--frames", "1"])
        .output()
        .expect("pump should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn formats_lists_supported_encodings() {
    let output = loopback()
        .args(["--format", "json", "formats"])
        .output()
        .expect("formats should run");

    assert!(output.status.success());
    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("formats should emit json");
    let names: Vec<&str> = payload["formats"]
        .as_array()
        .expect("formats should be an array")
        .iter()
        .filter_map(|f| f["name"].as_str())
        .collect();
    assert_eq!(names, vec!["CS8", "CS12", "CS16", "CF32"]);
    assert_eq!(payload["stream_args"][2]["key"], "pipe");
}

#[test]
fn envinfo_reports_version() {
    let output = loopback()
        .args(["--format", "json", "envinfo"])
        .output()
        .expect("envinfo should run");

    assert!(output.status.success());
    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("envinfo should emit json");
    assert_eq!(
        payload.get("version").and_then(|v| v.as_str()),
        Some(env!("CARGO_PKG_VERSION"))
    );
    assert_eq!(payload["defaults"]["channel"], "default");
}

#[test]
fn extended_version_lists_stream_support() {
    let output = loopback()
        .args(["version", "--extended"])
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("native_format: CS12"));
    assert!(stdout.contains("formats: CS8,CS12,CS16,CF32"));
}
