//! Integration tests for the command-line interface
//!
//! Only offline paths are exercised: the mock provider, argument errors and
//! local station ingestion.

use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str], cache_dir: &TempDir) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wateringscale"))
        .args(args)
        .env("WATERINGSCALE__CACHE_DIR", cache_dir.path())
        .env_remove("WATERINGSCALE_CONFIG")
        .output()
        .expect("Failed to execute wateringscale")
}

fn stdout_json(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("stdout is not JSON ({}): {}", e, stdout))
}

#[test]
fn test_help_flag_exits_successfully() {
    let dir = TempDir::new().expect("temp dir");
    let output = run_cli(&["--help"], &dir);
    assert!(output.status.success(), "Expected --help to exit successfully");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("wateringscale"), "Help should mention wateringscale");
    assert!(stdout.contains("scale"), "Help should list the scale command");
    assert!(stdout.contains("ingest"), "Help should list the ingest command");
}

#[test]
fn test_invalid_method_reports_error_code() {
    let dir = TempDir::new().expect("temp dir");
    let output = run_cli(&["--provider", "mock", "scale", "-m", "9", "-l", "40.7,-74.0"], &dir);
    assert!(!output.status.success(), "Expected an unknown method to fail");
    let json = stdout_json(&output);
    assert_eq!(json["errCode"], 41);
    assert_eq!(json["scale"], Value::Null);
}

#[test]
fn test_manual_method_works_offline() {
    let dir = TempDir::new().expect("temp dir");
    let output = run_cli(&["--provider", "mock", "scale", "-m", "0", "-l", "40.7,-74.0"], &dir);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["errCode"], 0);
    assert_eq!(json["scale"], -1);
}

#[test]
fn test_bad_location_reports_error_code() {
    let dir = TempDir::new().expect("temp dir");
    let output = run_cli(&["--provider", "mock", "scale", "-m", "0", "-l", "123,456"], &dir);
    assert!(!output.status.success());
    assert_eq!(stdout_json(&output)["errCode"], 22);
}

#[test]
fn test_pws_id_without_key_reports_invalid_key() {
    let dir = TempDir::new().expect("temp dir");
    let output = run_cli(
        &["--provider", "mock", "scale", "-m", "0", "-l", "40.7,-74.0", "--pws-id", "KSTATION1"],
        &dir,
    );
    assert!(!output.status.success());
    assert_eq!(stdout_json(&output)["errCode"], 31);
}

#[test]
fn test_log_filter_is_read_from_dotenv() {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join(".env"), "RUST_LOG=wateringscale=debug\n").expect("write .env");

    let output = Command::new(env!("CARGO_BIN_EXE_wateringscale"))
        .args(["--provider", "mock", "scale", "-m", "0", "-l", "40.7,-74.0"])
        .current_dir(dir.path())
        .env("WATERINGSCALE__CACHE_DIR", dir.path())
        .env_remove("WATERINGSCALE_CONFIG")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute wateringscale");

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("loaded configuration"), "debug logs missing: {}", stderr);
}

#[test]
fn test_invalid_ingest_param_is_rejected() {
    let dir = TempDir::new().expect("temp dir");
    let output = run_cli(&["ingest", "tempf"], &dir);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("key=value"), "Should explain the expected format: {}", stderr);
}

#[test]
fn test_ingested_observations_persist_between_runs() {
    let dir = TempDir::new().expect("temp dir");

    let first = run_cli(&["ingest", "dateutc=now", "tempf=70.5", "humidity=40"], &dir);
    assert!(first.status.success(), "stderr: {}", String::from_utf8_lossy(&first.stderr));
    let json = stdout_json(&first);
    assert_eq!(json["observation"]["temp"], 70.5);
    assert_eq!(json["buffered"], 1);

    let second = run_cli(&["ingest", "dateutc=now", "tempf=71", "humidity=42"], &dir);
    assert!(second.status.success());
    assert_eq!(stdout_json(&second)["buffered"], 2);
}
