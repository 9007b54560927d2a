//! Command line tests for the uax-ingest binary
//!
//! Configuration problems must stop the process with status 1 before any
//! request reaches the export API.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::MockServer;

fn write_config(dir: &TempDir, value: serde_json::Value) -> PathBuf {
    let config_path = dir.path().join("config.json");
    fs::write(&config_path, value.to_string()).expect("Failed to write config");
    config_path
}

fn uax() -> Command {
    let mut cmd = Command::cargo_bin("uax-ingest").expect("binary not built");
    cmd.env("UAX_LOG_OUTPUT", "console");
    cmd
}

#[tokio::test(flavor = "multi_thread")]
async fn test_collect_missing_key_exits_before_network() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        serde_json::json!({
            "user": "collector",
            "postgres_server": "localhost:5432",
            "database": "analytics",
            "local_collection_path": dir.path().join("staging"),
            "unity_project_id": "proj-1",
            "unity_export_api_key": "key-1",
            "api_base_url": server.uri()
        }),
    );

    uax()
        .arg("collect")
        .arg(&config)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("password"));

    let requests = server.received_requests().await.unwrap();
    assert!(requests.is_empty());
    assert!(!dir.path().join("staging").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_export_missing_collection_path_exits_before_network() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        serde_json::json!({
            "unity_project_id": "proj-1",
            "unity_export_api_key": "",
            "api_base_url": server.uri()
        }),
    );

    uax()
        .args(["export"])
        .arg(&config)
        .args(["2024-01-01", "2024-01-31"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("collection_path"))
        .stderr(predicate::str::contains("unity_export_api_key"));

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[test]
fn test_missing_config_file() {
    let dir = TempDir::new().unwrap();

    uax()
        .arg("collect")
        .arg(dir.path().join("absent.json"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to read config file"));
}

#[test]
fn test_failure_reported_once() {
    let dir = TempDir::new().unwrap();

    let output = uax()
        .arg("collect")
        .arg(dir.path().join("absent.json"))
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("failed to read config file").count(), 1);
    assert!(!stdout.contains("failed to read config file"));
}

#[test]
fn test_usage_error_exit_code() {
    uax().arg("export").assert().code(2);
    uax()
        .args(["export", "config.json", "2024-01-01", "2024-01-31", "--dataset", "session"])
        .assert()
        .code(2);
}

#[test]
fn test_help() {
    uax()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("collect"))
        .stdout(predicate::str::contains("export"));
}
