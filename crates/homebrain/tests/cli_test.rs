//! Integration tests for the `homebrain` CLI binary.
//!
//! Bridge-facing commands run against wiremock; everything else uses a
//! throwaway config directory so tests never touch real settings.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// `homebrain` with environment isolation rooted at `home`.
fn homebrain_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("homebrain");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("HOMEBRAIN_CONFIG_FILE")
        .env_remove("HOMEBRAIN_INSTEON_ENABLED")
        .env_remove("HOMEBRAIN_INSTEON_BRIDGE_URL")
        .env_remove("HOMEBRAIN_INSTEON_AUTH_TOKEN")
        .env_remove("HOMEBRAIN_INSTEON_POLL_INTERVAL")
        .env_remove("HOMEBRAIN_REQUEST_TIMEOUT_MS")
        .env_remove("HOMEBRAIN_DEVICE_CACHE_PATH");
    cmd
}

/// Write a config file pointing at `bridge` with the cache under `dir`.
fn write_config(dir: &Path, bridge: &str, extra: &str) -> PathBuf {
    let path = dir.join("homebrain.toml");
    let cache = dir.join("devices.json");
    std::fs::write(
        &path,
        format!(
            "insteon_bridge_url = \"{bridge}\"\nrequest_timeout_ms = 2000\ndevice_cache_path = \"{}\"\n{extra}",
            cache.display()
        ),
    )
    .unwrap();
    path
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// A port nothing listens on.
fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

async fn mount_discovery(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/discovery"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "mode": "mock",
            "devices": [
                { "id": "4A.BC.01", "name": "Lamp", "category": "dimmer", "level": 0 },
                { "address": "11:22:33", "name": "Fan" },
                { "name": "no address" }
            ]
        })))
        .mount(server)
        .await;
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn no_args_shows_help() {
    let home = tempfile::tempdir().unwrap();
    let output = homebrain_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn help_lists_commands() {
    let home = tempfile::tempdir().unwrap();
    homebrain_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("run")
            .and(predicate::str::contains("discover"))
            .and(predicate::str::contains("devices"))
            .and(predicate::str::contains("command")),
    );
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn config_path_honours_flag() {
    let home = tempfile::tempdir().unwrap();
    let file = home.path().join("custom.toml");
    homebrain_cmd(home.path())
        .args(["config", "path", "--config"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn config_show_masks_token() {
    let home = tempfile::tempdir().unwrap();
    let file = write_config(
        home.path(),
        "http://bridge.local:8765",
        "insteon_auth_token = \"hunter2\"\n",
    );
    homebrain_cmd(home.path())
        .args(["config", "show", "--config"])
        .arg(&file)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("http://bridge.local:8765")
                .and(predicate::str::contains("******"))
                .and(predicate::str::contains("hunter2").not()),
        );
}

#[test]
fn config_init_refuses_to_overwrite() {
    let home = tempfile::tempdir().unwrap();
    let file = home.path().join("new").join("config.toml");

    homebrain_cmd(home.path())
        .args(["config", "init", "--config"])
        .arg(&file)
        .assert()
        .success();
    assert!(file.exists());

    homebrain_cmd(home.path())
        .args(["config", "init", "--config"])
        .arg(&file)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already exists"));
}

// ── Device cache ────────────────────────────────────────────────────

#[test]
fn devices_on_empty_cache() {
    let home = tempfile::tempdir().unwrap();
    let file = write_config(home.path(), "http://127.0.0.1:8765", "");
    homebrain_cmd(home.path())
        .args(["devices", "--config"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("never synced"));

    homebrain_cmd(home.path())
        .args(["devices", "4A.BC.01", "--config"])
        .arg(&file)
        .assert()
        .code(4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn discover_save_then_read_cache() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    let home = tempfile::tempdir().unwrap();
    let file = write_config(home.path(), &server.uri(), "");

    homebrain_cmd(home.path())
        .args(["discover", "--save", "--output", "plain", "--config"])
        .arg(&file)
        .assert()
        .success()
        .stdout("4abc01\n112233\n");

    let output = homebrain_cmd(home.path())
        .args(["devices", "4a:bc:01", "--output", "json", "--config"])
        .arg(&file)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let device: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(device["id"], "4abc01");
    assert_eq!(device["name"], "Lamp");

    let cache: serde_json::Value =
        serde_json::from_slice(&std::fs::read(home.path().join("devices.json")).unwrap()).unwrap();
    assert_eq!(cache["mockMode"], true);
    assert_eq!(cache["lastSyncSummary"]["source"], "http");
}

// ── Bridge operations ───────────────────────────────────────────────

#[test]
fn status_unreachable_bridge_exits_with_connection_code() {
    let home = tempfile::tempdir().unwrap();
    let file = write_config(home.path(), &closed_port_url(), "");
    homebrain_cmd(home.path())
        .args(["status", "--config"])
        .arg(&file)
        .assert()
        .code(7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn status_reports_bridge_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "status": { "connected": true, "mode": "live", "port": "/dev/ttyUSB0" }
        })))
        .mount(&server)
        .await;
    let home = tempfile::tempdir().unwrap();
    let file = write_config(home.path(), "http://ignored.invalid", "");

    let output = homebrain_cmd(home.path())
        .args(["status", "--output", "json", "--bridge-url", &server.uri(), "--config"])
        .arg(&file)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["online"], true);
    assert_eq!(status["mockMode"], false);
    assert_eq!(status["details"]["port"], "/dev/ttyUSB0");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn command_posts_normalized_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/devices/4abc01/commands"))
        .and(body_json(json!({ "command": "on", "level": 80 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "result": { "acknowledged": true }
        })))
        .expect(1)
        .mount(&server)
        .await;
    let home = tempfile::tempdir().unwrap();
    let file = write_config(home.path(), &server.uri(), "");

    homebrain_cmd(home.path())
        .args(["command", "4A.BC.01", "on", "--level", "80", "--config"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("on sent to 4abc01"));

    homebrain_cmd(home.path())
        .args(["command", "zz", "on", "--config"])
        .arg(&file)
        .assert()
        .code(2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn discover_refresh_passes_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/discovery"))
        .and(query_param("refresh", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "devices": []
        })))
        .expect(1)
        .mount(&server)
        .await;
    let home = tempfile::tempdir().unwrap();
    let file = write_config(home.path(), &server.uri(), "");

    homebrain_cmd(home.path())
        .args(["discover", "--refresh", "--output", "json", "--config"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}
