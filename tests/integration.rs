//! Integration tests for gateway-adblock.
//!
//! These drive the compiled binary. None of them reach Cloudflare: every
//! command under test fails or finishes before the first API call.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Run gateway-adblock without Cloudflare credentials in the environment
fn run_gateway_adblock(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gateway-adblock"))
        .args(args)
        .env_remove("CF_ACCOUNT_ID")
        .env_remove("CF_API_TOKEN")
        .output()
        .expect("Failed to execute gateway-adblock")
}

fn write_config(dir: &Path, content: &str) -> String {
    let path = dir.join("config.yaml");
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

const VALID_CONFIG: &str = r#"
settings:
  lock_file: LOCK
groups:
  - name: ads
    adlist_urls:
      - https://lists.test/hosts
"#;

#[test]
fn test_version_command() {
    let output = run_gateway_adblock(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("gateway-adblock"));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_command() {
    let output = run_gateway_adblock(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("sync"));
    assert!(stdout.contains("delete"));
    assert!(stdout.contains("status"));
}

#[test]
fn test_invalid_subcommand() {
    let output = run_gateway_adblock(&["frobnicate"]);
    assert!(!output.status.success());
}

#[test]
fn test_init_writes_sample_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    let path_str = path.to_string_lossy();

    let output = run_gateway_adblock(&["init", "-c", &path_str]);
    assert!(output.status.success());
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("adlist_urls"));

    // A second init must not clobber the file
    let output = run_gateway_adblock(&["init", "-c", &path_str]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("already exists"));

    let output = run_gateway_adblock(&["init", "--force", "-c", &path_str]);
    assert!(output.status.success());
}

#[test]
fn test_sync_missing_config() {
    let output = run_gateway_adblock(&["sync", "-c", "/nonexistent/gateway-adblock.yaml"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to load config"));
}

#[test]
fn test_sync_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        "settings:\n  chunk_size: 5000\ngroups:\n  - name: ads\n    adlist_urls:\n      - https://lists.test/a\n",
    );

    let output = run_gateway_adblock(&["sync", "-c", &config]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("chunk_size"));
}

#[test]
fn test_sync_rejects_plain_http_sources() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        "groups:\n  - name: ads\n    adlist_urls:\n      - http://lists.test/a\n",
    );

    let output = run_gateway_adblock(&["sync", "--dry-run", "-c", &config]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("HTTPS"));
}

#[test]
fn test_sync_without_credentials() {
    let dir = TempDir::new().unwrap();
    let lock = dir.path().join("sync.lock");
    let config = write_config(
        dir.path(),
        &VALID_CONFIG.replace("LOCK", &lock.to_string_lossy()),
    );

    let output = run_gateway_adblock(&["sync", "-c", &config]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Missing credentials"));
    assert!(!lock.exists());
}

#[test]
fn test_sync_unknown_group() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &VALID_CONFIG.replace("LOCK", "/tmp/unused.lock"));

    let output = run_gateway_adblock(&["sync", "--group", "nope", "-c", &config]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not configured"));
}

#[test]
fn test_delete_rejects_invalid_group_name() {
    let output = run_gateway_adblock(&["delete", "--group", "ads] evil"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid group name"));
}
