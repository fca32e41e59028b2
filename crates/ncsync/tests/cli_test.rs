//! Integration tests for the `ncsync` CLI binary.
//!
//! These cover argument parsing, config handling, and error exit codes
//! without touching a real management API or spawning tunnels.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `ncsync` binary with env isolation.
///
/// Clears all `NCSYNC_*` variables the binary reads and points the config
/// directories at a nonexistent path, so tests never see the user's setup.
fn ncsync_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("ncsync");
    cmd.env("HOME", "/tmp/ncsync-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/ncsync-test-nonexistent")
        .env("NO_COLOR", "1")
        .env_remove("NCSYNC_CONFIG")
        .env_remove("NCSYNC_MODE")
        .env_remove("NCSYNC_OUTPUT")
        .env_remove("NCSYNC_TIMEOUT")
        .env_remove("NCSYNC_USERNAME")
        .env_remove("NCSYNC_PASS_INT")
        .env_remove("NCSYNC_PASS_PROD")
        .env_remove("RUST_LOG")
        .write_stdin("");
    cmd
}

/// A temp dir holding a starter config written by `config init`.
fn initialized() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    ncsync_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .success();
    (dir, path)
}

fn with_config(path: &Path) -> assert_cmd::Command {
    let mut cmd = ncsync_cmd();
    cmd.arg("--config").arg(path);
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = ncsync_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_commands() {
    ncsync_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("check")
            .and(predicate::str::contains("connect"))
            .and(predicate::str::contains("devices"))
            .and(predicate::str::contains("targets")),
    );
}

#[test]
fn test_version_flag() {
    ncsync_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ncsync"));
}

#[test]
fn test_completions_zsh() {
    ncsync_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_completions_bash() {
    ncsync_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Argument errors ─────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = ncsync_cmd().arg("foobar").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("foobar"));
}

#[test]
fn test_invalid_output_format() {
    let output = ncsync_cmd()
        .args(["--output", "invalid", "targets"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(text.contains("invalid") || text.contains("possible values"));
}

#[test]
fn test_zero_concurrency_is_rejected() {
    ncsync_cmd()
        .args(["check", "titan-e2e", "--concurrency", "0"])
        .assert()
        .code(2);
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honours_flag() {
    ncsync_cmd()
        .args(["--config", "/tmp/somewhere/ncsync.toml", "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/tmp/somewhere/ncsync.toml"));
}

#[test]
fn test_config_init_writes_starter_targets() {
    let (_dir, path) = initialized();
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("[targets.titan-production]"));
    assert!(written.contains("always_tunnel = true"));
}

#[test]
fn test_config_init_refuses_to_overwrite() {
    let (_dir, path) = initialized();
    with_config(&path)
        .args(["config", "init"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--force"));
    with_config(&path)
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn test_config_show_redacts_passwords() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[targets.lab]\nhost = \"192.0.2.10\"\npassword = \"hunter2\"\n",
    )
    .unwrap();

    with_config(&path)
        .args(["--output", "json", "config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("********").and(predicate::str::contains("hunter2").not()),
        );
}

#[test]
fn test_config_show_without_file_renders_defaults() {
    ncsync_cmd()
        .args(["--config", "/tmp/ncsync-test-nonexistent/none.toml", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("direct_hostname"));
}

#[test]
fn test_conflicting_local_ports_are_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[targets.a]\nhost = \"192.0.2.1\"\n\n[targets.b]\nhost = \"192.0.2.2\"\n",
    )
    .unwrap();

    with_config(&path)
        .arg("targets")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("local_port"));
}

// ── Targets ─────────────────────────────────────────────────────────

#[test]
fn test_targets_lists_configured_targets() {
    let (_dir, path) = initialized();
    with_config(&path)
        .args(["--output", "plain", "targets"])
        .assert()
        .success()
        .stdout(predicate::str::diff("titan-integration\ntitan-production\n"));
}

#[test]
fn test_targets_filter_by_environment() {
    let (_dir, path) = initialized();
    with_config(&path)
        .args(["--output", "plain", "targets", "--environment", "production"])
        .assert()
        .success()
        .stdout(predicate::str::diff("titan-production\n"));
}

#[test]
fn test_always_tunnel_survives_direct_mode() {
    let (_dir, path) = initialized();
    let output = with_config(&path)
        .args(["--mode", "direct", "--output", "json", "targets"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let targets: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let modes: Vec<(&str, &str)> = targets
        .as_array()
        .unwrap()
        .iter()
        .map(|t| (t["id"].as_str().unwrap(), t["mode"].as_str().unwrap()))
        .collect();
    assert_eq!(
        modes,
        vec![("titan-integration", "direct"), ("titan-production", "tunneled")]
    );
}

// ── Target-bound errors ─────────────────────────────────────────────

#[test]
fn test_unknown_target_exits_not_found() {
    let (_dir, path) = initialized();
    with_config(&path)
        .args(["devices", "no-such-target"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("titan-production"));
}

#[test]
fn test_missing_credentials_exit_auth() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        concat!(
            "[targets.ncsync-cli-test-nocreds]\n",
            "host = \"192.0.2.10\"\n",
            "password_env = \"NCSYNC_TEST_UNSET_PASSWORD\"\n",
        ),
    )
    .unwrap();

    with_config(&path)
        .env_remove("NCSYNC_TEST_UNSET_PASSWORD")
        .args(["check", "ncsync-cli-test-nocreds", "--no-progress"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No credentials"));
}
