//! CLI Integration Tests
//!
//! Runs the built `s2s` binary for the commands that need no server.

use s2s_common::auth::{sign, SharedSecret};
use std::process::Command;

fn s2s() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_s2s"));
    cmd.env_remove("S2S_SECRET").env_remove("S2S_ADMIN_KEY");
    cmd
}

#[test]
fn test_sign_prints_token() {
    let output = s2s()
        .args(["sign", "exec", "10.0.0.1:81", "--secret", "s3cret"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(
        stdout.trim(),
        sign(&SharedSecret::new("s3cret"), "exec", "10.0.0.1:81")
    );
}

#[test]
fn test_sign_reads_secret_from_env() {
    let output = s2s()
        .args(["sign", "exec", "10.0.0.1:81"])
        .env("S2S_SECRET", "from-env")
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(
        stdout.trim(),
        sign(&SharedSecret::new("from-env"), "exec", "10.0.0.1:81")
    );
}

#[test]
fn test_sign_without_secret_fails() {
    let output = s2s().args(["sign", "exec", "10.0.0.1:81"]).output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("S2S_SECRET"));
}

#[test]
fn test_register_rejects_url_without_scheme() {
    let output = s2s()
        .args(["register", "127.0.0.1:8080", "exec", "10.0.0.1:81", "--secret", "s"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("must start with http://"));
}

#[test]
fn test_set_status_rejects_unknown_action() {
    let output = s2s()
        .args(["set-status", "http://127.0.0.1:1", "exec", "a:1", "explode"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
