//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run and verify outputs.

use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(args: &[&str], envs: &[(&str, &str)]) -> (String, String, i32) {
    let mut cmd = Command::new("cargo");
    cmd.args(["run", "-p", "orgsync-cli", "--"]).args(args);
    for (key, value) in envs {
        cmd.env(key, value);
    }

    let output = cmd.output().expect("Failed to execute CLI command");
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn test_help() {
    let (stdout, _, code) = run_cli(&["--help"], &[]);
    assert_eq!(code, 0);
    assert!(stdout.contains("sync"));
    assert!(stdout.contains("auth"));
}

#[test]
fn test_completions_generate() {
    let (stdout, _, code) = run_cli(&["completions", "bash"], &[]);
    assert_eq!(code, 0);
    assert!(stdout.contains("orgsync"));
}

#[test]
fn test_sync_with_missing_config_fails_with_code_1() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    let (_, stderr, code) = run_cli(
        &[
            "sync",
            "--backend",
            "microsoft",
            "--list",
            "Orgplan",
            "--orgplan-dir",
            missing.to_str().unwrap(),
            "--no-prompt",
        ],
        &[("MS_CLIENT_ID", ""), ("MS_TENANT_ID", "")],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("error"));
}

#[test]
fn test_sync_rejects_unknown_backend() {
    let (_, stderr, code) = run_cli(
        &["sync", "--backend", "todoist", "--list", "Orgplan"],
        &[],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("Unknown backend"));
}

#[test]
fn test_sync_rejects_bad_month_format() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(
        &[
            "sync",
            "--backend",
            "microsoft",
            "--list",
            "Orgplan",
            "--month",
            "november",
            "--orgplan-dir",
            dir.path().to_str().unwrap(),
        ],
        &[("MS_CLIENT_ID", "cid"), ("MS_TENANT_ID", "tid")],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("Invalid month format"));
}

#[test]
fn test_auth_status_reports_unauthenticated() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        format!(
            "backend = \"google\"\ntoken_dir = \"{}\"\n\n[google]\nclient_id = \"cid\"\nclient_secret = \"sec\"\n",
            dir.path().join("tokens").display()
        ),
    )
    .unwrap();

    let (stdout, _, code) = run_cli(
        &[
            "auth",
            "status",
            "--backend",
            "google",
            "--config",
            config.to_str().unwrap(),
        ],
        &[],
    );
    assert_eq!(code, 0);
    assert!(stdout.contains("google: not authenticated"));
}
