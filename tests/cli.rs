use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn taskgate(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("taskgate").unwrap();
    cmd.arg("--config").arg(dir.path().join("taskgate.toml"));
    cmd
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("taskgate").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("taskgate 0.1.0"));
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("taskgate").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "In-process task queue and sliding-window rate limiter",
        ));
}

#[test]
fn test_cli_missing_subcommand() {
    let mut cmd = Command::cargo_bin("taskgate").unwrap();
    cmd.assert().failure().stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_show_config_reads_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("taskgate.toml"),
        r#"
[queue]
name = "from-file"

[rate_limit.policies.upload]
max_requests = 2
window_ms = 500
"#,
    )
    .unwrap();

    taskgate(&dir)
        .arg("show-config")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"name = "from-file""#))
        .stdout(predicate::str::contains("[rate_limit.policies.upload]"));
}

#[test]
fn test_cli_rejects_malformed_config() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("taskgate.toml"), "[queue\nname = 1").unwrap();

    taskgate(&dir)
        .arg("show-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_cli_demo_queue_isolates_failures() {
    let dir = TempDir::new().unwrap();
    let output = taskgate(&dir)
        .args([
            "demo-queue",
            "--jobs",
            "12",
            "--producers",
            "3",
            "--fail-every",
            "4",
            "--panic-every",
            "5",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["enqueued"], 12);
    assert_eq!(stats["succeeded"], 7);
    assert_eq!(stats["failed"], 3);
    assert_eq!(stats["panicked"], 2);
    assert_eq!(stats["pending"], 0);
    assert_eq!(stats["peak_workers"], 1);
    assert_eq!(stats["closed"], true);
}

#[test]
fn test_cli_check_limit_denies_over_limit() {
    let dir = TempDir::new().unwrap();
    taskgate(&dir)
        .args([
            "check-limit",
            "--key",
            "alice",
            "--max",
            "2",
            "--window-ms",
            "60000",
            "--attempts",
            "3",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("attempt 1: allowed (remaining 1)"))
        .stdout(predicate::str::contains("attempt 2: allowed (remaining 0)"))
        .stdout(predicate::str::contains("attempt 3: denied (retry after"));
}

#[test]
fn test_cli_check_limit_rejects_negative_max() {
    let dir = TempDir::new().unwrap();
    taskgate(&dir)
        .args(["check-limit", "--max", "-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_requests must be non-negative"));
}

#[test]
fn test_cli_check_limit_named_policy() {
    let dir = TempDir::new().unwrap();
    taskgate(&dir)
        .args(["check-limit", "--policy", "login", "--attempts", "6"])
        .assert()
        .success()
        .stdout(predicate::str::contains("attempt 5: allowed (remaining 0)"))
        .stdout(predicate::str::contains("attempt 6: denied"));
}

#[test]
fn test_cli_check_limit_unknown_policy() {
    let dir = TempDir::new().unwrap();
    taskgate(&dir)
        .args(["check-limit", "--policy", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown rate limit policy 'nope'"));
}
