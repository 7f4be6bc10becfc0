//! End-to-end tests for the kernel demonstration CLI.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin for tests

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn demo_succeeds_with_default_job_count() {
    Command::cargo_bin("kernel-demo")
        .expect("Failed to find kernel-demo binary")
        .arg("demo")
        .assert()
        .success()
        .stdout(predicate::str::contains("all 4 jobs succeeded"));
}

#[test]
fn demo_reports_aggregate_failure_when_injected() {
    Command::cargo_bin("kernel-demo")
        .expect("Failed to find kernel-demo binary")
        .args(["demo", "--jobs", "3", "--inject-failure"])
        .assert()
        .success()
        .stdout(predicate::str::contains("aggregate failed"));
}

#[test]
fn demo_rejects_zero_jobs() {
    Command::cargo_bin("kernel-demo")
        .expect("Failed to find kernel-demo binary")
        .args(["demo", "--jobs", "0"])
        .assert()
        .failure();
}

#[test]
fn help_mentions_deferred_value() {
    Command::cargo_bin("kernel-demo")
        .expect("Failed to find kernel-demo binary")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Deferred Value"));
}

#[test]
fn loads_config_file_without_erroring() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = dir.path().join("kernel.toml");
    std::fs::write(&config_path, "log_level = \"warn\"\n").expect("Failed to write config");

    Command::cargo_bin("kernel-demo")
        .expect("Failed to find kernel-demo binary")
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "demo",
            "--jobs",
            "2",
        ])
        .assert()
        .success();
}
