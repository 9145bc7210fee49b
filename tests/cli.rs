//! CLI-level smoke tests for the `revwatch` binary: argument validation and
//! the early configuration-error exit path, run as a real subprocess rather
//! than through `Supervisor` directly. Log output isn't asserted on here —
//! `tracing_subscriber`'s `EnvFilter::from_default_env()` only emits events
//! when `RUST_LOG` is set, which a bare subprocess invocation doesn't
//! control — so these only assert the documented exit-code contract (spec.md
//! §6, "Exit code").
use assert_cmd::prelude::*;
use predicates::str::contains;
use std::process::Command;

#[test]
fn missing_required_arguments_exits_non_zero() {
    Command::new(assert_cmd::cargo::cargo_bin!("revwatch"))
        .assert()
        .failure();
}

#[test]
fn dash_url_without_trailing_slash_is_a_configuration_error() {
    // `dash_url()`'s validation runs before any network or git subprocess
    // call, so this fails fast with the "Configuration error" exit path
    // rather than hanging on a real clone.
    Command::new(assert_cmd::cargo::cargo_bin!("revwatch"))
        .args([
            "--repo-url",
            "https://example.com/repo.git",
            "--dash-url",
            "https://dash.example.com",
            "--key-file",
            "/nonexistent/key/file",
        ])
        .assert()
        .failure();
}

#[test]
fn help_flag_succeeds_and_lists_known_options() {
    Command::new(assert_cmd::cargo::cargo_bin!("revwatch"))
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("--repo-url"))
        .stdout(contains("--mirror"));
}
