use std::fs::write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::{tempdir, NamedTempFile};

/// A config whose only provider points at an unreachable API, so no test
/// touches the network successfully.
fn create_offline_config() -> NamedTempFile {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(
        config.path(),
        b"providers:\n  - name: oss\n    type: github\n    token: not-a-token\n    api_url: http://127.0.0.1:9\n",
    )
    .expect("Writing temp config failed");
    config
}

fn gitfleet() -> Command {
    let mut cmd = Command::cargo_bin("gitfleet").expect("Binary exists");
    cmd.env_remove("GITFLEET_CONFIG").env("RUST_LOG", "error");
    cmd
}

#[test]
fn help_lists_every_command() {
    gitfleet()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("discover")
                .and(predicate::str::contains("clone"))
                .and(predicate::str::contains("status"))
                .and(predicate::str::contains("providers")),
        );
}

#[test]
fn invalid_query_fails_before_any_io() {
    gitfleet()
        .args(["--config", "/nonexistent/config.yaml", "discover", "a/b/c/d"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("validation error"));
}

#[test]
fn missing_config_is_fatal() {
    gitfleet()
        .args(["--config", "/nonexistent/config.yaml", "discover", "pdidev"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration error"));
}

#[test]
fn unknown_provider_name_is_fatal() {
    let config = create_offline_config();
    gitfleet()
        .arg("--config")
        .arg(config.path())
        .args(["discover", "*", "--provider", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing"));
}

#[test]
fn unreachable_provider_fails_authentication() {
    let config = create_offline_config();
    gitfleet()
        .arg("--config")
        .arg(config.path())
        .args(["discover", "*"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("authentication failed"));
}

#[test]
fn providers_lists_configured_names() {
    let config = create_offline_config();
    gitfleet()
        .arg("--config")
        .arg(config.path())
        .arg("providers")
        .assert()
        .success()
        .stdout(predicate::str::contains("oss\tgithub (default)"));
}

#[test]
fn status_of_empty_directory_succeeds() {
    let dest = tempdir().unwrap();
    gitfleet()
        .args(["--config", "/nonexistent/config.yaml", "status", "--format", "json", "--dest"])
        .arg(dest.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn rejects_unknown_update_mode() {
    let dest = tempdir().unwrap();
    gitfleet()
        .args(["clone", "acme", "--mode", "merge", "--dest"])
        .arg(dest.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("merge"));
}
