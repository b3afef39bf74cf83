//! CLI integration tests for safepost-bot

use assert_cmd::Command;
use libsafepost::StateStore;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "\\\\")
}

/// Write a config file pointing the state into `dir`
fn write_config(dir: &Path, extra: &str) -> (PathBuf, PathBuf) {
    let state_path = dir.join("state.json");
    let config_path = dir.join("config.toml");
    let content = format!(
        r#"
[mastodon]
instance = "mastodon.example"

[state]
path = "{}"

{}
"#,
        escape_path_for_toml(&state_path),
        extra
    );
    fs::write(&config_path, content).unwrap();
    (config_path, state_path)
}

fn bot() -> Command {
    let mut cmd = Command::cargo_bin("safepost-bot").unwrap();
    cmd.env_remove("MASTODON_BASE_URL")
        .env_remove("MASTODON_ACCESS_TOKEN")
        .env_remove("SAFEPOST_CONFIG")
        .env_remove("SAFEPOST_LOG_FORMAT")
        .env_remove("SAFEPOST_LOG_LEVEL");
    cmd
}

#[test]
fn test_help_flag_output() {
    bot()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("one safe action per cycle"))
        .stdout(predicate::str::contains("--oneshot"))
        .stdout(predicate::str::contains("--loop"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("EXIT CODES"));
}

#[test]
fn test_version_flag_output() {
    bot()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("safepost-bot"));
}

#[test]
fn test_oneshot_and_loop_conflict() {
    bot().args(["--oneshot", "--loop"]).assert().failure();
}

#[test]
fn test_missing_token_is_config_error() {
    let dir = TempDir::new().unwrap();
    let (config_path, _) = write_config(dir.path(), "");

    bot()
        .arg("--config")
        .arg(&config_path)
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Missing required field"))
        .stderr(predicate::str::contains("MASTODON_ACCESS_TOKEN"));
}

#[test]
fn test_missing_config_file_is_config_error() {
    let dir = TempDir::new().unwrap();

    bot()
        .arg("--config")
        .arg(dir.path().join("nope.toml"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn test_invalid_timezone_is_config_error() {
    let dir = TempDir::new().unwrap();
    let (config_path, _) = write_config(dir.path(), "[schedule]\ntimezone = \"Mars/Olympus\"\n");

    bot()
        .arg("--config")
        .arg(&config_path)
        .env("MASTODON_ACCESS_TOKEN", "token")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("schedule.timezone"));
}

#[test]
fn test_config_from_environment_variable() {
    let dir = TempDir::new().unwrap();
    let (config_path, _) = write_config(dir.path(), "[limits]\ntimeline_fetch_limit = 0\n");

    bot()
        .env("SAFEPOST_CONFIG", &config_path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("fetch limits"));
}

#[test]
fn test_second_instance_is_refused() {
    let dir = TempDir::new().unwrap();
    let (config_path, state_path) = write_config(dir.path(), "");
    let _lock = StateStore::new(&state_path).lock().unwrap();

    bot()
        .arg("--config")
        .arg(&config_path)
        .env("MASTODON_ACCESS_TOKEN", "token")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("locked"));
}
