//! CLI smoke tests: argument parsing and pre-flight exit codes.
//!
//! Nothing here needs a live database; configuration errors are raised
//! before any connection attempt.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn dbferry() -> Command {
    Command::cargo_bin("dbferry").unwrap()
}

#[test]
fn help_lists_subcommands() {
    dbferry()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("transfer"));
}

#[test]
fn version_prints() {
    dbferry()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dbferry"));
}

#[test]
fn export_requires_format() {
    dbferry()
        .arg("export")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--format"));
}

#[test]
fn export_rejects_unknown_format() {
    dbferry()
        .args(["export", "--format", "xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn missing_host_is_config_error() {
    // Empty env dir and an explicit empty host: validation fails with exit 2
    // before any connection attempt.
    let dir = TempDir::new().unwrap();
    dbferry()
        .args(["--env-dir"])
        .arg(dir.path())
        .args(["--host", "", "check"])
        .env_remove("DB_HOST")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn remote_without_password_is_config_error() {
    let dir = TempDir::new().unwrap();
    dbferry()
        .args(["--remote", "--env-dir"])
        .arg(dir.path())
        .args(["--host", "db.example.com", "--user", "app", "check"])
        .env_remove("REMOTE_DB_PASSWORD")
        .env_remove("DB_PASSWORD")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("password"));
}

#[test]
fn unreachable_database_is_connection_error() {
    // Port 1 refuses immediately; the failure is classified as a connection
    // error, not a generic one.
    let dir = TempDir::new().unwrap();
    dbferry()
        .args(["--env-dir"])
        .arg(dir.path())
        .args(["--host", "127.0.0.1", "--port", "1", "check"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Connection error"));
}

#[test]
fn unknown_subcommand_fails() {
    dbferry()
        .arg("obliterate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}
