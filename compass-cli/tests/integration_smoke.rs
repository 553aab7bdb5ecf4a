//! Smoke tests to verify command module wiring

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

fn compass() -> Command {
    let mut cmd = Command::cargo_bin("compass").unwrap();
    cmd.env_remove("DATABASE_URL")
        .env_remove("COMPASS_BIND")
        .env_remove("RUST_LOG")
        .env("HOME", "/nonexistent-home");
    cmd
}

// === Serve Command Tests ===

#[test]
fn test_serve_help() {
    compass()
        .arg("serve")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Address to bind to"))
        .stdout(predicate::str::contains("--skip-migrations"));
}

// === Migrate Command Tests ===

#[test]
fn test_migrate_status_help() {
    compass()
        .arg("migrate")
        .arg("status")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Print JSON"));
}

// === User / Token Command Tests ===

#[test]
fn test_user_add_help() {
    compass()
        .arg("user")
        .arg("add")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--email"))
        .stdout(predicate::str::contains("operator or admin"));
}

#[test]
fn test_token_issue_help() {
    compass()
        .arg("token")
        .arg("issue")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Lifetime in hours"));
}

// === Import Command Tests ===

#[test]
fn test_import_help() {
    compass()
        .arg("import")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Target batch"));
}

#[test]
fn test_import_requires_batch() {
    compass()
        .arg("import")
        .arg("gifts.csv")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--batch"));
}

#[test]
fn test_import_dry_run_reports_rows() {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "amount,received_date,method,check_number,last_name").unwrap();
    writeln!(csv, "25.00,2024-03-01,check,1001,Smith").unwrap();
    writeln!(csv, "10,03/02/2024,cash,,Jones").unwrap();
    writeln!(csv, "abc,2024-03-03,cash,,Brown").unwrap();

    compass()
        .arg("import")
        .arg("--batch")
        .arg("00000000-0000-0000-0000-000000000001")
        .arg("--dry-run")
        .arg(csv.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("2 valid row(s), total 35.00"))
        .stdout(predicate::str::contains("line 4"));
}

// === Config Command Tests ===

#[test]
fn test_config_show_masks_password() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[database]").unwrap();
    writeln!(file, "url = \"postgres://compass:hunter2@db/compass\"").unwrap();

    compass()
        .arg("--config")
        .arg(file.path())
        .arg("config")
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("compass:****@db"))
        .stdout(predicate::str::contains("hunter2").not());
}

#[test]
fn test_config_path_falls_back_to_defaults() {
    compass()
        .arg("config")
        .arg("path")
        .assert()
        .success()
        .stdout(predicate::str::contains(".compass/config.toml"))
        .stdout(predicate::str::contains("not found, using defaults"));
}

#[test]
fn test_explicit_config_must_exist() {
    compass()
        .arg("--config")
        .arg("/nonexistent/compass.toml")
        .arg("config")
        .arg("show")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

// === Completions ===

#[test]
fn test_completions_bash() {
    compass()
        .arg("completions")
        .arg("bash")
        .assert()
        .success()
        .stdout(predicate::str::contains("compass"));
}
