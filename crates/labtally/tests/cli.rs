//! End-to-end CLI integration tests
//!
//! These tests invoke the compiled binary as a subprocess to verify
//! argument handling and startup failures from a user's perspective.

use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Returns a Command configured to run our binary, isolated from the
/// user's own config and log locations.
#[allow(deprecated)]
fn cmd(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap();
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("LABTALLY_LOG_DIR", home.join("logs"))
        .env_remove("LABTALLY_LOG_PATH")
        .env_remove("RUST_LOG");
    cmd
}

/// A GitLab where the credential sees no projects at all.
fn empty_gitlab() -> MockServer {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/v4/groups");
        then.status(200).header("X-Next-Page", "").json_body(json!([]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/v4/projects");
        then.status(200).header("X-Next-Page", "").json_body(json!([]));
    });
    server
}

fn write_config(dir: &Path, server: &MockServer) {
    fs::write(
        dir.join(".labtally.toml"),
        format!(
            r#"
[api]
API_KEY = "test-key"
base_url = "{}"

[oauth]
oauth_token = "test-token"
"#,
            server.base_url()
        ),
    )
    .unwrap();
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_shows_usage() {
    let tmp = TempDir::new().unwrap();
    cmd(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("count"))
        .stdout(predicate::str::contains("recent"));
}

#[test]
fn long_help_lists_environment_variables() {
    let tmp = TempDir::new().unwrap();
    cmd(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("LABTALLY_LOG_PATH"))
        .stdout(predicate::str::contains("API_KEY"));
}

#[test]
fn version_flag_shows_version() {
    let tmp = TempDir::new().unwrap();
    cmd(tmp.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn subcommand_help_shows_global_flags() {
    let tmp = TempDir::new().unwrap();
    cmd(tmp.path())
        .args(["recent", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--json"))
        .stdout(predicate::str::contains("--config"));
}

// =============================================================================
// Global Flags
// =============================================================================

#[test]
fn global_flags_accepted() {
    let server = empty_gitlab();
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path(), &server);
    let dir = tmp.path().to_str().unwrap();

    for flags in [
        vec!["-q"],
        vec!["-v"],
        vec!["-vv"],
        vec!["--color", "always"],
        vec!["--color", "never"],
    ] {
        cmd(tmp.path())
            .args(["-C", dir])
            .args(&flags)
            .arg("recent")
            .assert()
            .success();
    }
}

#[test]
fn explicit_config_file_is_used() {
    let server = empty_gitlab();
    let tmp = TempDir::new().unwrap();
    let conf_dir = tmp.path().join("conf");
    fs::create_dir_all(&conf_dir).unwrap();
    write_config(&conf_dir, &server);
    let work = tmp.path().join("work");
    fs::create_dir_all(&work).unwrap();

    cmd(tmp.path())
        .args(["-C", work.to_str().unwrap(), "--config"])
        .arg(conf_dir.join(".labtally.toml"))
        .arg("recent")
        .assert()
        .success();

    assert!(work.join("recent_contributors.json").exists());
}

#[test]
fn config_discovered_in_parent_directory() {
    let server = empty_gitlab();
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path(), &server);
    let nested = tmp.path().join("nested").join("deep");
    fs::create_dir_all(&nested).unwrap();

    cmd(tmp.path())
        .args(["-C", nested.to_str().unwrap(), "recent"])
        .assert()
        .success();
}

#[test]
fn log_file_is_appended_across_runs() {
    let server = empty_gitlab();
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path(), &server);
    let dir = tmp.path().to_str().unwrap();

    cmd(tmp.path()).args(["-C", dir, "recent"]).assert().success();
    let log = tmp.path().join("logs").join("labtally.jsonl");
    let first = fs::read_to_string(&log).unwrap();
    assert!(!first.is_empty());

    cmd(tmp.path()).args(["-C", dir, "recent"]).assert().success();
    let second = fs::read_to_string(&log).unwrap();
    assert!(second.starts_with(&first));
    assert!(second.len() > first.len());

    for line in second.lines() {
        let event: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(event["timestamp"].is_string());
    }
}

// =============================================================================
// Error Cases
// =============================================================================

#[test]
fn no_subcommand_shows_help() {
    let tmp = TempDir::new().unwrap();
    cmd(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn invalid_subcommand_shows_error() {
    let tmp = TempDir::new().unwrap();
    cmd(tmp.path())
        .arg("not-a-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn missing_config_file_fails() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join(".git")).unwrap();

    cmd(tmp.path())
        .args(["-C", tmp.path().to_str().unwrap(), "count"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no configuration file found"));
}

#[test]
fn nonexistent_explicit_config_fails() {
    let tmp = TempDir::new().unwrap();
    cmd(tmp.path())
        .args(["--config", "/nonexistent/labtally.toml", "recent"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));

    let log = fs::read_to_string(tmp.path().join("logs").join("labtally.jsonl")).unwrap();
    assert!(log.contains("fatal error"));
    assert!(log.contains("config file not found: /nonexistent/labtally.toml"));
}

#[test]
fn missing_credential_fails_without_network() {
    let server = MockServer::start();
    let groups = server.mock(|when, then| {
        when.method(GET).path("/api/v4/groups");
        then.status(200).json_body(json!([]));
    });
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".labtally.toml"),
        format!(
            "[api]\nAPI_KEY = \"key\"\nbase_url = \"{}\"\n",
            server.base_url()
        ),
    )
    .unwrap();

    cmd(tmp.path())
        .args(["-C", tmp.path().to_str().unwrap(), "count"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("oauth.oauth_token"));

    groups.assert_hits(0);
    assert!(!tmp.path().join("gitlab_projects.csv").exists());
}

#[test]
fn malformed_config_is_logged_and_fails() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join(".labtally.toml"), "[api\nAPI_KEY = ").unwrap();

    cmd(tmp.path())
        .args(["-C", tmp.path().to_str().unwrap(), "recent"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load configuration"));

    let log = fs::read_to_string(tmp.path().join("logs").join("labtally.jsonl")).unwrap();
    assert!(log.contains("fatal error"));
}

#[test]
fn chdir_nonexistent_fails() {
    let tmp = TempDir::new().unwrap();
    cmd(tmp.path())
        .args(["-C", "/nonexistent/path/that/does/not/exist", "recent"])
        .assert()
        .failure();
}
