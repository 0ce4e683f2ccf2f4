//! CLI integration tests for all subcommands except `serve`.
//!
//! Uses `assert_cmd` to spawn the `tierstore` binary against filesystem
//! tiers in a temporary directory and verifies exit codes, stdout content,
//! and the on-disk layout of both tiers.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch tiers for one test.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("tempdir"),
        }
    }

    fn primary(&self) -> PathBuf {
        self.dir.path().join("primary")
    }

    fn archive(&self) -> PathBuf {
        self.dir.path().join("archive")
    }

    /// A `tierstore` command pointed at this workspace's tiers.
    fn tierstore(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("tierstore");
        cmd.current_dir(self.dir.path())
            .env("TIERSTORE_PRIMARY_DIR", self.primary())
            .env("TIERSTORE_ARCHIVE_DIR", self.archive())
            .env_remove("TIERSTORE_RETENTION_DAYS")
            .env_remove("TIERSTORE_CONCURRENCY")
            .env("RUST_LOG", "warn");
        cmd
    }

    fn put(&self, id: &str, timestamp: &str, payload: &str) {
        self.tierstore()
            .args(["put", id, "--payload", payload, "--timestamp", timestamp])
            .assert()
            .success();
    }
}

fn archived_blob(archive: &Path, id: &str) -> PathBuf {
    archive.join("archived-records").join(format!("{id}.json"))
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    cargo_bin_cmd!("tierstore")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Two-tier record store with age-based archival",
        ));
}

#[test]
fn version_exits_0() {
    cargo_bin_cmd!("tierstore")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tierstore"));
}

#[test]
fn migrate_help_mentions_cutoff() {
    cargo_bin_cmd!("tierstore")
        .args(["migrate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--cutoff"));
}

// ──────────────────────────────────────────────
// 2. Put and get
// ──────────────────────────────────────────────

#[test]
fn put_then_get_reads_from_primary() {
    let ws = Workspace::new();
    ws.tierstore()
        .args(["put", "R100", "--payload", r#"{"amount": 42}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stored R100 in partition R1"));

    assert!(ws.primary().join("R1").join("R100.json").is_file());

    let out = ws
        .tierstore()
        .args(["--output", "json", "get", "R100"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json["tier"], "primary");
    assert_eq!(json["record"]["payload"]["amount"], 42);
}

#[test]
fn put_rejects_invalid_payload() {
    let ws = Workspace::new();
    ws.tierstore()
        .args(["put", "R100", "--payload", "{not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--payload"));
}

#[test]
fn put_rejects_bad_timestamp() {
    let ws = Workspace::new();
    ws.tierstore()
        .args(["put", "R100", "--payload", "{}", "--timestamp", "last week"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("RFC 3339"));
}

#[test]
fn get_missing_record_exits_1() {
    let ws = Workspace::new();
    ws.tierstore()
        .args(["get", "NOPE"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn get_error_in_json_mode_is_json() {
    let ws = Workspace::new();
    let out = ws
        .tierstore()
        .args(["--output", "json", "get", "NOPE"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let text = String::from_utf8(out).unwrap();
    let last = text.lines().last().unwrap();
    let json: serde_json::Value = serde_json::from_str(last).unwrap();
    assert!(json["error"].as_str().unwrap().contains("NOPE"));
}

// ──────────────────────────────────────────────
// 3. Migrate
// ──────────────────────────────────────────────

#[test]
fn migrate_moves_aged_record_and_get_still_finds_it() {
    let ws = Workspace::new();
    ws.put("R100", "2020-01-01T00:00:00Z", r#"{"amount": 42}"#);
    ws.put("R200", "2999-01-01T00:00:00Z", r#"{"amount": 7}"#);

    ws.tierstore()
        .arg("migrate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Archived 1 records"));

    assert!(archived_blob(&ws.archive(), "R100").is_file());
    assert!(!ws.primary().join("R1").join("R100.json").exists());
    assert!(ws.primary().join("R2").join("R200.json").is_file());

    let out = ws
        .tierstore()
        .args(["--output", "json", "get", "R100"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json["tier"], "archive");
    assert_eq!(json["record"]["payload"]["amount"], 42);
    assert_eq!(json["record"]["timestamp"], "2020-01-01T00:00:00Z");
}

#[test]
fn migrate_with_explicit_cutoff_emits_json_report() {
    let ws = Workspace::new();
    ws.put("A1", "2024-01-01T00:00:00Z", "{}");
    ws.put("B1", "2024-03-01T00:00:00Z", "{}");

    let out = ws
        .tierstore()
        .args([
            "--output",
            "json",
            "migrate",
            "--cutoff",
            "2024-02-01T00:00:00Z",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let outcomes = report["outcomes"].as_array().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0]["id"], "A1");
    assert_eq!(outcomes[0]["kind"], "migrated");
    assert_eq!(report["cancelled"], false);
}

#[test]
fn second_migration_is_a_no_op() {
    let ws = Workspace::new();
    ws.put("R100", "2020-01-01T00:00:00Z", "{}");

    ws.tierstore().arg("migrate").assert().success();
    let blob = archived_blob(&ws.archive(), "R100");
    let first = fs::read(&blob).unwrap();

    ws.tierstore()
        .arg("migrate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Archived 0 records"));
    assert_eq!(fs::read(&blob).unwrap(), first);
}

#[test]
fn retention_comes_from_config_file() {
    let ws = Workspace::new();
    let config = ws.dir.path().join("tierstore.toml");
    fs::write(
        &config,
        "retention_days = 1\n\n[archive]\ncontainer = \"cold\"\n",
    )
    .unwrap();

    let three_days_ago = time::OffsetDateTime::now_utc() - time::Duration::days(3);
    let ts = three_days_ago
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap();
    ws.put("R100", &ts, "{}");

    ws.tierstore()
        .args(["--config", config.to_str().unwrap(), "migrate"])
        .assert()
        .success();

    assert!(ws.archive().join("cold").join("R100.json").is_file());
}

#[test]
fn invalid_env_override_exits_1() {
    let ws = Workspace::new();
    ws.tierstore()
        .env("TIERSTORE_CONCURRENCY", "lots")
        .arg("migrate")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("TIERSTORE_CONCURRENCY"));
}

#[test]
fn quiet_suppresses_clean_report() {
    let ws = Workspace::new();
    ws.put("R100", "2020-01-01T00:00:00Z", "{}");
    ws.tierstore()
        .args(["--quiet", "migrate"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}
