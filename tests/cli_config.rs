//! CLI and Configuration Tests
//!
//! Runs whole commands against a snapshot in a temporary directory:
//! - Configuration errors surface before the snapshot is touched
//! - Partition and link changes persist across invocations
//! - Rejected changes leave the stored state as it was

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::{json, Value};
use tempfile::TempDir;

use dirpart::cli::{run_command, Cli, CliErrorCode, CliResult};
use dirpart::error::DirectoryErrorKind;

struct Workspace {
    _dir: TempDir,
    config: PathBuf,
    snapshot: PathBuf,
}

impl Workspace {
    fn new(extra: Value) -> Self {
        let dir = TempDir::new().unwrap();
        let snapshot = dir.path().join("directory.json");
        let config = dir.path().join("dirpart.json");

        let mut body = json!({ "snapshot_path": snapshot, "log_level": "error" });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            for (key, value) in extra {
                body.insert(key.clone(), value.clone());
            }
        }
        fs::write(&config, body.to_string()).unwrap();

        Self {
            _dir: dir,
            config,
            snapshot,
        }
    }

    fn run(&self, args: &[&str]) -> CliResult<Value> {
        let mut argv = vec!["dirpart"];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).unwrap();
        run_command(&self.config, cli.command)
    }

    fn init_primary_result(&self) -> CliResult<Value> {
        self.run(&["init", "--root", "DC=corp,DC=com", "--server", "dc1.corp.com@Site1"])
    }

    fn init_primary(&self) {
        self.run(&[
            "init",
            "--root",
            "DC=corp,DC=com",
            "--server",
            "dc1.corp.com@Site1",
            "--server",
            "dc2.corp.com@Site1#6.3",
            "--server",
            "dc3.corp.com@Site2#5.0",
        ])
        .unwrap();
    }
}

fn snapshot_text(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_missing_config_file() {
    let ws = Workspace::new(json!({}));
    fs::remove_file(&ws.config).unwrap();
    let err = ws.init_primary_result().unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::ConfigError);
    assert!(!ws.snapshot.exists());
}

#[test]
fn test_invalid_config_values() {
    for extra in [
        json!({ "log_level": "loud" }),
        json!({ "min_primary_server_version": "abc" }),
        json!({ "snapshot_path": "" }),
    ] {
        let ws = Workspace::new(extra);
        let err = ws.init_primary_result().unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }
}

/// A raised version floor applies to replica-set changes from the CLI.
#[test]
fn test_version_floor_from_config() {
    let ws = Workspace::new(json!({ "min_primary_server_version": "10.0" }));
    ws.init_primary();

    let err = ws
        .run(&[
            "partition",
            "create",
            "--target",
            "dc2.corp.com",
            "DC=apps,DC=corp,DC=com",
            "--replica",
            "dc1.corp.com",
        ])
        .unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::Directory(DirectoryErrorKind::InvalidArgument));
}

// =============================================================================
// Snapshot
// =============================================================================

#[test]
fn test_init_refuses_existing_snapshot() {
    let ws = Workspace::new(json!({}));
    ws.init_primary();
    let before = snapshot_text(&ws.snapshot);

    let err = ws.init_primary_result().unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::SnapshotExists);
    assert_eq!(snapshot_text(&ws.snapshot), before);
}

#[test]
fn test_command_without_snapshot() {
    let ws = Workspace::new(json!({}));
    let err = ws
        .run(&["link", "show", "--target", "dc1.corp.com", "LinkA"])
        .unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::SnapshotError);
}

// =============================================================================
// Partitions
// =============================================================================

#[test]
fn test_partition_create_then_find() {
    let ws = Workspace::new(json!({}));
    ws.init_primary();

    let created = ws
        .run(&[
            "partition",
            "create",
            "--target",
            "dc2.corp.com",
            "DC=apps,DC=corp,DC=com",
            "--replica",
            "dc1.corp.com",
        ])
        .unwrap();
    assert_eq!(created["partition"]["lifecycle"], "committed");
    assert_eq!(created["partition"]["kind"], "primary");

    let found = ws
        .run(&[
            "partition",
            "find",
            "--target",
            "corp.com",
            "--target-kind",
            "forest",
            "--dns-name",
            "apps.corp.com",
        ])
        .unwrap();
    assert_eq!(found["partition"]["dn"], "DC=apps,DC=corp,DC=com");
    assert_eq!(found["partition"]["server"], "dc2.corp.com");

    let err = ws
        .run(&[
            "partition",
            "find",
            "--target",
            "dc1.corp.com",
            "--dn",
            "DC=other,DC=corp,DC=com",
        ])
        .unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::Directory(DirectoryErrorKind::NotFound));
}

#[test]
fn test_partition_delete() {
    let ws = Workspace::new(json!({}));
    ws.init_primary();
    ws.run(&["partition", "create", "--target", "dc2.corp.com", "DC=apps,DC=corp,DC=com"])
        .unwrap();

    let deleted = ws
        .run(&["partition", "delete", "--target", "dc2.corp.com", "DC=apps,DC=corp,DC=com"])
        .unwrap();
    assert_eq!(deleted["deleted"], "DC=apps,DC=corp,DC=com");
}

// =============================================================================
// Site links
// =============================================================================

#[test]
fn test_link_create_set_show() {
    let ws = Workspace::new(json!({ "recommended_link_defaults": true }));
    ws.init_primary();

    let created = ws
        .run(&[
            "link",
            "create",
            "--target",
            "dc1.corp.com",
            "Site1-Site2",
            "--site",
            "Site1",
            "--site",
            "Site2",
        ])
        .unwrap();
    assert_eq!(created["cost"], 100);
    assert_eq!(created["replication_interval_minutes"], 180);
    assert_eq!(created["sites"].as_array().map(Vec::len), Some(2));

    ws.run(&[
        "link",
        "set",
        "--target",
        "dc1.corp.com",
        "Site1-Site2",
        "--cost",
        "42",
        "--compression",
        "false",
        "--remove-site",
        "Site2",
        "--window",
        "daily 01:00-04:45",
    ])
    .unwrap();

    let shown = ws
        .run(&["link", "show", "--target", "dc1.corp.com", "Site1-Site2"])
        .unwrap();
    assert_eq!(shown["cost"], 42);
    assert_eq!(shown["options"], 4);
    assert_eq!(shown["has_schedule"], true);
    assert_eq!(shown["sites"][0]["name"], "Site1");
    assert_eq!(shown["transport"], "primary");
}

/// A rejected change leaves the stored link as it was.
#[test]
fn test_link_rejected_change() {
    let ws = Workspace::new(json!({}));
    ws.init_primary();
    ws.run(&["link", "create", "--target", "dc1.corp.com", "Site1-Site2"])
        .unwrap();

    let err = ws
        .run(&[
            "link",
            "set",
            "--target",
            "dc1.corp.com",
            "Site1-Site2",
            "--cost=-5",
        ])
        .unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::Directory(DirectoryErrorKind::InvalidArgument));

    let shown = ws
        .run(&["link", "show", "--target", "dc1.corp.com", "Site1-Site2"])
        .unwrap();
    assert_eq!(shown["cost"], 0);
    assert_eq!(shown["replication_interval_minutes"], 15);
}

#[test]
fn test_link_delete() {
    let ws = Workspace::new(json!({}));
    ws.init_primary();
    ws.run(&["link", "create", "--target", "dc1.corp.com", "LinkA", "--transport", "smtp"])
        .unwrap();

    let deleted = ws
        .run(&["link", "delete", "--target", "dc1.corp.com", "LinkA", "--transport", "smtp"])
        .unwrap();
    assert_eq!(deleted["deleted"], "LinkA");

    let err = ws
        .run(&["link", "show", "--target", "dc1.corp.com", "LinkA", "--transport", "smtp"])
        .unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::Directory(DirectoryErrorKind::NotFound));
}
