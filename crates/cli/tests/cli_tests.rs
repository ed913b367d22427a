#![allow(deprecated)] // cargo_bin is deprecated but still functional

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("burrow.toml");
        let root = dir.path().display();
        fs::write(
            &config,
            format!(
                r#"
[storage]
type = "filesystem"
path = "{root}/storage"
max_file_size = "1MB"

[metadata]
type = "sqlite"
path = "{root}/metadata.db"

[quota]
default_total = "64KB"

[uploads]
min_chunk_size = "1B"
reaper_enabled = false
"#
            ),
        )
        .unwrap();
        Self { dir, config }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("burrowctl").unwrap();
        cmd.env("BURROW_CONFIG", &self.config);
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.cmd().args(args).assert().success().get_output().clone();
        serde_json::from_slice(&output.stdout).unwrap()
    }

    fn local_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn account_put_list_get_roundtrip() {
    let ws = Workspace::new();
    let quota = ws.json(&["account", "create", "1"]);
    assert_eq!(quota["total_bytes"], 64 * 1024);

    let local = ws.local_file("notes.txt", b"remember the milk");
    let put = ws.json(&["put", "1", arg(&local)]);
    assert_eq!(put["duplicate"], false);
    assert_eq!(put["file"]["path"], "/notes.txt");
    assert_eq!(put["file"]["mime_type"], "text/plain");
    let file_id = put["file"]["id"].as_str().unwrap().to_string();

    let listing = ws.json(&["ls", "1"]);
    assert_eq!(listing.as_array().unwrap().len(), 1);
    assert_eq!(listing[0]["name"], "notes.txt");

    ws.cmd()
        .args(["get", "1", &file_id])
        .assert()
        .success()
        .stdout("remember the milk");

    let shown = ws.json(&["account", "show", "1"]);
    assert_eq!(shown["used_bytes"], 17);
}

#[test]
fn chunked_put_matches_source() {
    let ws = Workspace::new();
    ws.json(&["account", "create", "1", "--quota", "1MB"]);

    let contents: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let local = ws.local_file("data.bin", &contents);
    let put = ws.json(&["put", "1", arg(&local), "--chunk-size", "1KB", "--dir", "/"]);
    assert_eq!(put["file"]["size_bytes"], 10_000);
    let file_id = put["file"]["id"].as_str().unwrap().to_string();

    let out = ws.dir.path().join("copy.bin");
    ws.cmd()
        .args(["get", "1", &file_id, "--output", arg(&out)])
        .assert()
        .success();
    assert_eq!(fs::read(&out).unwrap(), contents);
}

#[test]
fn trash_restore_and_purge() {
    let ws = Workspace::new();
    ws.json(&["account", "create", "1"]);
    ws.json(&["mkdir", "1", "/", "docs"]);
    let local = ws.local_file("a.txt", b"abc");
    let put = ws.json(&["put", "1", arg(&local), "--dir", "/docs", "--name", "b.txt"]);
    let file_id = put["file"]["id"].as_str().unwrap().to_string();

    let renamed = ws.json(&["mv", "1", &file_id, "c.txt"]);
    assert_eq!(renamed["path"], "/docs/c.txt");

    ws.json(&["rm", "1", &file_id]);
    assert_eq!(ws.json(&["trash", "1"]).as_array().unwrap().len(), 1);
    assert_eq!(ws.json(&["ls", "1", "/docs"]).as_array().unwrap().len(), 0);

    let restored = ws.json(&["restore", "1", &file_id]);
    assert_eq!(restored["status"], "active");

    ws.json(&["purge", "1", &file_id]);
    assert_eq!(ws.json(&["account", "show", "1"])["used_bytes"], 0);
}

#[test]
fn vault_errors_are_reported_as_codes() {
    let ws = Workspace::new();
    ws.json(&["account", "create", "1", "--quota", "2B"]);
    let local = ws.local_file("big.txt", b"too big");

    ws.cmd()
        .args(["put", "1", arg(&local)])
        .assert()
        .code(2)
        .stderr(contains("\"code\":\"quota_exceeded\""));

    ws.cmd()
        .args(["account", "show", "7"])
        .assert()
        .code(2)
        .stderr(contains("account_not_found"));
}
