#![allow(deprecated)] // Command::cargo_bin

use assert_cmd::Command;
use offsync::{QueueMethod, QueueStore, QueuedRequest};
use predicates::str::contains;
use serde_json::json;
use std::collections::BTreeMap;
use tempfile::TempDir;

fn offsync_cmd(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("offsync").unwrap();
    cmd.env_remove("OFFSYNC_API_BASE_URL")
        .env_remove("OFFSYNC_REFRESH_PATH")
        .env_remove("OFFSYNC_LOGIN_PATH")
        .env_remove("OFFSYNC_HEALTH_PATH")
        .env_remove("OFFSYNC_PROBE_INTERVAL_SECS")
        .env_remove("OFFSYNC_REQUEST_TIMEOUT_SECS")
        .env("OFFSYNC_DATA_DIR", data_dir.path());
    cmd
}

fn queue(dir: &TempDir, url: &str, created_at: i64) -> QueuedRequest {
    let mut record = QueuedRequest::new(
        url,
        QueueMethod::Post,
        Some(json!({"razaoSocial": "Acme"})),
        BTreeMap::new(),
    );
    record.created_at = created_at;
    QueueStore::open(dir.path()).unwrap().add(&record).unwrap();
    record
}

#[test]
fn status_on_empty_queue() {
    let tmp = TempDir::new().unwrap();
    offsync_cmd(&tmp)
        .arg("status")
        .assert()
        .success()
        .stdout(contains("pending: 0"));
}

#[test]
fn status_counts_queued_records() {
    let tmp = TempDir::new().unwrap();
    queue(&tmp, "http://localhost:3000/clientes", 1);
    queue(&tmp, "http://localhost:3000/clientes", 2);
    offsync_cmd(&tmp)
        .arg("status")
        .assert()
        .success()
        .stdout(contains("pending: 2"));
}

#[test]
fn list_prints_oldest_first() {
    let tmp = TempDir::new().unwrap();
    let newer = queue(&tmp, "http://localhost:3000/b", 20);
    let older = queue(&tmp, "http://localhost:3000/a", 10);

    let output = offsync_cmd(&tmp).arg("list").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let ids: Vec<String> = stdout
        .lines()
        .map(|l| {
            let record: serde_json::Value = serde_json::from_str(l).unwrap();
            record["id"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(ids, vec![older.id, newer.id]);
}

#[test]
fn sync_against_unreachable_api_keeps_records() {
    let tmp = TempDir::new().unwrap();
    queue(&tmp, "http://127.0.0.1:9/clientes", 1);
    offsync_cmd(&tmp)
        .args(["--api-base-url", "http://127.0.0.1:9", "sync"])
        .assert()
        .success()
        .stdout(contains("failed: 1, remaining: 1"));
}

#[test]
fn rejects_non_http_base_url() {
    let tmp = TempDir::new().unwrap();
    offsync_cmd(&tmp)
        .args(["--api-base-url", "ftp://example.com", "status"])
        .assert()
        .failure();
}
