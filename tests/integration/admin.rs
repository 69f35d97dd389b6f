use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use soulstore::admin::{rebuild_index, show, stats, verify, AdminError, VerifySeverity};
use soulstore::{NodeAdapter, PutMessage, RecordingPipeline, StoreOptions};
use tempfile::tempdir;

fn populate(root: &Path) {
    let mut opts = StoreOptions::with_root(root);
    opts.debounce = Duration::from_secs(60);
    let pipeline = Arc::new(RecordingPipeline::new());
    let adapter = NodeAdapter::open(opts, pipeline.clone()).unwrap();
    let puts = [
        PutMessage::new("m1", "user/1", "name", 1.0, json!("ada")),
        PutMessage::new("m2", "user/1", "bio", 1.0, json!("x".repeat(200))),
        PutMessage::new("m3", "user/2", "name", 1.0, json!("alan")),
    ];
    for msg in puts {
        adapter.on_put(msg, pipeline.as_ref());
    }
    adapter.shutdown();
}

#[test]
fn stats_summarize_index_and_files() {
    let dir = tempdir().unwrap();
    populate(dir.path());
    let report = stats(dir.path()).unwrap();
    assert_eq!(report.nodes, 2);
    assert_eq!(report.files_on_disk, 2);
    assert_eq!(report.indexed_bytes, report.bytes_on_disk);
    assert!(report.index_bytes > 0);
    assert_eq!(report.largest.unwrap().soul, "user/1");
}

#[test]
fn missing_root_is_reported() {
    let dir = tempdir().unwrap();
    let err = stats(dir.path().join("nowhere")).unwrap_err();
    assert!(matches!(err, AdminError::MissingStore(_)));
}

#[test]
fn verify_clean_store_succeeds() {
    let dir = tempdir().unwrap();
    populate(dir.path());
    let report = verify(dir.path()).unwrap();
    assert!(report.success, "{:?}", report.findings);
    assert!(report.findings.is_empty());
    assert_eq!(report.counts.files_checked, 2);
}

#[test]
fn verify_flags_damage() {
    let dir = tempdir().unwrap();
    populate(dir.path());
    let storage = dir.path().join("storage");
    fs::remove_file(storage.join("user_2.json")).unwrap();
    fs::write(storage.join("stray.json"), b"{}").unwrap();

    let report = verify(dir.path()).unwrap();
    assert!(!report.success);
    assert_eq!(report.counts.orphans, 1);
    assert!(report
        .findings
        .iter()
        .any(|f| f.severity == VerifySeverity::Error && f.message.contains("user/2")));
    assert!(report
        .findings
        .iter()
        .any(|f| f.severity == VerifySeverity::Warning && f.message.contains("stray.json")));
}

#[test]
fn verify_reports_missing_index() {
    let dir = tempdir().unwrap();
    populate(dir.path());
    fs::remove_file(dir.path().join("storage/index.json")).unwrap();
    let report = verify(dir.path()).unwrap();
    assert!(!report.success);
    assert_eq!(report.counts.orphans, 2);
}

#[test]
fn rebuild_index_restores_a_verifiable_store() {
    let dir = tempdir().unwrap();
    populate(dir.path());
    fs::write(dir.path().join("storage/index.json"), b"[]").unwrap();
    assert!(!verify(dir.path()).unwrap().success);

    let report = rebuild_index(dir.path()).unwrap();
    assert_eq!(report.entries, 2);
    assert_eq!(report.previous_entries, None);
    assert!(verify(dir.path()).unwrap().success);
}

#[test]
fn show_reads_one_node_or_field() {
    let dir = tempdir().unwrap();
    populate(dir.path());
    let node = show(dir.path(), "user/1", None).unwrap().unwrap();
    assert_eq!(node.get("name"), Some(&json!("ada")));
    assert!(node.get("bio").is_some());

    let field = show(dir.path(), "user/1", Some("name")).unwrap().unwrap();
    assert_eq!(field.get("name"), Some(&json!("ada")));
    assert_eq!(field.get("bio"), None);

    assert!(show(dir.path(), "user/9", None).unwrap().is_none());
}
