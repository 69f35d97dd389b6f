use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use soulstore::storage::{IndexEntry, IndexMap, IndexStore};
use soulstore::{
    Event, Node, NodeAdapter, PutMessage, QuotaMode, RecordingPipeline, StoreOptions,
};
use tempfile::tempdir;

const CEILING: u64 = 10_000;

fn options(root: &Path) -> StoreOptions {
    let mut opts = StoreOptions::with_root(root);
    opts.max_bytes = CEILING;
    opts.debounce = Duration::from_secs(60);
    opts.ack_stagger = Duration::ZERO;
    opts
}

/// Lays down a store whose index already accounts for `total` bytes.
fn seed(root: &Path, total: u64) {
    let store = IndexStore::new(root.join("storage"));
    store.ensure_dir().unwrap();
    let mut node = Node::new("seed");
    node.set("blob", 1.0, json!("x"));
    store.write_node("seed.json", &node).unwrap();
    let mut entry = IndexEntry::new("seed");
    entry.size = total;
    let mut index = IndexMap::new();
    index.insert(entry.soul.clone(), entry);
    store.save(&index).unwrap();
}

fn candidate_len(soul: &str, field: &str, value: serde_json::Value) -> u64 {
    let mut node = Node::new(soul);
    node.set(field, 1.0, value);
    node.file_len().unwrap() as u64
}

fn open(opts: StoreOptions) -> (NodeAdapter, Arc<RecordingPipeline>) {
    let pipeline = Arc::new(RecordingPipeline::new());
    let adapter = NodeAdapter::new(opts, pipeline.clone());
    adapter.handle(Event::Create, pipeline.as_ref());
    (adapter, pipeline)
}

#[test]
fn put_over_remaining_budget_is_rejected() {
    let dir = tempdir().unwrap();
    seed(dir.path(), CEILING - 10);
    let (adapter, pipeline) = open(options(dir.path()));
    assert_eq!(adapter.stats().total_bytes, CEILING - 10);

    let msg = PutMessage::new("m1", "chat/msg1", "text", 1.0, json!("more than ten bytes"));
    adapter.handle(Event::Put(msg), pipeline.as_ref());

    let acks = pipeline.acks();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].reply_to, "m1");
    assert!(!acks[0].ok);
    assert_eq!(acks[0].err.as_deref(), Some("storage max exceeded"));

    let puts = pipeline
        .forwarded()
        .into_iter()
        .filter(|e| matches!(e, Event::Put(_)))
        .count();
    assert_eq!(puts, 0);
    let stats = adapter.stats();
    assert_eq!((stats.nodes, stats.dirty, stats.pending_acks), (1, 0, 0));
    assert!(adapter.flush_now().is_noop());
    assert!(!dir.path().join("storage/chat_msg1.json").exists());
}

#[test]
fn put_within_remaining_budget_is_admitted() {
    let dir = tempdir().unwrap();
    let len = candidate_len("q/1", "f", json!("x"));
    seed(dir.path(), CEILING - len);
    let (adapter, pipeline) = open(options(dir.path()));

    adapter.on_put(PutMessage::new("m1", "q/1", "f", 1.0, json!("x")), pipeline.as_ref());
    assert!(pipeline.acks().is_empty());
    assert_eq!(adapter.stats().dirty, 1);
    assert_eq!(pipeline.forwarded().len(), 2);
}

#[test]
fn one_byte_past_the_ceiling_is_rejected() {
    let dir = tempdir().unwrap();
    let len = candidate_len("q/1", "f", json!("x"));
    seed(dir.path(), CEILING - len + 1);
    let (adapter, pipeline) = open(options(dir.path()));

    adapter.on_put(PutMessage::new("m1", "q/1", "f", 1.0, json!("x")), pipeline.as_ref());
    assert_eq!(pipeline.acks().len(), 1);
    assert_eq!(adapter.stats().dirty, 0);
}

#[test]
fn updates_are_charged_only_for_growth() {
    let dir = tempdir().unwrap();
    let mut opts = options(dir.path());
    opts.max_bytes = u64::MAX;
    let (adapter, pipeline) = open(opts);
    adapter.on_put(PutMessage::new("m1", "doc/1", "t", 1.0, json!("aaaa")), pipeline.as_ref());
    adapter.flush_now();
    adapter.shutdown();

    let file_len = fs::metadata(dir.path().join("storage/doc_1.json")).unwrap().len();
    let mut opts = options(dir.path());
    opts.max_bytes = file_len;
    let (adapter, pipeline) = open(opts);
    assert_eq!(adapter.stats().total_bytes, file_len);

    adapter.on_put(PutMessage::new("m2", "doc/1", "t", 2.0, json!("bbbb")), pipeline.as_ref());
    assert!(pipeline.acks().is_empty());
    adapter.on_put(PutMessage::new("m3", "doc/2", "t", 1.0, json!("c")), pipeline.as_ref());
    assert_eq!(pipeline.acks().len(), 1);
    assert_eq!(pipeline.acks()[0].reply_to, "m3");
}

#[test]
fn growing_an_existing_node_at_the_ceiling_is_rejected() {
    let dir = tempdir().unwrap();
    let mut opts = options(dir.path());
    opts.max_bytes = u64::MAX;
    let (adapter, pipeline) = open(opts);
    adapter.on_put(PutMessage::new("m1", "doc/1", "t", 1.0, json!("aaaa")), pipeline.as_ref());
    adapter.flush_now();
    adapter.shutdown();

    let file_len = fs::metadata(dir.path().join("storage/doc_1.json")).unwrap().len();
    let mut opts = options(dir.path());
    opts.max_bytes = file_len;
    let (adapter, pipeline) = open(opts);

    let grown = json!("aaaaaaaaaaaaaaaa");
    adapter.on_put(PutMessage::new("m2", "doc/1", "t", 2.0, grown), pipeline.as_ref());
    let acks = pipeline.acks();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].reply_to, "m2");
    assert_eq!(acks[0].err.as_deref(), Some("storage max exceeded"));
    assert_eq!(adapter.stats().dirty, 0);

    adapter.on_put(PutMessage::new("m3", "doc/1", "t", 3.0, json!("a")), pipeline.as_ref());
    assert_eq!(pipeline.acks().len(), 1);
    adapter.flush_now();
    assert!(adapter.stats().total_bytes <= file_len);
}

#[test]
fn total_tracks_index_after_each_flush() {
    let dir = tempdir().unwrap();
    let (adapter, pipeline) = open(options(dir.path()));
    assert_eq!(adapter.stats().total_bytes, 0);

    adapter.on_put(PutMessage::new("m1", "a/1", "v", 1.0, json!("one")), pipeline.as_ref());
    assert_eq!(adapter.stats().total_bytes, 0);
    adapter.flush_now();
    let first = fs::metadata(dir.path().join("storage/a_1.json")).unwrap().len();
    assert_eq!(adapter.stats().total_bytes, first);

    adapter.on_put(PutMessage::new("m2", "b/1", "v", 1.0, json!("two")), pipeline.as_ref());
    adapter.flush_now();
    let second = fs::metadata(dir.path().join("storage/b_1.json")).unwrap().len();
    assert_eq!(adapter.stats().total_bytes, first + second);
}

#[test]
fn soft_mode_only_enforces_after_a_failed_flush() {
    let dir = tempdir().unwrap();
    seed(dir.path(), CEILING * 2);
    let mut opts = options(dir.path());
    opts.quota_mode = QuotaMode::Soft;
    let (adapter, pipeline) = open(opts);

    adapter.on_put(PutMessage::new("m1", "a/1", "v", 1.0, json!(1)), pipeline.as_ref());
    assert_eq!(adapter.stats().dirty, 1);

    fs::create_dir(dir.path().join("storage/a_1.json.tmp")).unwrap();
    let report = adapter.flush_now();
    assert!(report.error.is_some());
    assert!(adapter.stats().quota_stopped);

    adapter.on_put(PutMessage::new("m2", "b/1", "v", 1.0, json!(2)), pipeline.as_ref());
    let rejected: Vec<_> = pipeline
        .wait_for_acks(2, Duration::from_secs(5))
        .into_iter()
        .filter(|a| a.err.as_deref() == Some("storage max exceeded"))
        .collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].reply_to, "m2");
}
