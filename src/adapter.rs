//! The event adapter: `create`, `get` and `put` handlers over the store.

use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::engine::{Lifecycle, StoreEngine};
use crate::flush::worker::spawn_worker;
use crate::flush::{run_cycle, FlushPhase, FlushReport, PendingWrite};
use crate::hooks::{Chain, Pipeline};
use crate::merge::{MergeGateway, StateResolver};
use crate::options::StoreOptions;
use crate::storage::{IndexEntry, IndexMap, NodeCache};
use crate::types::{
    AckMessage, Event, GetMessage, Node, PutMessage, Result, StoreError, META_KEY,
};

/// Point-in-time counters for a running adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    /// Nodes held in the cache.
    pub nodes: usize,
    /// Souls waiting for the next flush, including carried failures.
    pub dirty: usize,
    /// Writes waiting for an acknowledgment.
    pub pending_acks: usize,
    /// Bytes accounted against the quota.
    pub total_bytes: u64,
    /// Configured ceiling.
    pub ceiling: u64,
    /// True once a failed flush raised the quota stop flag.
    pub quota_stopped: bool,
    /// Flushes completed, failed ones included.
    pub flushes: u64,
    /// Flushes that reported an error.
    pub flush_errors: u64,
    /// Scheduler phase.
    pub phase: FlushPhase,
}

enum PutOutcome {
    Stored,
    Ignored,
    Rejected(StoreError),
}

/// Persistence adapter for a graph node pipeline.
///
/// Writes are merged into the in-memory cache, acknowledged only once their
/// node file and the index are on disk, and flushed in debounced batches by a
/// background thread. Reads are served from the cache.
///
/// ```no_run
/// use std::sync::Arc;
/// use serde_json::json;
/// use soulstore::{Event, NodeAdapter, PutMessage, RecordingPipeline, StoreOptions};
///
/// let pipeline = Arc::new(RecordingPipeline::new());
/// let adapter = NodeAdapter::new(StoreOptions::with_root("gun-data"), pipeline.clone());
/// adapter.handle(Event::Create, pipeline.as_ref());
/// let put = PutMessage::new("m1", "chat/msg1", "text", 1.0, json!("hi"));
/// adapter.handle(Event::Put(put), pipeline.as_ref());
/// adapter.shutdown();
/// ```
pub struct NodeAdapter {
    engine: Arc<StoreEngine>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NodeAdapter {
    /// Adapter using the last-writer-wins resolver.
    pub fn new(options: StoreOptions, pipeline: Arc<dyn Pipeline>) -> Self {
        Self::with_gateway(options, pipeline, MergeGateway::default())
    }

    /// Adapter delegating merges to `resolver`.
    pub fn with_resolver(
        options: StoreOptions,
        pipeline: Arc<dyn Pipeline>,
        resolver: Arc<dyn StateResolver>,
    ) -> Self {
        Self::with_gateway(options, pipeline, MergeGateway::new(resolver))
    }

    fn with_gateway(
        options: StoreOptions,
        pipeline: Arc<dyn Pipeline>,
        gateway: MergeGateway,
    ) -> Self {
        Self {
            engine: Arc::new(StoreEngine::new(options, gateway, pipeline)),
            worker: Mutex::new(None),
        }
    }

    /// Builds an adapter and initializes it as a create event would, without
    /// forwarding anything.
    pub fn open(options: StoreOptions, pipeline: Arc<dyn Pipeline>) -> Result<Self> {
        let adapter = Self::new(options, pipeline);
        adapter.initialize()?;
        Ok(adapter)
    }

    /// Options the adapter was built with.
    pub fn options(&self) -> &StoreOptions {
        &self.engine.options
    }

    /// Directory holding the index and node files.
    pub fn storage_dir(&self) -> &Path {
        self.engine.disk.dir()
    }

    /// True between initialization and shutdown.
    pub fn is_open(&self) -> bool {
        self.engine.state.lock().lifecycle == Lifecycle::Open
    }

    /// Dispatches one pipeline event to its handler.
    pub fn handle(&self, event: Event, chain: &dyn Chain) {
        match event {
            Event::Create => {
                if let Err(err) = self.on_create(chain) {
                    error!(error = %err, "store.create.failed");
                }
            }
            Event::Get(msg) => self.on_get(msg, chain),
            Event::Put(msg) => self.on_put(msg, chain),
        }
    }

    /// Creates the storage directory, loads the index, warms the cache and
    /// starts the flush worker, then forwards the event. A failure leaves the
    /// adapter inert; the event is forwarded either way.
    pub fn on_create(&self, chain: &dyn Chain) -> Result<()> {
        let result = self.initialize();
        chain.forward(Event::Create);
        result
    }

    /// Answers a lookup from the cache and forwards it.
    pub fn on_get(&self, msg: GetMessage, chain: &dyn Chain) {
        let reply = self.lookup(&msg);
        chain.forward(Event::Get(msg.clone()));
        if let Some(reply) = reply {
            chain.ack(&msg, reply);
        }
    }

    /// Merges a write into the cache and schedules its flush. A write refused
    /// by the quota is answered with a negative acknowledgment and goes no
    /// further down the chain.
    pub fn on_put(&self, msg: PutMessage, chain: &dyn Chain) {
        match self.store_put(&msg) {
            PutOutcome::Stored | PutOutcome::Ignored => chain.forward(Event::Put(msg)),
            PutOutcome::Rejected(err) => {
                warn!(soul = %msg.soul, id = %msg.id, error = %err, "store.put.rejected");
                self.engine
                    .pipeline
                    .inject(AckMessage::failure(msg.id, err.ack_text()));
            }
        }
    }

    /// Flushes whatever is pending on the calling thread.
    pub fn flush_now(&self) -> FlushReport {
        if !self.is_open() {
            return FlushReport::default();
        }
        run_cycle(&self.engine)
    }

    /// Snapshot of the adapter's counters.
    pub fn stats(&self) -> StoreStats {
        let st = self.engine.state.lock();
        let dirty = st
            .batch
            .dirty()
            .iter()
            .chain(st.carried.iter().filter(|soul| !st.batch.dirty().contains(*soul)))
            .count();
        StoreStats {
            nodes: st.cache.len(),
            dirty,
            pending_acks: st.batch.pending().len(),
            total_bytes: st.quota.total(),
            ceiling: st.quota.ceiling(),
            quota_stopped: st.quota.is_stopped(),
            flushes: st.flushes,
            flush_errors: st.flush_errors,
            phase: st.timer.phase(),
        }
    }

    /// Stops the worker, runs a final flush and drains queued
    /// acknowledgments. Later events are forwarded untouched. Calling it
    /// again does nothing.
    pub fn shutdown(&self) {
        let mut worker = self.worker.lock();
        let was_open = {
            let mut st = self.engine.state.lock();
            if st.lifecycle == Lifecycle::Closed {
                return;
            }
            let was_open = st.lifecycle == Lifecycle::Open;
            st.lifecycle = Lifecycle::Closed;
            st.worker_stop = true;
            was_open
        };
        self.engine.wakeup.notify_all();
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                error!("store.flush.worker_panicked");
            }
        }
        if was_open && self.engine.state.lock().has_work() {
            let report = run_cycle(&self.engine);
            debug!(souls = report.souls.len(), acks = report.acks, "store.shutdown.final_flush");
        }
        self.engine.emitter.close();
        info!(dir = %self.engine.disk.dir().display(), "store.shutdown");
    }

    fn initialize(&self) -> Result<()> {
        let engine = &self.engine;
        if !engine.options.enabled {
            info!("store.disabled");
            return Ok(());
        }
        let mut worker = self.worker.lock();
        match engine.state.lock().lifecycle {
            Lifecycle::Open => {
                debug!("store.create.already_open");
                return Ok(());
            }
            Lifecycle::Closed => return Err(StoreError::Closed),
            Lifecycle::Unopened => {}
        }

        let started = Instant::now();
        engine.disk.ensure_dir()?;
        let index = self.load_index();
        let cache = self.warm_cache(&index);
        let handle = spawn_worker(Arc::clone(engine))?;
        {
            let mut guard = engine.state.lock();
            let st = &mut *guard;
            st.index = index;
            st.cache = cache;
            st.quota.recompute(&st.index);
            st.lifecycle = Lifecycle::Open;
            info!(
                dir = %engine.disk.dir().display(),
                nodes = st.cache.len(),
                bytes = st.quota.total(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "store.open"
            );
        }
        *worker = Some(handle);
        Ok(())
    }

    fn load_index(&self) -> IndexMap {
        let disk = &self.engine.disk;
        let index = disk.load();
        if !index.is_empty() || !self.engine.options.rebuild_index {
            return index;
        }
        match disk.node_files() {
            Ok(files) if !files.is_empty() => {
                warn!(files = files.len(), "store.index.rebuilding");
            }
            Ok(_) => return index,
            Err(err) => {
                warn!(error = %err, "store.index.scan_failed");
                return index;
            }
        }
        match disk.rebuild() {
            Ok(rebuilt) => {
                if let Err(err) = disk.save(&rebuilt) {
                    warn!(error = %err, "store.rebuild.save_failed");
                }
                rebuilt
            }
            Err(err) => {
                warn!(error = %err, "store.rebuild.failed");
                index
            }
        }
    }

    fn warm_cache(&self, index: &IndexMap) -> NodeCache {
        let mut cache = NodeCache::new();
        for (soul, entry) in index {
            match self.engine.disk.read_node(entry) {
                Ok(node) => {
                    if node.soul() != soul {
                        warn!(
                            soul = %soul,
                            file_soul = %node.soul(),
                            file = %entry.file_name,
                            "store.load.soul_mismatch"
                        );
                    }
                    cache.commit(soul.clone(), node);
                }
                Err(err) => {
                    warn!(
                        soul = %soul,
                        file = %entry.file_name,
                        error = %err,
                        "store.load.node_unreadable"
                    );
                }
            }
        }
        cache
    }

    fn lookup(&self, msg: &GetMessage) -> Option<Option<Node>> {
        let Some(soul) = msg.soul.as_deref() else {
            debug!(id = %msg.id, "store.get.malformed");
            return None;
        };
        let st = self.engine.state.lock();
        if st.lifecycle != Lifecycle::Open {
            return None;
        }
        let reply = match (st.cache.get(soul), msg.field.as_deref()) {
            (None, _) => None,
            (Some(node), None) => Some(node.clone()),
            (Some(node), Some(field)) => Some(self.engine.gateway.project(node, field)),
        };
        trace!(soul, found = reply.is_some(), "store.get.served");
        Some(reply)
    }

    fn store_put(&self, msg: &PutMessage) -> PutOutcome {
        // `_` is the metadata block of a node file and cannot hold a value.
        if msg.soul.is_empty() || msg.field.is_empty() || msg.field == META_KEY {
            debug!(id = %msg.id, field = %msg.field, "store.put.malformed");
            return PutOutcome::Ignored;
        }
        let engine = &self.engine;
        let mut guard = engine.state.lock();
        let st = &mut *guard;
        if st.lifecycle != Lifecycle::Open {
            return PutOutcome::Ignored;
        }

        let candidate = st.cache.propose(
            &engine.gateway,
            &msg.soul,
            &msg.field,
            msg.state,
            msg.value.clone(),
        );
        let incoming = match incoming_bytes(&candidate, st.index.get(&msg.soul)) {
            Ok(bytes) => bytes,
            Err(err) => return PutOutcome::Rejected(err),
        };
        if let Err(err) = st.quota.admit(&msg.soul, incoming) {
            return PutOutcome::Rejected(err);
        }

        st.cache.commit(msg.soul.clone(), candidate);
        st.batch.mark_dirty(&msg.soul);
        if engine.policy.should_ack(msg) {
            st.batch.enqueue(PendingWrite {
                id: msg.id.clone(),
                soul: msg.soul.clone(),
            });
        }
        st.timer.rearm(Instant::now(), engine.options.debounce);
        trace!(soul = %msg.soul, field = %msg.field, incoming, "store.put.merged");
        drop(guard);
        engine.wakeup.notify_all();
        PutOutcome::Stored
    }
}

impl Drop for NodeAdapter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Growth a candidate node would add over what is already indexed for it.
fn incoming_bytes(candidate: &Node, indexed: Option<&IndexEntry>) -> Result<u64> {
    let len = candidate.file_len()? as u64;
    Ok(len.saturating_sub(indexed.map_or(0, |entry| entry.size)))
}
