//! State shared between the hook handlers and the background flush worker.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::flush::ack::{policy_for, AckEmitter, AckPolicy};
use crate::flush::{DebounceTimer, FlushBatch};
use crate::hooks::Pipeline;
use crate::merge::MergeGateway;
use crate::options::StoreOptions;
use crate::storage::{IndexMap, IndexStore, NodeCache, QuotaEnforcer};
use crate::types::Soul;

/// Whether the adapter has been initialized by a create event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    /// Waiting for the create event.
    Unopened,
    /// Serving reads and writes.
    Open,
    /// Shut down; events are forwarded untouched.
    Closed,
}

/// Everything guarded by the state lock.
#[derive(Debug)]
pub(crate) struct StoreState {
    pub(crate) lifecycle: Lifecycle,
    pub(crate) cache: NodeCache,
    pub(crate) index: IndexMap,
    pub(crate) quota: QuotaEnforcer,
    pub(crate) batch: FlushBatch,
    pub(crate) timer: DebounceTimer,
    /// Souls whose last write failed; retried with the next batch.
    pub(crate) carried: BTreeSet<Soul>,
    pub(crate) flushes: u64,
    pub(crate) flush_errors: u64,
    pub(crate) worker_stop: bool,
}

impl StoreState {
    fn new(options: &StoreOptions) -> Self {
        Self {
            lifecycle: Lifecycle::Unopened,
            cache: NodeCache::new(),
            index: IndexMap::new(),
            quota: QuotaEnforcer::new(options.max_bytes, options.quota_mode),
            batch: FlushBatch::default(),
            timer: DebounceTimer::default(),
            carried: BTreeSet::new(),
            flushes: 0,
            flush_errors: 0,
            worker_stop: false,
        }
    }

    /// True when a flush would have something to do.
    pub(crate) fn has_work(&self) -> bool {
        !self.batch.is_empty() || !self.carried.is_empty()
    }
}

/// Shared core behind a [`crate::NodeAdapter`].
pub(crate) struct StoreEngine {
    pub(crate) options: StoreOptions,
    pub(crate) gateway: MergeGateway,
    pub(crate) disk: IndexStore,
    pub(crate) state: Mutex<StoreState>,
    /// Signalled whenever the timer changes or shutdown begins.
    pub(crate) wakeup: Condvar,
    /// Held for the duration of a flush so two flushes never interleave.
    pub(crate) io_lock: Mutex<()>,
    pub(crate) pipeline: Arc<dyn Pipeline>,
    pub(crate) emitter: AckEmitter,
    pub(crate) policy: Box<dyn AckPolicy>,
}

impl StoreEngine {
    pub(crate) fn new(
        options: StoreOptions,
        gateway: MergeGateway,
        pipeline: Arc<dyn Pipeline>,
    ) -> Self {
        let disk = IndexStore::new(options.storage_dir());
        let emitter = AckEmitter::start(Arc::clone(&pipeline), options.ack_stagger);
        let policy = policy_for(options.ack_policy);
        let state = Mutex::new(StoreState::new(&options));
        Self {
            options,
            gateway,
            disk,
            state,
            wakeup: Condvar::new(),
            io_lock: Mutex::new(()),
            pipeline,
            emitter,
            policy,
        }
    }
}
