use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::engine::StoreEngine;
use crate::storage::IndexEntry;
use crate::types::{
    now_millis, AckMessage, FlushError, Node, Soul, StorageErrorEvent, StoreError,
};

/// Outcome of one flush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    /// Souls the flush attempted, in write order.
    pub souls: Vec<Soul>,
    /// Node files written successfully.
    pub written: usize,
    /// Acknowledgments handed to the emitter.
    pub acks: usize,
    /// First failure, shared by every writer in the batch.
    pub error: Option<FlushError>,
}

impl FlushReport {
    /// True when the flush had nothing to do.
    pub fn is_noop(&self) -> bool {
        self.souls.is_empty() && self.acks == 0
    }
}

struct WriteJob {
    soul: Soul,
    node: Node,
    entry: IndexEntry,
}

/// Runs one flush: snapshot the batch, write every dirty node, rewrite the
/// index, refresh the quota total, then acknowledge.
///
/// Node file writes keep going past a failure so one bad soul does not hold
/// back the rest. The state lock is released for all disk I/O; puts that land
/// meanwhile go into the next batch.
pub(crate) fn run_cycle(engine: &StoreEngine) -> FlushReport {
    let _io = engine.io_lock.lock();
    let started = Instant::now();

    let (jobs, pending) = {
        let mut st = engine.state.lock();
        st.timer.fire();
        let (mut dirty, pending) = st.batch.take().into_parts();
        dirty.append(&mut st.carried);
        let jobs: Vec<WriteJob> = dirty
            .into_iter()
            .filter_map(|soul| {
                let Some(node) = st.cache.get(&soul).cloned() else {
                    warn!(soul = %soul, "store.flush.missing_from_cache");
                    return None;
                };
                let entry = st
                    .index
                    .get(&soul)
                    .cloned()
                    .unwrap_or_else(|| IndexEntry::new(soul.clone()));
                Some(WriteJob { soul, node, entry })
            })
            .collect();
        (jobs, pending)
    };

    if jobs.is_empty() && pending.is_empty() {
        engine.state.lock().timer.complete();
        engine.wakeup.notify_all();
        return FlushReport::default();
    }

    let souls: Vec<Soul> = jobs.iter().map(|job| job.soul.clone()).collect();
    let mut first_error: Option<StoreError> = None;
    let mut failed: Vec<Soul> = Vec::new();
    let mut written: Vec<IndexEntry> = Vec::with_capacity(jobs.len());
    for job in jobs {
        match engine.disk.write_node(&job.entry.file_name, &job.node) {
            Ok(size) => {
                let mut entry = job.entry;
                entry.size = size;
                entry.updated_at = now_millis();
                written.push(entry);
            }
            Err(err) => {
                warn!(soul = %job.soul, error = %err, "store.flush.node_failed");
                failed.push(job.soul);
                first_error.get_or_insert(err);
            }
        }
    }

    if !written.is_empty() {
        let snapshot = {
            let mut st = engine.state.lock();
            for entry in &written {
                st.index.insert(entry.soul.clone(), entry.clone());
            }
            st.index.clone()
        };
        if let Err(err) = engine.disk.save(&snapshot) {
            warn!(error = %err, "store.flush.index_failed");
            failed.extend(written.iter().map(|entry| entry.soul.clone()));
            first_error.get_or_insert(err);
        }
    }

    let error = first_error.as_ref().map(FlushError::capture);
    {
        let mut guard = engine.state.lock();
        let st = &mut *guard;
        st.quota.recompute(&st.index);
        st.flushes += 1;
        if error.is_some() {
            st.flush_errors += 1;
            st.quota.stop();
            st.carried.extend(failed.iter().cloned());
        }
        st.timer.complete();
    }
    engine.wakeup.notify_all();

    if let Some(err) = &error {
        error!(
            error = %err,
            souls = souls.len(),
            failed = failed.len(),
            "store.flush.failed"
        );
        engine.pipeline.storage_error(StorageErrorEvent {
            error: err.clone(),
            prefix: engine.options.root.clone(),
            souls: souls.clone(),
        });
    }

    let acks: Vec<AckMessage> = pending
        .into_iter()
        .map(|write| match &error {
            Some(err) => AckMessage::failure(write.id, err.message.clone()),
            None => AckMessage::success(write.id),
        })
        .collect();
    let ack_count = acks.len();
    engine.emitter.emit(acks);

    if error.is_none() {
        info!(
            souls = souls.len(),
            acks = ack_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "store.flush.complete"
        );
    } else {
        debug!(acks = ack_count, "store.flush.negative_acks");
    }

    FlushReport {
        written: souls.len().saturating_sub(failed.len()),
        souls,
        acks: ack_count,
        error,
    }
}
