use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, warn};

use crate::hooks::Pipeline;
use crate::options::AckPolicyKind;
use crate::types::{AckMessage, PutMessage};

/// Decides whether a write earns an acknowledgment once flushed.
pub trait AckPolicy: Send + Sync {
    /// True when `msg` should be acknowledged after it reaches disk.
    fn should_ack(&self, msg: &PutMessage) -> bool;
}

/// Acknowledges local writes and samples relayed ones.
///
/// A write with an [`AckHint`](crate::types::AckHint) is acknowledged with
/// probability `acked / peers`. Replies are never acknowledged.
#[derive(Debug, Default, Clone, Copy)]
pub struct SampledAcks;

impl AckPolicy for SampledAcks {
    fn should_ack(&self, msg: &PutMessage) -> bool {
        if msg.reply_to.is_some() {
            return false;
        }
        match msg.ack_hint {
            None => true,
            Some(hint) => rand::thread_rng().gen::<f64>() < hint.ratio(),
        }
    }
}

/// Acknowledges every write that is not itself a reply.
#[derive(Debug, Default, Clone, Copy)]
pub struct AckEveryWrite;

impl AckPolicy for AckEveryWrite {
    fn should_ack(&self, msg: &PutMessage) -> bool {
        msg.reply_to.is_none()
    }
}

/// Policy for a configured kind.
pub fn policy_for(kind: AckPolicyKind) -> Box<dyn AckPolicy> {
    match kind {
        AckPolicyKind::Sampled => Box::new(SampledAcks),
        AckPolicyKind::All => Box::new(AckEveryWrite),
    }
}

/// Delivers acknowledgments on a dedicated thread, spacing the entries of a
/// batch `stagger` apart so a large flush does not burst into the pipeline.
pub struct AckEmitter {
    pipeline: Arc<dyn Pipeline>,
    sender: Mutex<Option<Sender<Vec<AckMessage>>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AckEmitter {
    /// Starts the delivery thread.
    pub fn start(pipeline: Arc<dyn Pipeline>, stagger: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<Vec<AckMessage>>();
        let worker_pipeline = Arc::clone(&pipeline);
        let spawned = thread::Builder::new()
            .name("soulstore-acks".into())
            .spawn(move || {
                for batch in rx {
                    deliver(worker_pipeline.as_ref(), batch, stagger);
                }
                debug!("store.acks.worker_exit");
            });
        let (sender, handle) = match spawned {
            Ok(handle) => (Some(tx), Some(handle)),
            Err(err) => {
                warn!(error = %err, "store.acks.spawn_failed");
                (None, None)
            }
        };
        Self {
            pipeline,
            sender: Mutex::new(sender),
            handle: Mutex::new(handle),
        }
    }

    /// Queues a batch. Falls back to immediate delivery when the thread is
    /// gone.
    pub fn emit(&self, acks: Vec<AckMessage>) {
        if acks.is_empty() {
            return;
        }
        let undelivered = match self.sender.lock().as_ref() {
            Some(tx) => match tx.send(acks) {
                Ok(()) => return,
                Err(mpsc::SendError(acks)) => acks,
            },
            None => acks,
        };
        debug!(count = undelivered.len(), "store.acks.inline");
        deliver(self.pipeline.as_ref(), undelivered, Duration::ZERO);
    }

    /// Stops accepting batches and waits for queued ones to drain.
    pub fn close(&self) {
        drop(self.sender.lock().take());
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                warn!("store.acks.worker_panicked");
            }
        }
    }
}

impl std::fmt::Debug for AckEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckEmitter")
            .field("open", &self.sender.lock().is_some())
            .finish()
    }
}

fn deliver(pipeline: &dyn Pipeline, batch: Vec<AckMessage>, stagger: Duration) {
    for (idx, ack) in batch.into_iter().enumerate() {
        if idx > 0 && !stagger.is_zero() {
            thread::sleep(stagger);
        }
        pipeline.inject(ack);
    }
}
