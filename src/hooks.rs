//! Boundary to the event hook pipeline.
//!
//! Handlers get a [`Chain`] for the event being handled: `forward` hands the
//! event to the next handler and `ack` answers a lookup. Work that happens
//! after the handler returns (flush acknowledgments, storage errors) goes
//! through the long-lived [`Pipeline`] handle the adapter was built with.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::types::{AckMessage, Event, GetMessage, Node, StorageErrorEvent};

/// Continuation for the event currently being handled.
pub trait Chain {
    /// Passes `event` to the next handler.
    fn forward(&self, event: Event);
    /// Replies to a lookup. `None` means "not found".
    fn ack(&self, original: &GetMessage, reply: Option<Node>);
}

/// Root of the pipeline, reachable from background work.
pub trait Pipeline: Send + Sync + 'static {
    /// Injects an acknowledgment on the inbound side.
    fn inject(&self, ack: AckMessage);
    /// Publishes a flush failure.
    fn storage_error(&self, event: StorageErrorEvent);
    /// True while the pipeline still has work in flight. A flush with no
    /// acknowledgments due is deferred while this holds.
    fn in_flight(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
struct Recorded {
    forwarded: Vec<Event>,
    replies: Vec<(GetMessage, Option<Node>)>,
    acks: Vec<AckMessage>,
    errors: Vec<StorageErrorEvent>,
    busy: bool,
}

/// Pipeline that records everything it is handed.
///
/// Useful in tests and for driving the adapter from tools that have no real
/// pipeline.
#[derive(Debug, Default)]
pub struct RecordingPipeline {
    inner: Mutex<Recorded>,
    changed: Condvar,
}

impl RecordingPipeline {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events forwarded so far.
    pub fn forwarded(&self) -> Vec<Event> {
        self.inner.lock().forwarded.clone()
    }

    /// Lookup replies so far.
    pub fn replies(&self) -> Vec<(GetMessage, Option<Node>)> {
        self.inner.lock().replies.clone()
    }

    /// Acknowledgments injected so far.
    pub fn acks(&self) -> Vec<AckMessage> {
        self.inner.lock().acks.clone()
    }

    /// Storage error events so far.
    pub fn storage_errors(&self) -> Vec<StorageErrorEvent> {
        self.inner.lock().errors.clone()
    }

    /// Toggles the in-flight signal.
    pub fn set_busy(&self, busy: bool) {
        self.inner.lock().busy = busy;
    }

    /// Blocks until at least `n` acknowledgments arrived or `timeout` passed,
    /// then returns what arrived.
    pub fn wait_for_acks(&self, n: usize, timeout: Duration) -> Vec<AckMessage> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock();
        while guard.acks.len() < n {
            if self.changed.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        guard.acks.clone()
    }

    /// Blocks until at least `n` storage errors arrived or `timeout` passed.
    pub fn wait_for_errors(&self, n: usize, timeout: Duration) -> Vec<StorageErrorEvent> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock();
        while guard.errors.len() < n {
            if self.changed.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        guard.errors.clone()
    }
}

impl Chain for RecordingPipeline {
    fn forward(&self, event: Event) {
        self.inner.lock().forwarded.push(event);
    }

    fn ack(&self, original: &GetMessage, reply: Option<Node>) {
        self.inner.lock().replies.push((original.clone(), reply));
    }
}

impl Pipeline for RecordingPipeline {
    fn inject(&self, ack: AckMessage) {
        self.inner.lock().acks.push(ack);
        self.changed.notify_all();
    }

    fn storage_error(&self, event: StorageErrorEvent) {
        self.inner.lock().errors.push(event);
        self.changed.notify_all();
    }

    fn in_flight(&self) -> bool {
        self.inner.lock().busy
    }
}
