use std::collections::BTreeSet;

use crate::types::Soul;

/// A write waiting for the flush that will acknowledge it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    /// Id of the put message.
    pub id: String,
    /// Soul the put touched.
    pub soul: Soul,
}

/// Everything accumulated since the last flush began.
#[derive(Debug, Default)]
pub struct FlushBatch {
    dirty: BTreeSet<Soul>,
    pending: Vec<PendingWrite>,
}

impl FlushBatch {
    /// Marks `soul` for writing at the next flush.
    pub fn mark_dirty(&mut self, soul: &str) {
        if !self.dirty.contains(soul) {
            self.dirty.insert(soul.to_string());
        }
    }

    /// Queues an acknowledgment obligation.
    pub fn enqueue(&mut self, write: PendingWrite) {
        self.pending.push(write);
    }

    /// Dirty souls in the batch.
    pub fn dirty(&self) -> &BTreeSet<Soul> {
        &self.dirty
    }

    /// Writes waiting for acknowledgment.
    pub fn pending(&self) -> &[PendingWrite] {
        &self.pending
    }

    /// True when nothing is dirty and nothing awaits acknowledgment.
    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty() && self.pending.is_empty()
    }

    /// Empties the batch, returning its previous contents.
    pub fn take(&mut self) -> FlushBatch {
        std::mem::take(self)
    }

    /// Splits into dirty souls and pending writes.
    pub fn into_parts(self) -> (BTreeSet<Soul>, Vec<PendingWrite>) {
        (self.dirty, self.pending)
    }
}
