use tracing::{debug, warn};

use crate::options::QuotaMode;
use crate::types::{Result, StoreError};

use super::index::{total_size, IndexMap};

/// Admission control against the configured byte ceiling.
///
/// The running total is taken from the index and refreshed after each flush,
/// so writes admitted between two flushes are all checked against the same
/// total.
#[derive(Debug, Clone)]
pub struct QuotaEnforcer {
    ceiling: u64,
    mode: QuotaMode,
    total: u64,
    stopped: bool,
}

impl QuotaEnforcer {
    /// Enforcer with an empty running total.
    pub fn new(ceiling: u64, mode: QuotaMode) -> Self {
        Self {
            ceiling,
            mode,
            total: 0,
            stopped: false,
        }
    }

    /// Bytes currently accounted for.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Configured ceiling.
    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// True once a failed flush has raised the stop flag.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Raises the stop flag. In [`QuotaMode::Soft`] this is what turns the
    /// ceiling on.
    pub fn stop(&mut self) {
        if !self.stopped {
            warn!(total = self.total, ceiling = self.ceiling, "store.quota.stop_raised");
        }
        self.stopped = true;
    }

    /// Recomputes the running total from `index`.
    pub fn recompute(&mut self, index: &IndexMap) {
        self.total = total_size(index);
        debug!(total = self.total, "store.quota.recomputed");
    }

    /// Checks whether a write growing storage by `incoming` bytes fits.
    pub fn admit(&self, soul: &str, incoming: u64) -> Result<()> {
        if self.mode == QuotaMode::Soft && !self.stopped {
            return Ok(());
        }
        if self.total.saturating_add(incoming) > self.ceiling {
            debug!(soul, total = self.total, incoming, "store.quota.rejected");
            return Err(StoreError::QuotaExceeded {
                total: self.total,
                incoming,
                ceiling: self.ceiling,
            });
        }
        Ok(())
    }
}
