//! Write-behind machinery: batching, the debounce timer, the flush cycle and
//! acknowledgment delivery.
//!
//! Puts mark souls dirty and arm the timer. When the timer comes due the
//! background worker runs one flush for everything accumulated, then hands
//! acknowledgments to the emitter thread.

/// Acknowledgment policies and delivery.
pub mod ack;
mod batch;
mod cycle;
mod scheduler;
pub(crate) mod worker;

pub use ack::{AckEveryWrite, AckPolicy, SampledAcks};
pub use batch::{FlushBatch, PendingWrite};
pub use cycle::FlushReport;
pub use scheduler::{DebounceTimer, FlushPhase};

pub(crate) use cycle::run_cycle;
