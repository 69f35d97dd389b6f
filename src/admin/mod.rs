//! Offline inspection and repair of a storage root.
//!
//! These functions read the files directly and never go through an adapter,
//! so they are meant for stores that are not currently open.

mod error;
mod maintenance;
mod stats;
mod util;
mod verify;

/// Error types for administrative operations.
pub use error::{AdminError, Result};

/// Index repair and single-node reads.
pub use maintenance::{rebuild_index, show, RebuildReport};

/// Statistics collection and reporting.
pub use stats::{stats, LargestNode, StatsReport};

/// Consistency checks between the index and node files.
pub use verify::{verify, VerifyCounts, VerifyFinding, VerifyReport, VerifySeverity};
