//! Durable half of the store and the in-memory working set that mirrors it.
//!
//! Layout under the configured root:
//!
//! ```text
//! <root>/storage/index.json          soul -> { file, size, created, updated }
//! <root>/storage/<sanitized>.json    one serialized node per soul
//! ```

/// Index file handling, node file I/O and recovery scans.
pub mod index;

/// In-memory node cache.
pub mod cache;

/// Byte ceiling admission control.
pub mod quota;

pub use cache::NodeCache;
pub use index::{sanitize_file_name, total_size, IndexEntry, IndexMap, IndexStore, INDEX_FILE};
pub use quota::QuotaEnforcer;
