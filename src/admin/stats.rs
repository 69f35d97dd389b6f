use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::admin::util::open_store;
use crate::admin::Result;
use crate::storage::total_size;

/// Summary of a storage directory.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// Directory that was inspected.
    pub storage_dir: String,
    /// Souls recorded in the index.
    pub nodes: usize,
    /// Sum of sizes recorded in the index; what the quota counts.
    pub indexed_bytes: u64,
    /// Node files present on disk.
    pub files_on_disk: usize,
    /// Bytes those files occupy.
    pub bytes_on_disk: u64,
    /// Size of `index.json`, zero when absent.
    pub index_bytes: u64,
    /// Largest indexed node.
    pub largest: Option<LargestNode>,
}

/// The biggest node in the index.
#[derive(Debug, Clone, Serialize)]
pub struct LargestNode {
    /// Its soul.
    pub soul: String,
    /// Recorded size in bytes.
    pub size: u64,
}

/// Collects [`StatsReport`] for the store rooted at `root`.
pub fn stats(root: impl AsRef<Path>) -> Result<StatsReport> {
    let store = open_store(root.as_ref())?;
    let index = store.load();
    let files = store.node_files()?;
    let mut bytes_on_disk = 0;
    for file in &files {
        bytes_on_disk += fs::metadata(file)?.len();
    }
    let index_bytes = fs::metadata(store.index_path()).map(|m| m.len()).unwrap_or(0);
    let largest = index
        .values()
        .max_by_key(|entry| entry.size)
        .map(|entry| LargestNode {
            soul: entry.soul.clone(),
            size: entry.size,
        });
    Ok(StatsReport {
        storage_dir: store.dir().display().to_string(),
        nodes: index.len(),
        indexed_bytes: total_size(&index),
        files_on_disk: files.len(),
        bytes_on_disk,
        index_bytes,
        largest,
    })
}
