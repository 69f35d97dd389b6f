use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::admin::util::open_store;
use crate::admin::Result;
use crate::merge::MergeGateway;
use crate::storage::total_size;
use crate::types::Node;

/// Outcome of [`rebuild_index`].
#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    /// Entries in the rewritten index.
    pub entries: usize,
    /// Bytes those entries account for.
    pub bytes: u64,
    /// Entries the previous index held, when it was readable.
    pub previous_entries: Option<usize>,
}

/// Rewrites `index.json` from the node files under `root`.
///
/// Must not run while an adapter has the same root open; the adapter keeps
/// its own copy of the index and overwrites the file on its next flush.
pub fn rebuild_index(root: impl AsRef<Path>) -> Result<RebuildReport> {
    let store = open_store(root.as_ref())?;
    let previous_entries = store.try_load().ok().flatten().map(|index| index.len());
    let index = store.rebuild()?;
    store.save(&index)?;
    info!(
        dir = %store.dir().display(),
        entries = index.len(),
        "admin.rebuild_index.saved"
    );
    Ok(RebuildReport {
        entries: index.len(),
        bytes: total_size(&index),
        previous_entries,
    })
}

/// Reads one node from disk, optionally projected to a single field.
/// `Ok(None)` when the index has no entry for `soul`.
pub fn show(root: impl AsRef<Path>, soul: &str, field: Option<&str>) -> Result<Option<Node>> {
    let store = open_store(root.as_ref())?;
    let index = store.load();
    let Some(entry) = index.get(soul) else {
        return Ok(None);
    };
    let node = store.read_node(entry)?;
    Ok(Some(match field {
        Some(field) => MergeGateway::default().project(&node, field),
        None => node,
    }))
}
