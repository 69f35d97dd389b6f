use std::path::Path;

use crate::options::STORAGE_DIR;
use crate::storage::IndexStore;

use super::{AdminError, Result};

/// Opens the storage directory under `root` for offline inspection.
pub(crate) fn open_store(root: &Path) -> Result<IndexStore> {
    let dir = root.join(STORAGE_DIR);
    if !dir.is_dir() {
        return Err(AdminError::missing_store(&dir));
    }
    Ok(IndexStore::new(dir))
}
