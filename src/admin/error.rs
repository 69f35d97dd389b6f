use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::StoreError;

/// Error type for administrative operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// No storage directory under the given root.
    #[error("store not found: {0}")]
    MissingStore(PathBuf),
    /// Store-level failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias for administrative operations.
pub type Result<T> = std::result::Result<T, AdminError>;

impl AdminError {
    pub(crate) fn missing_store(path: impl AsRef<Path>) -> Self {
        AdminError::MissingStore(path.as_ref().to_path_buf())
    }
}
