use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Admitting a write would push stored bytes past the ceiling.
    #[error("storage max exceeded: {total} + {incoming} bytes over ceiling of {ceiling}")]
    QuotaExceeded {
        /// Bytes currently accounted for.
        total: u64,
        /// Estimated growth from the rejected write.
        incoming: u64,
        /// Configured ceiling.
        ceiling: u64,
    },
    /// A message or file was missing a required part.
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),
    /// The adapter was shut down.
    #[error("store is closed")]
    Closed,
    /// Option loading failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl StoreError {
    /// Text carried in negative acknowledgments for this error.
    pub fn ack_text(&self) -> String {
        match self {
            StoreError::QuotaExceeded { .. } => "storage max exceeded".to_string(),
            other => other.to_string(),
        }
    }
}

/// Errors raised while loading [`crate::StoreOptions`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The options file could not be read.
    #[error("failed to read options {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// The options file is not valid TOML for this schema.
    #[error("failed to parse options {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// A value parsed but is not acceptable.
    #[error("option '{field}' is invalid: {reason}")]
    Invalid {
        /// Offending option.
        field: &'static str,
        /// Why it was refused.
        reason: String,
    },
}

/// Snapshot of a flush failure, shared by every writer in the failed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushError {
    /// Rendered error message.
    pub message: String,
    /// I/O error kind when the failure came from the filesystem.
    pub kind: Option<io::ErrorKind>,
}

impl FlushError {
    pub(crate) fn capture(err: &StoreError) -> Self {
        let kind = match err {
            StoreError::Io(io_err) => Some(io_err.kind()),
            _ => None,
        };
        Self {
            message: err.to_string(),
            kind,
        }
    }
}

impl std::fmt::Display for FlushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
