//! Write-behind persistence for a graph node pipeline.
//!
//! A [`NodeAdapter`] sits on a pipeline's `create`, `get` and `put` hooks. It
//! keeps every node in memory, serves reads from there, and writes dirty
//! nodes to one JSON file each under `<root>/storage/` in debounced batches,
//! acknowledging a write only after its batch reached disk.

#![warn(missing_docs)]

pub mod adapter;
pub mod admin;
mod engine;
pub mod flush;
pub mod hooks;
pub mod logging;
pub mod merge;
pub mod options;
pub mod storage;
pub mod types;

pub use adapter::{NodeAdapter, StoreStats};
pub use flush::{FlushPhase, FlushReport};
pub use hooks::{Chain, Pipeline, RecordingPipeline};
pub use merge::{LastWriteWins, MergeGateway, StateResolver};
pub use options::{AckPolicyKind, QuotaMode, StoreOptions};
pub use types::{
    AckHint, AckMessage, ConfigError, Event, FlushError, GetMessage, Node, PutMessage, Result,
    Soul, State, StorageErrorEvent, StoreError,
};
