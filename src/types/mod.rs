#![forbid(unsafe_code)]

//! Core data model shared by every layer of the store.
//!
//! A [`Node`] is the unit of persistence: one JSON document per soul, holding
//! field values alongside the logical state (timestamp) each field was last
//! written at. Messages flowing through the hook pipeline are modelled here
//! too.

mod error;
mod message;
mod node;

pub use error::{ConfigError, FlushError, Result, StoreError};
pub use message::{AckHint, AckMessage, Event, GetMessage, PutMessage, StorageErrorEvent};
pub use node::{Node, NodeMeta, Soul, State, META_KEY};

/// Milliseconds since the Unix epoch, saturating to zero for clocks set before it.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis().min(u128::from(u64::MAX)) as u64)
        .unwrap_or(0)
}
