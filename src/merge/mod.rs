#![forbid(unsafe_code)]

//! Boundary to the state-resolution engine.
//!
//! The store never decides conflicts itself. It hands the cached node and the
//! incoming field write to a [`StateResolver`] and keeps whatever comes back.
//! Read-side projections go through the same resolver so that a single-field
//! view is built with the same comparison rules as a write.

use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::Value;

use crate::types::{Node, State};

/// Conflict resolution for a single field write.
pub trait StateResolver: Send + Sync + 'static {
    /// Merges `value` written at `state` into `existing` and returns the
    /// resulting node. `existing` is `None` for a soul never seen before.
    ///
    /// Implementations must return `existing` unchanged (or an empty node for
    /// `soul`) when the write loses.
    fn merge(
        &self,
        existing: Option<&Node>,
        soul: &str,
        field: &str,
        state: State,
        value: Value,
    ) -> Node;
}

/// Per-field last-writer-wins.
///
/// A higher state wins. Equal states are broken by comparing the JSON
/// encodings of the two values lexically, so every replica converges on the
/// same value regardless of arrival order.
#[derive(Debug, Default, Clone, Copy)]
pub struct LastWriteWins;

impl LastWriteWins {
    fn accepts(current: Option<(State, &Value)>, state: State, value: &Value) -> bool {
        let Some((current_state, current_value)) = current else {
            return true;
        };
        match state.partial_cmp(&current_state) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Less) => false,
            Some(Ordering::Equal) => {
                let incoming = value.to_string();
                let held = current_value.to_string();
                incoming > held
            }
            // NaN never wins.
            None => false,
        }
    }
}

impl StateResolver for LastWriteWins {
    fn merge(
        &self,
        existing: Option<&Node>,
        soul: &str,
        field: &str,
        state: State,
        value: Value,
    ) -> Node {
        let mut node = existing.cloned().unwrap_or_else(|| Node::new(soul));
        let current = match (node.state(field), node.get(field)) {
            (Some(s), Some(v)) => Some((s, v)),
            _ => None,
        };
        if Self::accepts(current, state, &value) {
            node.set(field, state, value);
        }
        node
    }
}

/// Adapter-side handle on the configured resolver.
#[derive(Clone)]
pub struct MergeGateway {
    resolver: Arc<dyn StateResolver>,
}

impl std::fmt::Debug for MergeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeGateway").finish_non_exhaustive()
    }
}

impl Default for MergeGateway {
    fn default() -> Self {
        Self::new(Arc::new(LastWriteWins))
    }
}

impl MergeGateway {
    /// Wraps `resolver`.
    pub fn new(resolver: Arc<dyn StateResolver>) -> Self {
        Self { resolver }
    }

    /// Merges one field write into `existing`.
    pub fn merge(
        &self,
        existing: Option<&Node>,
        soul: &str,
        field: &str,
        state: State,
        value: Value,
    ) -> Node {
        self.resolver.merge(existing, soul, field, state, value)
    }

    /// Single-field view of `node`.
    ///
    /// The field is replayed through the resolver onto an empty node of the
    /// same soul. A field the node does not hold yields an empty node.
    pub fn project(&self, node: &Node, field: &str) -> Node {
        let empty = Node::new(node.soul());
        match (node.state(field), node.get(field)) {
            (Some(state), Some(value)) => {
                self.resolver
                    .merge(Some(&empty), node.soul(), field, state, value.clone())
            }
            _ => empty,
        }
    }
}
