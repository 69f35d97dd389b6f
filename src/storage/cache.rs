use std::collections::HashMap;

use serde_json::Value;

use crate::merge::MergeGateway;
use crate::types::{Node, Soul, State};

/// In-memory working set: the merged value of every node loaded or written
/// during this run. Reads are served from here only.
#[derive(Debug, Default)]
pub struct NodeCache {
    nodes: HashMap<Soul, Node>,
}

impl NodeCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached node for `soul`.
    pub fn get(&self, soul: &str) -> Option<&Node> {
        self.nodes.get(soul)
    }

    /// Computes the merge of a field write without storing it.
    pub fn propose(
        &self,
        gateway: &MergeGateway,
        soul: &str,
        field: &str,
        state: State,
        value: Value,
    ) -> Node {
        gateway.merge(self.nodes.get(soul), soul, field, state, value)
    }

    /// Replaces the cached node for `soul` with a merge result.
    pub fn commit(&mut self, soul: Soul, node: Node) {
        self.nodes.insert(soul, node);
    }

    /// Merges a field write and stores the result.
    pub fn merge(
        &mut self,
        gateway: &MergeGateway,
        soul: &str,
        field: &str,
        state: State,
        value: Value,
    ) -> &Node {
        let merged = self.propose(gateway, soul, field, state, value);
        self.nodes.insert(soul.to_string(), merged);
        &self.nodes[soul]
    }

    /// Number of cached nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
