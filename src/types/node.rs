use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Result, StoreError};

/// Identifier of a graph node.
pub type Soul = String;

/// Logical timestamp attached to every field write.
pub type State = f64;

/// Reserved key holding node metadata in the serialized form.
pub const META_KEY: &str = "_";

/// Node metadata: the soul and the per-field state vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    /// Soul this node is addressed by.
    #[serde(rename = "#")]
    pub soul: Soul,
    /// Logical state of each field's current value.
    #[serde(rename = ">", default)]
    pub states: BTreeMap<String, State>,
}

/// A graph node: field values plus the state each value was written at.
///
/// Serializes as `{"_": {"#": soul, ">": {field: state}}, field: value, ...}`,
/// which is also the on-disk format of a node file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "_")]
    meta: NodeMeta,
    #[serde(flatten)]
    fields: BTreeMap<String, Value>,
}

impl Node {
    /// Creates an empty node for `soul`.
    pub fn new(soul: impl Into<Soul>) -> Self {
        Self {
            meta: NodeMeta {
                soul: soul.into(),
                states: BTreeMap::new(),
            },
            fields: BTreeMap::new(),
        }
    }

    /// Soul of this node.
    pub fn soul(&self) -> &str {
        &self.meta.soul
    }

    /// Metadata block (soul and state vector).
    pub fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    /// Current value of `field`.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// State `field` was last written at.
    pub fn state(&self, field: &str) -> Option<State> {
        self.meta.states.get(field).copied()
    }

    /// Overwrites `field` with `value` at `state`.
    ///
    /// This is the primitive resolvers build merge results with; it performs
    /// no conflict resolution of its own.
    pub fn set(&mut self, field: impl Into<String>, state: State, value: Value) {
        let field = field.into();
        self.meta.states.insert(field.clone(), state);
        self.fields.insert(field, value);
    }

    /// Iterates `(field, state, value)` in field order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<State>, &Value)> {
        self.fields
            .iter()
            .map(|(k, v)| (k.as_str(), self.meta.states.get(k).copied(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the node has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Size of the node file this node would be written as.
    ///
    /// Index entries record the same figure, so quota estimates compare like
    /// with like.
    pub fn file_len(&self) -> Result<usize> {
        Ok(self.to_file_bytes()?.len())
    }

    /// Pretty JSON document as written to a node file.
    pub fn to_file_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parses a node file.
    pub fn from_file_bytes(bytes: &[u8]) -> Result<Self> {
        let node: Node = serde_json::from_slice(bytes)?;
        if node.meta.soul.is_empty() {
            return Err(StoreError::InvalidMessage("node file without soul"));
        }
        Ok(node)
    }
}
