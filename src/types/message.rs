use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{FlushError, Soul, State};

/// Acknowledgment ratio advertised by a relayed write.
///
/// `acked / peers` is the probability that the write is acknowledged once
/// flushed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AckHint {
    /// Acknowledgments already gathered upstream.
    pub acked: f64,
    /// Peers the write was relayed to.
    pub peers: f64,
}

impl AckHint {
    /// Sampling probability, clamped to `[0, 1]`. Zero peers never samples.
    pub fn ratio(&self) -> f64 {
        if self.peers.is_nan() || self.peers <= 0.0 || self.acked.is_nan() {
            return 0.0;
        }
        (self.acked / self.peers).clamp(0.0, 1.0)
    }
}

/// A single field mutation arriving on the `put` hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutMessage {
    /// Message id acknowledgments refer back to.
    pub id: String,
    /// Node being written.
    pub soul: Soul,
    /// Field being written.
    pub field: String,
    /// Logical state of the write.
    pub state: State,
    /// New value.
    pub value: Value,
    /// Set when this message is itself a reply to another message.
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Acknowledgment sampling hint carried by relayed writes.
    #[serde(default)]
    pub ack_hint: Option<AckHint>,
}

impl PutMessage {
    /// Builds a locally originated put.
    pub fn new(
        id: impl Into<String>,
        soul: impl Into<Soul>,
        field: impl Into<String>,
        state: State,
        value: Value,
    ) -> Self {
        Self {
            id: id.into(),
            soul: soul.into(),
            field: field.into(),
            state,
            value,
            reply_to: None,
            ack_hint: None,
        }
    }

    /// Attaches an acknowledgment hint.
    pub fn with_ack_hint(mut self, hint: AckHint) -> Self {
        self.ack_hint = Some(hint);
        self
    }

    /// Marks the message as a reply to `id`.
    pub fn in_reply_to(mut self, id: impl Into<String>) -> Self {
        self.reply_to = Some(id.into());
        self
    }
}

/// A lookup arriving on the `get` hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetMessage {
    /// Message id.
    pub id: String,
    /// Node requested. `None` is a malformed request.
    pub soul: Option<Soul>,
    /// Single field to project, if any.
    #[serde(default)]
    pub field: Option<String>,
}

impl GetMessage {
    /// Whole-node lookup.
    pub fn node(id: impl Into<String>, soul: impl Into<Soul>) -> Self {
        Self {
            id: id.into(),
            soul: Some(soul.into()),
            field: None,
        }
    }

    /// Single-field lookup.
    pub fn field(id: impl Into<String>, soul: impl Into<Soul>, field: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            soul: Some(soul.into()),
            field: Some(field.into()),
        }
    }
}

/// Acknowledgment re-injected into the pipeline's inbound side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckMessage {
    /// Id of the put being acknowledged.
    pub reply_to: String,
    /// True when the write reached disk.
    pub ok: bool,
    /// Failure text for negative acknowledgments.
    pub err: Option<String>,
}

impl AckMessage {
    pub(crate) fn success(reply_to: String) -> Self {
        Self {
            reply_to,
            ok: true,
            err: None,
        }
    }

    pub(crate) fn failure(reply_to: String, err: impl Into<String>) -> Self {
        Self {
            reply_to,
            ok: false,
            err: Some(err.into()),
        }
    }
}

/// Observability event raised when a flush fails.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageErrorEvent {
    /// The captured failure.
    pub error: FlushError,
    /// Storage root the failing flush targeted.
    pub prefix: PathBuf,
    /// Souls the failing flush was writing.
    pub souls: Vec<Soul>,
}

/// Lifecycle events the adapter handles and forwards.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Instance creation.
    Create,
    /// Lookup.
    Get(GetMessage),
    /// Mutation.
    Put(PutMessage),
}
