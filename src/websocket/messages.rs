//! WebSocket Message Types
//!
//! Defines the envelope pushed to clients whenever the shared list changes,
//! and the framing used when several envelopes leave in one physical write.
//!
//! ## Wire format
//!
//! Each envelope is a single-line UTF-8 JSON object:
//!
//! ```json
//! {"client_id":"482913","type":"add","data":{"uid":"...","name":"milk"}}
//! ```
//!
//! When the outbound pump finds more than one envelope queued it joins them
//! with `\n` into one text frame. Compact JSON never contains a raw newline,
//! so receivers split on `\n` without ambiguity.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// A serialized envelope, shared read-only by every recipient of a broadcast
pub type Frame = Arc<str>;

/// Separator between envelopes coalesced into one text frame
pub const FRAME_SEPARATOR: char = '\n';

/// Kind of list mutation an envelope describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Add,
    Delete,
    Edit,
    Toggle,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Add => "add",
            EventKind::Delete => "delete",
            EventKind::Edit => "edit",
            EventKind::Toggle => "toggle",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit broadcast to connections on every mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Client that caused the mutation; it does not get its own echo
    #[serde(rename = "client_id", default)]
    pub originator_id: String,
    /// What happened to the item
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// The item after the mutation (or the removed item for `delete`)
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(originator_id: impl Into<String>, kind: EventKind, data: Value) -> Self {
        Self {
            originator_id: originator_id.into(),
            kind,
            data,
        }
    }

    /// Build an envelope from any serializable payload
    pub fn from_payload<T: Serialize>(
        originator_id: impl Into<String>,
        kind: EventKind,
        payload: &T,
    ) -> Result<Self, EnvelopeError> {
        let data = serde_json::to_value(payload)
            .map_err(|e| EnvelopeError::Serialization(e.to_string()))?;
        Ok(Self::new(originator_id, kind, data))
    }

    /// Parse client-submitted text into an envelope.
    ///
    /// The text is normalized first (see [`normalize_inbound`]).
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        let normalized = normalize_inbound(raw);
        serde_json::from_str(&normalized).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }

    /// Serialize once into a frame that can be shared across recipients
    pub fn encode(&self) -> Result<Frame, EnvelopeError> {
        serde_json::to_string(self)
            .map(Frame::from)
            .map_err(|e| EnvelopeError::Serialization(e.to_string()))
    }

    /// Whether a connection with `client_id` is the originator.
    ///
    /// Identities compare as plain strings, so an empty originator excludes
    /// connections that joined without a client id. Connections sharing a
    /// client id are all excluded together.
    pub fn excludes(&self, client_id: &str) -> bool {
        self.originator_id == client_id
    }
}

/// Flatten client text onto one line: newlines become spaces, then trim
pub fn normalize_inbound(raw: &str) -> String {
    raw.replace(['\r', '\n'], " ").trim().to_string()
}

/// Join queued frames into the payload of one physical write
pub fn join_frames(frames: &[Frame]) -> String {
    let capacity = frames.iter().map(|f| f.len() + 1).sum();
    let mut out = String::with_capacity(capacity);
    for (i, frame) in frames.iter().enumerate() {
        if i > 0 {
            out.push(FRAME_SEPARATOR);
        }
        out.push_str(frame);
    }
    out
}

/// Split a received text frame back into its envelopes
pub fn split_frames(text: &str) -> impl Iterator<Item = &str> {
    text.split(FRAME_SEPARATOR).filter(|part| !part.is_empty())
}

/// Errors produced while building or parsing envelopes
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
