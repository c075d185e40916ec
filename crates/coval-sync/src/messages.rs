//! Sync protocol message types.
//!
//! Four messages are exchanged per CoValue: `load` asks for a value while
//! announcing what the sender has, `known` announces a known state (or
//! corrects a wrong assumption), `content` carries a header and session
//! batches, and `done` ends interest in a value.

use serde::{Deserialize, Serialize};
use std::fmt;

use coval_core::{KnownState, NewContentMessage, RawCoId};

use crate::error::{Result, SyncError};

/// Identifier of a connected peer, unique per node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A `known` announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownMessage {
    /// Set when this value is announced because another value needs it.
    #[serde(
        rename = "asDependencyOf",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub as_dependency_of: Option<RawCoId>,
    /// Set when the receiver's assumption about our state was wrong.
    #[serde(rename = "isCorrection", default, skip_serializing_if = "is_false")]
    pub is_correction: bool,
    #[serde(flatten)]
    pub known: KnownState,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl KnownMessage {
    pub fn plain(known: KnownState) -> Self {
        Self {
            as_dependency_of: None,
            is_correction: false,
            known,
        }
    }

    pub fn correction(known: KnownState) -> Self {
        Self {
            as_dependency_of: None,
            is_correction: true,
            known,
        }
    }
}

/// Sync protocol messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum SyncMessage {
    /// Request a value, announcing what we already have.
    Load(KnownState),
    /// Announce what we have.
    Known(KnownMessage),
    /// Header and/or new transactions.
    Content(NewContentMessage),
    /// No longer interested in a value.
    Done { id: RawCoId },
}

impl SyncMessage {
    /// The CoValue this message is about.
    pub fn id(&self) -> RawCoId {
        match self {
            SyncMessage::Load(known) => known.id,
            SyncMessage::Known(msg) => msg.known.id,
            SyncMessage::Content(content) => content.id,
            SyncMessage::Done { id } => *id,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            SyncMessage::Load(_) => "load",
            SyncMessage::Known(_) => "known",
            SyncMessage::Content(_) => "content",
            SyncMessage::Done { .. } => "done",
        }
    }

    /// Reject structurally malformed messages before handling them.
    pub fn validate(&self) -> Result<()> {
        if let SyncMessage::Content(content) = self {
            if content.is_empty() {
                return Err(SyncError::InvalidMessage("empty content message".into()));
            }
            for (session, piece) in &content.new {
                if piece.new_transactions.is_empty() {
                    return Err(SyncError::InvalidMessage(format!(
                        "empty batch for session {session}"
                    )));
                }
                if piece.after.checked_add(piece.new_transactions.len() as u64).is_none() {
                    return Err(SyncError::InvalidMessage(format!(
                        "batch offset overflows for session {session}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Encode for the wire (CBOR).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| SyncError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    /// Decode from the wire.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| SyncError::EncodingError(e.to_string()))
    }
}
