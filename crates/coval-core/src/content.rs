//! Content messages: the payload of a `content` sync message.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::crypto::Ed25519Signature;
use crate::header::CoValueHeader;
use crate::transaction::Transaction;
use crate::types::{RawCoId, SessionId};

/// New transactions for one session, starting at `after`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionNewContent {
    pub after: u64,
    #[serde(rename = "newTransactions")]
    pub new_transactions: Vec<Transaction>,
    /// Signature over the session hash after the last of these transactions.
    #[serde(rename = "lastSignature")]
    pub last_signature: Ed25519Signature,
}

/// Header (if owed) plus per-session batches for one CoValue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContentMessage {
    pub id: RawCoId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<CoValueHeader>,
    pub new: BTreeMap<SessionId, SessionNewContent>,
}

impl NewContentMessage {
    pub fn empty(id: RawCoId) -> Self {
        Self {
            id,
            header: None,
            new: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_none() && self.new.is_empty()
    }

    pub fn transaction_count(&self) -> usize {
        self.new.values().map(|s| s.new_transactions.len()).sum()
    }
}
