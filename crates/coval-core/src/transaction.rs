//! Transactions: the signed unit of change inside a session.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::KeyId;

/// A JSON-like change. Interpretation depends on the CoValue kind.
pub type Change = serde_json::Value;

/// One atomic change-set, either plaintext or encrypted under a read key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "privacy", rename_all = "camelCase")]
pub enum Transaction {
    Private {
        #[serde(rename = "madeAt")]
        made_at: u64,
        #[serde(rename = "keyUsed")]
        key_used: KeyId,
        #[serde(rename = "encryptedChanges")]
        encrypted_changes: Bytes,
    },
    Trusting {
        #[serde(rename = "madeAt")]
        made_at: u64,
        changes: Vec<Change>,
    },
}

impl Transaction {
    pub fn trusting(made_at: u64, changes: Vec<Change>) -> Self {
        Transaction::Trusting { made_at, changes }
    }

    pub fn made_at(&self) -> u64 {
        match self {
            Transaction::Private { made_at, .. } | Transaction::Trusting { made_at, .. } => *made_at,
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Transaction::Private { .. })
    }

    /// Plaintext changes, if this is a trusting transaction.
    pub fn trusting_changes(&self) -> Option<&[Change]> {
        match self {
            Transaction::Trusting { changes, .. } => Some(changes),
            Transaction::Private { .. } => None,
        }
    }
}

/// Which privacy a local write should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privacy {
    Private,
    Trusting,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::{canonical_bytes, from_canonical_bytes};
    use serde_json::json;

    #[test]
    fn test_trusting_json_shape() {
        let tx = Transaction::trusting(5, vec![json!({"op": "set", "key": "a", "value": 1})]);
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["privacy"], "trusting");
        assert_eq!(value["madeAt"], 5);
        assert_eq!(value["changes"][0]["key"], "a");
    }

    #[test]
    fn test_private_cbor_roundtrip() {
        let tx = Transaction::Private {
            made_at: 9,
            key_used: KeyId([7; 16]),
            encrypted_changes: Bytes::from_static(b"\x01\x02\x03"),
        };
        let bytes = canonical_bytes(&tx).unwrap();
        let back: Transaction = from_canonical_bytes(&bytes).unwrap();
        assert_eq!(back, tx);
        assert!(back.is_private());
        assert_eq!(back.made_at(), 9);
    }
}
