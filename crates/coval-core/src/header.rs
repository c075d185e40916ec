//! CoValue headers and the rulesets they carry.
//!
//! A header is immutable. Its canonical encoding hashes to the CoValue's
//! [`RawCoId`], so two peers creating the same header get the same value.

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_bytes;
use crate::error::{CoreError, Result};
use crate::types::{MemberId, RawCoId};

/// Domain key for CoValue ID derivation.
const COVALUE_ID_DOMAIN: &str = "coval-covalue-id-v0";

/// The shape of content a CoValue materializes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoValueKind {
    Comap,
    Colist,
    Costream,
    Opaque,
}

/// Policy deciding which transactions of a CoValue are valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Ruleset {
    /// The value is itself a group; its content is a role map.
    Group {
        #[serde(rename = "initialAdmin")]
        initial_admin: MemberId,
    },
    /// Writes are gated by roles in the owning group.
    OwnedByGroup { group: RawCoId },
    /// Everything is valid.
    UnsafeAllowAll,
}

/// Immutable header of a CoValue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoValueHeader {
    #[serde(rename = "type")]
    pub kind: CoValueKind,
    pub ruleset: Ruleset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uniqueness: Option<String>,
}

impl CoValueHeader {
    pub fn new(kind: CoValueKind, ruleset: Ruleset) -> Self {
        Self {
            kind,
            ruleset,
            meta: None,
            created_at: None,
            uniqueness: None,
        }
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_created_at(mut self, created_at: u64) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_uniqueness(mut self, uniqueness: impl Into<String>) -> Self {
        self.uniqueness = Some(uniqueness.into());
        self
    }

    /// A random uniqueness nonce, for values that must not deduplicate.
    pub fn with_random_uniqueness(self) -> Self {
        let nonce: [u8; 12] = rand::random();
        self.with_uniqueness(hex::encode(nonce))
    }

    /// Derive the CoValue ID from the canonical header bytes.
    pub fn id(&self) -> Result<RawCoId> {
        let bytes = canonical_bytes(self)?;
        let mut hasher = blake3::Hasher::new_derive_key(COVALUE_ID_DOMAIN);
        hasher.update(&bytes);
        Ok(RawCoId(*hasher.finalize().as_bytes()))
    }

    /// Check that this header hashes to `id`.
    pub fn verify_id(&self, id: &RawCoId) -> Result<()> {
        if &self.id()? != id {
            return Err(CoreError::IdMismatch(*id));
        }
        Ok(())
    }

    /// Whether this header describes an account (a group with account meta).
    pub fn is_account(&self) -> bool {
        matches!(self.ruleset, Ruleset::Group { .. })
            && self
                .meta
                .as_ref()
                .and_then(|m| m.get("type"))
                .and_then(|t| t.as_str())
                == Some("account")
    }

    pub fn is_group(&self) -> bool {
        matches!(self.ruleset, Ruleset::Group { .. })
    }

    /// The group owning this value, if it is group-owned.
    pub fn owning_group(&self) -> Option<RawCoId> {
        match self.ruleset {
            Ruleset::OwnedByGroup { group } => Some(group),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn header() -> CoValueHeader {
        CoValueHeader::new(CoValueKind::Comap, Ruleset::UnsafeAllowAll)
    }

    #[test]
    fn test_identical_headers_share_id() {
        let a = header().with_created_at(10).with_uniqueness("u");
        let b = header().with_uniqueness("u").with_created_at(10);
        assert_eq!(a.id().unwrap(), b.id().unwrap());
    }

    #[test]
    fn test_uniqueness_changes_id() {
        let a = header().with_uniqueness("one");
        let b = header().with_uniqueness("two");
        assert_ne!(a.id().unwrap(), b.id().unwrap());
        assert_ne!(
            header().with_random_uniqueness().id().unwrap(),
            header().with_random_uniqueness().id().unwrap()
        );
    }

    #[test]
    fn test_verify_id() {
        let h = header();
        let id = h.id().unwrap();
        h.verify_id(&id).unwrap();
        assert!(matches!(
            h.verify_id(&RawCoId([0; 32])),
            Err(CoreError::IdMismatch(_))
        ));
    }

    #[test]
    fn test_ruleset_json_shape() {
        let h = CoValueHeader::new(
            CoValueKind::Colist,
            Ruleset::OwnedByGroup {
                group: RawCoId([1; 32]),
            },
        );
        let value = serde_json::to_value(&h).unwrap();
        assert_eq!(value["type"], "colist");
        assert_eq!(value["ruleset"]["type"], "ownedByGroup");
        assert!(value.get("meta").is_none());

        let unsafe_rules = serde_json::to_value(Ruleset::UnsafeAllowAll).unwrap();
        assert_eq!(unsafe_rules, json!({"type": "unsafeAllowAll"}));
    }

    #[test]
    fn test_header_cbor_roundtrip() {
        let h = header().with_meta(json!({"type": "account"}));
        let bytes = canonical_bytes(&h).unwrap();
        let back: CoValueHeader = crate::canonical::from_canonical_bytes(&bytes).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn test_account_detection() {
        let agent = crate::types::AgentId::new(
            crate::crypto::Keypair::from_seed(&[1; 32]).public_key(),
            [2; 32],
        );
        let group = CoValueHeader::new(
            CoValueKind::Comap,
            Ruleset::Group {
                initial_admin: agent.into(),
            },
        );
        assert!(!group.is_account());
        assert!(group.with_meta(json!({"type": "account"})).is_account());
    }
}
