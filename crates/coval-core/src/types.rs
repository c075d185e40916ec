//! Strong type definitions for coval.
//!
//! All identifiers are newtypes with a prefixed string form (`co_…`,
//! `agent_…`, `…_session_…`, `key_…`). The string form is what travels on
//! the wire and what gets hashed, so parsing and printing must round-trip.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::crypto::{decode_array, Ed25519PublicKey};
use crate::error::{CoreError, Result};

/// A 32-byte CoValue identifier, the content hash of its header.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawCoId(pub [u8; 32]);

impl RawCoId {
    /// Create a new RawCoId from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string (without the `co_` prefix).
    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self(decode_array(s)?))
    }
}

impl fmt::Debug for RawCoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawCoId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for RawCoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "co_{}", self.to_hex())
    }
}

impl FromStr for RawCoId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let hex_part = s
            .strip_prefix("co_")
            .ok_or_else(|| CoreError::InvalidId(s.to_string()))?;
        Self::from_hex(hex_part)
    }
}

impl AsRef<[u8]> for RawCoId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for RawCoId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

string_serde!(RawCoId);

/// A cryptographic identity: a signing key plus a sealing key.
///
/// The sealer is kept as raw X25519 bytes here; sealing itself lives in
/// the permissions crate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId {
    pub signer: Ed25519PublicKey,
    pub sealer: [u8; 32],
}

impl AgentId {
    pub fn new(signer: Ed25519PublicKey, sealer: [u8; 32]) -> Self {
        Self { signer, sealer }
    }
}

impl fmt::Debug for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentId({})", &self.signer.to_hex()[..16])
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "agent_{}_{}",
            self.signer.to_hex(),
            hex::encode(self.sealer)
        )
    }
}

impl FromStr for AgentId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("agent_")
            .ok_or_else(|| CoreError::InvalidId(s.to_string()))?;
        let (signer, sealer) = rest
            .split_once('_')
            .ok_or_else(|| CoreError::InvalidId(s.to_string()))?;
        Ok(Self {
            signer: Ed25519PublicKey(decode_array(signer)?),
            sealer: decode_array(sealer)?,
        })
    }
}

string_serde!(AgentId);

/// Anyone who can hold a role or own a session: a bare agent or an account.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberId {
    Agent(AgentId),
    Account(RawCoId),
}

impl MemberId {
    pub fn as_agent(&self) -> Option<&AgentId> {
        match self {
            MemberId::Agent(agent) => Some(agent),
            MemberId::Account(_) => None,
        }
    }

    pub fn as_account(&self) -> Option<&RawCoId> {
        match self {
            MemberId::Account(id) => Some(id),
            MemberId::Agent(_) => None,
        }
    }
}

impl fmt::Debug for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberId::Agent(agent) => write!(f, "{agent:?}"),
            MemberId::Account(id) => write!(f, "Account({})", &id.to_hex()[..16]),
        }
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberId::Agent(agent) => write!(f, "{agent}"),
            MemberId::Account(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for MemberId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        if s.starts_with("agent_") {
            Ok(MemberId::Agent(s.parse()?))
        } else if s.starts_with("co_") {
            Ok(MemberId::Account(s.parse()?))
        } else {
            Err(CoreError::InvalidId(s.to_string()))
        }
    }
}

impl From<AgentId> for MemberId {
    fn from(agent: AgentId) -> Self {
        MemberId::Agent(agent)
    }
}

string_serde!(MemberId);

/// One writer's session: an owner plus a per-device nonce.
///
/// Ordering matches the ordering of the string form, which is what makes
/// `(madeAt, sessionID, txIndex)` a total order every peer agrees on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId {
    pub owner: MemberId,
    pub nonce: [u8; 8],
}

impl SessionId {
    pub fn new(owner: MemberId, nonce: [u8; 8]) -> Self {
        Self { owner, nonce }
    }

    /// A fresh session for `owner` with a random nonce.
    pub fn generate(owner: MemberId) -> Self {
        Self {
            owner,
            nonce: rand::random(),
        }
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session({:?}/{})", self.owner, hex::encode(self.nonce))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_session_{}", self.owner, hex::encode(self.nonce))
    }
}

impl FromStr for SessionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let (owner, nonce) = s
            .rsplit_once("_session_")
            .ok_or_else(|| CoreError::InvalidId(s.to_string()))?;
        Ok(Self {
            owner: owner.parse()?,
            nonce: decode_array(nonce)?,
        })
    }
}

string_serde!(SessionId);

/// Stable reference to one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId {
    #[serde(rename = "sessionID")]
    pub session_id: SessionId,
    #[serde(rename = "txIndex")]
    pub tx_index: u64,
}

impl TransactionId {
    pub fn new(session_id: SessionId, tx_index: u64) -> Self {
        Self {
            session_id,
            tx_index,
        }
    }
}

/// Identifier of a read key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(pub [u8; 16]);

impl KeyId {
    /// A fresh random key ID.
    pub fn generate() -> Self {
        Self(rand::random())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self.to_hex())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key_{}", self.to_hex())
    }
}

impl FromStr for KeyId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let hex_part = s
            .strip_prefix("key_")
            .ok_or_else(|| CoreError::InvalidId(s.to_string()))?;
        Ok(Self(decode_array(hex_part)?))
    }
}

string_serde!(KeyId);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    fn agent(seed: u8) -> AgentId {
        AgentId::new(Keypair::from_seed(&[seed; 32]).public_key(), [seed; 32])
    }

    #[test]
    fn test_co_id_string_roundtrip() {
        let id = RawCoId::from_bytes([0x42; 32]);
        let s = id.to_string();
        assert!(s.starts_with("co_4242"));
        assert_eq!(s.parse::<RawCoId>().unwrap(), id);
    }

    #[test]
    fn test_agent_session_roundtrip() {
        let session = SessionId::new(agent(1).into(), [9; 8]);
        let s = session.to_string();
        assert!(s.starts_with("agent_"));
        assert!(s.ends_with("_session_0909090909090909"));
        assert_eq!(s.parse::<SessionId>().unwrap(), session);
    }

    #[test]
    fn test_account_session_roundtrip() {
        let session = SessionId::new(MemberId::Account(RawCoId([3; 32])), [1; 8]);
        let parsed: SessionId = session.to_string().parse().unwrap();
        assert_eq!(parsed, session);
        assert!(parsed.owner.as_account().is_some());
    }

    #[test]
    fn test_session_order_matches_string_order() {
        let mut sessions = vec![
            SessionId::new(MemberId::Account(RawCoId([1; 32])), [0; 8]),
            SessionId::new(agent(2).into(), [5; 8]),
            SessionId::new(agent(2).into(), [1; 8]),
            SessionId::new(agent(7).into(), [0; 8]),
        ];
        let mut by_string = sessions.clone();
        sessions.sort();
        by_string.sort_by_key(|s| s.to_string());
        assert_eq!(sessions, by_string);
    }

    #[test]
    fn test_rejects_bad_prefix() {
        assert!("xo_00".parse::<RawCoId>().is_err());
        assert!("key_zz".parse::<KeyId>().is_err());
        assert!("co_abcd".parse::<RawCoId>().is_err());
    }

    #[test]
    fn test_transaction_id_json_shape() {
        let id = TransactionId::new(SessionId::new(agent(1).into(), [0; 8]), 3);
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json["txIndex"], 3);
        assert!(json["sessionID"].as_str().unwrap().contains("_session_"));
    }
}
