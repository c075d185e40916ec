//! Symmetric encryption, sealing between agents, and agent secrets.
//!
//! Nonces are never random here: they are derived from a canonical
//! "nonce material" value that embeds the CoValue ID and transaction ID
//! the ciphertext lives in, so a given key never sees the same nonce twice.

use std::fmt;
use std::str::FromStr;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use serde::Serialize;
use x25519_dalek::{PublicKey, StaticSecret};

use coval_core::{canonical_bytes, AgentId, Keypair, KeyId};

use crate::error::{PermsError, Result};

const SEAL_DOMAIN: &str = "coval-seal-v0";

/// 96-bit ChaCha20-Poly1305 nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionNonce(pub [u8; 12]);

impl EncryptionNonce {
    /// Derive a nonce from the canonical encoding of `material`.
    pub fn from_material<T: Serialize + ?Sized>(material: &T) -> Result<Self> {
        let digest = blake3::hash(&canonical_bytes(material)?);
        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&digest.as_bytes()[..12]);
        Ok(Self(nonce))
    }
}

/// ChaCha20-Poly1305 key. Read keys and sealing keys are both this.
#[derive(Clone, PartialEq, Eq)]
pub struct KeySecret(pub [u8; 32]);

impl KeySecret {
    pub fn generate() -> Self {
        Self(rand::random())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }

    pub fn encrypt(&self, plaintext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        self.cipher()
            .encrypt(Nonce::from_slice(&nonce.0), plaintext)
            .map_err(|e| PermsError::EncryptionError(e.to_string()))
    }

    pub fn decrypt(&self, ciphertext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        self.cipher()
            .decrypt(Nonce::from_slice(&nonce.0), ciphertext)
            .map_err(|e| PermsError::DecryptionError(e.to_string()))
    }
}

impl fmt::Debug for KeySecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeySecret(..)")
    }
}

/// A read key: an ID plus its secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadKey {
    pub id: KeyId,
    pub secret: KeySecret,
}

impl ReadKey {
    pub fn generate() -> Self {
        Self {
            id: KeyId::generate(),
            secret: KeySecret::generate(),
        }
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Sealing
// ───────────────────────────────────────────────────────────────────────────

/// Sealing half of an agent ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct X25519PublicKey(pub [u8; 32]);

impl From<&AgentId> for X25519PublicKey {
    fn from(agent: &AgentId) -> Self {
        Self(agent.sealer)
    }
}

/// Sealing secret of an agent.
#[derive(Clone)]
pub struct X25519StaticSecret(StaticSecret);

impl X25519StaticSecret {
    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey(PublicKey::from(&self.0).to_bytes())
    }

    /// The key both sides of a seal agree on.
    fn shared_key(&self, peer: &X25519PublicKey) -> KeySecret {
        let shared = self.0.diffie_hellman(&PublicKey::from(peer.0));
        KeySecret(blake3::derive_key(SEAL_DOMAIN, shared.as_bytes()))
    }
}

/// A message sealed from one agent to another.
///
/// Carries the sender's sealer key so the recipient can redo the key
/// agreement. String form is `sealed_<hex(from || ciphertext)>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub from: X25519PublicKey,
    pub ciphertext: Vec<u8>,
}

impl fmt::Display for Sealed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sealed_{}{}", hex::encode(self.from.0), hex::encode(&self.ciphertext))
    }
}

impl FromStr for Sealed {
    type Err = PermsError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |why: String| PermsError::InvalidEncoding(why);
        let bytes = s
            .strip_prefix("sealed_")
            .ok_or_else(|| invalid(s.to_string()))
            .and_then(|h| hex::decode(h).map_err(|e| invalid(e.to_string())))?;
        if bytes.len() < 32 {
            return Err(invalid("sealed value too short".into()));
        }
        let (from, ciphertext) = bytes.split_at(32);
        let mut sender = [0u8; 32];
        sender.copy_from_slice(from);
        Ok(Self {
            from: X25519PublicKey(sender),
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Seal `message` so only the holder of `to`'s secret can read it.
pub fn seal<T: Serialize + ?Sized>(
    message: &[u8],
    from: &X25519StaticSecret,
    to: &X25519PublicKey,
    nonce_material: &T,
) -> Result<Sealed> {
    let nonce = EncryptionNonce::from_material(nonce_material)?;
    Ok(Sealed {
        from: from.public_key(),
        ciphertext: from.shared_key(to).encrypt(message, &nonce)?,
    })
}

/// Open a sealed message with the recipient's secret.
pub fn unseal<T: Serialize + ?Sized>(
    sealed: &Sealed,
    to: &X25519StaticSecret,
    nonce_material: &T,
) -> Result<Vec<u8>> {
    let nonce = EncryptionNonce::from_material(nonce_material)?;
    to.shared_key(&sealed.from).decrypt(&sealed.ciphertext, &nonce)
}

// ───────────────────────────────────────────────────────────────────────────
// Agents
// ───────────────────────────────────────────────────────────────────────────

/// The secret half of an agent: a signing keypair and a sealing secret.
#[derive(Clone)]
pub struct AgentSecret {
    signer: Keypair,
    sealer: X25519StaticSecret,
}

impl AgentSecret {
    pub fn generate() -> Self {
        Self::from_seed(&rand::random())
    }

    /// Deterministically derive both keys from one seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signer_seed = blake3::derive_key("coval-agent-signer-v0", seed);
        let sealer_seed = blake3::derive_key("coval-agent-sealer-v0", seed);
        Self {
            signer: Keypair::from_seed(&signer_seed),
            sealer: X25519StaticSecret(StaticSecret::from(sealer_seed)),
        }
    }

    pub fn signer(&self) -> &Keypair {
        &self.signer
    }

    pub fn sealer(&self) -> &X25519StaticSecret {
        &self.sealer
    }

    /// The public identity of this agent.
    pub fn agent_id(&self) -> AgentId {
        AgentId::new(self.signer.public_key(), self.sealer.public_key().0)
    }
}

impl fmt::Debug for AgentSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentSecret({:?})", self.agent_id())
    }
}
