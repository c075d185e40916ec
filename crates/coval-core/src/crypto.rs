//! Hashing and session signatures.
//!
//! Blake3 addresses content and chains the transactions of a session
//! ([`StreamingHash`]). Ed25519 signs the chain digest under a domain
//! prefix; nothing else is ever signed.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::Serialize;

use crate::canonical::canonical_bytes;
use crate::error::{CoreError, Result};

/// Domain prefix for session signatures.
pub const SIGN_DOMAIN: &[u8] = b"coval-session-sig-v0:";

/// Domain key for streaming session hashes.
const STREAM_DOMAIN: &str = "coval-session-hash-v0";

pub(crate) fn decode_array<const N: usize>(hex_str: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(hex_str).map_err(|e| CoreError::InvalidId(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| CoreError::InvalidId(format!("expected {N} bytes")))
}

fn decode_prefixed<const N: usize>(s: &str, prefix: &str) -> Result<[u8; N]> {
    match s.strip_prefix(prefix) {
        Some(hex_part) => decode_array(hex_part),
        None => Err(CoreError::InvalidId(s.to_string())),
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Hashes
// ───────────────────────────────────────────────────────────────────────────

/// Blake3 digest, written `hash_<hex>`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Blake3Hash(pub [u8; 32]);

impl Blake3Hash {
    pub const ZERO: Self = Self([0; 32]);

    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Blake3Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blake3Hash({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for Blake3Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hash_{}", self.to_hex())
    }
}

impl FromStr for Blake3Hash {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        decode_prefixed(s, "hash_").map(Self)
    }
}

string_serde!(Blake3Hash);

/// First 16 bytes of a [`secure_hash`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShortHash(pub [u8; 16]);

/// Hash the canonical encoding of a value.
pub fn secure_hash<T: Serialize + ?Sized>(value: &T) -> Result<Blake3Hash> {
    Ok(Blake3Hash::hash(&canonical_bytes(value)?))
}

pub fn short_hash<T: Serialize + ?Sized>(value: &T) -> Result<ShortHash> {
    let full = secure_hash(value)?;
    let mut short = [0u8; 16];
    short.copy_from_slice(&full.0[..16]);
    Ok(ShortHash(short))
}

/// Rolling hash over every transaction of a session.
///
/// Each item is folded in as its length followed by its canonical bytes.
/// Clones are independent, so a clone can be used to preview the digest an
/// append would produce.
#[derive(Clone)]
pub struct StreamingHash {
    hasher: blake3::Hasher,
}

impl StreamingHash {
    pub fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new_derive_key(STREAM_DOMAIN),
        }
    }

    /// Fold one item into the chain. Returns the encoded size of the item.
    pub fn update<T: Serialize + ?Sized>(&mut self, item: &T) -> Result<usize> {
        let bytes = canonical_bytes(item)?;
        self.hasher.update(&(bytes.len() as u64).to_be_bytes());
        self.hasher.update(&bytes);
        Ok(bytes.len())
    }

    pub fn digest(&self) -> Blake3Hash {
        Blake3Hash(*self.hasher.finalize().as_bytes())
    }
}

impl Default for StreamingHash {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StreamingHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamingHash({:?})", self.digest())
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Session signatures
// ───────────────────────────────────────────────────────────────────────────

fn signing_message(hash: &Blake3Hash) -> Vec<u8> {
    [SIGN_DOMAIN, &hash.0[..]].concat()
}

/// Ed25519 verifying key of an agent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ed25519PublicKey(pub [u8; 32]);

impl Ed25519PublicKey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Check a session signature over the chain digest `hash`.
    pub fn verify_hash(&self, hash: &Blake3Hash, signature: &Ed25519Signature) -> Result<()> {
        let key = VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)?;
        key.verify(&signing_message(hash), &Signature::from_bytes(&signature.0))
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519PublicKey({})", hex::encode(&self.0[..8]))
    }
}

/// Signature over a session's last hash, written `signature_<hex>`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature(pub [u8; 64]);

impl Ed25519Signature {
    /// Placeholder that never verifies.
    pub const ZERO: Self = Self([0; 64]);
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Signature({}..)", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "signature_{}", hex::encode(self.0))
    }
}

impl FromStr for Ed25519Signature {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        decode_prefixed(s, "signature_").map(Self)
    }
}

string_serde!(Ed25519Signature);

/// Signing half of an agent.
#[derive(Clone)]
pub struct Keypair(SigningKey);

impl Keypair {
    pub fn generate() -> Self {
        Self(SigningKey::generate(&mut rand::thread_rng()))
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self(SigningKey::from_bytes(seed))
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.0.verifying_key().to_bytes())
    }

    /// Sign the chain digest `hash` of a session.
    pub fn sign_hash(&self, hash: &Blake3Hash) -> Ed25519Signature {
        Ed25519Signature(self.0.sign(&signing_message(hash)).to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.public_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_hash_verifies_only_its_hash() {
        let keypair = Keypair::from_seed(&[7; 32]);
        let hash = Blake3Hash::hash(b"state");
        let sig = keypair.sign_hash(&hash);

        keypair.public_key().verify_hash(&hash, &sig).unwrap();
        assert!(keypair
            .public_key()
            .verify_hash(&Blake3Hash::hash(b"other"), &sig)
            .is_err());
        assert!(Keypair::from_seed(&[8; 32])
            .public_key()
            .verify_hash(&hash, &sig)
            .is_err());
    }

    #[test]
    fn test_raw_signature_is_not_a_session_signature() {
        let hash = Blake3Hash::hash(b"state");
        let raw = SigningKey::from_bytes(&[7; 32]).sign(&hash.0);
        let keypair = Keypair::from_seed(&[7; 32]);
        let result = keypair
            .public_key()
            .verify_hash(&hash, &Ed25519Signature(raw.to_bytes()));
        assert!(matches!(result, Err(CoreError::InvalidSignature)));
    }

    #[test]
    fn test_seeded_keypairs_match() {
        assert_eq!(
            Keypair::from_seed(&[0x42; 32]).public_key(),
            Keypair::from_seed(&[0x42; 32]).public_key()
        );
        assert_ne!(Keypair::generate().public_key(), Keypair::generate().public_key());
    }

    #[test]
    fn test_streaming_hash_clone_is_speculative() {
        let mut real = StreamingHash::new();
        real.update("first").unwrap();
        let before = real.digest();

        let mut speculative = real.clone();
        speculative.update("second").unwrap();

        assert_eq!(real.digest(), before);
        assert_ne!(speculative.digest(), before);

        real.update("second").unwrap();
        assert_eq!(real.digest(), speculative.digest());
    }

    #[test]
    fn test_streaming_hash_is_order_sensitive() {
        let mut a = StreamingHash::new();
        a.update(&1u8).unwrap();
        a.update(&2u8).unwrap();

        let mut b = StreamingHash::new();
        b.update(&2u8).unwrap();
        b.update(&1u8).unwrap();

        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_secure_hash_ignores_key_order() {
        let a = serde_json::json!({"x": 1, "y": 2});
        let b = serde_json::json!({"y": 2, "x": 1});
        assert_eq!(secure_hash(&a).unwrap(), secure_hash(&b).unwrap());
        assert_eq!(short_hash(&a).unwrap(), short_hash(&b).unwrap());
        assert_eq!(short_hash(&a).unwrap().0, secure_hash(&a).unwrap().0[..16]);
    }

    #[test]
    fn test_string_forms_parse_back() {
        let hash = Blake3Hash::hash(b"x");
        assert_eq!(hash.to_string().parse::<Blake3Hash>().unwrap(), hash);

        let sig = Keypair::from_seed(&[1; 32]).sign_hash(&hash);
        assert_eq!(sig.to_string().parse::<Ed25519Signature>().unwrap(), sig);

        assert!("signature_00".parse::<Ed25519Signature>().is_err());
        assert!(hash.to_hex().parse::<Blake3Hash>().is_err());
    }
}
