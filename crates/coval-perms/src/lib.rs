//! # Coval Permissions
//!
//! Groups, roles and read keys, all derived from CoValue content.
//!
//! ## Overview
//!
//! A group is a CoValue whose map content assigns roles to members. There
//! is no mutable permission table: the role map is recomputed by replaying
//! the group's trusting transactions, and every other CoValue's validity is
//! checked against that replay at each transaction's `madeAt`.
//!
//! ## Encryption Model
//!
//! Private transactions use a two-layer key model:
//!
//! 1. **Read Key**: a symmetric key (ChaCha20-Poly1305) that encrypts changes
//! 2. **Revelations**: the read key is sealed to each member via X25519
//!
//! Rotating the read key after a member is revoked keeps new content away
//! from them. Older keys are wrapped under newer ones so current members
//! can still read history.

pub mod change;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod read_key;
pub mod state;

pub use change::{GroupKey, MapOp, Role};
pub use crypto::{
    seal, unseal, AgentSecret, KeySecret, ReadKey, Sealed, X25519PublicKey, X25519StaticSecret,
};
pub use envelope::{decrypt_changes, encrypt_changes};
pub use error::{PermsError, Result};
pub use read_key::{
    get_current_read_key, get_read_key, key_recipients, reveal_ops, rotation_ops, KeyHolder,
    ReadKeyCache,
};
pub use state::{
    depended_on_covalues, determine_valid_transactions, resolve_agent, resolve_signer,
    CoValueResolver, GroupState,
};
