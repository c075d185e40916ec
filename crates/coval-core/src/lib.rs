//! # Coval Core
//!
//! Pure primitives for coval: canonical encoding, signed session logs,
//! CoValue headers and known states.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`CoValueLog`] - Append-only multi-session log of one CoValue
//! - [`CoValueHeader`] - Immutable header whose hash is the [`RawCoId`]
//! - [`Transaction`] - Private or trusting change-set, stamped `madeAt`
//! - [`KnownState`] - Watermark of how much of a CoValue a party has seen
//! - [`StreamingHash`] - Rolling hash chaining a session's transactions
//!
//! ## Canonicalization
//!
//! Everything hashed or signed is encoded using deterministic CBOR. See the
//! [`canonical`] module.

#[macro_use]
mod macros;

pub mod canonical;
pub mod content;
pub mod crypto;
pub mod error;
pub mod header;
pub mod known_state;
pub mod log;
pub mod session;
pub mod transaction;
pub mod types;

pub use canonical::{canonical_bytes, from_canonical_bytes};
pub use content::{NewContentMessage, SessionNewContent};
pub use crypto::{
    secure_hash, short_hash, Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair, ShortHash,
    StreamingHash,
};
pub use error::{CoreError, Result};
pub use header::{CoValueHeader, CoValueKind, Ruleset};
pub use known_state::{combined_known_states, KnownState};
pub use log::{CoValueLog, ListenerId, LogConfig};
pub use session::{PreparedAppend, SessionLog};
pub use transaction::{Change, Privacy, Transaction};
pub use types::{AgentId, KeyId, MemberId, RawCoId, SessionId, TransactionId};
