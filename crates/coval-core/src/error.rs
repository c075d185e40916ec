//! Error types for coval core.

use thiserror::Error;

use crate::types::{RawCoId, SessionId};

/// Core errors that can occur while building, hashing or appending to logs.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("hash mismatch in session {session}: expected {expected}, got {actual}")]
    HashMismatch {
        session: SessionId,
        expected: String,
        actual: String,
    },

    #[error("unknown signer for session {0}")]
    UnknownSigner(SessionId),

    #[error("session {session} changed during append: expected {expected} transactions, found {found}")]
    ConcurrentAppend {
        session: SessionId,
        expected: u64,
        found: u64,
    },

    #[error("header does not hash to {0}")]
    IdMismatch(RawCoId),

    #[error("empty transaction batch for session {0}")]
    EmptyBatch(SessionId),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
