//! Permission, key and sealing errors.

use coval_core::{RawCoId, SessionId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PermsError {
    /// No read key is available to the local agent.
    #[error("no read key available for {0}")]
    NoReadKey(RawCoId),

    /// The CoValue a check depends on is not loaded.
    #[error("covalue not available: {0}")]
    Unavailable(RawCoId),

    /// The signer behind a session cannot be resolved.
    #[error("cannot resolve signer for session {0}")]
    UnknownSigner(SessionId),

    /// The value is not a group.
    #[error("not a group: {0}")]
    NotAGroup(RawCoId),

    #[error("encryption failed: {0}")]
    EncryptionError(String),

    /// Wrong key, wrong nonce material or tampered ciphertext.
    #[error("decryption failed: {0}")]
    DecryptionError(String),

    /// Malformed sealed or encrypted value.
    #[error("invalid encoded value: {0}")]
    InvalidEncoding(String),

    #[error(transparent)]
    CoreError(#[from] coval_core::CoreError),
}

pub type Result<T> = std::result::Result<T, PermsError>;
