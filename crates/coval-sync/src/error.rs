//! Sync errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// A message broke the wire rules (empty content, bad offsets).
    #[error("malformed sync message: {0}")]
    InvalidMessage(String),

    #[error("cannot encode or decode sync message: {0}")]
    EncodingError(String),

    /// The peer's channel is closed.
    #[error("peer channel: {0}")]
    TransportError(String),

    #[error(transparent)]
    CoreError(#[from] coval_core::CoreError),

    #[error(transparent)]
    PermsError(#[from] coval_perms::PermsError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
