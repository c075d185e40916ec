//! Error types for a local node.

use coval_core::{CoreError, RawCoId};
use coval_perms::PermsError;
use coval_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Log or signature error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Permission or encryption error.
    #[error("permission error: {0}")]
    Perms(#[from] PermsError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// The CoValue is not loaded on this node.
    #[error("covalue not loaded: {0}")]
    NotLoaded(RawCoId),

    /// No peer could provide the CoValue.
    #[error("covalue unavailable: {0}")]
    Unavailable(RawCoId),

    /// The CoValue is not a group.
    #[error("not a group: {0}")]
    NotAGroup(RawCoId),

    /// The write was recorded but the ruleset rejects it.
    #[error("not authorized: {0}")]
    NotAuthorized(String),
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
