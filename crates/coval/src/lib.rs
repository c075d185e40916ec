//! # Coval
//!
//! Local-first collaborative values: signed session logs, content-derived
//! permissions, rotating read keys and peer sync.
//!
//! ## Overview
//!
//! A CoValue is an append-only, content-addressed value (map, list, stream
//! or opaque bytes). Every writer appends to its own signed, hash-chained
//! session. Nodes exchange sessions with a small load/known/content/done
//! protocol and converge without coordination.
//!
//! ## Key Concepts
//!
//! - **Group**: a CoValue whose content is a role map. Values owned by a
//!   group accept writes only from its admins and writers.
//! - **Read key**: the group's symmetric key for private transactions,
//!   sealed to each reader and rotated when a member is removed.
//! - **Known state**: per-session transaction counts, the unit peers
//!   negotiate with.
//! - **Content**: a deterministic view built from the valid transactions
//!   in `(madeAt, sessionID, txIndex)` order.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use coval::{LocalNode, NodeConfig};
//! use coval::core::{CoValueKind, Privacy};
//! use coval::perms::{AgentSecret, MapOp};
//!
//! fn example() -> coval::Result<()> {
//!     let node = LocalNode::with_new_account(AgentSecret::generate(), NodeConfig::default())?;
//!
//!     let group = node.create_group()?;
//!     let map = node.create_owned(CoValueKind::Comap, group)?;
//!     node.make_transaction(map, vec![MapOp::set("title", "draft").to_change()], Privacy::Private)?;
//!
//!     let content = node.get_current_content(map)?;
//!     assert_eq!(content.to_json()["title"], "draft");
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `coval::core` - Logs, headers, transactions, known states
//! - `coval::perms` - Groups, roles, sealing and read keys
//! - `coval::sync` - Sync protocol, peers and the CoValue table

pub mod content;
pub mod error;
pub mod node;

pub use coval_core as core;
pub use coval_perms as perms;
pub use coval_sync as sync;

pub use content::{
    CoList, CoMap, CoStream, CoValueContent, ListOp, MapEdit, OpId, OpaqueContent, StreamItem,
    ValidTransaction,
};
pub use error::{NodeError, Result};
pub use node::{Clock, LocalNode, NodeConfig, Subscription};

pub use coval_core::{
    CoValueHeader, CoValueKind, KnownState, MemberId, Privacy, RawCoId, Ruleset, SessionId,
    TransactionId,
};
pub use coval_perms::{AgentSecret, MapOp, Role};
pub use coval_sync::{connected_peers, LoadStatus, Peer, PeerRole, SyncConfig};
