//! # Coval Sync
//!
//! Peer-to-peer sync of CoValues.
//!
//! ## Overview
//!
//! Each node keeps a [`SyncManager`] owning its CoValue table and the state
//! of every connected peer. Peers exchange four messages per CoValue and
//! converge by sending each other whatever the other side's known state
//! lacks, always dependencies before the values that need them.
//!
//! ## Key Properties
//!
//! - **Dependency-first**: owning groups and member accounts are described
//!   to a peer before any value referencing them
//! - **Self-correcting**: a batch starting past what the receiver has is
//!   answered with a correction, and the sender resends from there
//! - **Serialized per peer**: one message in flight per peer, highest
//!   priority lane first
//!
//! ## Message Flow
//!
//! ```text
//! Client                              Server
//!   |-------- load (known state) ----->|
//!   |<------- known -------------------|
//!   |<------- content -----------------|
//!   |-------- known (ack) ------------>|
//!   |-------- content ---------------->|
//!   |<------- known (ack) -------------|
//! ```

pub mod error;
pub mod hashing;
pub mod manager;
pub mod messages;
pub mod peer;
pub mod queue;
pub mod state;

pub use error::{Result, SyncError};
pub use hashing::prepare_cooperatively;
pub use manager::{ContentOutcome, PeerStats, SyncConfig, SyncManager, SyncStats};
pub use messages::{KnownMessage, PeerId, SyncMessage};
pub use peer::{memory::connected_peers, Peer, PeerEvent, PeerOutgoing, PeerRole};
pub use queue::{OutgoingQueue, Priority};
pub use state::{CoValueState, CoValueTable, LoadStatus};
