//! Peer abstraction for the sync protocol.
//!
//! A transport hands the sync manager a [`Peer`]: a stream of incoming
//! events plus an outgoing sink. WebSocket, HTTP or in-process transports
//! all reduce to this shape.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::messages::{PeerId, SyncMessage};

/// What a peer is to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerRole {
    /// Source of truth we subscribe to and retry against.
    Server,
    /// Persistence peer; asked on first load, not retried.
    Storage,
    /// Served on request, never asked.
    Client,
}

impl PeerRole {
    /// Whether values are loaded from peers with this role.
    pub fn is_source(self) -> bool {
        matches!(self, PeerRole::Server | PeerRole::Storage)
    }
}

/// Something that happened on a peer connection.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    Message(SyncMessage),
    Disconnected,
    PingTimeout,
}

/// Sending half of a peer connection.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait PeerOutgoing: Send + Sync {
    /// Deliver one message. Resolves once the transport accepted it.
    async fn push(&self, message: SyncMessage) -> Result<()>;

    /// Close the connection.
    async fn close(&self);
}

/// A connected peer.
pub struct Peer {
    pub id: PeerId,
    pub incoming: mpsc::Receiver<PeerEvent>,
    pub outgoing: Box<dyn PeerOutgoing>,
    pub role: PeerRole,
    /// Higher priority peers are synced first.
    pub priority: u8,
    /// Treat the connection closing as fatal for this node.
    pub crash_on_close: bool,
}

impl Peer {
    pub fn new(
        id: impl Into<PeerId>,
        incoming: mpsc::Receiver<PeerEvent>,
        outgoing: Box<dyn PeerOutgoing>,
        role: PeerRole,
    ) -> Self {
        Self {
            id: id.into(),
            incoming,
            outgoing,
            role,
            priority: 0,
            crash_on_close: false,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_crash_on_close(mut self, crash_on_close: bool) -> Self {
        self.crash_on_close = crash_on_close;
        self
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("priority", &self.priority)
            .finish()
    }
}

/// A simple in-memory transport for testing.
///
/// Uses channels to simulate a connection between two nodes. Messages are
/// encoded to the wire format and decoded again on every push, so the
/// serialization path is exercised too.
pub mod memory {
    use super::*;
    use crate::error::SyncError;

    /// Channel capacity for each direction.
    const CHANNEL_CAPACITY: usize = 1024;

    /// Outgoing half backed by the other side's incoming channel.
    pub struct ChannelOutgoing {
        tx: mpsc::Sender<PeerEvent>,
    }

    impl ChannelOutgoing {
        pub fn new(tx: mpsc::Sender<PeerEvent>) -> Self {
            Self { tx }
        }
    }

    #[async_trait]
    impl PeerOutgoing for ChannelOutgoing {
        async fn push(&self, message: SyncMessage) -> Result<()> {
            let wire = message.to_bytes()?;
            let decoded = SyncMessage::from_bytes(&wire)?;
            self.tx
                .send(PeerEvent::Message(decoded))
                .await
                .map_err(|_| SyncError::TransportError("peer disconnected".into()))
        }

        async fn close(&self) {
            // The other side may already be gone.
            let _ = self.tx.send(PeerEvent::Disconnected).await;
        }
    }

    /// Connect two nodes.
    ///
    /// Returns `(peer_b_for_a, peer_a_for_b)`: hand the first to node A (it
    /// represents B with `b_role`) and the second to node B.
    pub fn connected_peers(
        a_id: impl Into<PeerId>,
        b_id: impl Into<PeerId>,
        a_role: PeerRole,
        b_role: PeerRole,
    ) -> (Peer, Peer) {
        let (to_a, a_incoming) = mpsc::channel(CHANNEL_CAPACITY);
        let (to_b, b_incoming) = mpsc::channel(CHANNEL_CAPACITY);

        let b_for_a = Peer::new(
            b_id,
            a_incoming,
            Box::new(ChannelOutgoing::new(to_b)),
            b_role,
        );
        let a_for_b = Peer::new(
            a_id,
            b_incoming,
            Box::new(ChannelOutgoing::new(to_a)),
            a_role,
        );
        (b_for_a, a_for_b)
    }
}

#[cfg(test)]
mod tests {
    use super::memory::connected_peers;
    use super::*;
    use coval_core::RawCoId;

    #[tokio::test]
    async fn test_memory_peers_deliver_both_ways() {
        let (mut b_for_a, mut a_for_b) =
            connected_peers("a", "b", PeerRole::Client, PeerRole::Server);
        assert_eq!(b_for_a.id, PeerId::from("b"));
        assert_eq!(b_for_a.role, PeerRole::Server);
        assert_eq!(a_for_b.role, PeerRole::Client);

        let msg = SyncMessage::Done { id: RawCoId([1; 32]) };
        b_for_a.outgoing.push(msg.clone()).await.unwrap();
        assert_eq!(a_for_b.incoming.recv().await, Some(PeerEvent::Message(msg.clone())));

        a_for_b.outgoing.push(msg.clone()).await.unwrap();
        assert_eq!(b_for_a.incoming.recv().await, Some(PeerEvent::Message(msg)));
    }

    #[tokio::test]
    async fn test_close_signals_disconnect() {
        let (b_for_a, mut a_for_b) = connected_peers("a", "b", PeerRole::Client, PeerRole::Server);
        b_for_a.outgoing.close().await;
        assert_eq!(a_for_b.incoming.recv().await, Some(PeerEvent::Disconnected));
    }
}
