//! Per-peer outgoing message queue.
//!
//! Each connected peer gets one sender task. Messages wait in three FIFO
//! lanes and the task always drains the highest non-empty lane first, with
//! exactly one push in flight at a time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use coval_core::{CoValueHeader, CoValueKind};

use crate::messages::{PeerId, SyncMessage};
use crate::peer::PeerOutgoing;

/// Delivery priority of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Groups and accounts go first since everything else depends on them.
    /// Opaque binary streams go last.
    pub fn for_header(header: Option<&CoValueHeader>) -> Self {
        match header {
            Some(h) if h.is_group() => Priority::High,
            Some(h) if h.kind == CoValueKind::Opaque => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

/// Handle to a peer's sender task.
///
/// Dropping the handle aborts the task and discards anything still queued.
pub struct OutgoingQueue {
    high: mpsc::UnboundedSender<SyncMessage>,
    medium: mpsc::UnboundedSender<SyncMessage>,
    low: mpsc::UnboundedSender<SyncMessage>,
    depth: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl OutgoingQueue {
    /// Spawn the sender task on the current runtime.
    pub fn spawn(peer_id: PeerId, outgoing: Box<dyn PeerOutgoing>) -> Self {
        let (high, mut high_rx) = mpsc::unbounded_channel();
        let (medium, mut medium_rx) = mpsc::unbounded_channel();
        let (low, mut low_rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));

        let task_depth = Arc::clone(&depth);
        let task = tokio::spawn(async move {
            loop {
                let msg: SyncMessage = tokio::select! {
                    biased;
                    Some(m) = high_rx.recv() => m,
                    Some(m) = medium_rx.recv() => m,
                    Some(m) = low_rx.recv() => m,
                    else => break,
                };
                task_depth.fetch_sub(1, Ordering::SeqCst);

                let action = msg.action();
                let id = msg.id();
                if let Err(e) = outgoing.push(msg).await {
                    warn!(peer = %peer_id, error = %e, "push failed, stopping sender");
                    break;
                }
                debug!(peer = %peer_id, action, covalue = %id, "sent");
            }
            outgoing.close().await;
        });

        Self {
            high,
            medium,
            low,
            depth,
            task,
        }
    }

    /// Queue a message. Returns `false` if the sender task has stopped.
    pub fn push(&self, msg: SyncMessage, priority: Priority) -> bool {
        let lane = match priority {
            Priority::High => &self.high,
            Priority::Medium => &self.medium,
            Priority::Low => &self.low,
        };
        self.depth.fetch_add(1, Ordering::SeqCst);
        if lane.send(msg).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Messages queued but not yet handed to the transport.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

impl Drop for OutgoingQueue {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for OutgoingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutgoingQueue")
            .field("depth", &self.depth())
            .finish()
    }
}
