//! Sync manager: per-node CoValue table, peer bookkeeping and the
//! load/known/content/done protocol.
//!
//! All state lives behind one mutex and every protocol step runs as a
//! single critical section. The only suspension points are peer I/O,
//! timers and the cooperative hashing of incoming batches, which happens
//! with the lock released.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, warn};

use coval_core::{
    CoValueLog, CoreError, Ed25519PublicKey, Ed25519Signature, KnownState, LogConfig,
    NewContentMessage, PreparedAppend, RawCoId, SessionId, Transaction,
};
use coval_perms::{depended_on_covalues, resolve_signer};

use crate::hashing::prepare_cooperatively;
use crate::messages::{KnownMessage, PeerId, SyncMessage};
use crate::peer::{Peer, PeerEvent, PeerRole};
use crate::queue::{OutgoingQueue, Priority};
use crate::state::{CoValueTable, LoadStatus};

/// Tuning knobs for loading and syncing.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long to wait for peers to answer one load pass.
    pub load_timeout: Duration,
    /// Total load passes, including the first.
    pub max_load_attempts: u32,
    /// Backoff before retry `n` is `retry_base_delay * retry_factor^n`.
    pub retry_base_delay: Duration,
    pub retry_factor: u32,
    /// Hashing of incoming batches yields after this much work.
    pub hashing_yield_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(30),
            max_load_attempts: 5,
            retry_base_delay: Duration::from_millis(100),
            retry_factor: 3,
            hashing_yield_interval: Duration::from_millis(1),
        }
    }
}

impl SyncConfig {
    /// Backoff before load attempt `attempt` (1-based for retries).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_base_delay
            .saturating_mul(self.retry_factor.saturating_pow(attempt))
    }
}

/// Diagnostics for one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStats {
    pub id: PeerId,
    pub role: PeerRole,
    pub priority: u8,
    /// Messages waiting in the outgoing queue.
    pub queued: usize,
}

/// Diagnostics for a sync manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Sync triggers collapsed into an already scheduled pass.
    pub suppressed_sync_requests: u64,
    /// Passes scheduled but not yet run.
    pub pending_syncs: usize,
    pub peers: Vec<PeerStats>,
}

/// What handling one `content` message did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentOutcome {
    /// The sender assumed we had transactions we don't.
    pub invalid_state_assumed: bool,
    /// Batches appended.
    pub applied: usize,
    /// Batches rejected (bad hash, bad signature, unknown signer).
    pub rejected: usize,
}

struct PeerState {
    role: PeerRole,
    priority: u8,
    queue: OutgoingQueue,
    /// What we believe the peer has, updated optimistically on send.
    known: HashMap<RawCoId, KnownState>,
    /// Values whose known state we already announced.
    told: HashSet<RawCoId>,
    /// Values for which the peer sent content we could not apply.
    errored: HashSet<RawCoId>,
    /// Values the peer asked us for.
    interested: HashSet<RawCoId>,
}

impl PeerState {
    fn new(role: PeerRole, priority: u8, queue: OutgoingQueue) -> Self {
        Self {
            role,
            priority,
            queue,
            known: HashMap::new(),
            told: HashSet::new(),
            errored: HashSet::new(),
            interested: HashSet::new(),
        }
    }

    fn wants(&self, id: &RawCoId) -> bool {
        !self.errored.contains(id)
            && (self.role.is_source() || self.interested.contains(id) || self.known.contains_key(id))
    }
}

struct SyncState {
    covalues: CoValueTable,
    peers: BTreeMap<PeerId, PeerState>,
    /// Running load loops. Each sender publishes the loop's final status.
    loading: HashMap<RawCoId, watch::Sender<Option<LoadStatus>>>,
    pending_sync: HashSet<RawCoId>,
    suppressed: u64,
}

/// A batch that passed the offset and signer checks, waiting to be hashed.
struct PendingBatch {
    session: SessionId,
    signer: Ed25519PublicKey,
    txs: Vec<Transaction>,
    prepared: PreparedAppend,
    signature: Ed25519Signature,
}

/// Drives sync for one local node.
pub struct SyncManager {
    state: Mutex<SyncState>,
    config: SyncConfig,
    log_config: LogConfig,
}

impl SyncManager {
    pub fn new(config: SyncConfig, log_config: LogConfig) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SyncState {
                covalues: CoValueTable::new(),
                peers: BTreeMap::new(),
                loading: HashMap::new(),
                pending_sync: HashSet::new(),
                suppressed: 0,
            }),
            config,
            log_config,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn log_config(&self) -> &LogConfig {
        &self.log_config
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the CoValue table in one critical section.
    ///
    /// `f` must not call back into the manager.
    pub fn with_covalues<R>(&self, f: impl FnOnce(&mut CoValueTable) -> R) -> R {
        f(&mut self.lock().covalues)
    }

    /// Load status of `id`. Stays `Loading` between retries.
    pub fn status(&self, id: &RawCoId) -> LoadStatus {
        let state = self.lock();
        match state.covalues.status(id) {
            LoadStatus::Available => LoadStatus::Available,
            _ if state.loading.contains_key(id) => LoadStatus::Loading,
            status => status,
        }
    }

    /// What we believe `peer` has of `id`.
    pub fn peer_known_state(&self, peer: &PeerId, id: &RawCoId) -> Option<KnownState> {
        self.lock().peers.get(peer)?.known.get(id).cloned()
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.lock().peers.keys().cloned().collect()
    }

    pub fn stats(&self) -> SyncStats {
        let state = self.lock();
        SyncStats {
            suppressed_sync_requests: state.suppressed,
            pending_syncs: state.pending_sync.len(),
            peers: state
                .peers
                .iter()
                .map(|(id, p)| PeerStats {
                    id: id.clone(),
                    role: p.role,
                    priority: p.priority,
                    queued: p.queue.depth(),
                })
                .collect(),
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Peers
    // ───────────────────────────────────────────────────────────────────────

    /// Start serving `peer`. Must be called inside a tokio runtime.
    ///
    /// Server and storage peers are immediately asked for everything we
    /// hold, dependencies first.
    pub fn add_peer(self: &Arc<Self>, peer: Peer) {
        let Peer {
            id,
            mut incoming,
            outgoing,
            role,
            priority,
            crash_on_close,
        } = peer;

        let queue = OutgoingQueue::spawn(id.clone(), outgoing);
        {
            let mut state = self.lock();
            if state.peers.contains_key(&id) {
                warn!(peer = %id, "replacing existing peer");
            }
            state
                .peers
                .insert(id.clone(), PeerState::new(role, priority, queue));

            if role.is_source() {
                let mut ids = state.covalues.available_ids();
                ids.sort();
                let mut visited = HashSet::new();
                for covalue in ids {
                    state.subscribe_including_dependencies(&id, covalue, &mut visited);
                }
            }
        }
        debug!(peer = %id, ?role, priority, "peer added");

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = incoming.recv().await {
                match event {
                    PeerEvent::Message(msg) => manager.handle_message(&id, msg).await,
                    PeerEvent::Disconnected => break,
                    PeerEvent::PingTimeout => {
                        warn!(peer = %id, "ping timeout");
                        break;
                    }
                }
            }
            if crash_on_close {
                error!(peer = %id, "connection to critical peer closed");
            }
            manager.remove_peer(&id);
        });
    }

    /// Forget `peer`: pending loads stop waiting on it and its queue is
    /// discarded.
    pub fn remove_peer(&self, peer: &PeerId) {
        let mut state = self.lock();
        for id in state.covalues.loading_from(peer) {
            state.covalues.dispatch_not_found(&id, peer);
        }
        if state.peers.remove(peer).is_some() {
            debug!(peer = %peer, "peer removed");
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Outgoing sync
    // ───────────────────────────────────────────────────────────────────────

    /// Schedule a sync pass for `id`.
    ///
    /// Requests made before the scheduled pass runs collapse into it.
    /// Outside a runtime the pass runs immediately.
    pub fn sync_covalue(self: &Arc<Self>, id: RawCoId) {
        {
            let mut state = self.lock();
            if !state.pending_sync.insert(id) {
                state.suppressed += 1;
                return;
            }
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let manager = Arc::clone(self);
                handle.spawn(async move { manager.flush_sync(id) });
            }
            Err(_) => self.flush_sync(id),
        }
    }

    fn flush_sync(&self, id: RawCoId) {
        let mut state = self.lock();
        state.pending_sync.remove(&id);
        state.run_sync(id);
    }

    // ───────────────────────────────────────────────────────────────────────
    // Loading
    // ───────────────────────────────────────────────────────────────────────

    /// Load `id` from peers unless already available.
    ///
    /// Concurrent calls share one load: later callers join the running
    /// retry loop and get its final status.
    pub async fn load(self: &Arc<Self>, id: RawCoId) -> LoadStatus {
        let joined = {
            let mut state = self.lock();
            if state.covalues.status(&id) == LoadStatus::Available {
                return LoadStatus::Available;
            }
            match state.loading.get(&id) {
                Some(done) => Some(done.subscribe()),
                None => {
                    let (done, _) = watch::channel(None);
                    state.loading.insert(id, done);
                    None
                }
            }
        };

        if let Some(mut done) = joined {
            debug!(covalue = %id, "joining running load");
            return match done.wait_for(Option::is_some).await {
                Ok(outcome) => (*outcome).unwrap_or(LoadStatus::Unavailable),
                Err(_) => self.status(&id),
            };
        }

        let _finish = LoadFinish { manager: self, id };
        self.load_from_peers(id).await
    }

    async fn load_from_peers(self: &Arc<Self>, id: RawCoId) -> LoadStatus {
        for attempt in 0..self.config.max_load_attempts {
            if attempt > 0 {
                let mut rx = self.lock().covalues.subscribe(id);
                let delay = self.config.retry_delay(attempt);
                let arrived =
                    tokio::time::timeout(delay, rx.wait_for(|s| *s == LoadStatus::Available))
                        .await;
                if matches!(arrived, Ok(Ok(_))) {
                    return LoadStatus::Available;
                }
            }

            let (peers, mut rx) = {
                let mut state = self.lock();
                if state.covalues.status(&id) == LoadStatus::Available {
                    return LoadStatus::Available;
                }
                let peers: Vec<PeerId> = state
                    .peers
                    .iter()
                    .filter(|(_, p)| !p.errored.contains(&id))
                    .filter(|(_, p)| {
                        if attempt == 0 {
                            p.role.is_source()
                        } else {
                            p.role == PeerRole::Server
                        }
                    })
                    .map(|(pid, _)| pid.clone())
                    .collect();
                if peers.is_empty() {
                    debug!(covalue = %id, attempt, "no peers to load from");
                    break;
                }

                state.covalues.start_loading(id, peers.iter().cloned());
                for peer in &peers {
                    state.send_to(peer, SyncMessage::Load(KnownState::empty(id)));
                }
                (peers, state.covalues.subscribe(id))
            };
            debug!(covalue = %id, attempt, peers = peers.len(), "loading");

            let settled = tokio::time::timeout(
                self.config.load_timeout,
                rx.wait_for(|s| *s != LoadStatus::Loading),
            )
            .await;
            if settled.is_err() {
                warn!(covalue = %id, attempt, "load timed out");
                let mut state = self.lock();
                for peer in &peers {
                    state.covalues.dispatch_not_found(&id, peer);
                }
            }

            if self.status(&id) == LoadStatus::Available {
                return LoadStatus::Available;
            }
        }

        let mut state = self.lock();
        state.covalues.mark_unavailable(id);
        state.covalues.status(&id)
    }

    // ───────────────────────────────────────────────────────────────────────
    // Incoming messages
    // ───────────────────────────────────────────────────────────────────────

    /// Handle one message from `from`.
    pub async fn handle_message(self: &Arc<Self>, from: &PeerId, msg: SyncMessage) {
        if let Err(e) = msg.validate() {
            warn!(peer = %from, error = %e, "dropping malformed message");
            return;
        }
        debug!(peer = %from, action = msg.action(), covalue = %msg.id(), "received");

        match msg {
            SyncMessage::Load(known) => self.handle_load(from, known),
            SyncMessage::Known(known) => self.handle_known(from, known),
            SyncMessage::Content(content) => {
                self.handle_content(from, content).await;
            }
            SyncMessage::Done { id } => self.handle_done(from, id),
        }
    }

    fn handle_load(self: &Arc<Self>, from: &PeerId, known: KnownState) {
        let id = known.id;
        let mut state = self.lock();
        let Some(peer) = state.peers.get_mut(from) else {
            return;
        };
        peer.known.insert(id, known);
        peer.interested.insert(id);
        peer.told.remove(&id);

        if state.covalues.available(&id).is_some() {
            let mut visited = HashSet::new();
            state.sync_to_peer(from, id, None, &mut visited);
            return;
        }

        let can_ask_others = state
            .peers
            .iter()
            .any(|(pid, p)| pid != from && p.role.is_source() && !p.errored.contains(&id));
        if !can_ask_others {
            state.send_to(from, SyncMessage::Known(KnownMessage::plain(KnownState::empty(id))));
            return;
        }
        drop(state);

        let manager = Arc::clone(self);
        let from = from.clone();
        tokio::spawn(async move {
            if manager.load(id).await == LoadStatus::Available {
                let mut state = manager.lock();
                let mut visited = HashSet::new();
                state.sync_to_peer(&from, id, None, &mut visited);
            } else {
                manager
                    .lock()
                    .send_to(&from, SyncMessage::Known(KnownMessage::plain(KnownState::empty(id))));
            }
        });
    }

    fn handle_known(&self, from: &PeerId, msg: KnownMessage) {
        let id = msg.known.id;
        let mut state = self.lock();
        let Some(peer) = state.peers.get_mut(from) else {
            return;
        };

        if msg.is_correction {
            debug!(peer = %from, covalue = %id, "peer corrected our assumption");
            peer.known.insert(id, msg.known.clone());
        } else {
            peer.known
                .entry(id)
                .and_modify(|k| k.combine_with(&msg.known))
                .or_insert_with(|| msg.known.clone());
        }

        if !msg.known.header && state.covalues.is_waiting_on(&id, from) {
            state.covalues.dispatch_not_found(&id, from);
        }

        if state.covalues.available(&id).is_some() {
            let mut visited = HashSet::new();
            state.sync_to_peer(from, id, None, &mut visited);
        }
    }

    /// Apply a `content` message and acknowledge it.
    ///
    /// Batches starting beyond what we have are skipped and answered with a
    /// correction. Overlap with what we have is sliced off.
    pub async fn handle_content(self: &Arc<Self>, from: &PeerId, msg: NewContentMessage) -> ContentOutcome {
        let id = msg.id;
        let mut outcome = ContentOutcome::default();

        let pending = {
            let mut state = self.lock();
            if !state.peers.contains_key(from) {
                return outcome;
            }

            if state.covalues.available(&id).is_none() {
                let Some(header) = msg.header.clone() else {
                    debug!(peer = %from, covalue = %id, "content for unknown covalue without header");
                    outcome.invalid_state_assumed = true;
                    state.send_to(
                        from,
                        SyncMessage::Known(KnownMessage::correction(KnownState::empty(id))),
                    );
                    return outcome;
                };
                match CoValueLog::from_header_with_id(id, header, self.log_config.clone()) {
                    Ok(log) => {
                        state.covalues.dispatch_available(log);
                    }
                    Err(e) => {
                        warn!(peer = %from, covalue = %id, error = %e, "rejecting header");
                        state.mark_errored(from, id);
                        return outcome;
                    }
                }
            }

            let mut pending = Vec::new();
            let mut unknown_signer = false;
            if let Some(log) = state.covalues.available(&id) {
                for (session, piece) in &msg.new {
                    let local = log.session_len(session);
                    if piece.after > local {
                        debug!(
                            peer = %from, covalue = %id, session = %session,
                            after = piece.after, local, "gap in incoming batch"
                        );
                        outcome.invalid_state_assumed = true;
                        continue;
                    }
                    let overlap = (local - piece.after) as usize;
                    if overlap >= piece.new_transactions.len() {
                        continue;
                    }
                    match resolve_signer(&state.covalues, session) {
                        Ok(signer) => pending.push(PendingBatch {
                            session: *session,
                            signer,
                            txs: piece.new_transactions[overlap..].to_vec(),
                            prepared: log.begin_append(session),
                            signature: piece.last_signature,
                        }),
                        Err(e) => {
                            warn!(peer = %from, covalue = %id, error = %e, "cannot resolve signer");
                            outcome.rejected += 1;
                            unknown_signer = true;
                        }
                    }
                }
            }
            if unknown_signer {
                state.mark_errored(from, id);
            }
            pending
        };

        let mut hashed = Vec::with_capacity(pending.len());
        for batch in pending {
            match prepare_cooperatively(
                batch.prepared.clone(),
                &batch.txs,
                self.config.hashing_yield_interval,
            )
            .await
            {
                Ok(prepared) => hashed.push(PendingBatch { prepared, ..batch }),
                Err(e) => {
                    warn!(peer = %from, covalue = %id, error = %e, "cannot hash batch");
                    outcome.rejected += 1;
                }
            }
        }

        {
            let mut state = self.lock();
            let mut failed = outcome.rejected > 0;
            if let Some(log) = state.covalues.available_mut(&id) {
                for batch in hashed {
                    let session = batch.session;
                    match log.try_add_prepared(
                        batch.session,
                        &batch.signer,
                        batch.txs,
                        batch.prepared,
                        None,
                        batch.signature,
                    ) {
                        Ok(()) => outcome.applied += 1,
                        Err(CoreError::ConcurrentAppend { .. }) => {
                            debug!(covalue = %id, session = %session, "session grew while hashing");
                            outcome.invalid_state_assumed = true;
                        }
                        Err(e) => {
                            warn!(peer = %from, covalue = %id, session = %session, error = %e, "rejecting batch");
                            outcome.rejected += 1;
                            failed = true;
                        }
                    }
                }
            }
            if failed {
                state.mark_errored(from, id);
            }

            let Some(local) = state.covalues.available(&id).map(CoValueLog::known_state) else {
                return outcome;
            };

            if outcome.invalid_state_assumed {
                state.send_to(from, SyncMessage::Known(KnownMessage::correction(local)));
                return outcome;
            }

            if let Some(peer) = state.peers.get_mut(from) {
                let mut sent = KnownState::empty(id);
                sent.header = true;
                for (session, piece) in &msg.new {
                    sent.sessions
                        .insert(*session, piece.after + piece.new_transactions.len() as u64);
                }
                peer.known
                    .entry(id)
                    .and_modify(|k| k.combine_with(&sent))
                    .or_insert(sent);
            }
            state.send_to(from, SyncMessage::Known(KnownMessage::plain(local)));
        }

        self.sync_covalue(id);
        outcome
    }

    fn handle_done(&self, from: &PeerId, id: RawCoId) {
        if let Some(peer) = self.lock().peers.get_mut(from) {
            peer.interested.remove(&id);
        }
    }
}

/// Ends a load loop, also when the loading future is dropped: settles the
/// value and wakes joined callers with the outcome.
struct LoadFinish<'a> {
    manager: &'a SyncManager,
    id: RawCoId,
}

impl Drop for LoadFinish<'_> {
    fn drop(&mut self) {
        let mut state = self.manager.lock();
        state.covalues.mark_unavailable(self.id);
        let status = state.covalues.status(&self.id);
        if let Some(done) = state.loading.remove(&self.id) {
            done.send_replace(Some(status));
        }
    }
}

impl SyncState {
    fn send_to(&self, peer_id: &PeerId, msg: SyncMessage) {
        let Some(peer) = self.peers.get(peer_id) else {
            return;
        };
        let header = self.covalues.available(&msg.id()).map(CoValueLog::header);
        let priority = Priority::for_header(header);
        if !peer.queue.push(msg, priority) {
            warn!(peer = %peer_id, "peer sender stopped");
        }
    }

    fn mark_errored(&mut self, peer_id: &PeerId, id: RawCoId) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.errored.insert(id);
        }
    }

    /// Sync `id` to every peer that wants it, highest priority first.
    fn run_sync(&mut self, id: RawCoId) {
        if self.covalues.available(&id).is_none() {
            return;
        }
        let mut targets: Vec<(u8, PeerId)> = self
            .peers
            .iter()
            .filter(|(_, p)| p.wants(&id))
            .map(|(pid, p)| (p.priority, pid.clone()))
            .collect();
        targets.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, peer) in targets {
            let mut visited = HashSet::new();
            self.sync_to_peer(&peer, id, None, &mut visited);
        }
    }

    /// Send `id` to `peer`, after everything it depends on.
    fn sync_to_peer(
        &mut self,
        peer: &PeerId,
        id: RawCoId,
        as_dependency_of: Option<RawCoId>,
        visited: &mut HashSet<RawCoId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        let Some(log) = self.covalues.available(&id) else {
            return;
        };
        for dep in depended_on_covalues(log) {
            self.sync_to_peer(peer, dep, Some(id), visited);
        }
        self.tell_untold_known_state(peer, id, as_dependency_of);
        self.send_new_content(peer, id);
    }

    /// Ask a source peer for `id` and its dependencies, dependencies first.
    fn subscribe_including_dependencies(
        &mut self,
        peer: &PeerId,
        id: RawCoId,
        visited: &mut HashSet<RawCoId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        let Some(log) = self.covalues.available(&id) else {
            return;
        };
        let known = log.known_state();
        for dep in depended_on_covalues(log) {
            self.subscribe_including_dependencies(peer, dep, visited);
        }
        let Some(state) = self.peers.get_mut(peer) else {
            return;
        };
        if state.told.insert(id) {
            self.send_to(peer, SyncMessage::Load(known));
        }
    }

    /// Announce our known state for `id` once per peer.
    ///
    /// A source peer that has never heard of `id` from us gets a `load`,
    /// which also subscribes us to its updates.
    fn tell_untold_known_state(&mut self, peer: &PeerId, id: RawCoId, as_dependency_of: Option<RawCoId>) {
        let Some(known) = self.covalues.available(&id).map(CoValueLog::known_state) else {
            return;
        };
        let Some(state) = self.peers.get_mut(peer) else {
            return;
        };
        if !state.told.insert(id) {
            return;
        }
        let msg = if state.role.is_source() && !state.known.contains_key(&id) {
            SyncMessage::Load(known)
        } else {
            SyncMessage::Known(KnownMessage {
                as_dependency_of,
                is_correction: false,
                known,
            })
        };
        self.send_to(peer, msg);
    }

    /// Send what `peer` is missing and assume it will have it.
    fn send_new_content(&mut self, peer: &PeerId, id: RawCoId) {
        let Some(log) = self.covalues.available(&id) else {
            return;
        };
        let Some(state) = self.peers.get(peer) else {
            return;
        };
        let Some(pieces) = log.new_content_since(state.known.get(&id)) else {
            return;
        };
        let local = log.known_state();

        debug!(peer = %peer, covalue = %id, messages = pieces.len(), "sending content");
        for piece in pieces {
            self.send_to(peer, SyncMessage::Content(piece));
        }
        if let Some(state) = self.peers.get_mut(peer) {
            state
                .known
                .entry(id)
                .and_modify(|k| k.combine_with(&local))
                .or_insert(local);
        }
    }
}

impl std::fmt::Debug for SyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
