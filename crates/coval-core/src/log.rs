//! The per-CoValue transaction log.
//!
//! A [`CoValueLog`] holds the header and one [`SessionLog`] per writer.
//! Appends are all-or-nothing: the batch is folded into a cloned hash,
//! checked against the optional expected hash and the signature, and only
//! then committed. Validity under the ruleset is decided elsewhere; every
//! correctly signed transaction is stored.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, warn};

use crate::content::{NewContentMessage, SessionNewContent};
use crate::crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::error::{CoreError, Result};
use crate::header::CoValueHeader;
use crate::known_state::KnownState;
use crate::session::{PreparedAppend, SessionLog};
use crate::transaction::Transaction;
use crate::types::{RawCoId, SessionId, TransactionId};

/// Tuning for log checkpoints and content pagination.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Payload size after which a checkpoint signature is recorded, and
    /// after which a content message is closed and a new one started.
    pub max_recommended_tx_size: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_recommended_tx_size: 100 * 1024,
        }
    }
}

/// Handle returned by [`CoValueLog::subscribe`].
pub type ListenerId = u64;

type Listener = Box<dyn Fn(&KnownState) + Send + Sync>;

/// Append-only multi-session log of one CoValue.
pub struct CoValueLog {
    id: RawCoId,
    header: CoValueHeader,
    sessions: BTreeMap<SessionId, SessionLog>,
    config: LogConfig,
    listeners: BTreeMap<ListenerId, Listener>,
    next_listener: ListenerId,
}

impl CoValueLog {
    /// Create an empty log, deriving the ID from the header.
    pub fn new(header: CoValueHeader, config: LogConfig) -> Result<Self> {
        let id = header.id()?;
        Ok(Self::with_verified_id(id, header, config))
    }

    /// Create an empty log for a header received from a peer.
    pub fn from_header_with_id(
        id: RawCoId,
        header: CoValueHeader,
        config: LogConfig,
    ) -> Result<Self> {
        header.verify_id(&id)?;
        Ok(Self::with_verified_id(id, header, config))
    }

    fn with_verified_id(id: RawCoId, header: CoValueHeader, config: LogConfig) -> Self {
        Self {
            id,
            header,
            sessions: BTreeMap::new(),
            config,
            listeners: BTreeMap::new(),
            next_listener: 0,
        }
    }

    pub fn id(&self) -> RawCoId {
        self.id
    }

    pub fn header(&self) -> &CoValueHeader {
        &self.header
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    pub fn sessions(&self) -> &BTreeMap<SessionId, SessionLog> {
        &self.sessions
    }

    pub fn session(&self, session_id: &SessionId) -> Option<&SessionLog> {
        self.sessions.get(session_id)
    }

    /// Number of transactions stored for `session_id`.
    pub fn session_len(&self, session_id: &SessionId) -> u64 {
        self.session(session_id).map_or(0, SessionLog::len)
    }

    /// Every stored transaction, session by session.
    pub fn transactions(&self) -> impl Iterator<Item = (TransactionId, &Transaction)> + '_ {
        self.sessions.iter().flat_map(|(session_id, log)| {
            log.transactions()
                .iter()
                .enumerate()
                .map(move |(i, tx)| (TransactionId::new(*session_id, i as u64), tx))
        })
    }

    /// What this log holds. Counts include transactions the ruleset may
    /// later reject; they are still part of the signed chain.
    pub fn known_state(&self) -> KnownState {
        KnownState {
            id: self.id,
            header: true,
            sessions: self
                .sessions
                .iter()
                .map(|(id, log)| (*id, log.len()))
                .collect(),
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Appending
    // ───────────────────────────────────────────────────────────────────────

    /// Start a speculative append on a clone of the session's hash state.
    pub fn begin_append(&self, session_id: &SessionId) -> PreparedAppend {
        match self.session(session_id) {
            Some(log) => log.begin_append(),
            None => SessionLog::new().begin_append(),
        }
    }

    /// The session hash that appending `txs` would produce.
    pub fn expected_hash_after(
        &self,
        session_id: &SessionId,
        txs: &[Transaction],
    ) -> Result<Blake3Hash> {
        let mut prepared = self.begin_append(session_id);
        for tx in txs {
            prepared.push(tx)?;
        }
        Ok(prepared.digest())
    }

    /// Verify and append a batch signed by `signer`.
    ///
    /// On any error nothing is mutated.
    pub fn try_add_transactions(
        &mut self,
        session_id: SessionId,
        signer: &Ed25519PublicKey,
        txs: Vec<Transaction>,
        expected_hash: Option<&Blake3Hash>,
        signature: Ed25519Signature,
    ) -> Result<()> {
        let mut prepared = self.begin_append(&session_id);
        for tx in &txs {
            prepared.push(tx)?;
        }
        self.try_add_prepared(session_id, signer, txs, prepared, expected_hash, signature)
    }

    /// Append a batch whose hash was already folded, possibly in chunks.
    ///
    /// Fails with [`CoreError::ConcurrentAppend`] if the session grew since
    /// `prepared` was started.
    pub fn try_add_prepared(
        &mut self,
        session_id: SessionId,
        signer: &Ed25519PublicKey,
        txs: Vec<Transaction>,
        prepared: PreparedAppend,
        expected_hash: Option<&Blake3Hash>,
        signature: Ed25519Signature,
    ) -> Result<()> {
        if txs.is_empty() {
            return Err(CoreError::EmptyBatch(session_id));
        }

        let current_len = self.session_len(&session_id);
        if prepared.base_len != current_len || prepared.sizes.len() != txs.len() {
            return Err(CoreError::ConcurrentAppend {
                session: session_id,
                expected: prepared.base_len,
                found: current_len,
            });
        }

        let new_hash = prepared.digest();
        if let Some(expected) = expected_hash {
            if expected != &new_hash {
                warn!(covalue = %self.id, session = %session_id, "hash mismatch on append");
                return Err(CoreError::HashMismatch {
                    session: session_id,
                    expected: expected.to_hex(),
                    actual: new_hash.to_hex(),
                });
            }
        }

        if let Err(e) = signer.verify_hash(&new_hash, &signature) {
            warn!(covalue = %self.id, session = %session_id, "invalid signature on append");
            return Err(e);
        }

        let count = txs.len();
        let threshold = self.config.max_recommended_tx_size;
        self.sessions
            .entry(session_id)
            .or_default()
            .commit(prepared, txs, signature, threshold);

        debug!(covalue = %self.id, session = %session_id, count, "appended transactions");
        self.notify();
        Ok(())
    }

    /// Sign and append a batch from the local writer.
    pub fn append_local(
        &mut self,
        session_id: SessionId,
        keypair: &Keypair,
        txs: Vec<Transaction>,
    ) -> Result<()> {
        let mut prepared = self.begin_append(&session_id);
        for tx in &txs {
            prepared.push(tx)?;
        }
        let hash = prepared.digest();
        let signature = keypair.sign_hash(&hash);
        self.try_add_prepared(
            session_id,
            &keypair.public_key(),
            txs,
            prepared,
            Some(&hash),
            signature,
        )
    }

    // ───────────────────────────────────────────────────────────────────────
    // Diffing
    // ───────────────────────────────────────────────────────────────────────

    /// Content a party with `known` is missing, split into messages.
    ///
    /// Each session batch ends at a checkpoint or at the session's last
    /// signature, so every trailing signature is one the writer produced.
    /// Returns `None` if nothing is new and no header is owed.
    pub fn new_content_since(&self, known: Option<&KnownState>) -> Option<Vec<NewContentMessage>> {
        let header_owed = known.map_or(true, |k| !k.header);
        let max_size = self.config.max_recommended_tx_size;

        let mut messages = Vec::new();
        let mut current = NewContentMessage::empty(self.id);
        if header_owed {
            current.header = Some(self.header.clone());
        }
        let mut current_size = 0usize;

        for (session_id, log) in &self.sessions {
            let mut after = known.map_or(0, |k| k.count(session_id));

            while after < log.len() {
                let (end, signature) = match log.signature_after().range(after..).next() {
                    Some((&idx, &sig)) => (idx + 1, sig),
                    None => match log.last_signature() {
                        Some(sig) => (log.len(), sig),
                        None => break,
                    },
                };

                if current.new.contains_key(session_id) || current_size > max_size {
                    messages.push(std::mem::replace(
                        &mut current,
                        NewContentMessage::empty(self.id),
                    ));
                    current_size = 0;
                }

                current.new.insert(
                    *session_id,
                    SessionNewContent {
                        after,
                        new_transactions: log.transactions()[after as usize..end as usize]
                            .to_vec(),
                        last_signature: signature,
                    },
                );
                current_size += log.size_of(after, end);
                after = end;
            }
        }

        if !current.is_empty() {
            messages.push(current);
        }

        if messages.is_empty() {
            None
        } else {
            Some(messages)
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Subscriptions
    // ───────────────────────────────────────────────────────────────────────

    /// Register a listener called synchronously after every append.
    pub fn subscribe(&mut self, listener: impl Fn(&KnownState) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.insert(id, Box::new(listener));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    fn notify(&self) {
        if self.listeners.is_empty() {
            return;
        }
        let state = self.known_state();
        for listener in self.listeners.values() {
            listener(&state);
        }
    }
}

impl fmt::Debug for CoValueLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoValueLog")
            .field("id", &self.id)
            .field("kind", &self.header.kind)
            .field("sessions", &self.known_state().sessions)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
