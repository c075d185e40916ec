//! The local node: the unified API over logs, permissions and sync.
//!
//! A [`LocalNode`] owns one agent identity (optionally acting for an
//! account), a [`SyncManager`] holding every CoValue it knows, and the
//! derived caches (read keys, decrypted payloads, content views).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, warn};

use coval_core::{
    Change, CoValueHeader, CoValueKind, CoValueLog, KeyId, KnownState, ListenerId, LogConfig,
    MemberId, Privacy, RawCoId, Ruleset, SessionId, Transaction, TransactionId,
};
use coval_perms::{
    decrypt_changes, depended_on_covalues, determine_valid_transactions, encrypt_changes,
    get_current_read_key, get_read_key, key_recipients, resolve_agent, reveal_ops, rotation_ops,
    AgentSecret, GroupState, KeyHolder, MapOp, PermsError, ReadKeyCache, Role, X25519PublicKey,
};
use coval_sync::{CoValueTable, LoadStatus, Peer, SyncConfig, SyncManager};

use crate::content::{CoValueContent, ValidTransaction};
use crate::error::{NodeError, Result};

/// Source of `madeAt` timestamps, in milliseconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Configuration for a local node.
#[derive(Clone)]
pub struct NodeConfig {
    /// Checkpoint and pagination tuning for every log.
    pub log: LogConfig,
    /// Load timeouts, retries and hashing cadence.
    pub sync: SyncConfig,
    /// Clock used to stamp local transactions.
    pub clock: Clock,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            sync: SyncConfig::default(),
            clock: Arc::new(system_millis),
        }
    }
}

impl NodeConfig {
    pub fn with_clock(mut self, clock: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }
}

impl fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConfig")
            .field("log", &self.log)
            .field("sync", &self.sync)
            .finish_non_exhaustive()
    }
}

/// Handle for a content subscription.
///
/// `updates` carries the value's known state after every append, from
/// local writes and from sync alike.
#[derive(Debug)]
pub struct Subscription {
    pub covalue: RawCoId,
    pub updates: watch::Receiver<KnownState>,
    listener: ListenerId,
}

struct CachedContent {
    known: KnownState,
    group_known: Option<KnownState>,
    content: CoValueContent,
}

#[derive(Default)]
struct NodeCaches {
    last_made_at: u64,
    read_keys: ReadKeyCache,
    /// Plaintext of private transactions, keyed by ciphertext.
    decrypted: HashMap<RawCoId, HashMap<Bytes, Vec<Change>>>,
    content: HashMap<RawCoId, CachedContent>,
}

impl NodeCaches {
    /// Next local `madeAt`: the clock, but strictly increasing.
    fn next_made_at(&mut self, now: u64) -> u64 {
        let made_at = now.max(self.last_made_at + 1);
        self.last_made_at = made_at;
        made_at
    }
}

/// One node: an identity plus everything it has loaded.
///
/// Locks are always taken caches first, then the sync manager.
pub struct LocalNode {
    agent: AgentSecret,
    account: Option<RawCoId>,
    /// Session for ordinary writes, owned by the account if there is one.
    session_id: SessionId,
    /// Session owned by the bare agent, used for the account's own log.
    agent_session: SessionId,
    sync: Arc<SyncManager>,
    config: NodeConfig,
    caches: Mutex<NodeCaches>,
}

impl LocalNode {
    /// A node acting as a bare agent.
    pub fn new(agent: AgentSecret, config: NodeConfig) -> Self {
        let agent_session = SessionId::generate(MemberId::Agent(agent.agent_id()));
        let sync = SyncManager::new(config.sync.clone(), config.log.clone());
        Self {
            agent,
            account: None,
            session_id: agent_session,
            agent_session,
            sync,
            config,
            caches: Mutex::new(NodeCaches::default()),
        }
    }

    /// A node acting for a freshly created account.
    ///
    /// The account is a group administered by `agent`, with its own read
    /// key.
    pub fn with_new_account(agent: AgentSecret, config: NodeConfig) -> Result<Self> {
        let mut node = Self::new(agent, config);
        let header = CoValueHeader::new(
            CoValueKind::Comap,
            Ruleset::Group {
                initial_admin: MemberId::Agent(node.agent.agent_id()),
            },
        )
        .with_meta(json!({"type": "account"}))
        .with_random_uniqueness()
        .with_created_at((node.config.clock)());

        let account = node.create_covalue(header)?;
        node.account = Some(account);
        node.session_id = SessionId::generate(MemberId::Account(account));

        node.bootstrap_group(account)?;
        debug!(account = %account, "account created");
        Ok(node)
    }

    pub fn agent(&self) -> &AgentSecret {
        &self.agent
    }

    pub fn account_id(&self) -> Option<RawCoId> {
        self.account
    }

    /// The identity this node writes and is granted roles as.
    pub fn member_id(&self) -> MemberId {
        match self.account {
            Some(account) => MemberId::Account(account),
            None => MemberId::Agent(self.agent.agent_id()),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn sync(&self) -> &Arc<SyncManager> {
        &self.sync
    }

    pub fn add_peer(&self, peer: Peer) {
        self.sync.add_peer(peer);
    }

    fn lock_caches(&self) -> MutexGuard<'_, NodeCaches> {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn holder(&self) -> KeyHolder<'_> {
        KeyHolder::new(&self.agent, self.account)
    }

    /// The account's own log is written by its agent, everything else by
    /// the account.
    fn session_for(&self, header: &CoValueHeader) -> SessionId {
        if header.is_account() {
            self.agent_session
        } else {
            self.session_id
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Creation
    // ───────────────────────────────────────────────────────────────────────

    /// Register a CoValue with `header`. Creating the same header twice
    /// yields the same ID and leaves the existing log untouched.
    pub fn create_covalue(&self, header: CoValueHeader) -> Result<RawCoId> {
        let log = CoValueLog::new(header, self.config.log.clone())?;
        let id = log.id();
        if !self.sync.with_covalues(|table| table.dispatch_available(log)) {
            debug!(covalue = %id, "covalue already exists");
        }
        self.sync.sync_covalue(id);
        Ok(id)
    }

    /// Create a group administered by this node, with an initial read key.
    pub fn create_group(&self) -> Result<RawCoId> {
        let header = CoValueHeader::new(
            CoValueKind::Comap,
            Ruleset::Group {
                initial_admin: self.member_id(),
            },
        )
        .with_random_uniqueness()
        .with_created_at((self.config.clock)());
        let group = self.create_covalue(header)?;
        self.bootstrap_group(group)?;
        Ok(group)
    }

    /// Create a value of `kind` owned by `group`.
    pub fn create_owned(&self, kind: CoValueKind, group: RawCoId) -> Result<RawCoId> {
        let header = CoValueHeader::new(kind, Ruleset::OwnedByGroup { group })
            .with_random_uniqueness()
            .with_created_at((self.config.clock)());
        self.create_covalue(header)
    }

    fn bootstrap_group(&self, group: RawCoId) -> Result<()> {
        let me = self.member_id_for(&group);
        self.write_group(group, |_, _, _, _| {
            Ok((vec![MapOp::set(me.to_string(), Role::Admin.as_str())], ()))
        })?;
        self.rotate_read_key(group)?;
        Ok(())
    }

    /// The member this node appoints in `group`: the agent for its own
    /// account, the account everywhere else.
    fn member_id_for(&self, group: &RawCoId) -> MemberId {
        if Some(*group) == self.account {
            MemberId::Agent(self.agent.agent_id())
        } else {
            self.member_id()
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Writes
    // ───────────────────────────────────────────────────────────────────────

    /// Sign and append one transaction carrying `changes`.
    ///
    /// Private writes are encrypted under the owning group's current read
    /// key and fail if this node cannot resolve it. On success a sync pass
    /// is scheduled.
    pub fn make_transaction(
        &self,
        id: RawCoId,
        changes: Vec<Change>,
        privacy: Privacy,
    ) -> Result<TransactionId> {
        let mut guard = self.lock_caches();
        let caches = &mut *guard;
        let made_at = caches.next_made_at((self.config.clock)());

        let tx_id = self.sync.with_covalues(|table| -> Result<TransactionId> {
            let log = table.available(&id).ok_or(NodeError::NotLoaded(id))?;
            let session = self.session_for(log.header());
            let tx_id = TransactionId::new(session, log.session_len(&session));

            let tx = match privacy {
                Privacy::Trusting => Transaction::trusting(made_at, changes),
                Privacy::Private => {
                    let group = log.header().owning_group().ok_or(PermsError::NoReadKey(id))?;
                    let group_log = table.available(&group).ok_or(PermsError::Unavailable(group))?;
                    let state = GroupState::replay(group_log)?;
                    let key = get_current_read_key(&group, &state, &self.holder(), &mut caches.read_keys)
                        .ok_or(PermsError::NoReadKey(group))?;
                    let encrypted = encrypt_changes(&changes, &key.secret, &id, &tx_id)?;
                    caches
                        .decrypted
                        .entry(id)
                        .or_default()
                        .insert(encrypted.clone(), changes);
                    Transaction::Private {
                        made_at,
                        key_used: key.id,
                        encrypted_changes: encrypted,
                    }
                }
            };

            let log = table.available_mut(&id).ok_or(NodeError::NotLoaded(id))?;
            log.append_local(session, self.agent.signer(), vec![tx])?;
            Ok(tx_id)
        })?;
        drop(guard);

        debug!(covalue = %id, tx = ?tx_id, ?privacy, "local transaction");
        self.sync.sync_covalue(id);
        Ok(tx_id)
    }

    /// Append one trusting group transaction built from the group's state.
    ///
    /// The transaction is kept and synced even when the ruleset rejects
    /// it, in which case `NotAuthorized` is returned.
    fn write_group<T>(
        &self,
        group: RawCoId,
        build: impl FnOnce(&GroupState, &TransactionId, &CoValueTable, &mut ReadKeyCache) -> Result<(Vec<MapOp>, T)>,
    ) -> Result<T> {
        let mut guard = self.lock_caches();
        let caches = &mut *guard;
        let made_at = caches.next_made_at((self.config.clock)());

        let (tx_id, valid, out) = self.sync.with_covalues(|table| -> Result<_> {
            let log = table.available(&group).ok_or(NodeError::NotLoaded(group))?;
            if !log.header().is_group() {
                return Err(NodeError::NotAGroup(group));
            }
            let state = GroupState::replay(log)?;
            let session = self.session_for(log.header());
            let tx_id = TransactionId::new(session, log.session_len(&session));

            let (ops, out) = build(&state, &tx_id, table, &mut caches.read_keys)?;
            let changes = ops.iter().map(MapOp::to_change).collect();

            let log = table.available_mut(&group).ok_or(NodeError::NotLoaded(group))?;
            log.append_local(session, self.agent.signer(), vec![Transaction::trusting(made_at, changes)])?;
            let valid = GroupState::replay(log)?.is_valid(&tx_id);
            Ok((tx_id, valid, out))
        })?;
        drop(guard);

        self.sync.sync_covalue(group);
        if !valid {
            warn!(group = %group, tx = ?tx_id, "group write rejected by ruleset");
            return Err(NodeError::NotAuthorized(format!("transaction {tx_id:?} in group {group}")));
        }
        Ok(out)
    }

    /// Give `member` a role in `group`, revealing the current read key to
    /// them if the role reads or is an invite.
    pub fn add_member(&self, group: RawCoId, member: MemberId, role: Role) -> Result<()> {
        self.write_group(group, |state, tx_id, table, read_keys| {
            let mut ops = vec![MapOp::set(member.to_string(), role.as_str())];
            if role.can_read() || role.is_invite() {
                if let Some(key) = get_current_read_key(&group, state, &self.holder(), read_keys) {
                    let agent = resolve_agent(table, &member).ok_or_else(|| match member {
                        MemberId::Account(account) => NodeError::NotLoaded(account),
                        MemberId::Agent(_) => NodeError::NotLoaded(group),
                    })?;
                    let recipients = [(member, X25519PublicKey::from(&agent))];
                    ops.extend(reveal_ops(&group, tx_id, &self.agent, &key, &recipients)?);
                } else {
                    debug!(group = %group, member = %member, "no read key to reveal");
                }
            }
            Ok((ops, ()))
        })?;
        debug!(group = %group, member = %member, %role, "member added");
        Ok(())
    }

    /// Revoke `member` and rotate the read key so later private writes
    /// stay hidden from them.
    pub fn remove_member(&self, group: RawCoId, member: MemberId) -> Result<KeyId> {
        self.write_group(group, |_, _, _, _| {
            Ok((vec![MapOp::set(member.to_string(), Role::Revoked.as_str())], ()))
        })?;
        debug!(group = %group, member = %member, "member revoked");
        self.rotate_read_key(group)
    }

    /// Publish a fresh read key to every reading member, wrapping the
    /// previous key under it.
    pub fn rotate_read_key(&self, group: RawCoId) -> Result<KeyId> {
        let key_id = self.write_group(group, |state, tx_id, table, read_keys| {
            let previous = get_current_read_key(&group, state, &self.holder(), read_keys);
            let recipients = key_recipients(state, table);
            let (key, ops) = rotation_ops(&group, tx_id, &self.agent, &recipients, previous.as_ref())?;
            read_keys.insert(group, key.id, key.secret.clone());
            Ok((ops, key.id))
        })?;
        debug!(group = %group, key = %key_id, "read key rotated");
        Ok(key_id)
    }

    // ───────────────────────────────────────────────────────────────────────
    // Reads
    // ───────────────────────────────────────────────────────────────────────

    /// Valid transactions of `id` in content order, with private payloads
    /// decrypted. Transactions whose key this node cannot resolve are
    /// left out.
    pub fn valid_sorted_transactions(&self, id: RawCoId) -> Result<Vec<ValidTransaction>> {
        let mut guard = self.lock_caches();
        let caches = &mut *guard;
        self.sync
            .with_covalues(|table| self.valid_transactions_in(table, caches, &id))
    }

    fn valid_transactions_in(
        &self,
        table: &CoValueTable,
        caches: &mut NodeCaches,
        id: &RawCoId,
    ) -> Result<Vec<ValidTransaction>> {
        let log = table.available(id).ok_or(NodeError::NotLoaded(*id))?;
        let valid = determine_valid_transactions(log, table)?;

        let group = log.header().owning_group();
        let group_state = match group {
            Some(g) if valid.iter().any(|(_, tx)| tx.is_private()) => {
                table.available(&g).map(GroupState::replay).transpose()?
            }
            _ => None,
        };

        let holder = self.holder();
        let NodeCaches {
            read_keys,
            decrypted,
            ..
        } = caches;
        let decrypted = decrypted.entry(*id).or_default();

        let mut out = Vec::with_capacity(valid.len());
        for (tx_id, tx) in valid {
            let changes = match tx {
                Transaction::Trusting { changes, .. } => changes.clone(),
                Transaction::Private {
                    key_used,
                    encrypted_changes,
                    ..
                } => {
                    if let Some(changes) = decrypted.get(encrypted_changes) {
                        changes.clone()
                    } else {
                        let Some((group, state)) = group.zip(group_state.as_ref()) else {
                            debug!(covalue = %id, tx = ?tx_id, "private transaction without owning group");
                            continue;
                        };
                        let Some(secret) = get_read_key(&group, state, key_used, &holder, read_keys) else {
                            debug!(covalue = %id, tx = ?tx_id, key = %key_used, "read key unavailable");
                            continue;
                        };
                        match decrypt_changes(encrypted_changes, &secret, id, &tx_id) {
                            Ok(changes) => {
                                decrypted.insert(encrypted_changes.clone(), changes.clone());
                                changes
                            }
                            Err(e) => {
                                warn!(covalue = %id, tx = ?tx_id, error = %e, "cannot decrypt transaction");
                                continue;
                            }
                        }
                    }
                }
            };
            out.push(ValidTransaction {
                tx_id,
                made_at: tx.made_at(),
                changes,
            });
        }
        Ok(out)
    }

    /// The materialized view of `id`.
    ///
    /// Memoized until the value or its owning group changes.
    pub fn get_current_content(&self, id: RawCoId) -> Result<CoValueContent> {
        let mut guard = self.lock_caches();
        let caches = &mut *guard;
        self.sync.with_covalues(|table| {
            let log = table.available(&id).ok_or(NodeError::NotLoaded(id))?;
            let known = log.known_state();
            let group_known = log
                .header()
                .owning_group()
                .and_then(|g| table.available(&g))
                .map(CoValueLog::known_state);

            if let Some(cached) = caches.content.get(&id) {
                if cached.known == known && cached.group_known == group_known {
                    return Ok(cached.content.clone());
                }
            }

            let kind = log.header().kind;
            let txs = self.valid_transactions_in(table, caches, &id)?;
            let content = CoValueContent::build(kind, &txs);
            caches.content.insert(
                id,
                CachedContent {
                    known,
                    group_known,
                    content: content.clone(),
                },
            );
            Ok(content)
        })
    }

    /// Replayed state of a group.
    pub fn group_state(&self, group: RawCoId) -> Result<GroupState> {
        self.sync.with_covalues(|table| {
            let log = table.available(&group).ok_or(NodeError::NotLoaded(group))?;
            if !log.header().is_group() {
                return Err(NodeError::NotAGroup(group));
            }
            Ok(GroupState::replay(log)?)
        })
    }

    pub fn known_state(&self, id: RawCoId) -> Option<KnownState> {
        self.sync
            .with_covalues(|table| table.available(&id).map(CoValueLog::known_state))
    }

    pub fn header(&self, id: RawCoId) -> Option<CoValueHeader> {
        self.sync
            .with_covalues(|table| table.available(&id).map(|log| log.header().clone()))
    }

    // ───────────────────────────────────────────────────────────────────────
    // Subscriptions
    // ───────────────────────────────────────────────────────────────────────

    pub fn subscribe(&self, id: RawCoId) -> Result<Subscription> {
        self.sync.with_covalues(|table| {
            let log = table.available_mut(&id).ok_or(NodeError::NotLoaded(id))?;
            let (tx, rx) = watch::channel(log.known_state());
            let listener = log.subscribe(move |known| {
                tx.send_replace(known.clone());
            });
            Ok(Subscription {
                covalue: id,
                updates: rx,
                listener,
            })
        })
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.sync.with_covalues(|table| {
            table
                .available_mut(&subscription.covalue)
                .map_or(false, |log| log.unsubscribe(subscription.listener))
        })
    }

    // ───────────────────────────────────────────────────────────────────────
    // Loading
    // ───────────────────────────────────────────────────────────────────────

    /// Load `id` and everything needed to validate it from peers.
    pub async fn load(&self, id: RawCoId) -> Result<()> {
        let mut pending = vec![id];
        let mut seen = HashSet::new();
        while let Some(next) = pending.pop() {
            if !seen.insert(next) {
                continue;
            }
            if self.sync.load(next).await != LoadStatus::Available {
                return Err(NodeError::Unavailable(next));
            }
            let deps = self.sync.with_covalues(|table| {
                table
                    .available(&next)
                    .map(depended_on_covalues)
                    .unwrap_or_default()
            });
            pending.extend(deps);
        }
        Ok(())
    }
}

impl fmt::Debug for LocalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalNode")
            .field("agent", &self.agent.agent_id())
            .field("account", &self.account)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

fn system_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn ticking_config() -> NodeConfig {
        let now = Arc::new(AtomicU64::new(1_000));
        NodeConfig::default().with_clock(move || now.fetch_add(1, Ordering::SeqCst))
    }

    #[test]
    fn test_made_at_is_strictly_increasing() {
        let mut caches = NodeCaches::default();
        assert_eq!(caches.next_made_at(10), 10);
        assert_eq!(caches.next_made_at(10), 11);
        assert_eq!(caches.next_made_at(5), 12);
        assert_eq!(caches.next_made_at(100), 100);
    }

    #[test]
    fn test_new_account_is_admin_of_itself_with_key() {
        let node = LocalNode::with_new_account(AgentSecret::from_seed(&[1; 32]), ticking_config()).unwrap();
        let account = node.account_id().unwrap();

        let state = node.group_state(account).unwrap();
        let agent: MemberId = node.agent().agent_id().into();
        assert_eq!(state.role_of(&agent), Some(Role::Admin));
        assert!(state.read_key_id().is_some());
        assert!(node.header(account).unwrap().is_account());
        assert_eq!(node.member_id(), MemberId::Account(account));
    }

    #[test]
    fn test_private_write_roundtrip() {
        let node = LocalNode::with_new_account(AgentSecret::from_seed(&[2; 32]), ticking_config()).unwrap();
        let group = node.create_group().unwrap();
        let map = node.create_owned(CoValueKind::Comap, group).unwrap();

        node.make_transaction(map, vec![MapOp::set("secret", 42).to_change()], Privacy::Private)
            .unwrap();

        let content = node.get_current_content(map).unwrap();
        assert_eq!(content.as_map().unwrap().get("secret"), Some(&json!(42)));
    }

    #[test]
    fn test_private_write_without_group_fails() {
        let node = LocalNode::new(AgentSecret::from_seed(&[3; 32]), ticking_config());
        let id = node
            .create_covalue(CoValueHeader::new(CoValueKind::Comap, Ruleset::UnsafeAllowAll))
            .unwrap();

        let err = node
            .make_transaction(id, vec![MapOp::set("k", 1).to_change()], Privacy::Private)
            .unwrap_err();
        assert!(matches!(err, NodeError::Perms(PermsError::NoReadKey(_))));
        assert_eq!(node.known_state(id).unwrap().total_transactions(), 0);
    }

    #[test]
    fn test_content_cache_tracks_appends() {
        let node = LocalNode::new(AgentSecret::from_seed(&[4; 32]), ticking_config());
        let id = node
            .create_covalue(CoValueHeader::new(CoValueKind::Comap, Ruleset::UnsafeAllowAll))
            .unwrap();

        node.make_transaction(id, vec![MapOp::set("k", 1).to_change()], Privacy::Trusting)
            .unwrap();
        assert_eq!(node.get_current_content(id).unwrap().to_json(), json!({"k": 1}));

        node.make_transaction(id, vec![MapOp::set("k", 2).to_change()], Privacy::Trusting)
            .unwrap();
        assert_eq!(node.get_current_content(id).unwrap().to_json(), json!({"k": 2}));
    }

    #[test]
    fn test_create_covalue_is_idempotent() {
        let node = LocalNode::new(AgentSecret::from_seed(&[5; 32]), ticking_config());
        let header = CoValueHeader::new(CoValueKind::Costream, Ruleset::UnsafeAllowAll).with_uniqueness("u");
        let a = node.create_covalue(header.clone()).unwrap();
        node.make_transaction(a, vec![json!("x")], Privacy::Trusting).unwrap();
        let b = node.create_covalue(header).unwrap();

        assert_eq!(a, b);
        assert_eq!(node.known_state(a).unwrap().total_transactions(), 1);
    }

    #[test]
    fn test_subscription_sees_appends() {
        let node = LocalNode::new(AgentSecret::from_seed(&[6; 32]), ticking_config());
        let id = node
            .create_covalue(CoValueHeader::new(CoValueKind::Costream, Ruleset::UnsafeAllowAll))
            .unwrap();
        let mut sub = node.subscribe(id).unwrap();

        node.make_transaction(id, vec![json!(1)], Privacy::Trusting).unwrap();
        assert!(sub.updates.has_changed().unwrap());
        assert_eq!(sub.updates.borrow_and_update().total_transactions(), 1);

        assert!(node.unsubscribe(sub));
    }

    #[test]
    fn test_write_to_unknown_value_fails() {
        let node = LocalNode::new(AgentSecret::from_seed(&[7; 32]), ticking_config());
        let err = node
            .make_transaction(RawCoId([9; 32]), vec![], Privacy::Trusting)
            .unwrap_err();
        assert!(matches!(err, NodeError::NotLoaded(_)));
    }
}
