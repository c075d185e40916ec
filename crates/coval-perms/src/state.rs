//! Permission state computation.
//!
//! Group state is computed by replaying a group's trusting transactions in
//! `(madeAt, sessionID, txIndex)` order. Each transaction is checked against
//! the roles in force when it was made; a transaction with any invalid
//! change is rejected whole. Rejected transactions stay in the log but never
//! affect roles, keys or content.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use coval_core::{
    AgentId, CoValueLog, Ed25519PublicKey, KeyId, MemberId, RawCoId, Ruleset, SessionId,
    Transaction, TransactionId,
};
use tracing::{debug, warn};

use crate::change::{GroupKey, MapOp, Role};
use crate::error::{PermsError, Result};

/// Lookup of other CoValues by ID.
///
/// Permission checks follow references by ID through this trait rather
/// than holding pointers between logs.
pub trait CoValueResolver {
    fn get_log(&self, id: &RawCoId) -> Option<&CoValueLog>;
}

impl CoValueResolver for HashMap<RawCoId, CoValueLog> {
    fn get_log(&self, id: &RawCoId) -> Option<&CoValueLog> {
        self.get(id)
    }
}

impl CoValueResolver for BTreeMap<RawCoId, CoValueLog> {
    fn get_log(&self, id: &RawCoId) -> Option<&CoValueLog> {
        self.get(id)
    }
}

/// A group map entry as last written by a valid transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupEntry {
    pub value: serde_json::Value,
    pub tx_id: TransactionId,
    pub made_at: u64,
}

/// One point in a member's role history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleChange {
    pub made_at: u64,
    pub tx_id: TransactionId,
    pub role: Role,
}

/// Materialized state of a group.
#[derive(Debug, Clone, Default)]
pub struct GroupState {
    roles: BTreeMap<MemberId, Role>,
    history: BTreeMap<MemberId, Vec<RoleChange>>,
    entries: BTreeMap<String, GroupEntry>,
    read_key: Option<KeyId>,
    valid: BTreeSet<TransactionId>,
}

/// All trusting and private transactions of a log in content order.
pub fn sorted_transactions(log: &CoValueLog) -> Vec<(TransactionId, &Transaction)> {
    let mut txs: Vec<_> = log.transactions().collect();
    txs.sort_by_key(|(id, tx)| (tx.made_at(), id.session_id, id.tx_index));
    txs
}

impl GroupState {
    /// Replay a group log.
    pub fn replay(log: &CoValueLog) -> Result<Self> {
        let initial_admin = match &log.header().ruleset {
            Ruleset::Group { initial_admin } => *initial_admin,
            _ => return Err(PermsError::NotAGroup(log.id())),
        };

        let mut state = GroupState::default();
        for (tx_id, tx) in sorted_transactions(log) {
            let changes = match tx {
                Transaction::Trusting { changes, .. } => changes,
                Transaction::Private { .. } => {
                    debug!(group = %log.id(), tx = ?tx_id, "private transaction in group ignored");
                    continue;
                }
            };

            let transactor = tx_id.session_id.owner;
            match state.check_transaction(&initial_admin, &transactor, changes) {
                Ok(ops) => state.apply(tx_id, tx.made_at(), ops),
                Err(reason) => {
                    warn!(group = %log.id(), tx = ?tx_id, reason, "invalid group transaction");
                }
            }
        }
        Ok(state)
    }

    /// Validate every change of one transaction against the state so far,
    /// including earlier changes of the same transaction.
    fn check_transaction(
        &self,
        initial_admin: &MemberId,
        transactor: &MemberId,
        changes: &[coval_core::Change],
    ) -> std::result::Result<Vec<MapOp>, &'static str> {
        let mut scratch = self.roles.clone();
        let mut added_by_invite: Option<MemberId> = None;
        let mut ops = Vec::with_capacity(changes.len());

        for change in changes {
            let op = MapOp::from_change(change).ok_or("malformed change")?;
            let own_role = scratch.get(transactor).copied();

            match (&op, GroupKey::parse(op.key())) {
                (MapOp::Set { value, .. }, GroupKey::Member(target)) => {
                    let role = value
                        .as_str()
                        .and_then(|s| s.parse::<Role>().ok())
                        .ok_or("member value is not a role")?;

                    let bootstrap = scratch.is_empty()
                        && transactor == initial_admin
                        && &target == transactor
                        && role == Role::Admin;

                    if bootstrap {
                        // first admin appoints itself
                    } else if own_role == Some(Role::Admin) {
                        if scratch.get(&target) == Some(&Role::Admin) && &target != transactor {
                            return Err("admins cannot change other admins");
                        }
                    } else if let Some(max) = own_role.and_then(Role::invite_grants) {
                        if added_by_invite.is_some() {
                            return Err("invite used for more than one member");
                        }
                        if scratch.contains_key(&target) {
                            return Err("invite cannot change an existing member");
                        }
                        if role.is_invite() || role == Role::Revoked || role.level() > max.level() {
                            return Err("invite cannot grant this role");
                        }
                        added_by_invite = Some(target);
                    } else {
                        return Err("transactor may not set roles");
                    }
                    scratch.insert(target, role);
                }
                (MapOp::Set { value, .. }, GroupKey::ReadKey) => {
                    if own_role != Some(Role::Admin) {
                        return Err("only admins set the read key");
                    }
                    value
                        .as_str()
                        .and_then(|s| s.parse::<KeyId>().ok())
                        .ok_or("read key value is not a key id")?;
                }
                (MapOp::Set { .. }, GroupKey::Revelation { to, .. }) => {
                    let allowed = own_role == Some(Role::Admin)
                        || (own_role.map_or(false, Role::is_invite)
                            && added_by_invite == Some(to));
                    if !allowed {
                        return Err("transactor may not reveal keys");
                    }
                }
                (MapOp::Set { .. }, GroupKey::KeyWrap { .. })
                | (MapOp::Set { .. }, GroupKey::Other(_)) => {
                    if own_role != Some(Role::Admin) {
                        return Err("only admins write group entries");
                    }
                }
                (MapOp::Del { .. }, GroupKey::Member(_)) => {
                    return Err("members are revoked, not deleted");
                }
                (MapOp::Del { .. }, _) => {
                    if own_role != Some(Role::Admin) {
                        return Err("only admins delete group entries");
                    }
                }
            }
            ops.push(op);
        }
        Ok(ops)
    }

    fn apply(&mut self, tx_id: TransactionId, made_at: u64, ops: Vec<MapOp>) {
        for op in ops {
            match op {
                MapOp::Set { key, value } => {
                    match GroupKey::parse(&key) {
                        GroupKey::Member(member) => {
                            if let Some(role) = value.as_str().and_then(|s| s.parse().ok()) {
                                self.roles.insert(member, role);
                                self.history.entry(member).or_default().push(RoleChange {
                                    made_at,
                                    tx_id,
                                    role,
                                });
                            }
                        }
                        GroupKey::ReadKey => {
                            self.read_key = value.as_str().and_then(|s| s.parse().ok());
                        }
                        _ => {}
                    }
                    self.entries.insert(
                        key,
                        GroupEntry {
                            value,
                            tx_id,
                            made_at,
                        },
                    );
                }
                MapOp::Del { key } => {
                    if key == crate::change::READ_KEY {
                        self.read_key = None;
                    }
                    self.entries.remove(&key);
                }
            }
        }
        self.valid.insert(tx_id);
    }

    /// Current role of `member`.
    pub fn role_of(&self, member: &MemberId) -> Option<Role> {
        self.roles.get(member).copied()
    }

    /// Role of `member` as of `made_at` (inclusive).
    pub fn role_at(&self, member: &MemberId, made_at: u64) -> Option<Role> {
        self.history
            .get(member)?
            .iter()
            .take_while(|change| change.made_at <= made_at)
            .last()
            .map(|change| change.role)
    }

    pub fn roles(&self) -> &BTreeMap<MemberId, Role> {
        &self.roles
    }

    /// Members currently holding a reading role.
    pub fn readers(&self) -> impl Iterator<Item = (&MemberId, Role)> + '_ {
        self.roles
            .iter()
            .filter(|(_, role)| role.can_read())
            .map(|(member, role)| (member, *role))
    }

    pub fn entry(&self, key: &str) -> Option<&GroupEntry> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> &BTreeMap<String, GroupEntry> {
        &self.entries
    }

    /// ID of the current read key.
    pub fn read_key_id(&self) -> Option<KeyId> {
        self.read_key
    }

    pub fn is_valid(&self, tx_id: &TransactionId) -> bool {
        self.valid.contains(tx_id)
    }
}

/// The transactions of `log` that its ruleset accepts, in content order.
pub fn determine_valid_transactions<'a>(
    log: &'a CoValueLog,
    resolver: &dyn CoValueResolver,
) -> Result<Vec<(TransactionId, &'a Transaction)>> {
    match &log.header().ruleset {
        Ruleset::UnsafeAllowAll => Ok(sorted_transactions(log)),
        Ruleset::Group { .. } => {
            let state = GroupState::replay(log)?;
            Ok(sorted_transactions(log)
                .into_iter()
                .filter(|(id, _)| state.is_valid(id))
                .collect())
        }
        Ruleset::OwnedByGroup { group } => {
            let group_log = resolver
                .get_log(group)
                .ok_or(PermsError::Unavailable(*group))?;
            let state = GroupState::replay(group_log)?;
            Ok(sorted_transactions(log)
                .into_iter()
                .filter(|(id, tx)| {
                    let allowed = state
                        .role_at(&id.session_id.owner, tx.made_at())
                        .map_or(false, Role::can_write);
                    if !allowed {
                        debug!(covalue = %log.id(), tx = ?id, "transaction rejected by owning group");
                    }
                    allowed
                })
                .collect())
        }
    }
}

/// The agent acting for `member`.
///
/// An agent acts for itself. An account is represented by its admin
/// agent, preferring the one that created the account.
pub fn resolve_agent(resolver: &dyn CoValueResolver, member: &MemberId) -> Option<AgentId> {
    match member {
        MemberId::Agent(agent) => Some(*agent),
        MemberId::Account(account_id) => {
            let log = resolver.get_log(account_id)?;
            if !log.header().is_account() {
                return None;
            }
            let state = GroupState::replay(log).ok()?;
            if let Ruleset::Group {
                initial_admin: MemberId::Agent(initial),
            } = log.header().ruleset
            {
                if state.role_of(&MemberId::Agent(initial)) == Some(Role::Admin) {
                    return Some(initial);
                }
            }
            state.roles().iter().find_map(|(m, role)| match (m, role) {
                (MemberId::Agent(agent), Role::Admin) => Some(*agent),
                _ => None,
            })
        }
    }
}

/// The public key that must have signed transactions in `session`.
pub fn resolve_signer(
    resolver: &dyn CoValueResolver,
    session: &SessionId,
) -> Result<Ed25519PublicKey> {
    resolve_agent(resolver, &session.owner)
        .map(|agent| agent.signer)
        .ok_or(PermsError::UnknownSigner(*session))
}

/// CoValues that must be known before `log` can be validated.
pub fn depended_on_covalues(log: &CoValueLog) -> Vec<RawCoId> {
    let mut deps = BTreeSet::new();

    match &log.header().ruleset {
        Ruleset::Group { initial_admin } => {
            if let MemberId::Account(id) = initial_admin {
                deps.insert(*id);
            }
            for (_, tx) in log.transactions() {
                let Some(changes) = tx.trusting_changes() else {
                    continue;
                };
                for op in changes.iter().filter_map(MapOp::from_change) {
                    match GroupKey::parse(op.key()) {
                        GroupKey::Member(MemberId::Account(id))
                        | GroupKey::Revelation {
                            to: MemberId::Account(id),
                            ..
                        } => {
                            deps.insert(id);
                        }
                        _ => {}
                    }
                }
            }
        }
        Ruleset::OwnedByGroup { group } => {
            deps.insert(*group);
        }
        Ruleset::UnsafeAllowAll => {}
    }

    for session in log.sessions().keys() {
        if let MemberId::Account(id) = session.owner {
            deps.insert(id);
        }
    }

    deps.remove(&log.id());
    deps.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AgentSecret;
    use coval_core::{CoValueHeader, CoValueKind, LogConfig};
    use serde_json::json;

    struct Member {
        secret: AgentSecret,
        session: SessionId,
    }

    impl Member {
        fn new(seed: u8) -> Self {
            let secret = AgentSecret::from_seed(&[seed; 32]);
            let session = SessionId::new(secret.agent_id().into(), [seed; 8]);
            Self { secret, session }
        }

        fn id(&self) -> MemberId {
            self.secret.agent_id().into()
        }

        fn write(&self, log: &mut CoValueLog, made_at: u64, ops: Vec<MapOp>) {
            let changes = ops.iter().map(MapOp::to_change).collect();
            log.append_local(
                self.session,
                self.secret.signer(),
                vec![Transaction::trusting(made_at, changes)],
            )
            .unwrap();
        }
    }

    fn group(admin: &Member) -> CoValueLog {
        let header = CoValueHeader::new(
            CoValueKind::Comap,
            Ruleset::Group {
                initial_admin: admin.id(),
            },
        )
        .with_uniqueness("group");
        let mut log = CoValueLog::new(header, LogConfig::default()).unwrap();
        admin.write(&mut log, 1, vec![MapOp::set(admin.id().to_string(), "admin")]);
        log
    }

    #[test]
    fn test_bootstrap_admin() {
        let a = Member::new(1);
        let log = group(&a);
        let state = GroupState::replay(&log).unwrap();
        assert_eq!(state.role_of(&a.id()), Some(Role::Admin));
    }

    #[test]
    fn test_non_initial_admin_cannot_bootstrap() {
        let a = Member::new(1);
        let b = Member::new(2);
        let header = CoValueHeader::new(
            CoValueKind::Comap,
            Ruleset::Group {
                initial_admin: a.id(),
            },
        );
        let mut log = CoValueLog::new(header, LogConfig::default()).unwrap();
        b.write(&mut log, 1, vec![MapOp::set(b.id().to_string(), "admin")]);

        let state = GroupState::replay(&log).unwrap();
        assert_eq!(state.role_of(&b.id()), None);
    }

    #[test]
    fn test_writer_cannot_appoint_admin() {
        let a = Member::new(1);
        let b = Member::new(2);
        let c = Member::new(3);
        let mut log = group(&a);

        a.write(&mut log, 2, vec![MapOp::set(b.id().to_string(), "writer")]);
        b.write(&mut log, 3, vec![MapOp::set(c.id().to_string(), "admin")]);
        let state = GroupState::replay(&log).unwrap();
        assert_eq!(state.role_of(&b.id()), Some(Role::Writer));
        assert_eq!(state.role_of(&c.id()), None);

        a.write(&mut log, 4, vec![MapOp::set(c.id().to_string(), "admin")]);
        let state = GroupState::replay(&log).unwrap();
        assert_eq!(state.role_of(&c.id()), Some(Role::Admin));
    }

    #[test]
    fn test_admin_can_only_demote_self() {
        let a = Member::new(1);
        let b = Member::new(2);
        let mut log = group(&a);
        a.write(&mut log, 2, vec![MapOp::set(b.id().to_string(), "admin")]);

        a.write(&mut log, 3, vec![MapOp::set(b.id().to_string(), "writer")]);
        let state = GroupState::replay(&log).unwrap();
        assert_eq!(state.role_of(&b.id()), Some(Role::Admin));

        b.write(&mut log, 4, vec![MapOp::set(b.id().to_string(), "writer")]);
        let state = GroupState::replay(&log).unwrap();
        assert_eq!(state.role_of(&b.id()), Some(Role::Writer));
    }

    #[test]
    fn test_invalid_change_rejects_whole_transaction() {
        let a = Member::new(1);
        let b = Member::new(2);
        let c = Member::new(3);
        let mut log = group(&a);
        a.write(&mut log, 2, vec![MapOp::set(b.id().to_string(), "writer")]);

        // A valid-looking change bundled with an invalid one
        b.write(
            &mut log,
            3,
            vec![
                MapOp::set("title", "hi"),
                MapOp::set(c.id().to_string(), "reader"),
            ],
        );
        let state = GroupState::replay(&log).unwrap();
        assert!(state.entry("title").is_none());
        assert_eq!(state.role_of(&c.id()), None);
    }

    #[test]
    fn test_invite_adds_exactly_one_member() {
        let a = Member::new(1);
        let invite = Member::new(2);
        let c = Member::new(3);
        let d = Member::new(4);
        let mut log = group(&a);
        a.write(&mut log, 2, vec![MapOp::set(invite.id().to_string(), "writerInvite")]);

        // Escalation is refused
        invite.write(&mut log, 3, vec![MapOp::set(c.id().to_string(), "admin")]);
        // Two members in one transaction is refused
        invite.write(
            &mut log,
            4,
            vec![
                MapOp::set(c.id().to_string(), "writer"),
                MapOp::set(d.id().to_string(), "reader"),
            ],
        );
        let state = GroupState::replay(&log).unwrap();
        assert_eq!(state.role_of(&c.id()), None);
        assert_eq!(state.role_of(&d.id()), None);

        invite.write(&mut log, 5, vec![MapOp::set(c.id().to_string(), "reader")]);
        let state = GroupState::replay(&log).unwrap();
        assert_eq!(state.role_of(&c.id()), Some(Role::Reader));

        // Existing members cannot be changed through the invite
        invite.write(&mut log, 6, vec![MapOp::set(c.id().to_string(), "writer")]);
        let state = GroupState::replay(&log).unwrap();
        assert_eq!(state.role_of(&c.id()), Some(Role::Reader));
    }

    #[test]
    fn test_read_key_requires_admin() {
        let a = Member::new(1);
        let b = Member::new(2);
        let mut log = group(&a);
        a.write(&mut log, 2, vec![MapOp::set(b.id().to_string(), "writer")]);

        let k1 = KeyId([1; 16]);
        let k2 = KeyId([2; 16]);
        b.write(&mut log, 3, vec![MapOp::set("readKey", k2.to_string())]);
        assert_eq!(GroupState::replay(&log).unwrap().read_key_id(), None);

        a.write(&mut log, 4, vec![MapOp::set("readKey", k1.to_string())]);
        assert_eq!(GroupState::replay(&log).unwrap().read_key_id(), Some(k1));
    }

    #[test]
    fn test_replay_is_order_independent() {
        let a = Member::new(1);
        let b = Member::new(2);
        let mut log = group(&a);
        // Written out of madeAt order across sessions
        a.write(&mut log, 10, vec![MapOp::set(b.id().to_string(), "writer")]);
        b.write(&mut log, 5, vec![MapOp::set("title", "too early")]);

        let state = GroupState::replay(&log).unwrap();
        assert!(state.entry("title").is_none());
        assert_eq!(state.role_at(&b.id(), 9), None);
        assert_eq!(state.role_at(&b.id(), 10), Some(Role::Writer));
    }

    #[test]
    fn test_owned_by_group_validity_is_point_in_time() {
        let a = Member::new(1);
        let w = Member::new(2);
        let mut group_log = group(&a);
        a.write(&mut group_log, 10, vec![MapOp::set(w.id().to_string(), "writer")]);
        a.write(&mut group_log, 20, vec![MapOp::set(w.id().to_string(), "revoked")]);

        let header = CoValueHeader::new(
            CoValueKind::Comap,
            Ruleset::OwnedByGroup {
                group: group_log.id(),
            },
        );
        let mut map = CoValueLog::new(header, LogConfig::default()).unwrap();
        w.write(&mut map, 5, vec![MapOp::set("k", "before")]);
        w.write(&mut map, 15, vec![MapOp::set("k", "during")]);
        w.write(&mut map, 25, vec![MapOp::set("k", "after")]);

        let mut resolver = HashMap::new();
        let group_id = group_log.id();
        resolver.insert(group_id, group_log);

        let valid = determine_valid_transactions(&map, &resolver).unwrap();
        let made_ats: Vec<u64> = valid.iter().map(|(_, tx)| tx.made_at()).collect();
        assert_eq!(made_ats, vec![15]);
        assert_eq!(depended_on_covalues(&map), vec![group_id]);
    }

    #[test]
    fn test_owned_by_missing_group_is_unavailable() {
        let header = CoValueHeader::new(
            CoValueKind::Comap,
            Ruleset::OwnedByGroup {
                group: RawCoId([7; 32]),
            },
        );
        let map = CoValueLog::new(header, LogConfig::default()).unwrap();
        let resolver: HashMap<RawCoId, CoValueLog> = HashMap::new();
        assert!(matches!(
            determine_valid_transactions(&map, &resolver),
            Err(PermsError::Unavailable(_))
        ));
    }

    #[test]
    fn test_resolve_account_signer() {
        let agent = Member::new(1);
        let header = CoValueHeader::new(
            CoValueKind::Comap,
            Ruleset::Group {
                initial_admin: agent.id(),
            },
        )
        .with_meta(json!({"type": "account"}));
        let mut account = CoValueLog::new(header, LogConfig::default()).unwrap();
        agent.write(&mut account, 1, vec![MapOp::set(agent.id().to_string(), "admin")]);
        let account_id = account.id();

        let mut resolver = HashMap::new();
        resolver.insert(account_id, account);

        let session = SessionId::new(MemberId::Account(account_id), [0; 8]);
        assert_eq!(
            resolve_signer(&resolver, &session).unwrap(),
            agent.secret.signer().public_key()
        );

        let unknown = SessionId::new(MemberId::Account(RawCoId([9; 32])), [0; 8]);
        assert!(matches!(
            resolve_signer(&resolver, &unknown),
            Err(PermsError::UnknownSigner(_))
        ));
    }
}
