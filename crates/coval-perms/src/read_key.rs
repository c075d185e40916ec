//! Read-key revelation, lookup and rotation.
//!
//! Read keys live in the group's own map. The current key ID is the
//! `readKey` entry. A key is revealed to a member by sealing it into
//! `{keyId}_for_{memberId}`, and older keys are kept reachable by
//! wrapping them under newer ones in `{oldKeyId}_for_{newKeyId}`.

use std::collections::{BTreeSet, HashMap};

use coval_core::{KeyId, MemberId, RawCoId, TransactionId};
use tracing::{debug, warn};

use crate::change::{key_wrap_key, revelation_key, GroupKey, MapOp, READ_KEY};
use crate::crypto::{seal, unseal, AgentSecret, KeySecret, ReadKey, Sealed, X25519PublicKey};
use crate::envelope::{unwrap_key, wrap_key, TransactionNonce};
use crate::error::Result;
use crate::state::{resolve_agent, CoValueResolver, GroupState};

/// Who is asking for keys: the local agent, and the account it acts for.
#[derive(Debug, Clone, Copy)]
pub struct KeyHolder<'a> {
    pub agent: &'a AgentSecret,
    pub account: Option<RawCoId>,
}

impl<'a> KeyHolder<'a> {
    pub fn new(agent: &'a AgentSecret, account: Option<RawCoId>) -> Self {
        Self { agent, account }
    }

    fn identities(&self) -> Vec<MemberId> {
        let mut ids = Vec::with_capacity(2);
        if let Some(account) = self.account {
            ids.push(MemberId::Account(account));
        }
        ids.push(MemberId::Agent(self.agent.agent_id()));
        ids
    }
}

/// Resolved key secrets, per group.
#[derive(Debug, Default)]
pub struct ReadKeyCache {
    keys: HashMap<(RawCoId, KeyId), KeySecret>,
}

impl ReadKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, group: &RawCoId, key: &KeyId) -> Option<&KeySecret> {
        self.keys.get(&(*group, *key))
    }

    pub fn insert(&mut self, group: RawCoId, key: KeyId, secret: KeySecret) {
        self.keys.insert((group, key), secret);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// The group's current read key, if the holder can resolve it.
pub fn get_current_read_key(
    group_id: &RawCoId,
    state: &GroupState,
    holder: &KeyHolder<'_>,
    cache: &mut ReadKeyCache,
) -> Option<ReadKey> {
    let id = state.read_key_id()?;
    let secret = get_read_key(group_id, state, &id, holder, cache)?;
    Some(ReadKey { id, secret })
}

/// Resolve a read key by ID: cached, sealed to the holder, or reachable
/// through a chain of wrapped keys.
pub fn get_read_key(
    group_id: &RawCoId,
    state: &GroupState,
    key_id: &KeyId,
    holder: &KeyHolder<'_>,
    cache: &mut ReadKeyCache,
) -> Option<KeySecret> {
    let mut visited = BTreeSet::new();
    resolve(group_id, state, key_id, holder, cache, &mut visited)
}

fn resolve(
    group_id: &RawCoId,
    state: &GroupState,
    key_id: &KeyId,
    holder: &KeyHolder<'_>,
    cache: &mut ReadKeyCache,
    visited: &mut BTreeSet<KeyId>,
) -> Option<KeySecret> {
    if let Some(secret) = cache.get(group_id, key_id) {
        return Some(secret.clone());
    }
    if !visited.insert(*key_id) {
        return None;
    }

    for member in holder.identities() {
        let Some(entry) = state.entry(&revelation_key(key_id, &member)) else {
            continue;
        };
        let Some(sealed) = entry.value.as_str().and_then(|s| s.parse::<Sealed>().ok()) else {
            warn!(group = %group_id, key = %key_id, "malformed key revelation");
            continue;
        };
        match unseal(
            &sealed,
            holder.agent.sealer(),
            &TransactionNonce::new(group_id, &entry.tx_id),
        ) {
            Ok(bytes) => match <[u8; 32]>::try_from(bytes) {
                Ok(secret) => {
                    let secret = KeySecret(secret);
                    cache.insert(*group_id, *key_id, secret.clone());
                    return Some(secret);
                }
                Err(_) => warn!(group = %group_id, key = %key_id, "revealed key has wrong length"),
            },
            Err(e) => debug!(group = %group_id, key = %key_id, error = %e, "cannot unseal revelation"),
        }
    }

    let wraps: Vec<(KeyId, String)> = state
        .entries()
        .iter()
        .filter_map(|(k, entry)| match GroupKey::parse(k) {
            GroupKey::KeyWrap { key, under } if &key == key_id => {
                Some((under, entry.value.as_str()?.to_string()))
            }
            _ => None,
        })
        .collect();

    for (under, wrapped) in wraps {
        let Some(encrypting) = resolve(group_id, state, &under, holder, cache, visited) else {
            continue;
        };
        match unwrap_key(&wrapped, key_id, &under, &encrypting) {
            Ok(secret) => {
                cache.insert(*group_id, *key_id, secret.clone());
                return Some(secret);
            }
            Err(e) => warn!(group = %group_id, key = %key_id, error = %e, "cannot unwrap key"),
        }
    }

    None
}

/// Members that should receive read keys, with their sealing keys.
///
/// Accounts whose log is not loaded are skipped.
pub fn key_recipients(
    state: &GroupState,
    resolver: &dyn CoValueResolver,
) -> Vec<(MemberId, X25519PublicKey)> {
    state
        .readers()
        .filter_map(|(member, _)| match resolve_agent(resolver, member) {
            Some(agent) => Some((*member, X25519PublicKey::from(&agent))),
            None => {
                warn!(member = %member, "cannot resolve sealer for member");
                None
            }
        })
        .collect()
}

/// Changes sealing `key` to each recipient.
///
/// `tx_id` is the transaction the changes will be written in; it seeds the
/// sealing nonce.
pub fn reveal_ops(
    group_id: &RawCoId,
    tx_id: &TransactionId,
    sender: &AgentSecret,
    key: &ReadKey,
    recipients: &[(MemberId, X25519PublicKey)],
) -> Result<Vec<MapOp>> {
    let nonce = TransactionNonce::new(group_id, tx_id);
    recipients
        .iter()
        .map(|(member, sealer)| {
            let sealed = seal(key.secret.as_bytes(), sender.sealer(), sealer, &nonce)?;
            Ok(MapOp::set(revelation_key(&key.id, member), sealed.to_string()))
        })
        .collect()
}

/// Changes rotating the group to a fresh key.
///
/// The new key is sealed to every recipient, the previous key (if any) is
/// wrapped under the new one, and `readKey` is pointed at the new key.
pub fn rotation_ops(
    group_id: &RawCoId,
    tx_id: &TransactionId,
    sender: &AgentSecret,
    recipients: &[(MemberId, X25519PublicKey)],
    previous: Option<&ReadKey>,
) -> Result<(ReadKey, Vec<MapOp>)> {
    let new_key = ReadKey::generate();
    let mut ops = reveal_ops(group_id, tx_id, sender, &new_key, recipients)?;

    if let Some(previous) = previous {
        let wrapped = wrap_key(&previous.id, &previous.secret, &new_key.id, &new_key.secret)?;
        ops.push(MapOp::set(key_wrap_key(&previous.id, &new_key.id), wrapped));
    }
    ops.push(MapOp::set(READ_KEY, new_key.id.to_string()));

    Ok((new_key, ops))
}

#[cfg(test)]
mod tests {
    use super::*;
    use coval_core::{
        CoValueHeader, CoValueKind, CoValueLog, LogConfig, Ruleset, SessionId, Transaction,
    };

    struct Fixture {
        admin: AgentSecret,
        session: SessionId,
        log: CoValueLog,
        resolver: HashMap<RawCoId, CoValueLog>,
    }

    impl Fixture {
        fn new() -> Self {
            let admin = AgentSecret::from_seed(&[1; 32]);
            let admin_id: MemberId = admin.agent_id().into();
            let session = SessionId::new(admin_id, [1; 8]);
            let header = CoValueHeader::new(
                CoValueKind::Comap,
                Ruleset::Group {
                    initial_admin: admin_id,
                },
            );
            let mut log = CoValueLog::new(header, LogConfig::default()).unwrap();
            let bootstrap = MapOp::set(admin_id.to_string(), "admin").to_change();
            log.append_local(
                session,
                admin.signer(),
                vec![Transaction::trusting(1, vec![bootstrap])],
            )
            .unwrap();
            Self {
                admin,
                session,
                log,
                resolver: HashMap::new(),
            }
        }

        fn next_tx(&self) -> TransactionId {
            TransactionId::new(self.session, self.log.session_len(&self.session))
        }

        fn write(&mut self, made_at: u64, ops: Vec<MapOp>) {
            let changes = ops.iter().map(MapOp::to_change).collect();
            self.log
                .append_local(
                    self.session,
                    self.admin.signer(),
                    vec![Transaction::trusting(made_at, changes)],
                )
                .unwrap();
        }

        fn state(&self) -> GroupState {
            GroupState::replay(&self.log).unwrap()
        }

        fn rotate(&mut self, made_at: u64, previous: Option<&ReadKey>) -> ReadKey {
            let recipients = key_recipients(&self.state(), &self.resolver);
            let (key, ops) = rotation_ops(
                &self.log.id(),
                &self.next_tx(),
                &self.admin,
                &recipients,
                previous,
            )
            .unwrap();
            self.write(made_at, ops);
            key
        }
    }

    #[test]
    fn test_admin_reads_own_key() {
        let mut f = Fixture::new();
        let key = f.rotate(2, None);

        let mut cache = ReadKeyCache::new();
        let holder = KeyHolder::new(&f.admin, None);
        let current = get_current_read_key(&f.log.id(), &f.state(), &holder, &mut cache).unwrap();
        assert_eq!(current, key);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_removed_member_cannot_read_new_key() {
        let mut f = Fixture::new();
        let reader = AgentSecret::from_seed(&[2; 32]);
        let reader_id: MemberId = reader.agent_id().into();
        f.write(2, vec![MapOp::set(reader_id.to_string(), "reader")]);
        let k1 = f.rotate(3, None);

        let state = f.state();
        let holder = KeyHolder::new(&reader, None);
        let mut cache = ReadKeyCache::new();
        assert_eq!(
            get_read_key(&f.log.id(), &state, &k1.id, &holder, &mut cache),
            Some(k1.secret.clone())
        );

        f.write(4, vec![MapOp::set(reader_id.to_string(), "revoked")]);
        let k2 = f.rotate(5, Some(&k1));

        let state = f.state();
        let mut cache = ReadKeyCache::new();
        assert_eq!(state.read_key_id(), Some(k2.id));
        assert!(get_current_read_key(&f.log.id(), &state, &holder, &mut cache).is_none());
        // The old key stays readable; forward secrecy only covers new content.
        assert!(get_read_key(&f.log.id(), &state, &k1.id, &holder, &mut cache).is_some());
    }

    #[test]
    fn test_old_key_reachable_through_wrap() {
        let mut f = Fixture::new();
        let k1 = f.rotate(2, None);
        let k2 = f.rotate(3, Some(&k1));

        // A member added after the rotation only gets k2 sealed to them.
        let late = AgentSecret::from_seed(&[3; 32]);
        let late_id: MemberId = late.agent_id().into();
        f.write(4, vec![MapOp::set(late_id.to_string(), "reader")]);
        let ops = reveal_ops(
            &f.log.id(),
            &f.next_tx(),
            &f.admin,
            &k2,
            &[(late_id, X25519PublicKey::from(&late.agent_id()))],
        )
        .unwrap();
        f.write(5, ops);

        let state = f.state();
        let holder = KeyHolder::new(&late, None);
        let mut cache = ReadKeyCache::new();
        assert_eq!(
            get_read_key(&f.log.id(), &state, &k1.id, &holder, &mut cache),
            Some(k1.secret)
        );
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_rotation_skips_invite_holders() {
        let mut f = Fixture::new();
        let reader = AgentSecret::from_seed(&[4; 32]);
        let reader_id: MemberId = reader.agent_id().into();
        let invite = AgentSecret::from_seed(&[5; 32]);
        let invite_id: MemberId = invite.agent_id().into();
        f.write(
            2,
            vec![
                MapOp::set(reader_id.to_string(), "reader"),
                MapOp::set(invite_id.to_string(), "readerInvite"),
            ],
        );

        let state = f.state();
        assert_eq!(state.role_of(&invite_id), Some(crate::change::Role::ReaderInvite));
        let recipients: Vec<MemberId> = key_recipients(&state, &f.resolver)
            .into_iter()
            .map(|(member, _)| member)
            .collect();
        assert!(recipients.contains(&reader_id));
        assert!(!recipients.contains(&invite_id));

        let key = f.rotate(3, None);
        let state = f.state();
        let mut cache = ReadKeyCache::new();
        let holder = KeyHolder::new(&invite, None);
        assert!(get_read_key(&f.log.id(), &state, &key.id, &holder, &mut cache).is_none());
        let holder = KeyHolder::new(&reader, None);
        assert!(get_read_key(&f.log.id(), &state, &key.id, &holder, &mut cache).is_some());
    }

    #[test]
    fn test_outsider_gets_nothing() {
        let mut f = Fixture::new();
        let k1 = f.rotate(2, None);
        let outsider = AgentSecret::from_seed(&[9; 32]);
        let holder = KeyHolder::new(&outsider, None);
        let mut cache = ReadKeyCache::new();
        assert!(get_read_key(&f.log.id(), &f.state(), &k1.id, &holder, &mut cache).is_none());
        assert!(cache.is_empty());
    }
}
