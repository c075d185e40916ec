//! Proptest generators for property-based testing.

use std::collections::BTreeMap;

use proptest::prelude::*;
use serde_json::Value;

use coval_core::{
    AgentId, Change, CoValueKind, CoValueLog, KnownState, MemberId, RawCoId, SessionId, Transaction,
};
use coval_perms::{AgentSecret, MapOp};

use crate::fixtures::{allow_all_log, TestAgent};

/// Generate a random agent secret.
pub fn agent_secret() -> impl Strategy<Value = AgentSecret> {
    any::<[u8; 32]>().prop_map(|seed| AgentSecret::from_seed(&seed))
}

/// Generate a random agent ID.
pub fn agent_id() -> impl Strategy<Value = AgentId> {
    agent_secret().prop_map(|secret| secret.agent_id())
}

/// Generate a random CoValue ID.
pub fn raw_co_id() -> impl Strategy<Value = RawCoId> {
    any::<[u8; 32]>().prop_map(RawCoId)
}

/// Generate a member: an agent or an account.
pub fn member_id() -> impl Strategy<Value = MemberId> {
    prop_oneof![
        agent_id().prop_map(MemberId::Agent),
        raw_co_id().prop_map(MemberId::Account),
    ]
}

/// Generate a session ID.
pub fn session_id() -> impl Strategy<Value = SessionId> {
    (member_id(), any::<[u8; 8]>()).prop_map(|(owner, nonce)| SessionId::new(owner, nonce))
}

/// Generate a known state for `id` over up to `max_sessions` sessions.
pub fn known_state(id: RawCoId, max_sessions: usize) -> impl Strategy<Value = KnownState> {
    (
        any::<bool>(),
        prop::collection::btree_map(session_id(), 0u64..1_000, 0..=max_sessions),
    )
        .prop_map(move |(header, sessions)| KnownState { id, header, sessions })
}

/// Generate a JSON scalar.
pub fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(|b| Value::from(b)),
        any::<i64>().prop_map(|n| Value::from(n)),
        "[a-z0-9 ]{0,16}".prop_map(|s| Value::from(s)),
    ]
}

/// Generate a map key.
pub fn map_key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,7}".prop_map(String::from)
}

/// Generate a map operation.
pub fn map_op() -> impl Strategy<Value = MapOp> {
    prop_oneof![
        4 => (map_key(), scalar()).prop_map(|(k, v)| MapOp::set(k, v)),
        1 => map_key().prop_map(|k| MapOp::del(k)),
    ]
}

/// Generate the changes of one transaction.
pub fn changes(max_len: usize) -> impl Strategy<Value = Vec<Change>> {
    prop::collection::vec(map_op().prop_map(|op| op.to_change()), 1..=max_len)
}

/// Generate a trusting transaction.
pub fn trusting_transaction() -> impl Strategy<Value = Transaction> {
    (0u64..1_000_000, changes(4)).prop_map(|(made_at, changes)| Transaction::trusting(made_at, changes))
}

/// Parameters for building a single-writer log in several batches.
#[derive(Debug, Clone)]
pub struct LogParams {
    pub seed: [u8; 32],
    pub kind: CoValueKind,
    pub batches: Vec<Vec<Transaction>>,
}

impl Arbitrary for LogParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            any::<[u8; 32]>(),
            prop_oneof![
                Just(CoValueKind::Comap),
                Just(CoValueKind::Colist),
                Just(CoValueKind::Costream),
                Just(CoValueKind::Opaque),
            ],
            prop::collection::vec(prop::collection::vec(trusting_transaction(), 1..=6), 1..=5),
        )
            .prop_map(|(seed, kind, batches)| LogParams { seed, kind, batches })
            .boxed()
    }
}

/// Build the log described by `params`, appending each batch separately.
pub fn log_from_params(params: &LogParams) -> coval_core::Result<(TestAgent, CoValueLog)> {
    let agent = TestAgent::with_seed(params.seed);
    let mut log = allow_all_log(params.kind)?;
    for batch in &params.batches {
        agent.append(&mut log, batch.clone())?;
    }
    Ok((agent, log))
}

/// Per-session counts of a log, as a plain map.
pub fn session_counts(log: &CoValueLog) -> BTreeMap<SessionId, u64> {
    log.known_state().sessions
}
