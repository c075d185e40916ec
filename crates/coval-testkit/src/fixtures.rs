//! Test fixtures and helpers.
//!
//! Common setup code for unit and integration tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use coval_core::{
    CoValueHeader, CoValueKind, CoValueLog, LogConfig, MemberId, RawCoId, Result, Ruleset,
    SessionId, Transaction, TransactionId,
};
use coval_perms::{AgentSecret, MapOp, Role};
use coval_sync::SyncConfig;
use serde_json::json;

/// An agent with deterministic keys and a default session.
pub struct TestAgent {
    pub secret: AgentSecret,
    pub session: SessionId,
}

impl TestAgent {
    /// Create an agent with random keys.
    pub fn new() -> Self {
        Self::from_secret(AgentSecret::generate())
    }

    /// Create with deterministic keys from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self::from_secret(AgentSecret::from_seed(&seed))
    }

    fn from_secret(secret: AgentSecret) -> Self {
        let session = SessionId::new(MemberId::Agent(secret.agent_id()), [0; 8]);
        Self { secret, session }
    }

    pub fn member_id(&self) -> MemberId {
        MemberId::Agent(self.secret.agent_id())
    }

    /// Another session of this agent, as if on a second device.
    pub fn new_session(&self) -> SessionId {
        SessionId::new(self.member_id(), rand::random())
    }

    /// Sign and append `txs` to the default session.
    pub fn append(&self, log: &mut CoValueLog, txs: Vec<Transaction>) -> Result<()> {
        log.append_local(self.session, self.secret.signer(), txs)
    }

    /// Append one trusting transaction of map operations.
    pub fn write(&self, log: &mut CoValueLog, made_at: u64, ops: &[MapOp]) -> Result<TransactionId> {
        let tx_id = TransactionId::new(self.session, log.session_len(&self.session));
        let changes = ops.iter().map(MapOp::to_change).collect();
        self.append(log, vec![Transaction::trusting(made_at, changes)])?;
        Ok(tx_id)
    }

    /// Append a role assignment for `member`.
    pub fn set_role(
        &self,
        log: &mut CoValueLog,
        made_at: u64,
        member: MemberId,
        role: Role,
    ) -> Result<TransactionId> {
        self.write(log, made_at, &[MapOp::set(member.to_string(), role.as_str())])
    }
}

impl Default for TestAgent {
    fn default() -> Self {
        Self::new()
    }
}

/// Create several agents with distinct deterministic keys.
pub fn multi_agent_fixtures(count: usize) -> Vec<TestAgent> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            seed[31] = 0xa5;
            TestAgent::with_seed(seed)
        })
        .collect()
}

/// A group administered by `admin`, bootstrapped at `made_at`.
pub fn group_log(admin: &TestAgent, made_at: u64) -> Result<CoValueLog> {
    let header = CoValueHeader::new(
        CoValueKind::Comap,
        Ruleset::Group {
            initial_admin: admin.member_id(),
        },
    )
    .with_uniqueness(hex::encode(admin.secret.agent_id().signer.0));
    let mut log = CoValueLog::new(header, LogConfig::default())?;
    admin.set_role(&mut log, made_at, admin.member_id(), Role::Admin)?;
    Ok(log)
}

/// An account log for `agent`: a group with account meta.
pub fn account_log(agent: &TestAgent, made_at: u64) -> Result<CoValueLog> {
    let header = CoValueHeader::new(
        CoValueKind::Comap,
        Ruleset::Group {
            initial_admin: agent.member_id(),
        },
    )
    .with_meta(json!({"type": "account"}));
    let mut log = CoValueLog::new(header, LogConfig::default())?;
    agent.set_role(&mut log, made_at, agent.member_id(), Role::Admin)?;
    Ok(log)
}

/// An empty value of `kind` owned by `group`.
pub fn owned_log(group: RawCoId, kind: CoValueKind, uniqueness: &str) -> Result<CoValueLog> {
    let header = CoValueHeader::new(kind, Ruleset::OwnedByGroup { group }).with_uniqueness(uniqueness);
    CoValueLog::new(header, LogConfig::default())
}

/// An empty value accepting every transaction.
pub fn allow_all_log(kind: CoValueKind) -> Result<CoValueLog> {
    CoValueLog::new(CoValueHeader::new(kind, Ruleset::UnsafeAllowAll), LogConfig::default())
}

/// `count` trusting transactions stamped from `first_made_at` upward.
pub fn trusting_batch(first_made_at: u64, count: u64) -> Vec<Transaction> {
    (0..count)
        .map(|i| Transaction::trusting(first_made_at + i, vec![json!({"op": "set", "key": "n", "value": i})]))
        .collect()
}

/// A shared, manually advanced clock.
#[derive(Debug, Clone)]
pub struct TestClock(Arc<AtomicU64>);

impl TestClock {
    pub fn new(start: u64) -> Self {
        Self(Arc::new(AtomicU64::new(start)))
    }

    pub fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn advance(&self, millis: u64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.0.store(millis, Ordering::SeqCst);
    }

    /// A clock function reading this clock, for node configuration.
    pub fn as_fn(&self) -> impl Fn() -> u64 + Send + Sync + 'static {
        let inner = Arc::clone(&self.0);
        move || inner.load(Ordering::SeqCst)
    }

    /// A clock function that advances by one millisecond per read.
    ///
    /// Nodes sharing it stamp transactions in the order they make them.
    pub fn ticking_fn(&self) -> impl Fn() -> u64 + Send + Sync + 'static {
        let inner = Arc::clone(&self.0);
        move || inner.fetch_add(1, Ordering::SeqCst)
    }
}

/// Sync tuning with short timeouts and backoff.
pub fn fast_sync_config() -> SyncConfig {
    SyncConfig {
        load_timeout: Duration::from_millis(200),
        retry_base_delay: Duration::from_millis(1),
        retry_factor: 2,
        ..SyncConfig::default()
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coval_perms::GroupState;

    #[test]
    fn test_group_fixture_bootstraps_admin() {
        let admin = TestAgent::with_seed([1; 32]);
        let log = group_log(&admin, 1).unwrap();

        let state = GroupState::replay(&log).unwrap();
        assert_eq!(state.role_of(&admin.member_id()), Some(Role::Admin));
    }

    #[test]
    fn test_account_fixture_is_account() {
        let agent = TestAgent::with_seed([2; 32]);
        let log = account_log(&agent, 1).unwrap();
        assert!(log.header().is_account());
    }

    #[test]
    fn test_multi_agent() {
        let agents = multi_agent_fixtures(3);

        let ids: Vec<_> = agents.iter().map(TestAgent::member_id).collect();
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
        assert_ne!(ids[0], ids[2]);
    }

    #[test]
    fn test_clock_is_shared() {
        let clock = TestClock::new(10);
        let read = clock.as_fn();
        clock.advance(5);
        assert_eq!(read(), 15);
        clock.set(3);
        assert_eq!(clock.now(), 3);

        let tick = clock.ticking_fn();
        assert_eq!(tick(), 3);
        assert_eq!(tick(), 4);
        assert_eq!(clock.now(), 5);
    }

    #[tokio::test]
    async fn test_wait_until_gives_up() {
        assert!(wait_until(Duration::from_millis(20), || true).await);
        assert!(!wait_until(Duration::from_millis(20), || false).await);
    }
}
