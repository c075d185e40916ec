//! Multi-node scenarios over in-memory peers.

use std::sync::Arc;
use std::time::Duration;

use coval::core::{CoValueKind, MemberId, Privacy, RawCoId};
use coval::perms::{MapOp, Role};
use coval::sync::LoadStatus;
use coval::{connected_peers, AgentSecret, LocalNode, NodeConfig, NodeError, PeerRole};
use coval_testkit::{fast_sync_config, wait_until, TestClock};
use serde_json::json;

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .try_init();
}

fn config(clock: &TestClock) -> NodeConfig {
    NodeConfig {
        sync: fast_sync_config(),
        ..NodeConfig::default().with_clock(clock.ticking_fn())
    }
}

struct Cluster {
    server: Arc<LocalNode>,
    alice: Arc<LocalNode>,
    bob: Arc<LocalNode>,
}

impl Cluster {
    /// A server plus two account nodes connected to it as clients.
    async fn start() -> Self {
        init_tracing();
        let clock = TestClock::new(1_000);
        let server = Arc::new(LocalNode::new(AgentSecret::from_seed(&[1; 32]), config(&clock)));
        let alice = Arc::new(LocalNode::with_new_account(AgentSecret::from_seed(&[2; 32]), config(&clock)).unwrap());
        let bob = Arc::new(LocalNode::with_new_account(AgentSecret::from_seed(&[3; 32]), config(&clock)).unwrap());

        for (name, node) in [("alice", &alice), ("bob", &bob)] {
            let (server_for_client, client_for_server) =
                connected_peers(name, "server", PeerRole::Client, PeerRole::Server);
            node.add_peer(server_for_client);
            server.add_peer(client_for_server);
        }

        let cluster = Self { server, alice, bob };
        for account in [cluster.alice_account(), cluster.bob_account()] {
            assert!(
                wait_until(WAIT, || cluster.server.known_state(account).is_some()).await,
                "server never received account {account}"
            );
        }
        cluster
    }

    fn alice_account(&self) -> RawCoId {
        self.alice.account_id().unwrap()
    }

    fn bob_account(&self) -> RawCoId {
        self.bob.account_id().unwrap()
    }

    /// Alice's group with a private map, Bob added at `role`.
    async fn shared_map(&self, role: Role) -> (RawCoId, RawCoId) {
        self.alice.load(self.bob_account()).await.unwrap();
        let group = self.alice.create_group().unwrap();
        self.alice
            .add_member(group, MemberId::Account(self.bob_account()), role)
            .unwrap();
        let map = self.alice.create_owned(CoValueKind::Comap, group).unwrap();
        assert!(self.converged(&self.server, group, &self.alice).await);
        assert!(self.converged(&self.server, map, &self.alice).await);
        (group, map)
    }

    async fn converged(&self, node: &LocalNode, id: RawCoId, with: &LocalNode) -> bool {
        wait_until(WAIT, || {
            let theirs = with.known_state(id);
            theirs.is_some() && node.known_state(id) == theirs
        })
        .await
    }
}

#[tokio::test]
async fn test_private_map_reaches_member_through_server() {
    let c = Cluster::start().await;
    let (_, map) = c.shared_map(Role::Reader).await;

    c.alice
        .make_transaction(map, vec![MapOp::set("title", "hello").to_change()], Privacy::Private)
        .unwrap();
    assert!(c.converged(&c.server, map, &c.alice).await);

    c.bob.load(map).await.unwrap();
    assert!(c.converged(&c.bob, map, &c.alice).await);

    let content = c.bob.get_current_content(map).unwrap();
    assert_eq!(content.to_json(), json!({"title": "hello"}));

    // The server relays ciphertext it cannot read.
    assert_eq!(c.server.get_current_content(map).unwrap().to_json(), json!({}));
}

#[tokio::test]
async fn test_writes_flow_both_ways() {
    let c = Cluster::start().await;
    let (_, map) = c.shared_map(Role::Writer).await;
    c.alice
        .make_transaction(map, vec![MapOp::set("a", 1).to_change()], Privacy::Private)
        .unwrap();

    c.bob.load(map).await.unwrap();
    assert!(c.converged(&c.bob, map, &c.alice).await);

    c.bob
        .make_transaction(map, vec![MapOp::set("b", 2).to_change()], Privacy::Private)
        .unwrap();
    assert!(c.converged(&c.alice, map, &c.bob).await);

    let expected = json!({"a": 1, "b": 2});
    assert_eq!(c.alice.get_current_content(map).unwrap().to_json(), expected);
    assert_eq!(c.bob.get_current_content(map).unwrap().to_json(), expected);
}

#[tokio::test]
async fn test_removed_member_stops_reading() {
    let c = Cluster::start().await;
    let (group, map) = c.shared_map(Role::Reader).await;
    c.alice
        .make_transaction(map, vec![MapOp::set("msg", "before").to_change()], Privacy::Private)
        .unwrap();

    c.bob.load(map).await.unwrap();
    assert!(c.converged(&c.bob, map, &c.alice).await);

    c.alice
        .remove_member(group, MemberId::Account(c.bob_account()))
        .unwrap();
    c.alice
        .make_transaction(map, vec![MapOp::set("msg", "after").to_change()], Privacy::Private)
        .unwrap();

    assert!(c.converged(&c.bob, group, &c.alice).await);
    assert!(c.converged(&c.bob, map, &c.alice).await);

    // Bob holds every transaction but only the old key.
    let content = c.bob.get_current_content(map).unwrap();
    assert_eq!(content.to_json(), json!({"msg": "before"}));
    assert_eq!(
        c.alice.get_current_content(map).unwrap().to_json(),
        json!({"msg": "after"})
    );
}

#[tokio::test]
async fn test_writer_cannot_escalate_remotely() {
    let c = Cluster::start().await;
    let (group, map) = c.shared_map(Role::Writer).await;

    c.bob.load(map).await.unwrap();
    assert!(c.converged(&c.bob, group, &c.alice).await);

    let outsider = AgentSecret::from_seed(&[9; 32]).agent_id();
    let err = c
        .bob
        .add_member(group, MemberId::Agent(outsider), Role::Admin)
        .unwrap_err();
    assert!(matches!(err, NodeError::NotAuthorized(_)));

    // The rejected transaction syncs, and every node agrees to ignore it.
    assert!(c.converged(&c.alice, group, &c.bob).await);
    let state = c.alice.group_state(group).unwrap();
    assert_eq!(state.role_of(&MemberId::Agent(outsider)), None);
    assert_eq!(
        state.role_of(&MemberId::Account(c.bob_account())),
        Some(Role::Writer)
    );
}

#[tokio::test]
async fn test_unknown_value_is_unavailable() {
    let c = Cluster::start().await;
    let missing = RawCoId([0xee; 32]);

    let err = c.alice.load(missing).await.unwrap_err();
    assert!(matches!(err, NodeError::Unavailable(id) if id == missing));
    assert_eq!(c.alice.sync().status(&missing), LoadStatus::Unavailable);
}

#[tokio::test]
async fn test_subscription_sees_remote_writes() {
    let c = Cluster::start().await;
    let (_, map) = c.shared_map(Role::Writer).await;

    c.bob.load(map).await.unwrap();
    let mut sub = c.alice.subscribe(map).unwrap();

    c.bob
        .make_transaction(map, vec![MapOp::set("ping", true).to_change()], Privacy::Trusting)
        .unwrap();

    let bob_session = c.bob.session_id();
    tokio::time::timeout(WAIT, sub.updates.wait_for(|k| k.count(&bob_session) == 1))
        .await
        .expect("update never arrived")
        .unwrap();
    assert!(c.alice.unsubscribe(sub));
}
