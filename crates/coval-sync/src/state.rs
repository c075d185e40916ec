//! Per-node table of CoValue load states.
//!
//! `Unknown` → `Loading` → `Available` (sticky) or `Unavailable` (a later
//! arrival can still make it available). Waiters observe transitions
//! through a `watch` channel per CoValue.
//!
//! Here `Unavailable` ends one load pass. The sync manager keeps reporting
//! `Loading` until its retries run out.

use std::collections::{BTreeSet, HashMap};

use tokio::sync::watch;
use tracing::debug;

use coval_core::{CoValueLog, RawCoId};
use coval_perms::CoValueResolver;

use crate::messages::PeerId;

/// Observable load status of a CoValue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Unknown,
    Loading,
    Available,
    Unavailable,
}

/// State of one CoValue on this node.
#[derive(Debug)]
pub enum CoValueState {
    Unknown,
    /// Waiting for answers from these peers.
    Loading { pending: BTreeSet<PeerId> },
    Available(Box<CoValueLog>),
    Unavailable,
}

impl CoValueState {
    pub fn status(&self) -> LoadStatus {
        match self {
            CoValueState::Unknown => LoadStatus::Unknown,
            CoValueState::Loading { .. } => LoadStatus::Loading,
            CoValueState::Available(_) => LoadStatus::Available,
            CoValueState::Unavailable => LoadStatus::Unavailable,
        }
    }
}

#[derive(Debug)]
struct Entry {
    state: CoValueState,
    status: watch::Sender<LoadStatus>,
}

impl Entry {
    fn new() -> Self {
        let (status, _) = watch::channel(LoadStatus::Unknown);
        Self {
            state: CoValueState::Unknown,
            status,
        }
    }

    fn set(&mut self, state: CoValueState) {
        let status = state.status();
        self.state = state;
        self.status.send_replace(status);
    }
}

/// All CoValues this node knows about, keyed by ID.
#[derive(Debug, Default)]
pub struct CoValueTable {
    entries: HashMap<RawCoId, Entry>,
}

impl CoValueTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, id: &RawCoId) -> LoadStatus {
        self.entries
            .get(id)
            .map_or(LoadStatus::Unknown, |e| e.state.status())
    }

    pub fn state(&self, id: &RawCoId) -> Option<&CoValueState> {
        self.entries.get(id).map(|e| &e.state)
    }

    pub fn available(&self, id: &RawCoId) -> Option<&CoValueLog> {
        match self.entries.get(id).map(|e| &e.state) {
            Some(CoValueState::Available(log)) => Some(log),
            _ => None,
        }
    }

    pub fn available_mut(&mut self, id: &RawCoId) -> Option<&mut CoValueLog> {
        match self.entries.get_mut(id).map(|e| &mut e.state) {
            Some(CoValueState::Available(log)) => Some(log),
            _ => None,
        }
    }

    /// IDs of every available CoValue.
    pub fn available_ids(&self) -> Vec<RawCoId> {
        self.entries
            .iter()
            .filter(|(_, e)| matches!(e.state, CoValueState::Available(_)))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Watch the load status of `id`, creating an `Unknown` entry if needed.
    pub fn subscribe(&mut self, id: RawCoId) -> watch::Receiver<LoadStatus> {
        self.entries.entry(id).or_insert_with(Entry::new).status.subscribe()
    }

    /// A log arrived. Wins over any state except an existing log, which is
    /// kept as is. Returns whether `log` was inserted.
    pub fn dispatch_available(&mut self, log: CoValueLog) -> bool {
        let id = log.id();
        let entry = self.entries.entry(id).or_insert_with(Entry::new);
        if matches!(entry.state, CoValueState::Available(_)) {
            return false;
        }
        debug!(covalue = %id, "covalue available");
        entry.set(CoValueState::Available(Box::new(log)));
        true
    }

    /// Start waiting on `peers`. No-op if the value is already available.
    ///
    /// With no peers to ask the value settles `Unavailable` immediately.
    pub fn start_loading(&mut self, id: RawCoId, peers: impl IntoIterator<Item = PeerId>) -> LoadStatus {
        let entry = self.entries.entry(id).or_insert_with(Entry::new);
        if matches!(entry.state, CoValueState::Available(_)) {
            return LoadStatus::Available;
        }
        let pending: BTreeSet<PeerId> = peers.into_iter().collect();
        if pending.is_empty() {
            entry.set(CoValueState::Unavailable);
        } else {
            entry.set(CoValueState::Loading { pending });
        }
        entry.state.status()
    }

    /// `peer` does not have `id`. Only affects values still loading.
    pub fn dispatch_not_found(&mut self, id: &RawCoId, peer: &PeerId) {
        let Some(entry) = self.entries.get_mut(id) else {
            return;
        };
        let CoValueState::Loading { pending } = &mut entry.state else {
            return;
        };
        pending.remove(peer);
        if pending.is_empty() {
            debug!(covalue = %id, "no peer has covalue");
            entry.set(CoValueState::Unavailable);
        }
    }

    /// Whether `id` is loading and still waiting on `peer`.
    pub fn is_waiting_on(&self, id: &RawCoId, peer: &PeerId) -> bool {
        matches!(
            self.entries.get(id).map(|e| &e.state),
            Some(CoValueState::Loading { pending }) if pending.contains(peer)
        )
    }

    /// IDs still waiting on `peer`.
    pub fn loading_from(&self, peer: &PeerId) -> Vec<RawCoId> {
        self.entries
            .iter()
            .filter(|(_, e)| matches!(&e.state, CoValueState::Loading { pending } if pending.contains(peer)))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Give up on `id` unless it became available.
    pub fn mark_unavailable(&mut self, id: RawCoId) {
        let entry = self.entries.entry(id).or_insert_with(Entry::new);
        if !matches!(entry.state, CoValueState::Available(_)) {
            entry.set(CoValueState::Unavailable);
        }
    }
}

impl CoValueResolver for CoValueTable {
    fn get_log(&self, id: &RawCoId) -> Option<&CoValueLog> {
        self.available(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coval_core::{CoValueHeader, CoValueKind, LogConfig, Ruleset};

    fn log(uniq: &str) -> CoValueLog {
        let header = CoValueHeader::new(CoValueKind::Comap, Ruleset::UnsafeAllowAll)
            .with_uniqueness(uniq);
        CoValueLog::new(header, LogConfig::default()).unwrap()
    }

    #[test]
    fn test_not_found_from_every_peer_settles_unavailable() {
        let mut table = CoValueTable::new();
        let id = RawCoId([1; 32]);
        let mut rx = table.subscribe(id);

        let status = table.start_loading(id, [PeerId::from("a"), PeerId::from("b")]);
        assert_eq!(status, LoadStatus::Loading);
        assert!(table.is_waiting_on(&id, &PeerId::from("a")));

        table.dispatch_not_found(&id, &PeerId::from("a"));
        assert_eq!(table.status(&id), LoadStatus::Loading);
        table.dispatch_not_found(&id, &PeerId::from("b"));
        assert_eq!(table.status(&id), LoadStatus::Unavailable);
        assert_eq!(*rx.borrow_and_update(), LoadStatus::Unavailable);
    }

    #[test]
    fn test_not_found_ignored_unless_loading() {
        let mut table = CoValueTable::new();
        let l = log("x");
        let id = l.id();
        table.dispatch_available(l);
        table.dispatch_not_found(&id, &PeerId::from("a"));
        assert_eq!(table.status(&id), LoadStatus::Available);

        let other = RawCoId([2; 32]);
        table.dispatch_not_found(&other, &PeerId::from("a"));
        assert_eq!(table.status(&other), LoadStatus::Unknown);
    }

    #[test]
    fn test_available_wins_and_is_sticky() {
        let mut table = CoValueTable::new();
        let l = log("y");
        let id = l.id();

        table.mark_unavailable(id);
        assert_eq!(table.status(&id), LoadStatus::Unavailable);

        assert!(table.dispatch_available(l));
        assert_eq!(table.status(&id), LoadStatus::Available);
        assert!(table.get_log(&id).is_some());
        assert!(!table.dispatch_available(log("y")));

        assert_eq!(table.start_loading(id, [PeerId::from("a")]), LoadStatus::Available);
        table.mark_unavailable(id);
        assert_eq!(table.status(&id), LoadStatus::Available);
        assert_eq!(table.available_ids(), vec![id]);
    }

    #[test]
    fn test_loading_without_peers_is_unavailable() {
        let mut table = CoValueTable::new();
        let id = RawCoId([3; 32]);
        assert_eq!(
            table.start_loading(id, std::iter::empty()),
            LoadStatus::Unavailable
        );
    }

    #[test]
    fn test_loading_from_lists_pending_ids() {
        let mut table = CoValueTable::new();
        table.start_loading(RawCoId([4; 32]), [PeerId::from("a")]);
        table.start_loading(RawCoId([5; 32]), [PeerId::from("b")]);
        assert_eq!(table.loading_from(&PeerId::from("a")), vec![RawCoId([4; 32])]);
    }
}
