//! Known states: how much of a CoValue a party has seen.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{RawCoId, SessionId};

/// Watermark over one CoValue: header presence plus per-session counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownState {
    pub id: RawCoId,
    pub header: bool,
    pub sessions: BTreeMap<SessionId, u64>,
}

impl KnownState {
    /// Knows nothing about `id`.
    pub fn empty(id: RawCoId) -> Self {
        Self {
            id,
            header: false,
            sessions: BTreeMap::new(),
        }
    }

    /// Count known for `session`, zero if absent.
    pub fn count(&self, session: &SessionId) -> u64 {
        self.sessions.get(session).copied().unwrap_or(0)
    }

    /// Merge `other` into `self`: header is OR-ed, counts take the max.
    pub fn combine_with(&mut self, other: &KnownState) {
        self.header |= other.header;
        for (session, &count) in &other.sessions {
            let entry = self.sessions.entry(*session).or_insert(0);
            *entry = (*entry).max(count);
        }
    }

    /// Whether `self` knows at least everything `other` knows.
    pub fn covers(&self, other: &KnownState) -> bool {
        (self.header || !other.header)
            && other
                .sessions
                .iter()
                .all(|(session, &count)| self.count(session) >= count)
    }

    pub fn total_transactions(&self) -> u64 {
        self.sessions.values().sum()
    }
}

/// Combine two known states into a fresh one.
pub fn combined_known_states(a: &KnownState, b: &KnownState) -> KnownState {
    let mut out = a.clone();
    out.combine_with(b);
    out
}
