//! Typed views over a CoValue's valid transactions.
//!
//! Views are rebuilt from scratch from the valid, decrypted transactions in
//! content order `(madeAt, sessionID, txIndex)`, so every node holding the
//! same transactions builds the same view.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use coval_core::{Change, CoValueKind, SessionId, TransactionId};
use coval_perms::MapOp;

/// A transaction that passed validation, with plaintext changes.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidTransaction {
    pub tx_id: TransactionId,
    pub made_at: u64,
    pub changes: Vec<Change>,
}

/// The materialized content of a CoValue.
#[derive(Debug, Clone, PartialEq)]
pub enum CoValueContent {
    Map(CoMap),
    List(CoList),
    Stream(CoStream),
    Opaque(OpaqueContent),
}

impl CoValueContent {
    pub fn build(kind: CoValueKind, txs: &[ValidTransaction]) -> Self {
        match kind {
            CoValueKind::Comap => CoValueContent::Map(CoMap::from_transactions(txs)),
            CoValueKind::Colist => CoValueContent::List(CoList::from_transactions(txs)),
            CoValueKind::Costream => CoValueContent::Stream(CoStream::from_transactions(txs)),
            CoValueKind::Opaque => CoValueContent::Opaque(OpaqueContent {
                transactions: txs.to_vec(),
            }),
        }
    }

    pub fn kind(&self) -> CoValueKind {
        match self {
            CoValueContent::Map(_) => CoValueKind::Comap,
            CoValueContent::List(_) => CoValueKind::Colist,
            CoValueContent::Stream(_) => CoValueKind::Costream,
            CoValueContent::Opaque(_) => CoValueKind::Opaque,
        }
    }

    pub fn as_map(&self) -> Option<&CoMap> {
        match self {
            CoValueContent::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&CoList> {
        match self {
            CoValueContent::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&CoStream> {
        match self {
            CoValueContent::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&OpaqueContent> {
        match self {
            CoValueContent::Opaque(opaque) => Some(opaque),
            _ => None,
        }
    }

    /// Plain JSON rendering of the current state.
    pub fn to_json(&self) -> Value {
        match self {
            CoValueContent::Map(map) => map.to_json(),
            CoValueContent::List(list) => list.to_json(),
            CoValueContent::Stream(stream) => stream.to_json(),
            CoValueContent::Opaque(opaque) => Value::Array(
                opaque
                    .transactions
                    .iter()
                    .map(|tx| Value::Array(tx.changes.clone()))
                    .collect(),
            ),
        }
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Map
// ───────────────────────────────────────────────────────────────────────────

/// One write to a map key. `value` is `None` for a deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEdit {
    pub tx_id: TransactionId,
    pub made_at: u64,
    pub value: Option<Value>,
}

/// Last-writer-wins map, keeping the edit history of every key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoMap {
    edits: BTreeMap<String, Vec<MapEdit>>,
}

impl CoMap {
    pub fn from_transactions(txs: &[ValidTransaction]) -> Self {
        let mut map = CoMap::default();
        for tx in txs {
            for change in &tx.changes {
                let Some(op) = MapOp::from_change(change) else {
                    debug!(tx = ?tx.tx_id, "skipping non-map change");
                    continue;
                };
                let (key, value) = match op {
                    MapOp::Set { key, value } => (key, Some(value)),
                    MapOp::Del { key } => (key, None),
                };
                map.edits.entry(key).or_default().push(MapEdit {
                    tx_id: tx.tx_id,
                    made_at: tx.made_at,
                    value,
                });
            }
        }
        map
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.last_edit(key)?.value.as_ref()
    }

    /// The edit that produced the current value (or deletion) of `key`.
    pub fn last_edit(&self, key: &str) -> Option<&MapEdit> {
        self.edits.get(key)?.last()
    }

    /// Every edit of `key`, oldest first.
    pub fn edits(&self, key: &str) -> &[MapEdit] {
        self.edits.get(key).map_or(&[], Vec::as_slice)
    }

    /// Keys with a current (non-deleted) value.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.edits
            .iter()
            .filter(|(_, edits)| edits.last().map_or(false, |e| e.value.is_some()))
            .map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.keys().count()
    }

    pub fn is_empty(&self) -> bool {
        self.keys().next().is_none()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.keys()
                .filter_map(|k| Some((k.to_string(), self.get(k)?.clone())))
                .collect(),
        )
    }
}

// ───────────────────────────────────────────────────────────────────────────
// List
// ───────────────────────────────────────────────────────────────────────────

/// Identifies one change inside one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpId {
    #[serde(rename = "sessionID")]
    pub session_id: SessionId,
    #[serde(rename = "txIndex")]
    pub tx_index: u64,
    #[serde(rename = "changeIdx")]
    pub change_idx: u32,
}

impl OpId {
    pub fn to_json(&self) -> Value {
        json!({
            "sessionID": self.session_id.to_string(),
            "txIndex": self.tx_index,
            "changeIdx": self.change_idx,
        })
    }
}

/// One list operation inside a transaction's changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ListOp {
    /// Insert `value` right after the insertion `after`, or at the start.
    App {
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after: Option<OpId>,
    },
    /// Hide an earlier insertion.
    Del { insertion: OpId },
}

impl ListOp {
    pub fn append(value: impl Into<Value>, after: Option<OpId>) -> Self {
        ListOp::App {
            value: value.into(),
            after,
        }
    }

    pub fn delete(insertion: OpId) -> Self {
        ListOp::Del { insertion }
    }

    pub fn to_change(&self) -> Change {
        match self {
            ListOp::App { value, after } => {
                let mut change = json!({"op": "app", "value": value.clone()});
                if let Some(after) = after {
                    change["after"] = after.to_json();
                }
                change
            }
            ListOp::Del { insertion } => json!({"op": "del", "insertion": insertion.to_json()}),
        }
    }

    pub fn from_change(change: &Change) -> Option<Self> {
        serde_json::from_value(change.clone()).ok()
    }
}

struct Insertion {
    value: Value,
    deleted: bool,
}

/// Replicated list.
///
/// Each element is inserted after another element (or the start).
/// Siblings inserted after the same element are ordered newest first, and
/// an element's own successors follow it before any older sibling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoList {
    items: Vec<(OpId, Value)>,
}

impl CoList {
    pub fn from_transactions(txs: &[ValidTransaction]) -> Self {
        let mut insertions: HashMap<OpId, Insertion> = HashMap::new();
        let mut children: HashMap<Option<OpId>, Vec<(u64, OpId)>> = HashMap::new();
        let mut deletions = Vec::new();

        for tx in txs {
            for (idx, change) in tx.changes.iter().enumerate() {
                match ListOp::from_change(change) {
                    Some(ListOp::App { value, after }) => {
                        let id = OpId {
                            session_id: tx.tx_id.session_id,
                            tx_index: tx.tx_id.tx_index,
                            change_idx: idx as u32,
                        };
                        insertions.insert(
                            id,
                            Insertion {
                                value,
                                deleted: false,
                            },
                        );
                        children.entry(after).or_default().push((tx.made_at, id));
                    }
                    Some(ListOp::Del { insertion }) => deletions.push(insertion),
                    None => debug!(tx = ?tx.tx_id, "skipping non-list change"),
                }
            }
        }

        for id in deletions {
            if let Some(ins) = insertions.get_mut(&id) {
                ins.deleted = true;
            }
        }
        for siblings in children.values_mut() {
            siblings.sort_by(|a, b| b.cmp(a));
        }

        let mut items = Vec::with_capacity(insertions.len());
        let mut stack: Vec<OpId> = children
            .get(&None)
            .map(|c| c.iter().rev().map(|(_, id)| *id).collect())
            .unwrap_or_default();
        while let Some(id) = stack.pop() {
            if let Some(ins) = insertions.get(&id) {
                if !ins.deleted {
                    items.push((id, ins.value.clone()));
                }
            }
            if let Some(kids) = children.get(&Some(id)) {
                stack.extend(kids.iter().rev().map(|(_, k)| *k));
            }
        }

        CoList { items }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index).map(|(_, v)| v)
    }

    /// The insertion that produced the element at `index`.
    pub fn op_id(&self, index: usize) -> Option<OpId> {
        self.items.get(index).map(|(id, _)| *id)
    }

    /// Anchor for appending at the end.
    pub fn last_op_id(&self) -> Option<OpId> {
        self.items.last().map(|(id, _)| *id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> + '_ {
        self.items.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.iter().cloned().collect())
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Stream
// ───────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct StreamItem {
    pub tx_id: TransactionId,
    pub made_at: u64,
    pub value: Value,
}

/// Append-only per-session item lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoStream {
    by_session: BTreeMap<SessionId, Vec<StreamItem>>,
}

impl CoStream {
    pub fn from_transactions(txs: &[ValidTransaction]) -> Self {
        let mut stream = CoStream::default();
        for tx in txs {
            let items = stream.by_session.entry(tx.tx_id.session_id).or_default();
            items.extend(tx.changes.iter().map(|change| StreamItem {
                tx_id: tx.tx_id,
                made_at: tx.made_at,
                value: change.clone(),
            }));
        }
        stream
    }

    pub fn sessions(&self) -> impl Iterator<Item = &SessionId> + '_ {
        self.by_session.keys()
    }

    pub fn items(&self, session: &SessionId) -> &[StreamItem] {
        self.by_session.get(session).map_or(&[], Vec::as_slice)
    }

    pub fn latest(&self, session: &SessionId) -> Option<&StreamItem> {
        self.items(session).last()
    }

    pub fn len(&self) -> usize {
        self.by_session.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.by_session
                .iter()
                .map(|(session, items)| {
                    (
                        session.to_string(),
                        Value::Array(items.iter().map(|i| i.value.clone()).collect()),
                    )
                })
                .collect(),
        )
    }
}

/// Raw valid transactions of a binary or otherwise uninterpreted value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpaqueContent {
    pub transactions: Vec<ValidTransaction>,
}

impl OpaqueContent {
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
