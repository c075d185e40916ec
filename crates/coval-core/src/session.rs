//! Per-session transaction logs with hash chaining and checkpoints.
//!
//! A session only grows. Its streaming hash always equals the hash of
//! exactly the transactions it holds, and every append carries a signature
//! over that hash. Signatures are kept as sparse checkpoints so that a
//! peer can be sent a prefix ending at a signature the writer produced.

use std::collections::BTreeMap;

use crate::crypto::{Blake3Hash, Ed25519Signature, StreamingHash};
use crate::error::Result;
use crate::transaction::Transaction;

/// Result of folding a batch into a cloned streaming hash.
///
/// Computed without touching the session; applied with
/// [`SessionLog::commit`] only if the signature checks out.
#[derive(Debug, Clone)]
pub struct PreparedAppend {
    /// Transaction count the hash was computed on top of.
    pub base_len: u64,
    /// Hash state after folding in the batch.
    pub hash: StreamingHash,
    /// Encoded size of each transaction in the batch.
    pub sizes: Vec<usize>,
}

impl PreparedAppend {
    /// Start preparing on top of a session's current state.
    pub fn start(base_len: u64, hash: StreamingHash) -> Self {
        Self {
            base_len,
            hash,
            sizes: Vec::new(),
        }
    }

    /// Fold one transaction in.
    pub fn push(&mut self, tx: &Transaction) -> Result<()> {
        let size = self.hash.update(tx)?;
        self.sizes.push(size);
        Ok(())
    }

    pub fn digest(&self) -> Blake3Hash {
        self.hash.digest()
    }
}

/// The transactions written by one session, plus their hash chain.
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    transactions: Vec<Transaction>,
    tx_sizes: Vec<usize>,
    streaming_hash: StreamingHash,
    last_hash: Option<Blake3Hash>,
    last_signature: Option<Ed25519Signature>,
    signature_after: BTreeMap<u64, Ed25519Signature>,
    bytes_since_last_signature: usize,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> u64 {
        self.transactions.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn last_hash(&self) -> Option<Blake3Hash> {
        self.last_hash
    }

    pub fn last_signature(&self) -> Option<Ed25519Signature> {
        self.last_signature
    }

    /// Checkpoint signatures, keyed by the index of the last transaction
    /// they cover.
    pub fn signature_after(&self) -> &BTreeMap<u64, Ed25519Signature> {
        &self.signature_after
    }

    /// Encoded sizes of `transactions[range]`.
    pub fn size_of(&self, from: u64, to: u64) -> usize {
        self.tx_sizes[from as usize..to as usize].iter().sum()
    }

    /// Begin a speculative append on a clone of the current hash state.
    pub fn begin_append(&self) -> PreparedAppend {
        PreparedAppend::start(self.len(), self.streaming_hash.clone())
    }

    /// Fold a whole batch at once.
    pub fn prepare(&self, txs: &[Transaction]) -> Result<PreparedAppend> {
        let mut prepared = self.begin_append();
        for tx in txs {
            prepared.push(tx)?;
        }
        Ok(prepared)
    }

    /// Apply a verified batch.
    ///
    /// The caller has checked `prepared.base_len == self.len()` and the
    /// signature over `prepared.digest()`. A checkpoint is recorded once
    /// the payload since the previous one exceeds `checkpoint_threshold`.
    pub fn commit(
        &mut self,
        prepared: PreparedAppend,
        txs: Vec<Transaction>,
        signature: Ed25519Signature,
        checkpoint_threshold: usize,
    ) {
        let added: usize = prepared.sizes.iter().sum();
        self.last_hash = Some(prepared.hash.digest());
        self.streaming_hash = prepared.hash;
        self.tx_sizes.extend(prepared.sizes);
        self.transactions.extend(txs);
        self.last_signature = Some(signature);

        self.bytes_since_last_signature += added;
        if self.bytes_since_last_signature > checkpoint_threshold {
            self.signature_after.insert(self.len() - 1, signature);
            self.bytes_since_last_signature = 0;
        }
    }

    /// Recompute the chain from scratch. Used to check integrity.
    pub fn recompute_hash(&self) -> Result<Option<Blake3Hash>> {
        if self.transactions.is_empty() {
            return Ok(None);
        }
        let mut hash = StreamingHash::new();
        for tx in &self.transactions {
            hash.update(tx)?;
        }
        Ok(Some(hash.digest()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use serde_json::json;

    fn tx(i: u64, padding: usize) -> Transaction {
        Transaction::trusting(i, vec![json!({"i": i, "pad": "x".repeat(padding)})])
    }

    fn append(log: &mut SessionLog, kp: &Keypair, txs: Vec<Transaction>, threshold: usize) {
        let prepared = log.prepare(&txs).unwrap();
        let sig = kp.sign_hash(&prepared.digest());
        log.commit(prepared, txs, sig, threshold);
    }

    #[test]
    fn test_chain_matches_recompute() {
        let kp = Keypair::from_seed(&[1; 32]);
        let mut log = SessionLog::new();
        append(&mut log, &kp, vec![tx(1, 0), tx(2, 0)], 1000);
        append(&mut log, &kp, vec![tx(3, 0)], 1000);

        assert_eq!(log.len(), 3);
        assert_eq!(log.recompute_hash().unwrap(), log.last_hash());
    }

    #[test]
    fn test_prepare_does_not_mutate() {
        let kp = Keypair::from_seed(&[1; 32]);
        let mut log = SessionLog::new();
        append(&mut log, &kp, vec![tx(1, 0)], 1000);
        let before = log.last_hash();

        let _ = log.prepare(&[tx(2, 0)]).unwrap();
        assert_eq!(log.last_hash(), before);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_checkpoint_inserted_past_threshold() {
        let kp = Keypair::from_seed(&[1; 32]);
        let mut log = SessionLog::new();
        append(&mut log, &kp, vec![tx(1, 10)], 100);
        assert!(log.signature_after().is_empty());

        append(&mut log, &kp, vec![tx(2, 200)], 100);
        assert_eq!(log.signature_after().keys().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(log.signature_after()[&1], log.last_signature().unwrap());

        append(&mut log, &kp, vec![tx(3, 10)], 100);
        assert_eq!(log.signature_after().len(), 1);
    }
}
