//! Cooperative hashing of large incoming batches.

use std::time::{Duration, Instant};

use coval_core::{PreparedAppend, Transaction};

use crate::error::Result;

/// Fold `txs` into `prepared`, yielding to the runtime whenever more than
/// `yield_interval` of hashing work has accumulated.
///
/// The resulting digest is identical to folding synchronously.
pub async fn prepare_cooperatively(
    mut prepared: PreparedAppend,
    txs: &[Transaction],
    yield_interval: Duration,
) -> Result<PreparedAppend> {
    let mut since_yield = Instant::now();
    for tx in txs {
        prepared.push(tx)?;
        if since_yield.elapsed() >= yield_interval {
            tokio::task::yield_now().await;
            since_yield = Instant::now();
        }
    }
    Ok(prepared)
}
