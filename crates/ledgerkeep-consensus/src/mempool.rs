//! Bounded pending-transaction pool (spec §4.6).
//!
//! Unlike the teacher's [`Mempool`](../../ledgerkeep-consensus), this pool
//! does not evict by fee rate when full — `add` simply rejects once
//! `max_size` is reached, and the only way out is [`Mempool::remove_mined`]
//! clearing space as blocks confirm.

use std::collections::HashMap;

use ledgerkeep_core::types::{Hash256, Transaction};
use parking_lot::Mutex;

pub struct Mempool {
    inner: Mutex<HashMap<Hash256, Transaction>>,
    max_size: usize,
}

impl Mempool {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            max_size,
        }
    }

    /// Admit `tx`. Rejects (returns `false`) if its hash is already
    /// present or the pool is at capacity.
    pub fn add(&self, tx: Transaction) -> bool {
        let mut inner = self.inner.lock();
        if inner.contains_key(&tx.tx_hash) || inner.len() >= self.max_size {
            return false;
        }
        inner.insert(tx.tx_hash, tx);
        true
    }

    pub fn remove_mined(&self, tx_hashes: &[Hash256]) {
        let mut inner = self.inner.lock();
        for hash in tx_hashes {
            inner.remove(hash);
        }
    }

    pub fn contains(&self, tx_hash: &Hash256) -> bool {
        self.inner.lock().contains_key(tx_hash)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// Transactions ordered by fee descending, ties broken by ascending
    /// `tx_hash`, truncated to `max_count`.
    pub fn select_for_block(&self, max_count: usize) -> Vec<Transaction> {
        let inner = self.inner.lock();
        let mut txs: Vec<Transaction> = inner.values().cloned().collect();
        txs.sort_by(|a, b| b.fee.cmp(&a.fee).then_with(|| a.tx_hash.cmp(&b.tx_hash)));
        txs.truncate(max_count);
        txs
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
