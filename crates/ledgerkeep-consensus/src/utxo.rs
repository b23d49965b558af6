//! UTXO set (spec §4.5): unspent outputs indexed by outpoint, with a
//! secondary index by `script_pubkey` bytes for address balance lookups.
//!
//! Unlike the teacher's [`chain_state`](../../ledgerkeep-consensus) store,
//! this set carries no undo log — chain reorganization (spec §4.15)
//! rebuilds it from scratch via [`UtxoSet::clear`] plus replay rather
//! than disconnecting blocks one at a time.

use std::collections::HashMap;

use ledgerkeep_core::types::{OutPoint, Transaction, TxOut};
use parking_lot::Mutex;

#[derive(Default)]
struct Inner {
    /// Unspent outputs by outpoint.
    by_outpoint: HashMap<OutPoint, TxOut>,
    /// Outpoints grouped by the owning `script_pubkey`, for balance scans.
    by_script: HashMap<Vec<u8>, Vec<OutPoint>>,
}

impl Inner {
    fn add(&mut self, outpoint: OutPoint, output: TxOut) {
        self.by_script
            .entry(output.script_pubkey.clone())
            .or_default()
            .push(outpoint.clone());
        self.by_outpoint.insert(outpoint, output);
    }

    fn remove(&mut self, outpoint: &OutPoint) -> Option<TxOut> {
        let removed = self.by_outpoint.remove(outpoint)?;
        if let Some(list) = self.by_script.get_mut(&removed.script_pubkey) {
            list.retain(|op| op != outpoint);
            if list.is_empty() {
                self.by_script.remove(&removed.script_pubkey);
            }
        }
        Some(removed)
    }
}

/// Thread-safe unspent-output set. All mutation is funneled through a
/// single mutex: the consensus orchestrator is the only writer (spec §5
/// "Ownership"), so contention is limited to readers racing a block
/// application.
pub struct UtxoSet {
    inner: Mutex<Inner>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn add(&self, outpoint: OutPoint, output: TxOut) {
        self.inner.lock().add(outpoint, output);
    }

    pub fn remove(&self, outpoint: &OutPoint) -> Option<TxOut> {
        self.inner.lock().remove(outpoint)
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<TxOut> {
        self.inner.lock().by_outpoint.get(outpoint).cloned()
    }

    /// All unspent outputs whose `script_pubkey` equals `script_pubkey`,
    /// as `(outpoint, output)` pairs.
    pub fn get_by_address(&self, script_pubkey: &[u8]) -> Vec<(OutPoint, TxOut)> {
        let inner = self.inner.lock();
        match inner.by_script.get(script_pubkey) {
            Some(outpoints) => outpoints
                .iter()
                .filter_map(|op| inner.by_outpoint.get(op).map(|out| (op.clone(), out.clone())))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Apply a block's worth of spends and creations atomically under a
    /// single lock acquisition: every non-coinbase input is removed,
    /// then every output of every transaction (including the coinbase)
    /// is added.
    pub fn apply_batch(&self, transactions: &[Transaction]) {
        let mut inner = self.inner.lock();
        for tx in transactions {
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    inner.remove(&input.outpoint());
                }
            }
        }
        for tx in transactions {
            for (index, output) in tx.outputs.iter().enumerate() {
                let outpoint = OutPoint {
                    tx_hash: tx.tx_hash,
                    output_index: index as u32,
                };
                inner.add(outpoint, output.clone());
            }
        }
    }

    pub fn total_supply(&self) -> u64 {
        self.inner
            .lock()
            .by_outpoint
            .values()
            .map(|out| out.value)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_outpoint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.by_outpoint.clear();
        inner.by_script.clear();
    }
}

impl Default for UtxoSet {
    fn default() -> Self {
        Self::new()
    }
}
