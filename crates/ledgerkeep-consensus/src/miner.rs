//! Block builder / miner (spec §4.16).
//!
//! Grounded on the teacher's `rill-consensus/src/engine.rs` nonce-search
//! loop shape (`mine_block`), generalized from its Phase-1 SHA-256
//! mock-PoW helper to the full coinbase-construction and merkle-root
//! pipeline spec's block builder describes; the BIP34-like height tag in
//! the coinbase `script_sig` follows the original implementation's block
//! builder (spec's Open Question resolves this tag as mandatory).
//!
//! Genesis is not produced here — per spec §4.16 step 1, a miner with no
//! tip requires the caller to construct the genesis block independently
//! (see the node crate).

use std::sync::atomic::{AtomicBool, Ordering};

use ledgerkeep_core::constants::{COINBASE_OUTPUT_INDEX, DEFAULT_MAX_NONCE, DEFAULT_MAX_TX_PER_BLOCK};
use ledgerkeep_core::error::StorageError;
use ledgerkeep_core::merkle::merkle_root;
use ledgerkeep_core::preimage::{block_header_hash, transaction_hash};
use ledgerkeep_core::types::{Block, BlockHeader, Hash256, Transaction, TxIn};

use crate::block_store::BlockStore;
use crate::difficulty::{self, RetargetParams};
use crate::mempool::Mempool;
use crate::reward::subsidy;

pub struct MinerParams {
    pub initial_subsidy: u64,
    pub halving_interval: u64,
    pub retarget: RetargetParams,
    pub max_tx_per_block: usize,
    pub max_nonce: u32,
}

impl Default for MinerParams {
    fn default() -> Self {
        Self {
            initial_subsidy: ledgerkeep_core::constants::DEFAULT_INITIAL_SUBSIDY,
            halving_interval: ledgerkeep_core::constants::DEFAULT_HALVING_INTERVAL,
            retarget: RetargetParams {
                adjustment_interval: ledgerkeep_core::constants::DEFAULT_DIFFICULTY_ADJUSTMENT_INTERVAL,
                target_block_time_secs: ledgerkeep_core::constants::DEFAULT_TARGET_BLOCK_TIME_SECS,
            },
            max_tx_per_block: DEFAULT_MAX_TX_PER_BLOCK,
            max_nonce: DEFAULT_MAX_NONCE,
        }
    }
}

fn build_coinbase(height: u32, total_reward: u64, miner_script_pubkey: Vec<u8>, timestamp: i64) -> Transaction {
    let mut coinbase = Transaction {
        tx_hash: Hash256::ZERO,
        timestamp,
        inputs: vec![TxIn {
            previous_tx_hash: Hash256::ZERO,
            output_index: COINBASE_OUTPUT_INDEX,
            script_sig: height.to_le_bytes().to_vec(),
        }],
        outputs: vec![ledgerkeep_core::types::TxOut {
            value: total_reward,
            script_pubkey: miner_script_pubkey,
        }],
        fee: 0,
    };
    coinbase.tx_hash = transaction_hash(&coinbase);
    coinbase
}

/// `bits` for the next block: the tip's retained `bits` unless `height`
/// falls on a retarget boundary, in which case the epoch just completed
/// is read back from `block_store` to compute the new target.
fn next_bits(
    block_store: &BlockStore,
    tip: &BlockHeader,
    height: u32,
    params: &RetargetParams,
) -> Result<ledgerkeep_core::types::CompactBits, StorageError> {
    if !difficulty::is_retarget_height(height, params.adjustment_interval) {
        return Ok(tip.bits);
    }

    let epoch_start_height = height - u32::try_from(params.adjustment_interval).unwrap_or(u32::MAX);
    let first_timestamp = block_store
        .range(epoch_start_height, 1)?
        .first()
        .map(|b| b.header.timestamp)
        .unwrap_or(tip.timestamp);

    Ok(difficulty::retarget(first_timestamp, tip.timestamp, tip.bits, params))
}

/// Build a candidate block on top of the current tip and search for a
/// satisfying nonce, checking `interrupt` after every trial. Returns
/// `Ok(None)` if there is no tip yet (genesis case), the nonce space is
/// exhausted without a solution, or `interrupt` fires mid-search.
pub fn mine_next_block(
    block_store: &BlockStore,
    mempool: &Mempool,
    miner_script_pubkey: Vec<u8>,
    timestamp: i64,
    interrupt: &AtomicBool,
    params: &MinerParams,
) -> Result<Option<Block>, StorageError> {
    let tip = match block_store.get_last()? {
        Some(block) => block,
        None => return Ok(None),
    };

    let height = tip.header.index + 1;
    let bits = next_bits(block_store, &tip.header, height, &params.retarget)?;

    let selected = mempool.select_for_block(params.max_tx_per_block);
    let total_fees: u64 = selected.iter().map(|tx| tx.fee).sum();
    let total_reward = subsidy(u64::from(height), params.initial_subsidy, params.halving_interval)
        .saturating_add(total_fees);

    let coinbase = build_coinbase(height, total_reward, miner_script_pubkey, timestamp);

    let mut leaves = Vec::with_capacity(1 + selected.len());
    leaves.push(coinbase.tx_hash);
    leaves.extend(selected.iter().map(|tx| tx.tx_hash));

    let mut header = BlockHeader {
        index: height,
        timestamp,
        previous_hash: tip.header.block_hash,
        bits,
        merkle_root: merkle_root(&leaves),
        nonce: 0,
        block_hash: Hash256::ZERO,
    };

    let target = bits.to_target();
    for nonce in 0..=params.max_nonce {
        if interrupt.load(Ordering::Relaxed) {
            return Ok(None);
        }
        header.nonce = nonce;
        let candidate_hash = block_header_hash(&header);
        if candidate_hash.as_u256() <= target {
            header.block_hash = candidate_hash;
            let mut transactions = Vec::with_capacity(1 + selected.len());
            transactions.push(coinbase);
            transactions.extend(selected);
            return Ok(Some(Block { header, transactions }));
        }
    }

    Ok(None)
}
