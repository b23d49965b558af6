//! Chain reorganization (spec §4.15): given a candidate chain known to be
//! longer than the local tip and to share an ancestor with it, replace
//! the canonical chain and rebuild state from scratch.
//!
//! Grounded on the teacher's `chain_state.rs` reorg path for the
//! find-common-ancestor idiom, generalized from its per-block
//! disconnect/connect undo-log dance to spec's simpler clear-then-replay
//! model — this workspace's [`UtxoSet`] carries no undo log, so there is
//! nothing to disconnect.

use ledgerkeep_core::crypto::SignatureVerifier;
use ledgerkeep_core::error::{ChainError, ConsensusError};
use ledgerkeep_core::types::Block;

use crate::block_store::BlockStore;
use crate::mempool::Mempool;
use crate::rules;
use crate::utxo::UtxoSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorgReport {
    pub fork_height: u32,
    pub orphaned_tx_count: usize,
    pub restored_tx_count: usize,
}

/// Find the highest height at which `local` and `candidate` agree on the
/// block hash, scanning from height 0. `None` if they share no ancestor
/// at all (including height 0).
fn find_fork_point(local: &[Block], candidate: &[Block]) -> Option<u32> {
    let mut fork = None;
    for (local_block, candidate_block) in local.iter().zip(candidate.iter()) {
        if local_block.header.block_hash == candidate_block.header.block_hash {
            fork = Some(local_block.header.index);
        } else {
            break;
        }
    }
    fork
}

/// Validates every block of a candidate chain in order against a scratch
/// UTXO set, checking header contiguity and running each block through
/// [`rules::validate_block`]. Nothing here touches `block_store` or the
/// live `utxo`/`mempool` — a rejected candidate leaves persisted and live
/// state untouched.
fn validate_chain(
    chain: &[Block],
    verifier: &dyn SignatureVerifier,
    initial_subsidy: u64,
    halving_interval: u64,
) -> Result<(), ConsensusError> {
    let scratch = UtxoSet::new();
    let mut previous: Option<&Block> = None;

    for block in chain {
        if let Some(prev) = previous {
            let expected_index = prev.header.index + 1;
            if block.header.index != expected_index || block.header.previous_hash != prev.header.block_hash {
                return Err(ChainError::HeaderChainBroken {
                    index: u64::from(block.header.index),
                }
                .into());
            }
        }

        rules::validate_block(
            block,
            block.header.index,
            &scratch,
            verifier,
            initial_subsidy,
            halving_interval,
        )?;
        scratch.apply_batch(&block.transactions);
        previous = Some(block);
    }

    Ok(())
}

/// Replace the canonical chain with `new_chain` (spec §4.15's five
/// steps). `local_chain` is the full current canonical chain in
/// ascending height order, used to find the fork point and collect
/// transactions orphaned off the losing side.
///
/// Every block of `new_chain` is run through [`rules::validate_block`]
/// and checked for header contiguity, against a scratch UTXO set, before
/// anything is persisted or applied to the live `utxo`/`mempool` — a
/// peer cannot get a longer-but-invalid chain replayed as canonical.
pub fn reorganize(
    block_store: &BlockStore,
    utxo: &UtxoSet,
    mempool: &Mempool,
    verifier: &dyn SignatureVerifier,
    local_chain: &[Block],
    new_chain: &[Block],
    initial_subsidy: u64,
    halving_interval: u64,
) -> Result<Option<ReorgReport>, ConsensusError> {
    let Some(fork_height) = find_fork_point(local_chain, new_chain) else {
        return Ok(None);
    };

    validate_chain(new_chain, verifier, initial_subsidy, halving_interval)?;

    let orphaned_txs: Vec<_> = local_chain
        .iter()
        .filter(|b| b.header.index > fork_height)
        .flat_map(|b| b.transactions.iter().filter(|tx| !tx.is_coinbase()).cloned())
        .collect();

    block_store.save_atomic(new_chain)?;

    utxo.clear();
    for block in new_chain {
        utxo.apply_batch(&block.transactions);
    }

    let orphaned_tx_count = orphaned_txs.len();
    let mut restored_tx_count = 0;
    for tx in orphaned_txs {
        if mempool.add(tx) {
            restored_tx_count += 1;
        }
    }

    Ok(Some(ReorgReport {
        fork_height,
        orphaned_tx_count,
        restored_tx_count,
    }))
}
