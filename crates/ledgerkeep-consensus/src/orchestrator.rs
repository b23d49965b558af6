//! Consensus orchestrator (spec §4.14): the six-case dispatch that turns
//! one incoming candidate block into a chain-state transition.
//!
//! Grounded on the teacher's `chain_state.rs` `connect_block` /
//! `ConnectBlockResult` shape (a typed outcome rather than a bare bool),
//! generalized to the richer case table spec §4.14 requires — in
//! particular `Orphan`/`WeakFork`/`StrongFork`, which the teacher's
//! linear-chain-only model never needed to distinguish.
//!
//! The orchestrator is the only writer of [`UtxoSet`], [`Mempool`], and
//! [`BlockStore`] (spec §3 "Ownership"); callers must serialize calls to
//! [`process_block`] themselves (e.g. behind one mutex) if invoked from
//! more than one thread.

use ledgerkeep_core::crypto::SignatureVerifier;
use ledgerkeep_core::error::StorageError;
use ledgerkeep_core::types::{Block, Hash256};

use crate::block_store::BlockStore;
use crate::mempool::Mempool;
use crate::rules;
use crate::utxo::UtxoSet;

pub struct ValidationParams {
    pub initial_subsidy: u64,
    pub halving_interval: u64,
}

/// The six dispatch outcomes of spec §4.14. `StrongFork` and `Orphan`
/// carry no payload: the caller already holds `candidate` and is
/// expected to drive sync/reorg from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    Genesis,
    Extension,
    /// Parent hash not in the store; caller should request a sync, not
    /// buffer the block.
    Orphan,
    /// `candidate.index <= tip.index` and differs from the local chain;
    /// rejected silently.
    WeakFork,
    /// `candidate.index > tip.index` with a known parent that isn't the
    /// tip; hand off to [`crate::reorg`].
    StrongFork,
    Invalid(String),
}

fn apply_to_state(utxo: &UtxoSet, mempool: &Mempool, block: &Block) {
    utxo.apply_batch(&block.transactions);
    let mined: Vec<Hash256> = block.transactions.iter().map(|tx| tx.tx_hash).collect();
    mempool.remove_mined(&mined);
}

/// Validate and dispatch `candidate` against the current tip, mutating
/// state in place for `Genesis`/`Extension`.
pub fn process_block(
    block_store: &BlockStore,
    utxo: &UtxoSet,
    mempool: &Mempool,
    verifier: &dyn SignatureVerifier,
    candidate: &Block,
    params: &ValidationParams,
) -> Result<ChainOutcome, StorageError> {
    let tip = block_store.get_last()?;

    let (is_genesis, is_extension) = match &tip {
        None => (candidate.header.index == 0, false),
        Some(tip_block) => (
            false,
            candidate.header.previous_hash == tip_block.header.block_hash
                && candidate.header.index == tip_block.header.index + 1,
        ),
    };

    if is_genesis || is_extension {
        if let Err(e) = rules::validate_block(
            candidate,
            candidate.header.index,
            utxo,
            verifier,
            params.initial_subsidy,
            params.halving_interval,
        ) {
            return Ok(ChainOutcome::Invalid(e.to_string()));
        }
        apply_to_state(utxo, mempool, candidate);
        block_store.save(candidate)?;
        return Ok(if is_genesis {
            ChainOutcome::Genesis
        } else {
            ChainOutcome::Extension
        });
    }

    let tip_block = tip.expect("genesis case handled above");
    if candidate.header.index <= tip_block.header.index {
        return Ok(ChainOutcome::WeakFork);
    }

    match block_store.get_by_hash(&candidate.header.previous_hash)? {
        Some(_) => Ok(ChainOutcome::StrongFork),
        None => Ok(ChainOutcome::Orphan),
    }
}
