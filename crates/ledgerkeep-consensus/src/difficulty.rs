//! Difficulty retargeting (spec §4.8).
//!
//! Retargets every `adjustment_interval` blocks by comparing the actual
//! time the last epoch took against the target timespan, clamped to
//! `[target/4, target*4]` so a single epoch can only move difficulty by
//! 4x in either direction.

use ledgerkeep_core::types::CompactBits;
use primitive_types::U256;

pub struct RetargetParams {
    pub adjustment_interval: u64,
    pub target_block_time_secs: u64,
}

/// `bits` for the block at `height`, given the first and last headers of
/// the epoch it belongs to. When `height` does not fall on a retarget
/// boundary, callers should simply reuse the tip's `bits` instead of
/// calling this function.
///
/// `first_timestamp`/`last_timestamp` are the timestamps of the first
/// and last blocks of the epoch just completed; `last_bits` is that
/// epoch's difficulty.
pub fn retarget(
    first_timestamp: i64,
    last_timestamp: i64,
    last_bits: CompactBits,
    params: &RetargetParams,
) -> CompactBits {
    let target_timespan = params.adjustment_interval * params.target_block_time_secs;
    let actual_timespan = (last_timestamp - first_timestamp).max(0) as u64;
    let actual_timespan = actual_timespan.clamp(target_timespan / 4, target_timespan * 4);

    let current_target = last_bits.to_target();
    let new_target = current_target
        .saturating_mul(U256::from(actual_timespan))
        / U256::from(target_timespan);
    let new_target = new_target.min(CompactBits::max_target());

    CompactBits::from_target(new_target)
}

/// Whether `height` falls on a retarget boundary (the first block of a
/// new epoch, where `height % adjustment_interval == 0`). Height 0
/// (genesis) is never retargeted by this function; callers supply the
/// genesis `bits` directly.
pub fn is_retarget_height(height: u32, adjustment_interval: u64) -> bool {
    height != 0 && u64::from(height) % adjustment_interval == 0
}
