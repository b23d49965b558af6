//! Subsidy halving schedule (spec §4.9).

use ledgerkeep_core::constants::{DEFAULT_HALVING_INTERVAL, DEFAULT_INITIAL_SUBSIDY};

/// `subsidy(height) = initial_subsidy >> (height / halving_interval)`.
///
/// Bit-shift semantics mean the subsidy reaches zero once the shift
/// count reaches the bit width of `initial_subsidy`; shifting by ≥64 is
/// saturated to zero rather than relying on wrapping-shift behavior.
pub fn subsidy(height: u64, initial_subsidy: u64, halving_interval: u64) -> u64 {
    let halvings = height / halving_interval;
    if halvings >= 64 {
        0
    } else {
        initial_subsidy >> halvings
    }
}

/// Subsidy using the protocol's default parameters.
pub fn default_subsidy(height: u64) -> u64 {
    subsidy(height, DEFAULT_INITIAL_SUBSIDY, DEFAULT_HALVING_INTERVAL)
}
