//! Core protocol types: hashes, compact targets, transactions, blocks.
//!
//! All monetary values are atomic units (1 coin = `COIN_FACTOR`). Script
//! fields are raw bytes end to end; hex is only a textual boundary
//! representation used by the wire/storage codec, never carried in these
//! types themselves.

use std::fmt;

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::constants::{COINBASE_OUTPUT_INDEX, MAX_TARGET_EXPONENT, MAX_TARGET_MANTISSA};

/// A 32-byte hash, rendered lowercase hex. The all-zero hash is "null".
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Interpret the 32 bytes as a big-endian 256-bit unsigned integer,
    /// matching the natural reading of the hex string (`int(hash, 16)`
    /// in spec §4.10's `int(block_hash) ≤ target(bits)`).
    pub fn as_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Compact proof-of-work target encoding ("bits"): first byte is an
/// exponent, remaining three bytes a mantissa (spec §3).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct CompactBits(pub u32);

impl CompactBits {
    /// `MAX_TARGET`: mantissa `0x7fffff`, exponent `0x20` (spec §3).
    pub fn max_target() -> U256 {
        CompactBits((MAX_TARGET_EXPONENT as u32) << 24 | MAX_TARGET_MANTISSA).to_target()
    }

    /// Expand the compact encoding to its numeric target, capped at
    /// `MAX_TARGET`.
    pub fn to_target(self) -> U256 {
        let exponent = self.0 >> 24;
        // Mask off the sign bit (0x0080_0000); spec's mantissa has 23 bits
        // of precision (§8 round-trip note).
        let mantissa = U256::from(self.0 & 0x007f_ffff);

        let target = if exponent <= 3 {
            mantissa >> (8 * (3 - exponent))
        } else {
            mantissa << (8 * (exponent - 3))
        };

        let max = CompactBits((MAX_TARGET_EXPONENT as u32) << 24 | MAX_TARGET_MANTISSA);
        if self.0 != max.0 && target > max.to_target_uncapped() {
            max.to_target_uncapped()
        } else {
            target
        }
    }

    /// Expand without capping — used internally to compute `MAX_TARGET`
    /// itself without infinite recursion.
    fn to_target_uncapped(self) -> U256 {
        let exponent = self.0 >> 24;
        let mantissa = U256::from(self.0 & 0x007f_ffff);
        if exponent <= 3 {
            mantissa >> (8 * (3 - exponent))
        } else {
            mantissa << (8 * (exponent - 3))
        }
    }

    /// Compress a numeric target back to compact form, normalizing the
    /// mantissa to 23 bits of precision (spec §8 round-trip note).
    pub fn from_target(target: U256) -> Self {
        if target.is_zero() {
            return CompactBits(0);
        }

        let bytes = target.to_big_endian();
        let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap();
        let mut exponent = (32 - first_nonzero) as u32;

        let mut mantissa: u32 = if exponent <= 3 {
            let shift = 8 * (3 - exponent);
            (target << shift).low_u32()
        } else {
            let shift = 8 * (exponent - 3);
            (target >> shift).low_u32()
        };

        // If the top bit of the 3-byte mantissa is set it would be
        // misread as a sign bit; shift one more byte right and bump the
        // exponent to keep it clear.
        if mantissa & 0x0080_0000 != 0 {
            mantissa >>= 8;
            exponent += 1;
        }

        let bits = CompactBits((exponent << 24) | (mantissa & 0x007f_ffff));
        let max = CompactBits((MAX_TARGET_EXPONENT as u32) << 24 | MAX_TARGET_MANTISSA);
        if bits.to_target_uncapped() > max.to_target_uncapped() {
            max
        } else {
            bits
        }
    }
}

impl fmt::Display for CompactBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// A transaction input (spec §3). Coinbase inputs set `previous_tx_hash`
/// to the null hash and `output_index` to `COINBASE_OUTPUT_INDEX`.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode,
)]
pub struct TxIn {
    pub previous_tx_hash: Hash256,
    pub output_index: u32,
    pub script_sig: Vec<u8>,
}

impl TxIn {
    pub fn is_coinbase_input(&self) -> bool {
        self.previous_tx_hash.is_zero() && self.output_index == COINBASE_OUTPUT_INDEX
    }

    /// The `(tx_hash, output_index)` key this input references, for UTXO
    /// lookups. Meaningless for a coinbase input.
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            tx_hash: self.previous_tx_hash,
            output_index: self.output_index,
        }
    }
}

/// A transaction output (spec §3).
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode,
)]
pub struct TxOut {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

/// A key into the UTXO set: `(tx_hash, output_index)`.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    pub tx_hash: Hash256,
    pub output_index: u32,
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.output_index)
    }
}

/// A transaction (spec §3).
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    pub tx_hash: Hash256,
    pub timestamp: i64,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub fee: u64,
}

impl Transaction {
    /// A transaction is coinbase iff it has exactly one input and that
    /// input is the coinbase sentinel (spec §3).
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase_input()
    }

    /// Sum of output values. `None` on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }
}

/// A block header (spec §3). `block_hash` and `merkle_root` are committed
/// fields, not derived lazily, so that a header can be validated standalone
/// (e.g. for SPV clients that never see the full block).
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    pub index: u32,
    pub timestamp: i64,
    pub previous_hash: Hash256,
    pub bits: CompactBits,
    pub merkle_root: Hash256,
    pub nonce: u32,
    pub block_hash: Hash256,
}

/// A block: a header plus an ordered, non-empty transaction list whose
/// first element is the coinbase (spec §3).
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode,
)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }
}
