//! Canonical byte layouts for consensus-critical hashes (§4.2 of the protocol).
//!
//! These serializations are independent of `serde`/`bincode` — they are a
//! fixed wire format whose byte-for-byte determinism is itself a consensus
//! rule. Any deviation here causes a chain split.

use crate::crypto::double_sha256;
use crate::types::{BlockHeader, Hash256, Transaction};

fn push_bytes_field(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

/// Build the transaction hash preimage (§4.2): all fields little-endian,
/// `script_sig`/`script_pubkey` length-prefixed.
pub fn transaction_preimage(tx: &Transaction) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(tx.timestamp as u64).to_le_bytes());

    buf.extend_from_slice(&(tx.inputs.len() as u32).to_le_bytes());
    for input in &tx.inputs {
        buf.extend_from_slice(input.previous_tx_hash.as_bytes());
        buf.extend_from_slice(&input.output_index.to_le_bytes());
        push_bytes_field(&mut buf, &input.script_sig);
    }

    buf.extend_from_slice(&(tx.outputs.len() as u32).to_le_bytes());
    for output in &tx.outputs {
        buf.extend_from_slice(&output.value.to_le_bytes());
        push_bytes_field(&mut buf, &output.script_pubkey);
    }

    buf.extend_from_slice(&tx.fee.to_le_bytes());
    buf
}

/// Recompute a transaction's hash from its canonical preimage.
pub fn transaction_hash(tx: &Transaction) -> Hash256 {
    double_sha256(&transaction_preimage(tx))
}

/// Build the block-header hash preimage (§4.2).
pub fn block_header_preimage(header: &BlockHeader) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + 32 + 32 + 8 + 4 + 4);
    buf.extend_from_slice(&header.index.to_le_bytes());
    buf.extend_from_slice(header.previous_hash.as_bytes());
    buf.extend_from_slice(header.merkle_root.as_bytes());
    buf.extend_from_slice(&(header.timestamp as u64).to_le_bytes());
    buf.extend_from_slice(&header.bits.0.to_be_bytes());
    buf.extend_from_slice(&header.nonce.to_le_bytes());
    buf
}

/// Recompute a header's hash from its canonical preimage.
pub fn block_header_hash(header: &BlockHeader) -> Hash256 {
    double_sha256(&block_header_preimage(header))
}

/// Build the signature preimage for input `input_index` (SIGHASH_ALL
/// analogue, §4.2): the transaction with every `script_sig` cleared,
/// hashed by its own canonical tx-hash rule.
pub fn signature_preimage_hash(tx: &Transaction, input_index: usize) -> Hash256 {
    let mut stripped = tx.clone();
    for input in &mut stripped.inputs {
        input.script_sig.clear();
    }
    let _ = input_index; // the digest is the same for every input; kept for call-site clarity
    transaction_hash(&stripped)
}
