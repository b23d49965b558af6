//! Merkle tree over transaction hashes (spec §4.3).
//!
//! No domain separation between leaf and internal-node hashes — both are
//! plain `double_sha256(left ‖ right)` — matching the reference
//! implementation's observable wire behavior exactly. Odd-length layers
//! are padded by duplicating the last element before pairing.

use serde::{Deserialize, Serialize};

use crate::crypto::double_sha256;
use crate::types::Hash256;

/// Combine two hashes into their parent: `double_sha256(left ‖ right)`.
fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(left.as_bytes());
    buf.extend_from_slice(right.as_bytes());
    double_sha256(&buf)
}

fn next_layer(layer: &[Hash256]) -> Vec<Hash256> {
    let mut next = Vec::with_capacity(layer.len().div_ceil(2));
    let mut i = 0;
    while i < layer.len() {
        let left = &layer[i];
        let right = if i + 1 < layer.len() {
            &layer[i + 1]
        } else {
            left
        };
        next.push(node_hash(left, right));
        i += 2;
    }
    next
}

/// Compute the Merkle root over a slice of transaction hashes (§4.3).
///
/// Empty input roots to `double_sha256("")`; a single leaf roots to
/// itself unchanged.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return double_sha256(b"");
    }
    if leaves.len() == 1 {
        return leaves[0];
    }

    let mut current = leaves.to_vec();
    while current.len() > 1 {
        current = next_layer(&current);
    }
    current[0]
}

/// Which side the sibling hash sits on relative to the running hash.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode,
)]
pub enum Side {
    /// Sibling is to the left of the running hash (`"L"`).
    Left,
    /// Sibling is to the right of the running hash (`"R"`).
    Right,
}

/// A single step in a Merkle inclusion proof: a sibling hash and which
/// side it sits on.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode,
)]
pub struct ProofStep {
    pub side: Side,
    pub sibling: Hash256,
}

/// Merkle inclusion proof for a single transaction hash.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode,
)]
pub struct MerkleProof {
    pub leaf: Hash256,
    pub steps: Vec<ProofStep>,
}

impl MerkleProof {
    /// Recompute the root implied by this proof and compare it to
    /// `expected_root` (§4.3 `verify_proof`).
    pub fn verify(&self, expected_root: &Hash256) -> bool {
        let mut current = self.leaf;
        for step in &self.steps {
            current = match step.side {
                Side::Left => node_hash(&step.sibling, &current),
                Side::Right => node_hash(&current, &step.sibling),
            };
        }
        current == *expected_root
    }
}

/// Full Merkle tree over a set of transaction hashes, retaining every
/// layer so that inclusion proofs can be produced for any leaf (§4.3
/// `get_proof`).
#[derive(Clone, Debug)]
pub struct MerkleTree {
    leaves: Vec<Hash256>,
    layers: Vec<Vec<Hash256>>,
}

impl MerkleTree {
    pub fn build(leaves: &[Hash256]) -> Self {
        if leaves.is_empty() {
            return Self {
                leaves: Vec::new(),
                layers: Vec::new(),
            };
        }
        let mut layers = vec![leaves.to_vec()];
        while layers.last().unwrap().len() > 1 {
            let next = next_layer(layers.last().unwrap());
            layers.push(next);
        }
        Self {
            leaves: leaves.to_vec(),
            layers,
        }
    }

    pub fn root(&self) -> Hash256 {
        self.layers
            .last()
            .and_then(|l| l.first())
            .copied()
            .unwrap_or_else(|| double_sha256(b""))
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Build an inclusion proof for the given tx hash. Returns `None` if
    /// `target` is absent (§4.3 `get_proof`).
    pub fn get_proof(&self, target: &Hash256) -> Option<MerkleProof> {
        let mut pos = self.leaves.iter().position(|h| h == target)?;

        if self.layers.len() <= 1 {
            return Some(MerkleProof {
                leaf: *target,
                steps: Vec::new(),
            });
        }

        let mut steps = Vec::new();
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling_pos = pos ^ 1;
            let sibling = if sibling_pos < layer.len() {
                layer[sibling_pos]
            } else {
                layer[pos]
            };
            let side = if pos % 2 == 0 { Side::Right } else { Side::Left };
            steps.push(ProofStep { side, sibling });
            pos /= 2;
        }

        Some(MerkleProof {
            leaf: *target,
            steps,
        })
    }
}
