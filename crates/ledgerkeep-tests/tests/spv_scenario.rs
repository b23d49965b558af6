//! End-to-end scenario 5 (spec §8): an SPV client verifies a Merkle
//! proof for a transaction against a header it already holds, and
//! rejects a tampered proof.

use ledgerkeep_core::constants::COIN_FACTOR;
use ledgerkeep_core::merkle::MerkleTree;
use ledgerkeep_core::types::TxOut;
use ledgerkeep_tests::helpers::{TestChain, Wallet};

#[test]
fn scenario_5_spv_merkle_proof_round_trip_and_tamper_detection() {
    let chain = TestChain::new();
    let alice = Wallet::generate();
    let bob = Wallet::generate();

    for _ in 0..41 {
        chain.mine_block(alice.script_pubkey());
    }

    let (outpoint, utxo_out) = chain.utxos_for(&alice.script_pubkey())[0].clone();
    let tx = alice.spend(
        vec![outpoint],
        vec![TxOut { value: utxo_out.value - COIN_FACTOR, script_pubkey: bob.script_pubkey() }],
        COIN_FACTOR,
        3_000_000_000,
    );
    let tx_hash = tx.tx_hash;
    assert!(chain.mempool.add(tx));
    let block = chain.mine_block(alice.script_pubkey());
    assert_eq!(chain.tip_height(), 42);

    // Server side: locate the block, build the tree, produce the proof.
    let leaves: Vec<_> = block.transactions.iter().map(|t| t.tx_hash).collect();
    let tree = MerkleTree::build(&leaves);
    let proof = tree.get_proof(&tx_hash).expect("the spending tx is in this block");
    let block_hash = block.header.block_hash;
    let merkle_root = block.header.merkle_root;

    // Client side: holds the header for `block_hash` (as if via HEADERS),
    // checks it against the claimed root, then verifies the proof.
    assert_eq!(merkle_root, tree.root());
    assert!(proof.verify(&merkle_root));

    // Flipping any byte of the proof must break verification.
    let mut tampered = proof.clone();
    let first_byte = tampered.steps[0].sibling.as_bytes()[0];
    let mut sibling_bytes = *tampered.steps[0].sibling.as_bytes();
    sibling_bytes[0] = first_byte ^ 0xFF;
    tampered.steps[0].sibling = ledgerkeep_core::types::Hash256::from_bytes(sibling_bytes);
    assert!(!tampered.verify(&merkle_root));

    let _ = block_hash;
}
