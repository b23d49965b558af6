//! End-to-end scenario 4 (spec §8): two peers extend a shared chain
//! independently past a common ancestor; the shorter side reorganizes
//! onto the longer one and re-admits its orphaned transactions.

use ledgerkeep_consensus::reorg;
use ledgerkeep_core::constants::COIN_FACTOR;
use ledgerkeep_core::crypto::Secp256k1Verifier;
use ledgerkeep_core::types::TxOut;
use ledgerkeep_tests::helpers::{TestChain, Wallet};

#[test]
fn scenario_4_reorganization_onto_a_longer_fork() {
    // Both peers start from byte-identical, deterministically mined
    // genesis blocks (same default config, no payout address override).
    let peer_x = TestChain::new();
    let peer_y = TestChain::new();

    let miner_x = Wallet::generate();
    let miner_y = Wallet::generate();
    let alice = Wallet::generate();

    // Five blocks of shared history, paid to a common miner so both
    // peers' stores hold identical blocks up to height 5.
    let shared_miner = Wallet::generate();
    for _ in 0..5 {
        peer_x.mine_block(shared_miner.script_pubkey());
    }
    let shared_chain = peer_x.block_store.range(0, 6).unwrap();
    for block in &shared_chain {
        if block.header.index > 0 {
            peer_y.block_store.save(block).unwrap();
        }
    }
    peer_y.utxo.clear();
    for block in &shared_chain {
        peer_y.utxo.apply_batch(&block.transactions);
    }
    assert_eq!(peer_x.tip_height(), 5);
    assert_eq!(peer_y.tip_height(), 5);

    // Peer X extends two more blocks (height 6, 7), with a spend at
    // height 6 that only X's chain will ever confirm.
    let (outpoint, utxo_out) = peer_x.utxos_for(&shared_miner.script_pubkey())[0].clone();
    let x_only_tx = shared_miner.spend(
        vec![outpoint],
        vec![TxOut { value: utxo_out.value - COIN_FACTOR, script_pubkey: alice.script_pubkey() }],
        COIN_FACTOR,
        2_000_000_000,
    );
    assert!(peer_x.mempool.add(x_only_tx.clone()));
    peer_x.mine_block(miner_x.script_pubkey());
    peer_x.mine_block(miner_x.script_pubkey());
    assert_eq!(peer_x.tip_height(), 7);
    assert!(!peer_x.mempool.contains(&x_only_tx.tx_hash), "the spend should have been mined");

    // Peer Y independently extends three blocks (height 6, 7, 8), never
    // seeing X's transaction.
    peer_y.mine_block(miner_y.script_pubkey());
    peer_y.mine_block(miner_y.script_pubkey());
    peer_y.mine_block(miner_y.script_pubkey());
    assert_eq!(peer_y.tip_height(), 8);

    // X receives Y's (longer) chain and reorganizes onto it.
    let local_chain = peer_x.block_store.range(0, usize::MAX).unwrap();
    let new_chain = peer_y.block_store.range(0, usize::MAX).unwrap();
    let report = reorg::reorganize(
        &peer_x.block_store,
        &peer_x.utxo,
        &peer_x.mempool,
        &Secp256k1Verifier,
        &local_chain,
        &new_chain,
        peer_x.config.initial_subsidy_atomic(),
        peer_x.config.halving_interval,
    )
    .expect("new chain is valid")
    .expect("chains share a common ancestor");

    assert_eq!(report.fork_height, 5);
    assert_eq!(peer_x.tip_height(), 8);

    // X's UTXO set now matches Y's (the chain it just adopted).
    assert_eq!(peer_x.balance(&miner_y.script_pubkey()), peer_y.balance(&miner_y.script_pubkey()));
    assert_eq!(peer_x.balance(&miner_x.script_pubkey()), 0, "X's own-fork-only reward must be gone");

    // X's orphaned spend is re-admitted to the mempool (best-effort).
    assert!(peer_x.mempool.contains(&x_only_tx.tx_hash));
}
