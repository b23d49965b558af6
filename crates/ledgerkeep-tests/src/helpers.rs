//! Shared scaffolding for the end-to-end scenario tests: a chain harness
//! wrapping the real block store / UTXO set / mempool, plus signed
//! spending-transaction construction.

use std::sync::atomic::AtomicBool;

use ledgerkeep_consensus::block_store::BlockStore;
use ledgerkeep_consensus::difficulty::RetargetParams;
use ledgerkeep_consensus::mempool::Mempool;
use ledgerkeep_consensus::miner::{self, MinerParams};
use ledgerkeep_consensus::orchestrator::{self, ChainOutcome, ValidationParams};
use ledgerkeep_consensus::utxo::UtxoSet;
use ledgerkeep_core::address::Address;
use ledgerkeep_core::crypto::{KeyPair, Secp256k1Verifier};
use ledgerkeep_core::preimage::{signature_preimage_hash, transaction_hash};
use ledgerkeep_core::script::{p2pkh_script_pubkey, p2pkh_script_sig};
use ledgerkeep_core::types::{Block, OutPoint, Transaction, TxIn, TxOut};
use ledgerkeep_node_lib::config::Config;
use ledgerkeep_node_lib::node::build_genesis;

/// A funded keypair with its P2PKH address and locking script.
pub struct Wallet {
    pub keypair: KeyPair,
    pub address: Address,
}

impl Wallet {
    pub fn generate() -> Self {
        let keypair = KeyPair::generate();
        let address = Address::from_public_key(&keypair.public_key());
        Self { keypair, address }
    }

    pub fn script_pubkey(&self) -> Vec<u8> {
        p2pkh_script_pubkey(&self.address.pubkey_hash())
    }

    /// Build and sign a transaction spending `inputs` (each an outpoint
    /// owned by this wallet) to `outputs`, with the given `fee`.
    pub fn spend(&self, inputs: Vec<OutPoint>, outputs: Vec<TxOut>, fee: u64, timestamp: i64) -> Transaction {
        let mut tx = Transaction {
            tx_hash: ledgerkeep_core::types::Hash256::ZERO,
            timestamp,
            inputs: inputs
                .into_iter()
                .map(|outpoint| TxIn {
                    previous_tx_hash: outpoint.tx_hash,
                    output_index: outpoint.output_index,
                    script_sig: Vec::new(),
                })
                .collect(),
            outputs,
            fee,
        };

        let digest = signature_preimage_hash(&tx, 0);
        let signature = self.keypair.sign_digest(digest.as_bytes());
        let pubkey_bytes = self.keypair.public_key().to_bytes();
        let script_sig = p2pkh_script_sig(&signature, &pubkey_bytes);
        for input in &mut tx.inputs {
            input.script_sig = script_sig.clone();
        }

        tx.tx_hash = transaction_hash(&tx);
        tx
    }
}

/// A running chain under test: real storage, UTXO set, and mempool with
/// mining and block-application helpers layered on top.
pub struct TestChain {
    pub block_store: BlockStore,
    pub utxo: UtxoSet,
    pub mempool: Mempool,
    pub config: Config,
    _tempdir: tempfile::TempDir,
}

impl TestChain {
    pub fn new() -> Self {
        Self::with_payout(None)
    }

    pub fn with_payout(payout_address: Option<String>) -> Self {
        let tempdir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = tempdir.path().to_path_buf();
        config.payout_address = payout_address;

        let block_store = BlockStore::open(config.db_path()).unwrap();
        let utxo = UtxoSet::new();
        let mempool = Mempool::new(config.mempool_max_size);

        let genesis = build_genesis(&config);
        block_store.save(&genesis).unwrap();
        utxo.apply_batch(&genesis.transactions);

        Self { block_store, utxo, mempool, config, _tempdir: tempdir }
    }

    fn miner_params(&self) -> MinerParams {
        MinerParams {
            initial_subsidy: self.config.initial_subsidy_atomic(),
            halving_interval: self.config.halving_interval,
            retarget: RetargetParams {
                adjustment_interval: self.config.difficulty_adjustment_interval,
                target_block_time_secs: self.config.target_block_time_sec,
            },
            max_tx_per_block: ledgerkeep_core::constants::DEFAULT_MAX_TX_PER_BLOCK,
            max_nonce: self.config.max_nonce,
        }
    }

    fn validation_params(&self) -> ValidationParams {
        ValidationParams {
            initial_subsidy: self.config.initial_subsidy_atomic(),
            halving_interval: self.config.halving_interval,
        }
    }

    /// Mine one block paying `miner_script_pubkey` and apply it,
    /// panicking if mining or validation unexpectedly fails.
    pub fn mine_block(&self, miner_script_pubkey: Vec<u8>) -> Block {
        let interrupt = AtomicBool::new(false);
        let timestamp = self.block_store.get_last().unwrap().unwrap().header.timestamp + 60;
        let block = miner::mine_next_block(
            &self.block_store,
            &self.mempool,
            miner_script_pubkey,
            timestamp,
            &interrupt,
            &self.miner_params(),
        )
        .unwrap()
        .expect("mining with max_target should find a nonce quickly");

        let outcome = orchestrator::process_block(
            &self.block_store,
            &self.utxo,
            &self.mempool,
            &Secp256k1Verifier,
            &block,
            &self.validation_params(),
        )
        .unwrap();
        assert_eq!(outcome, ChainOutcome::Extension);
        block
    }

    pub fn tip_height(&self) -> u32 {
        self.block_store.get_last().unwrap().unwrap().header.index
    }

    pub fn balance(&self, script_pubkey: &[u8]) -> u64 {
        self.utxo.get_by_address(script_pubkey).into_iter().map(|(_, out)| out.value).sum()
    }

    pub fn utxos_for(&self, script_pubkey: &[u8]) -> Vec<(OutPoint, TxOut)> {
        self.utxo.get_by_address(script_pubkey)
    }
}
