//! Polymorphic seams (spec §9 design note): `Chain` distinguishes a full
//! chain backed by a block store from an SPV header-only chain; `Signer`
//! distinguishes a software signer from a future hardware signer. These
//! are the only two capability traits the core asks its collaborators to
//! implement; everything else composes concretely.

use crate::error::{ChainError, CryptoError, StorageError};
use crate::types::{Block, BlockHeader, Hash256, OutPoint, TxOut};

/// Read-only view of chain state, implemented by whatever backs the
/// block store and UTXO store (rill-node's storage layer, or an SPV
/// client's header cache).
pub trait Chain: Send + Sync {
    /// Current tip as `(height, block_hash)`. `None` before genesis.
    fn tip(&self) -> Result<Option<(u32, Hash256)>, StorageError>;

    fn get_header(&self, hash: &Hash256) -> Result<Option<BlockHeader>, StorageError>;

    fn get_block(&self, hash: &Hash256) -> Result<Option<Block>, StorageError>;

    fn get_block_hash_at_height(&self, height: u32) -> Result<Option<Hash256>, StorageError>;

    fn get_utxo(&self, outpoint: &OutPoint) -> Result<Option<TxOut>, StorageError>;

    /// Default: delegates to [`get_utxo`](Self::get_utxo).
    fn has_utxo(&self, outpoint: &OutPoint) -> Result<bool, StorageError> {
        Ok(self.get_utxo(outpoint)?.is_some())
    }
}

/// The single-writer side of chain state, exclusively owned by the
/// consensus orchestrator (spec §3 "Ownership").
pub trait ChainMutator: Chain {
    fn apply_block(&self, block: &Block) -> Result<(), ChainError>;

    fn reorganize(&self, new_chain: &[Block]) -> Result<(), ChainError>;
}

/// Sends gossip/sync messages to peers; implemented by the network
/// transport (spec §4.17).
pub trait NetSend: Send + Sync {
    fn broadcast(&self, message: &[u8], exclude_peer: Option<&str>);

    fn send_to(&self, peer_id: &str, message: &[u8]) -> bool;

    fn peer_count(&self) -> usize;
}

/// Produces signatures over a 32-byte digest. The wallet keystore is out
/// of scope (spec §1); this trait is the only surface the core needs
/// from it, letting a software keystore and a future hardware signer
/// share one call site.
pub trait Signer: Send + Sync {
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Vec<u8>, CryptoError>;

    fn public_key_bytes(&self) -> Vec<u8>;
}

/// [`Signer`] backed by an in-memory [`crate::crypto::KeyPair`]. Used by
/// integration tests and the miner binary; production wallets implement
/// `Signer` against their own keystore.
pub struct InMemorySigner {
    keypair: crate::crypto::KeyPair,
}

impl InMemorySigner {
    pub fn new(keypair: crate::crypto::KeyPair) -> Self {
        Self { keypair }
    }
}

impl Signer for InMemorySigner {
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
        Ok(self.keypair.sign_digest(digest))
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        self.keypair.public_key().to_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::types::{CompactBits, Transaction};
    use std::collections::HashMap;

    struct MockChain {
        headers: HashMap<Hash256, BlockHeader>,
        utxos: HashMap<OutPoint, TxOut>,
        tip: Option<(u32, Hash256)>,
    }

    impl MockChain {
        fn new() -> Self {
            Self {
                headers: HashMap::new(),
                utxos: HashMap::new(),
                tip: None,
            }
        }
    }

    impl Chain for MockChain {
        fn tip(&self) -> Result<Option<(u32, Hash256)>, StorageError> {
            Ok(self.tip)
        }

        fn get_header(&self, hash: &Hash256) -> Result<Option<BlockHeader>, StorageError> {
            Ok(self.headers.get(hash).cloned())
        }

        fn get_block(&self, _hash: &Hash256) -> Result<Option<Block>, StorageError> {
            Ok(None)
        }

        fn get_block_hash_at_height(&self, _height: u32) -> Result<Option<Hash256>, StorageError> {
            Ok(None)
        }

        fn get_utxo(&self, outpoint: &OutPoint) -> Result<Option<TxOut>, StorageError> {
            Ok(self.utxos.get(outpoint).cloned())
        }
    }

    struct MockNetSend {
        peers: usize,
    }

    impl NetSend for MockNetSend {
        fn broadcast(&self, _message: &[u8], _exclude_peer: Option<&str>) {}

        fn send_to(&self, _peer_id: &str, _message: &[u8]) -> bool {
            self.peers > 0
        }

        fn peer_count(&self) -> usize {
            self.peers
        }
    }

    #[test]
    fn chain_tip_none_before_genesis() {
        let chain = MockChain::new();
        assert_eq!(chain.tip().unwrap(), None);
    }

    #[test]
    fn chain_has_utxo_default_impl() {
        let mut chain = MockChain::new();
        let op = OutPoint {
            tx_hash: Hash256([1; 32]),
            output_index: 0,
        };
        assert!(!chain.has_utxo(&op).unwrap());
        chain.utxos.insert(
            op,
            TxOut {
                value: 1,
                script_pubkey: vec![],
            },
        );
        assert!(chain.has_utxo(&op).unwrap());
    }

    #[test]
    fn chain_as_dyn_object_safe() {
        let chain = MockChain::new();
        let dyn_chain: &dyn Chain = &chain;
        assert_eq!(dyn_chain.tip().unwrap(), None);
    }

    #[test]
    fn chain_get_header_roundtrip() {
        let mut chain = MockChain::new();
        let header = BlockHeader {
            index: 0,
            timestamp: 0,
            previous_hash: Hash256::ZERO,
            bits: CompactBits(0x1f00ffff),
            merkle_root: Hash256::ZERO,
            nonce: 0,
            block_hash: Hash256([5; 32]),
        };
        chain.headers.insert(header.block_hash, header.clone());
        assert_eq!(chain.get_header(&header.block_hash).unwrap(), Some(header));
    }

    #[test]
    fn net_send_peer_count() {
        let ns = MockNetSend { peers: 3 };
        assert_eq!(ns.peer_count(), 3);
    }

    #[test]
    fn net_send_as_dyn() {
        let ns = MockNetSend { peers: 0 };
        let dyn_ns: &dyn NetSend = &ns;
        assert!(!dyn_ns.send_to("x", b"y"));
    }

    #[test]
    fn in_memory_signer_signs_and_verifies() {
        let kp = KeyPair::generate();
        let pubkey_bytes = kp.public_key().to_bytes().to_vec();
        let signer = InMemorySigner::new(kp);
        let digest = crate::crypto::sha256(b"payload");
        let signature = signer.sign_digest(&digest).unwrap();

        let pk = crate::crypto::PublicKey::from_bytes(&pubkey_bytes).unwrap();
        assert!(pk.verify_digest(&digest, &signature).is_ok());
        assert_eq!(signer.public_key_bytes(), pubkey_bytes);
    }

    #[test]
    fn signer_as_dyn() {
        let kp = KeyPair::generate();
        let signer = InMemorySigner::new(kp);
        let dyn_signer: &dyn Signer = &signer;
        assert!(!dyn_signer.public_key_bytes().is_empty());
    }

}
