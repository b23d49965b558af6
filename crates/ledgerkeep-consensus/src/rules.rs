//! Consensus validation rules (spec §4.10–§4.13): static block shape,
//! per-transaction checks against the UTXO set, coinbase shape, and the
//! block-level sequencing that ties them together.
//!
//! Grounded on the teacher's `block_validation.rs`/`validation.rs`
//! static-then-per-tx-then-coinbase pass structure, generalized to
//! script-based authorization in place of a direct signature field, and
//! to the burn-permitting `sum_out + fee ≤ sum_in` balance rule in place
//! of the teacher's exact-equality reward check.

use std::collections::HashSet;

use ledgerkeep_core::crypto::SignatureVerifier;
use ledgerkeep_core::error::RulesError;
use ledgerkeep_core::merkle::merkle_root;
use ledgerkeep_core::preimage::{block_header_hash, transaction_hash};
use ledgerkeep_core::script;
use ledgerkeep_core::types::{Block, OutPoint, Transaction};

use crate::reward::subsidy;
use crate::utxo::UtxoSet;

/// Static checks on a block that don't require chain or UTXO context
/// (spec §4.10).
pub fn validate_static(block: &Block) -> Result<(), RulesError> {
    if block_header_hash(&block.header) != block.header.block_hash {
        return Err(RulesError::BlockHashMismatch);
    }
    if block.header.block_hash.as_u256() > block.header.bits.to_target() {
        return Err(RulesError::InsufficientPoW);
    }
    if block.transactions.is_empty() {
        return Err(RulesError::EmptyBlock);
    }

    let leaves: Vec<_> = block.transactions.iter().map(|tx| tx.tx_hash).collect();
    if merkle_root(&leaves) != block.header.merkle_root {
        return Err(RulesError::MerkleMismatch);
    }

    Ok(())
}

/// Validate a non-coinbase transaction against a read-only UTXO view
/// (spec §4.11). Returns the transaction's `sum_in` on success.
pub fn validate_transaction(
    tx: &Transaction,
    utxo: &UtxoSet,
    verifier: &dyn SignatureVerifier,
) -> Result<u64, RulesError> {
    if transaction_hash(tx) != tx.tx_hash {
        return Err(RulesError::TxHashMismatch);
    }

    let mut sum_in: u64 = 0;
    let mut referenced = Vec::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        let outpoint = input.outpoint();
        let output = utxo
            .get(&outpoint)
            .ok_or_else(|| RulesError::MissingUtxo(outpoint.to_string()))?;
        sum_in = sum_in
            .checked_add(output.value)
            .ok_or(RulesError::ArithmeticOverflow("sum_in"))?;
        referenced.push(output);
    }

    for (i, output) in referenced.iter().enumerate() {
        let authorized = script::execute(
            &tx.inputs[i].script_sig,
            &output.script_pubkey,
            tx,
            i,
            verifier,
        )
        .unwrap_or(false);
        if !authorized {
            return Err(RulesError::ScriptAuthFailed(i));
        }
    }

    let sum_out = tx
        .total_output_value()
        .ok_or(RulesError::ArithmeticOverflow("sum_out"))?;
    let sum_out_fee = sum_out
        .checked_add(tx.fee)
        .ok_or(RulesError::ArithmeticOverflow("sum_out_fee"))?;
    if sum_out_fee == 0 {
        return Err(RulesError::ZeroValueTransaction);
    }
    if sum_out_fee > sum_in {
        return Err(RulesError::BalanceViolation { sum_out_fee, sum_in });
    }

    Ok(sum_in)
}

/// Validate a block's coinbase transaction (spec §4.12).
pub fn validate_coinbase(
    coinbase: &Transaction,
    height: u32,
    total_fees: u64,
    initial_subsidy: u64,
    halving_interval: u64,
) -> Result<(), RulesError> {
    if !coinbase.is_coinbase() {
        return Err(RulesError::CoinbaseShape("missing null coinbase input"));
    }
    if coinbase.outputs.len() != 1 {
        return Err(RulesError::CoinbaseShape("expected exactly one output"));
    }
    if coinbase.fee != 0 {
        return Err(RulesError::CoinbaseShape("coinbase fee must be zero"));
    }

    let allowed = subsidy(u64::from(height), initial_subsidy, halving_interval)
        .saturating_add(total_fees);
    let got = coinbase.outputs[0].value;
    if got > allowed {
        return Err(RulesError::CoinbaseRewardExceeded { got, allowed });
    }

    Ok(())
}

/// Full block-level validation sequence (spec §4.13): static checks,
/// then each non-coinbase transaction in order (rejecting intra-block
/// double spends), then the coinbase against accumulated fees.
pub fn validate_block(
    block: &Block,
    height: u32,
    utxo: &UtxoSet,
    verifier: &dyn SignatureVerifier,
    initial_subsidy: u64,
    halving_interval: u64,
) -> Result<(), RulesError> {
    validate_static(block)?;

    let coinbase = &block.transactions[0];
    let mut spent_in_block: HashSet<OutPoint> = HashSet::new();
    let mut total_fees: u64 = 0;

    for tx in &block.transactions[1..] {
        validate_transaction(tx, utxo, verifier)?;
        for input in &tx.inputs {
            let outpoint = input.outpoint();
            if !spent_in_block.insert(outpoint.clone()) {
                return Err(RulesError::IntraBlockDoubleSpend(outpoint.to_string()));
            }
        }
        total_fees = total_fees
            .checked_add(tx.fee)
            .ok_or(RulesError::ArithmeticOverflow("total_fees"))?;
    }

    validate_coinbase(coinbase, height, total_fees, initial_subsidy, halving_interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerkeep_core::crypto::{KeyPair, Secp256k1Verifier};
    use ledgerkeep_core::preimage::{block_header_hash, signature_preimage_hash};
    use ledgerkeep_core::script::{p2pkh_script_pubkey, p2pkh_script_sig};
    use ledgerkeep_core::types::{BlockHeader, CompactBits, Hash256, OutPoint, TxIn, TxOut};

    fn coinbase_tx(height: u32, value: u64) -> Transaction {
        let mut tx = Transaction {
            tx_hash: Hash256::ZERO,
            timestamp: 1,
            inputs: vec![TxIn {
                previous_tx_hash: Hash256::ZERO,
                output_index: u32::MAX,
                script_sig: height.to_le_bytes().to_vec(),
            }],
            outputs: vec![TxOut {
                value,
                script_pubkey: vec![],
            }],
            fee: 0,
        };
        tx.tx_hash = transaction_hash(&tx);
        tx
    }

    fn header_for(transactions: &[Transaction], bits: CompactBits) -> BlockHeader {
        let leaves: Vec<_> = transactions.iter().map(|t| t.tx_hash).collect();
        let mut header = BlockHeader {
            index: 0,
            timestamp: 1,
            previous_hash: Hash256::ZERO,
            bits,
            merkle_root: merkle_root(&leaves),
            nonce: 0,
            block_hash: Hash256::ZERO,
        };
        header.block_hash = block_header_hash(&header);
        header
    }

    #[test]
    fn static_validation_accepts_well_formed_block() {
        let cb = coinbase_tx(0, 50);
        let header = header_for(&[cb.clone()], CompactBits::from_target(CompactBits::max_target()));
        let block = Block {
            header,
            transactions: vec![cb],
        };
        assert!(validate_static(&block).is_ok());
    }

    #[test]
    fn static_validation_rejects_empty_block() {
        let mut block = Block {
            header: header_for(&[], CompactBits::from_target(CompactBits::max_target())),
            transactions: vec![],
        };
        block.header.block_hash = block_header_hash(&block.header);
        assert_eq!(validate_static(&block), Err(RulesError::EmptyBlock));
    }

    #[test]
    fn static_validation_rejects_merkle_mismatch() {
        let cb = coinbase_tx(0, 50);
        let mut header = header_for(&[cb.clone()], CompactBits::from_target(CompactBits::max_target()));
        header.merkle_root = Hash256([9; 32]);
        header.block_hash = block_header_hash(&header);
        let block = Block {
            header,
            transactions: vec![cb],
        };
        assert_eq!(validate_static(&block), Err(RulesError::MerkleMismatch));
    }

    #[test]
    fn static_validation_rejects_insufficient_pow() {
        let cb = coinbase_tx(0, 50);
        let header = header_for(&[cb.clone()], CompactBits(0x0100_0001));
        let block = Block {
            header,
            transactions: vec![cb],
        };
        assert_eq!(validate_static(&block), Err(RulesError::InsufficientPoW));
    }

    #[test]
    fn validate_coinbase_accepts_under_claim() {
        let cb = coinbase_tx(0, 10);
        assert!(validate_coinbase(&cb, 0, 0, 50, 210_000).is_ok());
    }

    #[test]
    fn validate_coinbase_rejects_over_claim() {
        let cb = coinbase_tx(0, 100);
        assert_eq!(
            validate_coinbase(&cb, 0, 0, 50, 210_000),
            Err(RulesError::CoinbaseRewardExceeded { got: 100, allowed: 50 })
        );
    }

    #[test]
    fn validate_coinbase_rejects_nonzero_fee() {
        let mut cb = coinbase_tx(0, 10);
        cb.fee = 1;
        assert_eq!(
            validate_coinbase(&cb, 0, 0, 50, 210_000),
            Err(RulesError::CoinbaseShape("coinbase fee must be zero"))
        );
    }

    #[test]
    fn validate_transaction_rejects_missing_utxo() {
        let utxo = UtxoSet::new();
        let tx = Transaction {
            tx_hash: Hash256::ZERO,
            timestamp: 1,
            inputs: vec![TxIn {
                previous_tx_hash: Hash256([1; 32]),
                output_index: 0,
                script_sig: vec![],
            }],
            outputs: vec![TxOut { value: 1, script_pubkey: vec![] }],
            fee: 0,
        };
        let mut tx = tx;
        tx.tx_hash = transaction_hash(&tx);
        let verifier = Secp256k1Verifier;
        assert!(matches!(
            validate_transaction(&tx, &utxo, &verifier),
            Err(RulesError::MissingUtxo(_))
        ));
    }

    #[test]
    fn validate_transaction_accepts_authorized_spend() {
        let utxo = UtxoSet::new();
        let kp = KeyPair::generate();
        let pubkey_hash = kp.public_key().hash160();
        let source_outpoint = OutPoint {
            tx_hash: Hash256([1; 32]),
            output_index: 0,
        };
        utxo.add(
            source_outpoint.clone(),
            TxOut {
                value: 100,
                script_pubkey: p2pkh_script_pubkey(&pubkey_hash),
            },
        );

        let mut tx = Transaction {
            tx_hash: Hash256::ZERO,
            timestamp: 1,
            inputs: vec![TxIn {
                previous_tx_hash: source_outpoint.tx_hash,
                output_index: source_outpoint.output_index,
                script_sig: vec![],
            }],
            outputs: vec![TxOut { value: 90, script_pubkey: vec![] }],
            fee: 10,
        };
        tx.tx_hash = transaction_hash(&tx);

        let digest = signature_preimage_hash(&tx, 0);
        let signature = kp.sign_digest(digest.as_bytes());
        tx.inputs[0].script_sig = p2pkh_script_sig(&signature, &kp.public_key().to_bytes());
        tx.tx_hash = transaction_hash(&tx);

        let verifier = Secp256k1Verifier;
        assert_eq!(validate_transaction(&tx, &utxo, &verifier), Ok(100));
    }

    #[test]
    fn validate_transaction_rejects_balance_violation() {
        let utxo = UtxoSet::new();
        let source_outpoint = OutPoint {
            tx_hash: Hash256([1; 32]),
            output_index: 0,
        };
        utxo.add(
            source_outpoint.clone(),
            TxOut { value: 10, script_pubkey: vec![] },
        );

        let mut tx = Transaction {
            tx_hash: Hash256::ZERO,
            timestamp: 1,
            inputs: vec![TxIn {
                previous_tx_hash: source_outpoint.tx_hash,
                output_index: source_outpoint.output_index,
                script_sig: vec![],
            }],
            outputs: vec![TxOut { value: 20, script_pubkey: vec![] }],
            fee: 0,
        };
        tx.tx_hash = transaction_hash(&tx);

        let verifier = Secp256k1Verifier;
        assert_eq!(
            validate_transaction(&tx, &utxo, &verifier),
            Err(RulesError::BalanceViolation { sum_out_fee: 20, sum_in: 10 })
        );
    }

    #[test]
    fn validate_transaction_rejects_sum_in_overflow() {
        let utxo = UtxoSet::new();
        let first = OutPoint {
            tx_hash: Hash256([1; 32]),
            output_index: 0,
        };
        let second = OutPoint {
            tx_hash: Hash256([2; 32]),
            output_index: 0,
        };
        utxo.add(first.clone(), TxOut { value: u64::MAX, script_pubkey: vec![] });
        utxo.add(second.clone(), TxOut { value: 1, script_pubkey: vec![] });

        let mut tx = Transaction {
            tx_hash: Hash256::ZERO,
            timestamp: 1,
            inputs: vec![
                TxIn {
                    previous_tx_hash: first.tx_hash,
                    output_index: first.output_index,
                    script_sig: vec![],
                },
                TxIn {
                    previous_tx_hash: second.tx_hash,
                    output_index: second.output_index,
                    script_sig: vec![],
                },
            ],
            outputs: vec![TxOut { value: 1, script_pubkey: vec![] }],
            fee: 0,
        };
        tx.tx_hash = transaction_hash(&tx);

        let verifier = Secp256k1Verifier;
        assert_eq!(
            validate_transaction(&tx, &utxo, &verifier),
            Err(RulesError::ArithmeticOverflow("sum_in"))
        );
    }

    #[test]
    fn validate_block_rejects_intra_block_double_spend() {
        let utxo = UtxoSet::new();
        let source_outpoint = OutPoint {
            tx_hash: Hash256([1; 32]),
            output_index: 0,
        };
        utxo.add(
            source_outpoint.clone(),
            TxOut { value: 100, script_pubkey: vec![] },
        );

        let mut spend_a = Transaction {
            tx_hash: Hash256::ZERO,
            timestamp: 1,
            inputs: vec![TxIn {
                previous_tx_hash: source_outpoint.tx_hash,
                output_index: source_outpoint.output_index,
                script_sig: vec![],
            }],
            outputs: vec![TxOut { value: 50, script_pubkey: vec![] }],
            fee: 0,
        };
        spend_a.tx_hash = transaction_hash(&spend_a);

        let mut spend_b = spend_a.clone();
        spend_b.timestamp = 2;
        spend_b.tx_hash = transaction_hash(&spend_b);

        let cb = coinbase_tx(1, 50);
        let header = header_for(
            &[cb.clone(), spend_a.clone(), spend_b.clone()],
            CompactBits::from_target(CompactBits::max_target()),
        );
        let block = Block {
            header,
            transactions: vec![cb, spend_a, spend_b],
        };

        let verifier = Secp256k1Verifier;
        assert!(matches!(
            validate_block(&block, 1, &utxo, &verifier, 50, 210_000),
            Err(RulesError::IntraBlockDoubleSpend(_))
        ));
    }
}
