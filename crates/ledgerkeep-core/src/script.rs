//! Stack-machine script interpreter authorizing transaction spends
//! (spec §4.4). Grounded on the opcode set and P2PKH pattern of a
//! reference UTXO implementation; the teacher repo has no script concept
//! of its own.

use crate::crypto::{hash160, SignatureVerifier};
use crate::error::ScriptError;
use crate::types::Transaction;

pub const OP_0: u8 = 0x00;
pub const OP_TRUE: u8 = 0x51;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;

/// Build the standard P2PKH locking script for a 20-byte pubkey hash:
/// `OP_DUP OP_HASH160 <push hash> OP_EQUALVERIFY OP_CHECKSIG`.
pub fn p2pkh_script_pubkey(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(5 + 20);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(pubkey_hash.len() as u8);
    script.extend_from_slice(pubkey_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// Build the standard P2PKH unlocking script: `<push sig> <push pubkey>`.
pub fn p2pkh_script_sig(signature_der: &[u8], pubkey_compressed: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(2 + signature_der.len() + pubkey_compressed.len());
    script.push(signature_der.len() as u8);
    script.extend_from_slice(signature_der);
    script.push(pubkey_compressed.len() as u8);
    script.extend_from_slice(pubkey_compressed);
    script
}

/// Run `script_sig` then `script_pubkey` against a shared stack, with
/// `OP_CHECKSIG` authorized by `verifier` against `tx`'s input
/// `input_index`. Returns `Ok(true)` iff execution completed with a
/// non-empty, non-zero top-of-stack (spec §4.4); any interpreter error
/// collapses to `Ok(false)` with no partial mutation observable to the
/// caller.
pub fn execute(
    script_sig: &[u8],
    script_pubkey: &[u8],
    tx: &Transaction,
    input_index: usize,
    verifier: &dyn SignatureVerifier,
) -> Result<bool, ScriptError> {
    let mut stack: Vec<Vec<u8>> = Vec::new();

    match run(script_sig, &mut stack, tx, input_index, verifier)
        .and_then(|()| run(script_pubkey, &mut stack, tx, input_index, verifier))
    {
        Ok(()) => {}
        Err(_) => return Ok(false),
    }

    Ok(match stack.last() {
        Some(top) => !top.is_empty() && top.iter().any(|&b| b != 0),
        None => false,
    })
}

fn run(
    script: &[u8],
    stack: &mut Vec<Vec<u8>>,
    tx: &Transaction,
    input_index: usize,
    verifier: &dyn SignatureVerifier,
) -> Result<(), ScriptError> {
    let mut i = 0;
    while i < script.len() {
        let op = script[i];
        i += 1;

        match op {
            OP_0 => stack.push(Vec::new()),
            OP_TRUE => stack.push(vec![0x01]),
            OP_DROP => {
                stack.pop().ok_or(ScriptError::StackUnderflow)?;
            }
            OP_DUP => {
                let top = stack.last().ok_or(ScriptError::StackUnderflow)?.clone();
                stack.push(top);
            }
            OP_EQUAL => {
                let b = stack.pop().ok_or(ScriptError::StackUnderflow)?;
                let a = stack.pop().ok_or(ScriptError::StackUnderflow)?;
                stack.push(if a == b { vec![0x01] } else { Vec::new() });
            }
            OP_EQUALVERIFY => {
                let b = stack.pop().ok_or(ScriptError::StackUnderflow)?;
                let a = stack.pop().ok_or(ScriptError::StackUnderflow)?;
                if a != b {
                    return Err(ScriptError::EqualVerifyMismatch);
                }
            }
            OP_HASH160 => {
                let top = stack.pop().ok_or(ScriptError::StackUnderflow)?;
                stack.push(hash160(&top).to_vec());
            }
            OP_CHECKSIG => {
                let pubkey = stack.pop().ok_or(ScriptError::StackUnderflow)?;
                let signature = stack.pop().ok_or(ScriptError::StackUnderflow)?;
                if verifier.verify(&signature, &pubkey, tx, input_index) {
                    stack.push(vec![0x01]);
                } else {
                    return Err(ScriptError::BadCheckSig);
                }
            }
            0x01..=0x4b => {
                let n = op as usize;
                if i + n > script.len() {
                    return Err(ScriptError::StackUnderflow);
                }
                stack.push(script[i..i + n].to_vec());
                i += n;
            }
            other => return Err(ScriptError::UnknownOpcode(other)),
        }
    }
    Ok(())
}
