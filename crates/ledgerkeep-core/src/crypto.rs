//! Cryptographic primitives for the LedgerKeep protocol (spec §4.1).
//!
//! SHA-256/double-SHA-256 hashing, `HASH160 = RIPEMD160(SHA256(x))`,
//! ECDSA over secp256k1 with DER signatures and compressed public keys.
//! Any malformed input collapses to the single [`CryptoError`] kind —
//! callers must not distinguish sub-causes for consensus purposes.

use std::fmt;

use ripemd::Ripemd160;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey as Secp256k1PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::CryptoError;
use crate::types::Hash256;

/// `SHA256(x)`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// `SHA256(SHA256(x))`, returned as a [`Hash256`].
pub fn double_sha256(data: &[u8]) -> Hash256 {
    Hash256(sha256(&sha256(data)))
}

/// `HASH160(x) = RIPEMD160(SHA256(x))`.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(sha256(data)).into()
}

/// A secp256k1 keypair for signing transaction inputs.
pub struct KeyPair {
    secret_key: SecretKey,
}

impl KeyPair {
    /// Generate a random keypair using the OS cryptographic RNG.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        let (secret_key, _) = Secp256k1::new().generate_keypair(&mut rng);
        Self { secret_key }
    }

    /// Create a keypair from 32 bytes of secret key material.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let secret_key = SecretKey::from_slice(&bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { secret_key })
    }

    /// Derive the compressed public key for this keypair.
    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::new();
        PublicKey {
            inner: Secp256k1PublicKey::from_secret_key(&secp, &self.secret_key),
        }
    }

    /// Raw 32-byte secret key material.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret_key.secret_bytes()
    }

    /// Sign a 32-byte digest, returning a DER-encoded ECDSA signature.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Vec<u8> {
        let secp = Secp256k1::new();
        let message = Message::from_digest(*digest);
        secp.sign_ecdsa(&message, &self.secret_key)
            .serialize_der()
            .to_vec()
    }
}

impl Clone for KeyPair {
    fn clone(&self) -> Self {
        Self {
            secret_key: self.secret_key,
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// A compressed (33-byte) secp256k1 public key.
#[derive(Clone, Copy)]
pub struct PublicKey {
    inner: Secp256k1PublicKey,
}

impl PublicKey {
    /// Parse a compressed or uncompressed public key from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let inner = Secp256k1PublicKey::from_slice(bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { inner })
    }

    /// The compressed 33-byte encoding.
    pub fn to_bytes(&self) -> [u8; 33] {
        self.inner.serialize()
    }

    /// `HASH160` of the compressed public key, used by the P2PKH script
    /// pattern (spec §4.4).
    pub fn hash160(&self) -> [u8; 20] {
        hash160(&self.to_bytes())
    }

    /// Verify a DER-encoded ECDSA signature over a 32-byte digest.
    pub fn verify_digest(&self, digest: &[u8; 32], der_signature: &[u8]) -> Result<(), CryptoError> {
        let secp = Secp256k1::new();
        let signature =
            Signature::from_der(der_signature).map_err(|_| CryptoError::InvalidSignature)?;
        let message = Message::from_digest(*digest);
        secp.verify_ecdsa(&message, &signature, &self.inner)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.to_bytes()))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PublicKey {}

impl std::hash::Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state);
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = <Vec<u8>>::deserialize(deserializer)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Verifies a signature/pubkey pair against a transaction's signature
/// preimage digest. The injected dependency `OP_CHECKSIG` calls into
/// (spec §4.4).
pub trait SignatureVerifier {
    fn verify(
        &self,
        signature: &[u8],
        pubkey: &[u8],
        tx: &crate::types::Transaction,
        input_index: usize,
    ) -> bool;
}

/// The production [`SignatureVerifier`]: secp256k1 ECDSA over the
/// SIGHASH_ALL-analogue digest (spec §4.2).
pub struct Secp256k1Verifier;

impl SignatureVerifier for Secp256k1Verifier {
    fn verify(
        &self,
        signature: &[u8],
        pubkey: &[u8],
        tx: &crate::types::Transaction,
        input_index: usize,
    ) -> bool {
        let Ok(pk) = PublicKey::from_bytes(pubkey) else {
            return false;
        };
        let digest = crate::preimage::signature_preimage_hash(tx, input_index);
        pk.verify_digest(digest.as_bytes(), signature).is_ok()
    }
}
