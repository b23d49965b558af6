//! Base58Check address encoding (spec §4.1): a version byte plus a
//! `HASH160` pubkey hash, checksummed with the first four bytes of
//! `double_sha256`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::ADDRESS_VERSION_BYTE;
use crate::crypto::PublicKey;
use crate::error::FormatError;

/// A Base58Check-encoded mainnet P2PKH address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    version: u8,
    pubkey_hash: [u8; 20],
}

impl Address {
    pub fn from_pubkey_hash(pubkey_hash: [u8; 20]) -> Self {
        Self {
            version: ADDRESS_VERSION_BYTE,
            pubkey_hash,
        }
    }

    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Self::from_pubkey_hash(public_key.hash160())
    }

    pub fn pubkey_hash(&self) -> [u8; 20] {
        self.pubkey_hash
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn encode(&self) -> String {
        let mut payload = Vec::with_capacity(1 + 20);
        payload.push(self.version);
        payload.extend_from_slice(&self.pubkey_hash);
        bs58::encode(payload).with_check().into_string()
    }

    pub fn decode(s: &str) -> Result<Self, FormatError> {
        let payload = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|_| FormatError::InvalidBase58Check)?;
        if payload.len() != 21 {
            return Err(FormatError::WrongLength {
                expected: 21,
                got: payload.len(),
            });
        }
        let mut pubkey_hash = [0u8; 20];
        pubkey_hash.copy_from_slice(&payload[1..]);
        Ok(Self {
            version: payload[0],
            pubkey_hash,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl FromStr for Address {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::decode(&s).map_err(serde::de::Error::custom)
    }
}
