// FORUM LEDGER: VALIDATOR IDENTITY
// Validator keys as delivered by the consensus host, and the addresses derived from them.
//
// SAFETY INVARIANTS:
// 1. An address is a pure function of the public key bytes
// 2. Only keys that decode to a valid Ed25519 point are ever admitted
// 3. A decode failure is reported, never papered over

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Length of a validator address in bytes.
pub const ADDRESS_LEN: usize = 20;

const ED25519_KEY_LEN: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Unsupported key type {0}")]
    UnsupportedKeyType(KeyType),

    #[error("Ed25519 key must be {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("Key bytes are not a valid curve point")]
    InvalidPoint,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// Truncated SHA-256 of a validator public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ValidatorAddress([u8; ADDRESS_LEN]);

impl ValidatorAddress {
    pub fn from_public_key(pub_key: &[u8]) -> Self {
        let digest = Sha256::digest(pub_key);
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&digest[..ADDRESS_LEN]);
        ValidatorAddress(out)
    }

    /// Interpret raw address bytes as delivered by the host.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let arr: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|_| {
            KeyError::InvalidAddress(format!(
                "expected {} bytes, got {}",
                ADDRESS_LEN,
                bytes.len()
            ))
        })?;
        Ok(ValidatorAddress(arr))
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim()).map_err(|e| KeyError::InvalidAddress(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Display for ValidatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ValidatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidatorAddress({})", self.to_hex())
    }
}

impl From<ValidatorAddress> for String {
    fn from(addr: ValidatorAddress) -> Self {
        addr.to_hex()
    }
}

impl TryFrom<String> for ValidatorAddress {
    type Error = KeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ValidatorAddress::from_hex(&s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Ed25519,
    Secp256k1,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Ed25519 => write!(f, "ed25519"),
            KeyType::Secp256k1 => write!(f, "secp256k1"),
        }
    }
}

/// Public key in the host's encoding: a type tag plus raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    pub key_type: KeyType,

    #[serde(with = "hex::serde")]
    pub bytes: Vec<u8>,
}

impl PublicKey {
    pub fn ed25519(bytes: impl Into<Vec<u8>>) -> Self {
        PublicKey {
            key_type: KeyType::Ed25519,
            bytes: bytes.into(),
        }
    }

    /// Decode into a verified Ed25519 key.
    pub fn decode(&self) -> Result<VerifyingKey, KeyError> {
        if self.key_type != KeyType::Ed25519 {
            return Err(KeyError::UnsupportedKeyType(self.key_type));
        }
        let arr: [u8; ED25519_KEY_LEN] =
            self.bytes
                .as_slice()
                .try_into()
                .map_err(|_| KeyError::InvalidLength {
                    expected: ED25519_KEY_LEN,
                    got: self.bytes.len(),
                })?;
        VerifyingKey::from_bytes(&arr).map_err(|_| KeyError::InvalidPoint)
    }
}

/// Validator-set change delivered by the host (InitChain or a block).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub pub_key: PublicKey,

    /// Voting power; zero removes the validator
    pub power: i64,
}

impl ValidatorUpdate {
    pub fn new(pub_key: PublicKey, power: i64) -> Self {
        ValidatorUpdate { pub_key, power }
    }

    pub fn is_removal(&self) -> bool {
        self.power == 0
    }
}

/// A known validator, keyed by address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorEntry {
    pub address: ValidatorAddress,
    pub pub_key: PublicKey,
    pub power: i64,
}

impl ValidatorEntry {
    /// Decode the key of an update and derive its address.
    ///
    /// SAFETY: This is the only way to build an entry, so every registered
    /// validator has a decodable key.
    pub fn from_update(update: &ValidatorUpdate) -> Result<Self, KeyError> {
        let key = update.pub_key.decode()?;
        Ok(ValidatorEntry {
            address: ValidatorAddress::from_public_key(key.as_bytes()),
            pub_key: update.pub_key.clone(),
            power: update.power,
        })
    }
}
