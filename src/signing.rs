//! Key material the relayer signs with
//!
//! Built once from configuration and handed to the adapters that sign.
//! The secret never leaves this type; callers get signatures and the
//! derived addresses only.

use crate::error::{AppError, AppResult};
use bitcoin::base58;
use bitcoin::hashes::{hash160, Hash};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use std::fmt;

const NEO_ADDRESS_VERSION: u8 = 0x17;
const OP_PUSHBYTES33: u8 = 0x21;
const OP_CHECKSIG: u8 = 0xac;

pub struct SigningContext {
    key: SigningKey,
    address: String,
}

impl SigningContext {
    /// Build from a hex-encoded 32 byte ed25519 seed (`0x` prefix allowed)
    pub fn from_hex_seed(seed: &str) -> AppResult<Self> {
        let trimmed = seed.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);

        let bytes = hex::decode(trimmed)
            .map_err(|_| AppError::Configuration("swap.private_key is not valid hex".to_string()))?;

        let seed: [u8; 32] = bytes.try_into().map_err(|_| {
            AppError::Configuration("swap.private_key must be a 32 byte ed25519 seed".to_string())
        })?;

        Ok(Self::from_seed(&seed))
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let key = SigningKey::from_bytes(seed);
        let address = hex::encode(key.verifying_key().as_bytes());
        Self { key, address }
    }

    /// Local-chain address of the relayer (hex public key)
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.key.sign(message)
    }

    #[cfg(test)]
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        use ed25519_dalek::Verifier;
        self.key.verifying_key().verify(message, signature).is_ok()
    }

    /// NEO identity behind the same seed
    pub fn neo_keys(&self) -> AppResult<NeoKeys> {
        NeoKeys::from_seed(&self.key.to_bytes())
    }
}

/// secp256r1 key pair's public side on NEO
///
/// The bridge deposit address is the single-signature contract of this key:
/// `PUSHBYTES33 <compressed key> CHECKSIG`, hashed with hash160 and encoded
/// base58check under version `0x17`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeoKeys {
    script_hash: [u8; 20],
    address: String,
}

impl NeoKeys {
    pub fn from_seed(seed: &[u8; 32]) -> AppResult<Self> {
        let secret = p256::SecretKey::from_slice(seed).map_err(|_| {
            AppError::Configuration("swap.private_key is not a valid secp256r1 key".to_string())
        })?;
        let point = secret.public_key().to_encoded_point(true);

        let mut script = Vec::with_capacity(35);
        script.push(OP_PUSHBYTES33);
        script.extend_from_slice(point.as_bytes());
        script.push(OP_CHECKSIG);

        let script_hash = hash160::Hash::hash(&script).to_byte_array();

        let mut payload = Vec::with_capacity(21);
        payload.push(NEO_ADDRESS_VERSION);
        payload.extend_from_slice(&script_hash);

        Ok(Self {
            script_hash,
            address: base58::encode_check(&payload),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Script hash in the byte-reversed hex NEO tooling displays
    pub fn script_hash(&self) -> String {
        let mut reversed = self.script_hash;
        reversed.reverse();
        hex::encode(reversed)
    }
}

// Never print the secret
impl fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningContext")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
