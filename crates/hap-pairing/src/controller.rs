//! Long-term identities of the two pairing parties.
//!
//! The controller's pairing identifier must be the same in Pair-Setup M5 and
//! every later Pair-Verify M3, or the accessory will not recognise it.

use hap_core::error::{ParseError, Result};
use hap_crypto::ed25519::IdentityKeyPair;

/// Controller identity: a pairing identifier and its Ed25519 key pair.
#[derive(Clone, Debug)]
pub struct ControllerIdentity {
    /// Stable identifier (e.g. "12345678-ABCD-1234-ABCD-123456789ABC").
    pairing_id: String,
    keypair: IdentityKeyPair,
}

impl ControllerIdentity {
    /// Generate a new key pair with an identifier derived from its public key.
    pub fn generate() -> Self {
        Self::from_keypair(IdentityKeyPair::generate())
    }

    /// Use an existing key pair, deriving the identifier from its public key.
    ///
    /// The identifier is the first 16 public key bytes in UUID form, so it
    /// is stable for a given key pair.
    pub fn from_keypair(keypair: IdentityKeyPair) -> Self {
        let hex = hex::encode_upper(&keypair.public_key()[..16]);
        let pairing_id = format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        );
        Self {
            pairing_id,
            keypair,
        }
    }

    /// Use an existing key pair with an explicit identifier.
    pub fn with_id(keypair: IdentityKeyPair, pairing_id: impl Into<String>) -> Self {
        Self {
            pairing_id: pairing_id.into(),
            keypair,
        }
    }

    pub fn pairing_id(&self) -> &str {
        &self.pairing_id
    }

    pub fn keypair(&self) -> &IdentityKeyPair {
        &self.keypair
    }

    /// Ed25519 long-term public key (LTPK).
    pub fn public_key(&self) -> [u8; 32] {
        self.keypair.public_key()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.keypair.sign(message)
    }
}

/// The accessory's public identity, learned in Pair-Setup M6.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessoryIdentity {
    pub pairing_id: String,
    pub long_term_public_key: [u8; 32],
}

impl AccessoryIdentity {
    /// Build from the raw M6 sub-TLV values.
    pub fn from_raw(pairing_id: &[u8], long_term_public_key: &[u8]) -> Result<Self> {
        let pairing_id = String::from_utf8(pairing_id.to_vec())
            .map_err(|e| ParseError::InvalidValue(format!("accessory pairing id: {}", e)))?;
        let long_term_public_key: [u8; 32] = long_term_public_key.try_into().map_err(|_| {
            ParseError::InvalidValue(format!(
                "accessory LTPK must be 32 bytes, got {}",
                long_term_public_key.len()
            ))
        })?;

        Ok(Self {
            pairing_id,
            long_term_public_key,
        })
    }
}

/// Everything a completed Pair-Setup leaves behind for Pair-Verify.
#[derive(Clone, Debug)]
pub struct LongTermIdentity {
    pub controller: ControllerIdentity,
    pub accessory: AccessoryIdentity,
}
