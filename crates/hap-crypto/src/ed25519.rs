//! Ed25519 long-term identity keys and signatures.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hap_core::error::PairingError;
use rand::rngs::OsRng;
use zeroize::ZeroizeOnDrop;

/// Ed25519 public key length.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Ed25519 signature length.
pub const SIGNATURE_LEN: usize = 64;

/// Long-term Ed25519 identity key pair (LTPK/LTSK).
///
/// Clone is implemented so one identity can back several sessions.
/// Every copy zeroizes on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct IdentityKeyPair {
    #[zeroize(skip)]
    public: [u8; 32],
    secret: [u8; 32], // Ed25519 seed (32 bytes, not expanded)
}

impl IdentityKeyPair {
    /// Generate a new random identity key pair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self {
            public: signing_key.verifying_key().to_bytes(),
            secret: signing_key.to_bytes(),
        }
    }

    /// Create from seed bytes (32 bytes).
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self {
            public: signing_key.verifying_key().to_bytes(),
            secret: *seed,
        }
    }

    /// Get the public key (32 bytes).
    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    /// Sign a message, returning 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        SigningKey::from_bytes(&self.secret).sign(message).to_bytes()
    }

    /// Export the seed for storage (32 bytes).
    pub fn seed(&self) -> [u8; 32] {
        self.secret
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Verify a peer's Ed25519 signature.
///
/// Key and signature arrive as raw TLV values, so lengths are checked here.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), PairingError> {
    let public_key: &[u8; PUBLIC_KEY_LEN] = public_key
        .try_into()
        .map_err(|_| PairingError::SignatureVerificationFailed)?;
    let signature: &[u8; SIGNATURE_LEN] = signature
        .try_into()
        .map_err(|_| PairingError::SignatureVerificationFailed)?;

    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|_| PairingError::SignatureVerificationFailed)?;

    verifying_key
        .verify(message, &Signature::from_bytes(signature))
        .map_err(|_| PairingError::SignatureVerificationFailed)
}
