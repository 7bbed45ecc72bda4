//! X25519 ECDH for Pair-Verify.

use hap_core::error::CryptoError;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::ZeroizeOnDrop;

/// X25519 public key length.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Ephemeral Curve25519 key pair, one per Pair-Verify attempt.
#[derive(ZeroizeOnDrop)]
pub struct EphemeralKeyPair {
    #[zeroize(skip)]
    public: [u8; 32],
    secret: [u8; 32],
}

impl EphemeralKeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            public: public.to_bytes(),
            secret: secret.to_bytes(),
        }
    }

    /// Create from existing secret key bytes.
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        let static_secret = StaticSecret::from(*secret);
        let public = PublicKey::from(&static_secret);
        Self {
            public: public.to_bytes(),
            secret: *secret,
        }
    }

    /// Get the public key (32 bytes).
    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    /// Perform Diffie-Hellman key exchange, consuming the secret.
    ///
    /// Rejects keys of the wrong length and low-order points (all-zero output).
    pub fn diffie_hellman(self, peer_public: &[u8]) -> Result<[u8; 32], CryptoError> {
        let peer: [u8; PUBLIC_KEY_LEN] =
            peer_public
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: PUBLIC_KEY_LEN,
                    actual: peer_public.len(),
                })?;

        if peer.iter().all(|&b| b == 0) {
            return Err(CryptoError::KeyDerivation(
                "Invalid peer public key: all zeros".to_string(),
            ));
        }

        let shared = StaticSecret::from(self.secret).diffie_hellman(&PublicKey::from(peer));

        let shared_bytes = shared.to_bytes();
        if shared_bytes.iter().all(|&b| b == 0) {
            return Err(CryptoError::KeyDerivation(
                "Weak ECDH: shared secret is all zeros (low-order point)".to_string(),
            ));
        }

        Ok(shared_bytes)
    }
}
