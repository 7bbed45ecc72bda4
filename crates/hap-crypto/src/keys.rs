//! Session key types and derivation.

use crate::chacha::SessionCipher;
use crate::hkdf;
use hap_core::error::CryptoError;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Shared secret from SRP or ECDH.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret(Vec<u8>);

/// 32-byte encryption key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

/// Keys for a verified session, named from the controller's side.
#[derive(ZeroizeOnDrop)]
pub struct SessionKeys {
    /// Key for encrypting data we send.
    pub write_key: EncryptionKey,
    /// Key for decrypting data we receive.
    pub read_key: EncryptionKey,
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

impl SharedSecret {
    /// Create from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl EncryptionKey {
    /// Create from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl SessionKeys {
    /// Derive the post-verify session keys from the Pair-Verify shared secret.
    pub fn derive_control_keys(shared_secret: &SharedSecret) -> Result<Self, CryptoError> {
        let write_key = hkdf::derive_control_write_key(shared_secret.as_bytes())?;
        let read_key = hkdf::derive_control_read_key(shared_secret.as_bytes())?;

        Ok(Self {
            write_key: EncryptionKey(write_key),
            read_key: EncryptionKey(read_key),
        })
    }

    /// Key protecting the Pair-Setup M5/M6 payloads.
    pub fn derive_pair_setup_key(session_key: &SharedSecret) -> Result<EncryptionKey, CryptoError> {
        hkdf::derive_pair_setup_key(session_key.as_bytes()).map(EncryptionKey)
    }

    /// Key protecting the Pair-Verify M2/M3 payloads.
    pub fn derive_pair_verify_key(shared_secret: &SharedSecret) -> Result<EncryptionKey, CryptoError> {
        hkdf::derive_pair_verify_key(shared_secret.as_bytes()).map(EncryptionKey)
    }

    /// The same keys seen from the accessory's side.
    pub fn swapped(&self) -> Self {
        Self {
            write_key: self.read_key.clone(),
            read_key: self.write_key.clone(),
        }
    }

    /// Build the per-PDU cipher for this session.
    pub fn cipher(&self) -> SessionCipher {
        SessionCipher::new(*self.write_key.as_bytes(), *self.read_key.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod shared_secret {
        use super::*;

        #[test]
        fn new_stores_bytes() {
            let bytes = vec![0x01, 0x02, 0x03, 0x04];
            let secret = SharedSecret::new(bytes.clone());
            assert_eq!(secret.as_bytes(), &bytes);
        }

        #[test]
        fn clone_produces_equal_copy() {
            let original = SharedSecret::new(vec![0x42u8; 32]);
            let cloned = original.clone();
            assert_eq!(original.as_bytes(), cloned.as_bytes());
        }
    }

    mod session_keys {
        use super::*;

        #[test]
        fn derive_control_keys_produces_different_read_write() {
            let shared_secret = SharedSecret::new(vec![0xABu8; 32]);
            let keys = SessionKeys::derive_control_keys(&shared_secret).unwrap();
            assert_ne!(keys.write_key.as_bytes(), keys.read_key.as_bytes());
        }

        #[test]
        fn different_secrets_produce_different_keys() {
            let keys1 = SessionKeys::derive_control_keys(&SharedSecret::new(vec![0x01u8; 32])).unwrap();
            let keys2 = SessionKeys::derive_control_keys(&SharedSecret::new(vec![0x02u8; 32])).unwrap();
            assert_ne!(keys1.write_key.as_bytes(), keys2.write_key.as_bytes());
            assert_ne!(keys1.read_key.as_bytes(), keys2.read_key.as_bytes());
        }

        #[test]
        fn pair_setup_and_verify_keys_are_different() {
            let secret = SharedSecret::new(vec![0xABu8; 32]);
            let setup_key = SessionKeys::derive_pair_setup_key(&secret).unwrap();
            let verify_key = SessionKeys::derive_pair_verify_key(&secret).unwrap();
            assert_ne!(setup_key.as_bytes(), verify_key.as_bytes());
        }

        #[test]
        fn swapped_ciphers_interoperate() {
            let keys = SessionKeys::derive_control_keys(&SharedSecret::new(vec![0x07u8; 32])).unwrap();
            let mut controller = keys.cipher();
            let mut accessory = keys.swapped().cipher();

            let sealed = controller.encrypt(b"write").unwrap();
            assert_eq!(accessory.decrypt(&sealed).unwrap(), b"write");
            let sealed = accessory.encrypt(b"read").unwrap();
            assert_eq!(controller.decrypt(&sealed).unwrap(), b"read");
        }
    }
}
