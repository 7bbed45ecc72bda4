//! ChaCha20-Poly1305 AEAD for pairing payloads and the HAP-BLE secure session.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hap_core::error::CryptoError;
use zeroize::ZeroizeOnDrop;

/// Poly1305 tag length appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Pair-Setup and Pair-Verify message nonces.
pub mod nonces {
    pub const PS_MSG05: &[u8; 8] = b"PS-Msg05";
    pub const PS_MSG06: &[u8; 8] = b"PS-Msg06";
    pub const PV_MSG02: &[u8; 8] = b"PV-Msg02";
    pub const PV_MSG03: &[u8; 8] = b"PV-Msg03";
}

/// Cipher for a paired HAP-BLE session with one counter per direction.
///
/// Each PDU body is sealed whole: ciphertext || tag, no AAD, nonce built from
/// the direction's 64-bit message counter.
#[derive(ZeroizeOnDrop)]
pub struct SessionCipher {
    write_key: [u8; 32],
    read_key: [u8; 32],
    #[zeroize(skip)]
    write_cipher: ChaCha20Poly1305,
    #[zeroize(skip)]
    read_cipher: ChaCha20Poly1305,
    #[zeroize(skip)]
    encrypt_counter: u64,
    #[zeroize(skip)]
    decrypt_counter: u64,
}

impl SessionCipher {
    /// Create cipher with separate write/read keys.
    pub fn new(write_key: [u8; 32], read_key: [u8; 32]) -> Self {
        let write_cipher = ChaCha20Poly1305::new(&write_key.into());
        let read_cipher = ChaCha20Poly1305::new(&read_key.into());
        Self {
            write_key,
            read_key,
            write_cipher,
            read_cipher,
            encrypt_counter: 0,
            decrypt_counter: 0,
        }
    }

    /// Seal one outgoing PDU.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = build_nonce_from_counter(self.encrypt_counter);
        let sealed = self
            .write_cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CryptoError::Encryption(format!("Encryption failed: {}", e)))?;

        self.encrypt_counter += 1;
        Ok(sealed)
    }

    /// Open one incoming PDU.
    ///
    /// The read counter only advances on success.
    pub fn decrypt(&mut self, ciphertext_with_tag: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext_with_tag.len() < TAG_LEN {
            return Err(CryptoError::Decryption(
                "Ciphertext too short (missing tag)".to_string(),
            ));
        }

        let nonce = build_nonce_from_counter(self.decrypt_counter);
        let plaintext = self
            .read_cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext_with_tag)
            .map_err(|_| CryptoError::AuthTagMismatch)?;

        self.decrypt_counter += 1;
        Ok(plaintext)
    }

    /// Get current encryption nonce counter.
    pub fn encrypt_counter(&self) -> u64 {
        self.encrypt_counter
    }

    /// Get current decryption nonce counter.
    pub fn decrypt_counter(&self) -> u64 {
        self.decrypt_counter
    }
}

/// Build 12-byte nonce from counter: 4 zero bytes then the counter LE.
fn build_nonce_from_counter(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..12].copy_from_slice(&counter.to_le_bytes());
    nonce
}

/// Encrypt with explicit 12-byte nonce (for pairing protocols).
///
/// Returns ciphertext with 16-byte auth tag appended.
pub fn encrypt_with_nonce(
    key: &[u8; 32],
    nonce: &[u8; 12],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    ChaCha20Poly1305::new(&(*key).into())
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(format!("Encryption failed: {}", e)))
}

/// Decrypt with explicit 12-byte nonce (for pairing protocols).
///
/// Expects ciphertext with 16-byte auth tag appended.
pub fn decrypt_with_nonce(
    key: &[u8; 32],
    nonce: &[u8; 12],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::Decryption(
            "Ciphertext too short (missing tag)".to_string(),
        ));
    }

    ChaCha20Poly1305::new(&(*key).into())
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthTagMismatch)
}

/// Create a 12-byte nonce from a string (right-aligned, left-padded with zeros).
///
/// HAP nonces like "PS-Msg05" become `\x00\x00\x00\x00PS-Msg05`.
pub fn nonce_from_string(s: &[u8]) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    let len = s.len().min(12);
    nonce[12 - len..].copy_from_slice(&s[..len]);
    nonce
}
