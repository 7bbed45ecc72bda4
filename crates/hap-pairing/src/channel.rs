//! Encrypted characteristic traffic after Pair-Verify.
//!
//! Every PDU written to or read from a characteristic is sealed whole with
//! ChaCha20-Poly1305:
//!
//! ```text
//! +------------------+----------+
//! | Ciphertext (N)   | Tag (16) |
//! +------------------+----------+
//! ```
//!
//! Nonces are 64-bit counters, one per direction, starting at zero.

use async_trait::async_trait;
use hap_ble::CharacteristicTransport;
use hap_core::error::{PairingError, Result};
use hap_crypto::keys::SessionKeys;
use hap_crypto::SessionCipher;
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Encrypted channel for post-verify PDUs.
pub struct EncryptedChannel {
    cipher: SessionCipher,
}

impl EncryptedChannel {
    /// Create a channel from the controller's session keys.
    pub fn new(keys: &SessionKeys) -> Self {
        Self {
            cipher: keys.cipher(),
        }
    }

    /// Create a channel with explicit keys.
    pub fn with_keys(write_key: [u8; 32], read_key: [u8; 32]) -> Self {
        Self {
            cipher: SessionCipher::new(write_key, read_key),
        }
    }

    /// Seal one outgoing PDU. Advances the write counter.
    pub fn encrypt(&mut self, pdu: &[u8]) -> Result<Vec<u8>> {
        Ok(self.cipher.encrypt(pdu)?)
    }

    /// Open one incoming PDU. The read counter only advances on success.
    pub fn decrypt(&mut self, sealed: &[u8]) -> Result<Vec<u8>> {
        Ok(self.cipher.decrypt(sealed)?)
    }

    pub fn write_counter(&self) -> u64 {
        self.cipher.encrypt_counter()
    }

    pub fn read_counter(&self) -> u64 {
        self.cipher.decrypt_counter()
    }
}

/// [`CharacteristicTransport`] that encrypts every PDU with a verified session.
///
/// A reconnect ends the accessory's session, so after one this transport
/// refuses further traffic until replaced by a new Pair-Verify.
pub struct SecureTransport<T> {
    inner: T,
    channel: Mutex<EncryptedChannel>,
    ended: Mutex<bool>,
}

impl<T: CharacteristicTransport> SecureTransport<T> {
    pub fn new(inner: T, keys: &SessionKeys) -> Self {
        Self {
            inner,
            channel: Mutex::new(EncryptedChannel::new(keys)),
            ended: Mutex::new(false),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// (write, read) counters of the underlying channel.
    pub fn counters(&self) -> (u64, u64) {
        let channel = self.channel.lock();
        (channel.write_counter(), channel.read_counter())
    }

    fn check_live(&self) -> Result<()> {
        if *self.ended.lock() {
            return Err(PairingError::InvalidState(
                "secure session ended by reconnect".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl<T: CharacteristicTransport> CharacteristicTransport for SecureTransport<T> {
    async fn write(&self, data: &[u8], require_ack: bool) -> Result<()> {
        self.check_live()?;
        let sealed = self.channel.lock().encrypt(data)?;
        self.inner.write(&sealed, require_ack).await
    }

    async fn read(&self) -> Result<Vec<u8>> {
        self.check_live()?;
        let sealed = self.inner.read().await?;
        let pdu = self.channel.lock().decrypt(&sealed);
        if let Err(e) = &pdu {
            warn!(len = sealed.len(), error = %e, "Failed to open session PDU");
        }
        pdu
    }

    async fn read_descriptor(&self, uuid: Uuid) -> Result<Vec<u8>> {
        // Descriptors are plain GATT reads outside the HAP session.
        self.inner.read_descriptor(uuid).await
    }

    async fn reconnect(&self) -> Result<()> {
        self.inner.reconnect().await?;
        *self.ended.lock() = true;
        debug!("Secure session ended by reconnect");
        Err(PairingError::InvalidState("secure session ended by reconnect".to_string()).into())
    }
}
