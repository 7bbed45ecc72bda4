//! Pair-Verify (M1-M4): per-session X25519 exchange authenticated by the
//! long-term keys from Pair-Setup.

use hap_core::error::{PairingError, Result};
use hap_crypto::chacha::nonces;
use hap_crypto::curve25519::{EphemeralKeyPair, PUBLIC_KEY_LEN};
use hap_crypto::ed25519;
use hap_crypto::keys::{EncryptionKey, SessionKeys, SharedSecret};
use hap_crypto::tlv::{Tlv8, TlvType};
use tracing::{debug, info};

use crate::controller::LongTermIdentity;
use crate::handshake::{hex_prefix, open, parse_response, require, seal};

/// Where a Pair-Verify attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairVerifyState {
    Initial,
    M1Sent,
    M2Verified,
    M3Sent,
    Complete,
    Failed,
}

impl PairVerifyState {
    fn next_message(self) -> Option<u8> {
        match self {
            Self::Initial => Some(1),
            Self::M1Sent => Some(2),
            Self::M2Verified => Some(3),
            Self::M3Sent => Some(4),
            Self::Complete | Self::Failed => None,
        }
    }
}

/// Controller side of one Pair-Verify attempt.
///
/// The ephemeral key pair is generated in M1 and dropped on completion or
/// failure, so every attempt runs with fresh keys.
pub struct PairVerify {
    identity: LongTermIdentity,
    state: PairVerifyState,
    ephemeral: Option<EphemeralKeyPair>,
    controller_public: Option<[u8; 32]>,
    accessory_public: Option<[u8; 32]>,
    shared_secret: Option<SharedSecret>,
    encryption_key: Option<EncryptionKey>,
}

impl PairVerify {
    pub fn new(identity: LongTermIdentity) -> Self {
        Self {
            identity,
            state: PairVerifyState::Initial,
            ephemeral: None,
            controller_public: None,
            accessory_public: None,
            shared_secret: None,
            encryption_key: None,
        }
    }

    /// M1: `{State=1, PublicKey=controller ephemeral}`.
    pub fn generate_m1(&mut self) -> Result<Vec<u8>> {
        self.guard(|this| {
            this.expect_state(PairVerifyState::Initial, 1)?;

            let ephemeral = EphemeralKeyPair::generate();
            let public = ephemeral.public_key();
            this.ephemeral = Some(ephemeral);
            this.controller_public = Some(public);
            this.state = PairVerifyState::M1Sent;

            debug!(public = %hex_prefix(&public), "Pair-Verify M1 generated");
            Ok(Tlv8::pair_verify_m1(&public).encode())
        })
    }

    /// M2: `{State=2, PublicKey=accessory ephemeral, EncryptedData}`.
    ///
    /// The sealed sub-TLV names the accessory and signs
    /// `accessory ephemeral || accessory id || controller ephemeral` with the
    /// accessory's long-term key.
    pub fn process_m2(&mut self, response: &[u8]) -> Result<()> {
        self.guard(|this| {
            this.expect_state(PairVerifyState::M1Sent, 2)?;
            let tlv = parse_response(response, 2)?;

            let accessory_public: [u8; 32] = require(&tlv, TlvType::PublicKey)?
                .try_into()
                .map_err(|_| PairingError::InvalidAccessoryPublicKey)?;
            let sealed = require(&tlv, TlvType::EncryptedData)?;

            let (ephemeral, controller_public) = match (this.ephemeral.take(), this.controller_public) {
                (Some(ephemeral), Some(public)) => (ephemeral, public),
                _ => return Err(PairingError::InvalidState("ephemeral key missing".to_string()).into()),
            };
            let shared = SharedSecret::new(ephemeral.diffie_hellman(&accessory_public)?);
            let key = SessionKeys::derive_pair_verify_key(&shared)?;

            let inner = open(&key, nonces::PV_MSG02, sealed)?;
            let id = require(&inner, TlvType::Identifier)?;
            let signature = require(&inner, TlvType::Signature)?;

            let expected = &this.identity.accessory;
            if id != expected.pairing_id.as_bytes() {
                return Err(PairingError::AccessoryMismatch {
                    expected: expected.pairing_id.clone(),
                    actual: String::from_utf8_lossy(id).into_owned(),
                }
                .into());
            }

            let mut accessory_info = Vec::with_capacity(PUBLIC_KEY_LEN * 2 + id.len());
            accessory_info.extend_from_slice(&accessory_public);
            accessory_info.extend_from_slice(id);
            accessory_info.extend_from_slice(&controller_public);
            ed25519::verify(&expected.long_term_public_key, &accessory_info, signature)?;

            this.accessory_public = Some(accessory_public);
            this.shared_secret = Some(shared);
            this.encryption_key = Some(key);
            this.state = PairVerifyState::M2Verified;

            debug!(
                accessory_id = %expected.pairing_id,
                public = %hex_prefix(&accessory_public),
                "Pair-Verify M2 verified"
            );
            Ok(())
        })
    }

    /// M3: `{State=3, EncryptedData}` proving the controller's identity.
    ///
    /// Signs `controller ephemeral || controller id || accessory ephemeral`.
    pub fn generate_m3(&mut self) -> Result<Vec<u8>> {
        self.guard(|this| {
            this.expect_state(PairVerifyState::M2Verified, 3)?;

            let (controller_public, accessory_public, key) = match (
                this.controller_public,
                this.accessory_public,
                &this.encryption_key,
            ) {
                (Some(c), Some(a), Some(key)) => (c, a, key),
                _ => return Err(PairingError::InvalidState("verify keys missing".to_string()).into()),
            };

            let controller = &this.identity.controller;
            let id = controller.pairing_id().as_bytes();
            let mut device_info = Vec::with_capacity(PUBLIC_KEY_LEN * 2 + id.len());
            device_info.extend_from_slice(&controller_public);
            device_info.extend_from_slice(id);
            device_info.extend_from_slice(&accessory_public);

            let inner = Tlv8::new()
                .with(TlvType::Identifier, id.to_vec())
                .with(TlvType::Signature, controller.sign(&device_info).to_vec());
            let sealed = seal(key, nonces::PV_MSG03, &inner)?;

            this.state = PairVerifyState::M3Sent;
            debug!("Pair-Verify M3 generated");
            Ok(Tlv8::new()
                .with(TlvType::State, vec![3])
                .with(TlvType::EncryptedData, sealed)
                .encode())
        })
    }

    /// M4: `{State=4}`. Derives the control channel keys.
    pub fn process_m4(&mut self, response: &[u8]) -> Result<SessionKeys> {
        self.guard(|this| {
            this.expect_state(PairVerifyState::M3Sent, 4)?;
            parse_response(response, 4)?;

            let shared = this
                .shared_secret
                .take()
                .ok_or_else(|| PairingError::InvalidState("shared secret missing".to_string()))?;
            let keys = SessionKeys::derive_control_keys(&shared)?;

            this.encryption_key = None;
            this.state = PairVerifyState::Complete;
            info!(
                accessory_id = %this.identity.accessory.pairing_id,
                "Pair-Verify complete"
            );
            Ok(keys)
        })
    }

    pub fn state(&self) -> PairVerifyState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == PairVerifyState::Complete
    }

    pub fn identity(&self) -> &LongTermIdentity {
        &self.identity
    }

    fn expect_state(&self, required: PairVerifyState, attempted: u8) -> Result<()> {
        if self.state == required {
            return Ok(());
        }
        match self.state.next_message() {
            Some(expected) => Err(PairingError::HandshakeStateMismatch {
                expected,
                actual: attempted,
            }
            .into()),
            None => Err(PairingError::InvalidState(format!(
                "Pair-Verify is {:?}, start a new attempt",
                self.state
            ))
            .into()),
        }
    }

    fn guard<T>(&mut self, step: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = step(self);
        if let Err(e) = &result {
            debug!(state = ?self.state, error = %e, "Pair-Verify step failed");
            self.state = PairVerifyState::Failed;
            self.ephemeral = None;
            self.shared_secret = None;
            self.encryption_key = None;
        }
        result
    }
}

impl std::fmt::Debug for PairVerify {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairVerify")
            .field("state", &self.state)
            .field("accessory", &self.identity.accessory.pairing_id)
            .finish_non_exhaustive()
    }
}
