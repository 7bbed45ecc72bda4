//! Pair-Setup (M1-M6): SRP-6a over the setup code, then an exchange of
//! long-term Ed25519 identities under the SRP-derived key.

use hap_core::error::{PairingError, ParseError, Result};
use hap_crypto::chacha::nonces;
use hap_crypto::ed25519;
use hap_crypto::hkdf;
use hap_crypto::keys::{EncryptionKey, SessionKeys, SharedSecret};
use hap_crypto::srp::{SrpChallenge, SrpClient, SrpProof, N_BYTES, PAIR_SETUP_IDENTITY};
use hap_crypto::tlv::{Tlv8, TlvType};
use tracing::{debug, info};
use zeroize::{Zeroize, Zeroizing};

use crate::controller::{AccessoryIdentity, ControllerIdentity};
use crate::handshake::{hex_prefix, open, parse_response, require, seal};

/// Where a Pair-Setup attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairSetupState {
    Initial,
    M1Sent,
    M2Received,
    M3Sent,
    M4Verified,
    M5Sent,
    Complete,
    Failed,
}

impl PairSetupState {
    /// Number of the message this state is waiting to send or receive.
    fn next_message(self) -> Option<u8> {
        match self {
            Self::Initial => Some(1),
            Self::M1Sent => Some(2),
            Self::M2Received => Some(3),
            Self::M3Sent => Some(4),
            Self::M4Verified => Some(5),
            Self::M5Sent => Some(6),
            Self::Complete | Self::Failed => None,
        }
    }
}

/// Controller side of one Pair-Setup attempt.
///
/// Each `generate_*`/`process_*` call is legal only in the state the previous
/// call left behind. Any failure moves the machine to
/// [`PairSetupState::Failed`] and discards the SRP ephemeral and derived keys;
/// a new attempt needs a new `PairSetup`.
pub struct PairSetup {
    state: PairSetupState,
    setup_code: Zeroizing<String>,
    srp_client: Option<SrpClient>,
    srp_proof: Option<SrpProof>,
    encryption_key: Option<EncryptionKey>,
    accessory: Option<AccessoryIdentity>,
}

impl PairSetup {
    /// Start an attempt with the accessory's setup code (`XXX-XX-XXX`).
    pub fn new(setup_code: &str) -> Self {
        Self {
            state: PairSetupState::Initial,
            setup_code: Zeroizing::new(setup_code.to_string()),
            srp_client: None,
            srp_proof: None,
            encryption_key: None,
            accessory: None,
        }
    }

    /// M1: `{State=1, Method=Pair_Setup}`.
    ///
    /// Draws a fresh SRP private value.
    pub fn generate_m1(&mut self) -> Result<Vec<u8>> {
        self.guard(|this| {
            this.expect_state(PairSetupState::Initial, 1)?;

            this.srp_client = Some(SrpClient::new(
                PAIR_SETUP_IDENTITY,
                this.setup_code.as_bytes(),
            ));
            this.state = PairSetupState::M1Sent;

            debug!("Pair-Setup M1 generated");
            Ok(Tlv8::pair_setup_m1().encode())
        })
    }

    /// M2: `{State=2, Salt, PublicKey=B}`.
    ///
    /// Computes the client proof and session key from the challenge.
    pub fn process_m2(&mut self, response: &[u8]) -> Result<()> {
        self.guard(|this| {
            this.expect_state(PairSetupState::M1Sent, 2)?;
            let tlv = parse_response(response, 2)?;

            let salt = require(&tlv, TlvType::Salt)?;
            let salt: [u8; 16] = salt.try_into().map_err(|_| {
                ParseError::InvalidValue(format!("salt must be 16 bytes, got {}", salt.len()))
            })?;

            // Leading zero bytes of B may be stripped on the wire.
            let b = require(&tlv, TlvType::PublicKey)?;
            if b.is_empty() || b.len() > N_BYTES {
                return Err(PairingError::InvalidAccessoryPublicKey.into());
            }
            let mut server_public_key = vec![0u8; N_BYTES - b.len()];
            server_public_key.extend_from_slice(b);

            let client = this
                .srp_client
                .as_ref()
                .ok_or_else(|| PairingError::InvalidState("SRP client missing".to_string()))?;
            let proof = client.process_challenge(&SrpChallenge {
                salt,
                server_public_key,
            })?;

            debug!(
                salt = %hex_prefix(&salt),
                b_len = b.len(),
                "Pair-Setup M2 processed"
            );
            this.srp_proof = Some(proof);
            this.state = PairSetupState::M2Received;
            Ok(())
        })
    }

    /// M3: `{State=3, PublicKey=A, Proof=M1}`.
    pub fn generate_m3(&mut self) -> Result<Vec<u8>> {
        self.guard(|this| {
            this.expect_state(PairSetupState::M2Received, 3)?;

            let (client, proof) = match (&this.srp_client, &this.srp_proof) {
                (Some(client), Some(proof)) => (client, proof),
                _ => return Err(PairingError::InvalidState("SRP proof missing".to_string()).into()),
            };
            let m3 = Tlv8::new()
                .with(TlvType::State, vec![3])
                .with(TlvType::PublicKey, client.public_key())
                .with(TlvType::Proof, proof.client_proof.clone())
                .encode();

            this.state = PairSetupState::M3Sent;
            debug!("Pair-Setup M3 generated");
            Ok(m3)
        })
    }

    /// M4: `{State=4, Proof=M2}`.
    ///
    /// Verifies the accessory's proof, then derives the M5/M6 key from K.
    pub fn process_m4(&mut self, response: &[u8]) -> Result<()> {
        self.guard(|this| {
            this.expect_state(PairSetupState::M3Sent, 4)?;
            let tlv = parse_response(response, 4)?;
            let server_proof = require(&tlv, TlvType::Proof)?;

            let proof = this
                .srp_proof
                .as_ref()
                .ok_or_else(|| PairingError::InvalidState("SRP proof missing".to_string()))?;
            proof.verify_server_proof(server_proof)?;

            let key =
                SessionKeys::derive_pair_setup_key(&SharedSecret::new(proof.session_key.clone()))?;
            this.encryption_key = Some(key);
            this.state = PairSetupState::M4Verified;

            info!("Pair-Setup accessory proof verified");
            Ok(())
        })
    }

    /// M5: `{State=5, EncryptedData}` carrying the controller's identity.
    ///
    /// The sub-TLV is `{Identifier, PublicKey=LTPK, Signature}` where the
    /// signature covers `iOSDeviceX || pairing id || LTPK`.
    pub fn generate_m5(&mut self, controller: &ControllerIdentity) -> Result<Vec<u8>> {
        self.guard(|this| {
            this.expect_state(PairSetupState::M4Verified, 5)?;
            let (proof, key) = this.keys()?;

            let device_x = Zeroizing::new(hkdf::derive_controller_sign_key(&proof.session_key)?);
            let id = controller.pairing_id().as_bytes();
            let ltpk = controller.public_key();

            let mut device_info = Vec::with_capacity(32 + id.len() + 32);
            device_info.extend_from_slice(&device_x[..]);
            device_info.extend_from_slice(id);
            device_info.extend_from_slice(&ltpk);
            let signature = controller.sign(&device_info);

            let inner = Tlv8::new()
                .with(TlvType::Identifier, id.to_vec())
                .with(TlvType::PublicKey, ltpk.to_vec())
                .with(TlvType::Signature, signature.to_vec());
            let sealed = seal(key, nonces::PS_MSG05, &inner)?;

            this.state = PairSetupState::M5Sent;
            debug!(
                pairing_id = controller.pairing_id(),
                ltpk = %hex_prefix(&ltpk),
                "Pair-Setup M5 generated"
            );
            Ok(Tlv8::new()
                .with(TlvType::State, vec![5])
                .with(TlvType::EncryptedData, sealed)
                .encode())
        })
    }

    /// M6: `{State=6, EncryptedData}` carrying the accessory's identity.
    ///
    /// The accessory's signature over `AccessoryX || pairing id || LTPK` is
    /// checked before its identity is returned.
    pub fn process_m6(&mut self, response: &[u8]) -> Result<AccessoryIdentity> {
        self.guard(|this| {
            this.expect_state(PairSetupState::M5Sent, 6)?;
            let tlv = parse_response(response, 6)?;
            let sealed = require(&tlv, TlvType::EncryptedData)?;

            let (proof, key) = this.keys()?;
            let inner = open(key, nonces::PS_MSG06, sealed)?;
            let id = require(&inner, TlvType::Identifier)?;
            let ltpk = require(&inner, TlvType::PublicKey)?;
            let signature = require(&inner, TlvType::Signature)?;
            let accessory = AccessoryIdentity::from_raw(id, ltpk)?;

            let accessory_x =
                Zeroizing::new(hkdf::derive_accessory_sign_key(&proof.session_key)?);
            let mut accessory_info = Vec::with_capacity(32 + id.len() + 32);
            accessory_info.extend_from_slice(&accessory_x[..]);
            accessory_info.extend_from_slice(id);
            accessory_info.extend_from_slice(&accessory.long_term_public_key);
            ed25519::verify(&accessory.long_term_public_key, &accessory_info, signature)?;

            this.state = PairSetupState::Complete;
            this.accessory = Some(accessory.clone());
            // Only K outlives the exchange.
            this.discard_ephemerals();
            this.encryption_key = None;

            info!(
                accessory_id = %accessory.pairing_id,
                ltpk = %hex_prefix(&accessory.long_term_public_key),
                "Pair-Setup complete"
            );
            Ok(accessory)
        })
    }

    pub fn state(&self) -> PairSetupState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == PairSetupState::Complete
    }

    /// The SRP session key K, once the whole exchange has succeeded.
    pub fn session_key(&self) -> Option<&[u8]> {
        match (&self.state, &self.srp_proof) {
            (PairSetupState::Complete, Some(proof)) => Some(proof.session_key.as_slice()),
            _ => None,
        }
    }

    /// The accessory identity verified in M6.
    pub fn accessory(&self) -> Option<&AccessoryIdentity> {
        self.accessory.as_ref()
    }

    fn keys(&self) -> Result<(&SrpProof, &EncryptionKey)> {
        match (&self.srp_proof, &self.encryption_key) {
            (Some(proof), Some(key)) => Ok((proof, key)),
            _ => Err(PairingError::InvalidState("session key missing".to_string()).into()),
        }
    }

    fn expect_state(&self, required: PairSetupState, attempted: u8) -> Result<()> {
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
                "Pair-Setup is {:?}, start a new attempt",
                self.state
            ))
            .into()),
        }
    }

    /// Run one step, failing the machine closed if it errors.
    fn guard<T>(&mut self, step: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = step(self);
        if let Err(e) = &result {
            debug!(state = ?self.state, error = %e, "Pair-Setup step failed");
            self.fail();
        }
        result
    }

    fn fail(&mut self) {
        self.state = PairSetupState::Failed;
        self.discard_ephemerals();
        self.srp_proof = None;
        self.encryption_key = None;
    }

    fn discard_ephemerals(&mut self) {
        self.srp_client = None;
        self.setup_code.zeroize();
    }
}

impl std::fmt::Debug for PairSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairSetup")
            .field("state", &self.state)
            .field("accessory", &self.accessory)
            .finish_non_exhaustive()
    }
}

/// Accessory side of Pair-Setup for unit tests.
#[cfg(test)]
pub(crate) struct MockSetupServer {
    identity: hap_crypto::ed25519::IdentityKeyPair,
    pairing_id: String,
    salt: [u8; 16],
    verifier: num_bigint::BigUint,
    private_key: num_bigint::BigUint,
    public_key: num_bigint::BigUint,
    session_key: Option<Vec<u8>>,
}

#[cfg(test)]
impl MockSetupServer {
    pub(crate) fn new(setup_code: &str) -> Self {
        use hap_crypto::srp::{derive_private_key, group, random_int};

        let group = group();
        let salt = [0x5Au8; 16];
        let x = derive_private_key(&salt, PAIR_SETUP_IDENTITY, setup_code.as_bytes());
        let verifier = group.g.modpow(&x, &group.n);
        let private_key = random_int(256);
        let public_key = (&group.k * &verifier + group.g.modpow(&private_key, &group.n)) % &group.n;

        Self {
            identity: hap_crypto::ed25519::IdentityKeyPair::generate(),
            pairing_id: "AA:BB:CC:DD:EE:FF".to_string(),
            salt,
            verifier,
            private_key,
            public_key,
            session_key: None,
        }
    }

    pub(crate) fn ltpk(&self) -> [u8; 32] {
        self.identity.public_key()
    }

    pub(crate) fn session_key(&self) -> Option<&[u8]> {
        self.session_key.as_deref()
    }

    pub(crate) fn m2(&self) -> Vec<u8> {
        Tlv8::new()
            .with(TlvType::State, vec![2])
            .with(TlvType::Salt, self.salt.to_vec())
            .with(TlvType::PublicKey, hap_crypto::srp::pad_to_n(&self.public_key))
            .encode()
    }

    /// Check the controller's M1 proof and answer with M4.
    pub(crate) fn m4(&mut self, m3: &[u8]) -> Vec<u8> {
        use hap_crypto::srp::{
            compute_proof_m1, compute_proof_m2, compute_session_key, compute_u, group,
        };
        use num_bigint::BigUint;

        let group = group();
        let tlv = Tlv8::parse(m3).unwrap();
        let a_pub = BigUint::from_bytes_be(tlv.get(TlvType::PublicKey).unwrap());
        let u = compute_u(&a_pub, &self.public_key);
        let s = ((&a_pub * self.verifier.modpow(&u, &group.n)) % &group.n)
            .modpow(&self.private_key, &group.n);
        let k = compute_session_key(&s);

        let m1 = compute_proof_m1(PAIR_SETUP_IDENTITY, &self.salt, &a_pub, &self.public_key, &k);
        if tlv.get(TlvType::Proof) != Some(&m1[..]) {
            return Tlv8::new()
                .with(TlvType::State, vec![4])
                .with(TlvType::Error, vec![0x02])
                .encode();
        }

        let m2 = compute_proof_m2(&a_pub, &m1, &k);
        self.session_key = Some(k);
        Tlv8::new()
            .with(TlvType::State, vec![4])
            .with(TlvType::Proof, m2)
            .encode()
    }

    /// Verify the controller's M5 and answer with a signed M6.
    pub(crate) fn m6(&self, m5: &[u8]) -> Vec<u8> {
        let k = self.session_key.as_ref().unwrap();
        let key = SessionKeys::derive_pair_setup_key(&SharedSecret::new(k.clone())).unwrap();

        let tlv = Tlv8::parse(m5).unwrap();
        let inner = open(&key, nonces::PS_MSG05, tlv.get(TlvType::EncryptedData).unwrap()).unwrap();
        let id = inner.get(TlvType::Identifier).unwrap();
        let ltpk = inner.get(TlvType::PublicKey).unwrap();
        let device_x = hkdf::derive_controller_sign_key(k).unwrap();
        let device_info = [&device_x[..], id, ltpk].concat();
        ed25519::verify(ltpk, &device_info, inner.get(TlvType::Signature).unwrap()).unwrap();

        let accessory_x = hkdf::derive_accessory_sign_key(k).unwrap();
        let ltpk = self.identity.public_key();
        let accessory_info = [&accessory_x[..], self.pairing_id.as_bytes(), &ltpk[..]].concat();
        let reply = Tlv8::new()
            .with(TlvType::Identifier, self.pairing_id.as_bytes().to_vec())
            .with(TlvType::PublicKey, ltpk.to_vec())
            .with(TlvType::Signature, self.identity.sign(&accessory_info).to_vec());

        Tlv8::new()
            .with(TlvType::State, vec![6])
            .with(TlvType::EncryptedData, seal(&key, nonces::PS_MSG06, &reply).unwrap())
            .encode()
    }
}
