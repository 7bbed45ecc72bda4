//! Scripted in-memory accessory for pairing integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hap_ble::pdu::RESPONSE_CONTROL_FIELD;
use hap_ble::CharacteristicTransport;
use hap_core::error::{Result, TransportError};
use hap_core::registry::ParamType;
use hap_crypto::chacha::{decrypt_with_nonce, encrypt_with_nonce, nonce_from_string, nonces};
use hap_crypto::curve25519::EphemeralKeyPair;
use hap_crypto::ed25519::{self, IdentityKeyPair};
use hap_crypto::keys::{SessionKeys, SharedSecret};
use hap_crypto::srp::{
    compute_proof_m1, compute_proof_m2, compute_session_key, compute_u, derive_private_key, group,
    pad_to_n, random_int, PAIR_SETUP_IDENTITY,
};
use hap_crypto::tlv::{self, Tlv8, TlvType};
use hap_crypto::hkdf;
use hap_pairing::PairingTransport;
use num_bigint::BigUint;
use uuid::Uuid;

pub const SETUP_CODE: &str = "031-45-154";
pub const ACCESSORY_ID: &str = "2A:9F:51:0C:77:E4";

/// Accessory side of Pair-Setup and Pair-Verify, implementing the same math
/// independently of the controller crate.
pub struct ScriptedAccessory {
    pub pairing_id: String,
    pub identity: IdentityKeyPair,
    salt: [u8; 16],
    verifier: BigUint,
    b: BigUint,
    b_pub: BigUint,
    session_key: Option<Vec<u8>>,
    /// Controller identity learned in M5.
    pub controller: Option<(String, [u8; 32])>,
    verify: Option<VerifySession>,
    /// Flip a bit of the M2 proof sent in M4.
    pub tamper_m4: bool,
    /// Answer M1 with a state-4 message.
    pub skip_m2: bool,
    /// States of every Pair-Setup request received.
    pub setup_states: Vec<u8>,
}

struct VerifySession {
    controller_public: [u8; 32],
    public: [u8; 32],
    shared: SharedSecret,
}

impl ScriptedAccessory {
    pub fn new(setup_code: &str) -> Self {
        let group = group();
        let salt = [0xC3u8; 16];
        let x = derive_private_key(&salt, PAIR_SETUP_IDENTITY, setup_code.as_bytes());
        let verifier = group.g.modpow(&x, &group.n);
        let b = random_int(256);
        let b_pub = (&group.k * &verifier + group.g.modpow(&b, &group.n)) % &group.n;

        Self {
            pairing_id: ACCESSORY_ID.to_string(),
            identity: IdentityKeyPair::generate(),
            salt,
            verifier,
            b,
            b_pub,
            session_key: None,
            controller: None,
            verify: None,
            tamper_m4: false,
            skip_m2: false,
            setup_states: Vec::new(),
        }
    }

    /// SRP session key K as derived by the accessory.
    pub fn session_key(&self) -> Option<&[u8]> {
        self.session_key.as_deref()
    }

    /// Session keys from the accessory's side (write = accessory to controller).
    pub fn session_keys(&self) -> Option<SessionKeys> {
        let verify = self.verify.as_ref()?;
        SessionKeys::derive_control_keys(&verify.shared)
            .ok()
            .map(|keys| keys.swapped())
    }

    pub fn handle_setup(&mut self, request: &[u8]) -> Vec<u8> {
        let tlv = Tlv8::parse(request).expect("controller sent malformed TLV");
        let state = tlv.state().expect("controller omitted state");
        self.setup_states.push(state);

        match state {
            1 if self.skip_m2 => Tlv8::new()
                .with(TlvType::State, vec![4])
                .with(TlvType::Proof, vec![0u8; 64])
                .encode(),
            1 => Tlv8::new()
                .with(TlvType::State, vec![2])
                .with(TlvType::Salt, self.salt.to_vec())
                .with(TlvType::PublicKey, pad_to_n(&self.b_pub))
                .encode(),
            3 => self.setup_m4(&tlv),
            5 => self.setup_m6(&tlv),
            other => error_reply(other + 1, 0x01),
        }
    }

    fn setup_m4(&mut self, m3: &Tlv8) -> Vec<u8> {
        let group = group();
        let a_pub = BigUint::from_bytes_be(m3.get(TlvType::PublicKey).expect("M3 without A"));
        let u = compute_u(&a_pub, &self.b_pub);
        let s = ((&a_pub * self.verifier.modpow(&u, &group.n)) % &group.n).modpow(&self.b, &group.n);
        let k = compute_session_key(&s);

        let m1 = compute_proof_m1(PAIR_SETUP_IDENTITY, &self.salt, &a_pub, &self.b_pub, &k);
        if m3.get(TlvType::Proof) != Some(&m1[..]) {
            return error_reply(4, 0x02);
        }

        let mut m2 = compute_proof_m2(&a_pub, &m1, &k);
        if self.tamper_m4 {
            m2[10] ^= 0x80;
        }
        self.session_key = Some(k);
        Tlv8::new()
            .with(TlvType::State, vec![4])
            .with(TlvType::Proof, m2)
            .encode()
    }

    fn setup_m6(&mut self, m5: &Tlv8) -> Vec<u8> {
        let k = match &self.session_key {
            Some(k) => k.clone(),
            None => return error_reply(6, 0x01),
        };
        let key = hkdf::derive_pair_setup_key(&k).unwrap();

        let sealed = m5.get(TlvType::EncryptedData).expect("M5 without EncryptedData");
        let inner = match decrypt_with_nonce(&key, &nonce_from_string(nonces::PS_MSG05), sealed) {
            Ok(plain) => Tlv8::parse(&plain).unwrap(),
            Err(_) => return error_reply(6, 0x02),
        };
        let id = inner.get(TlvType::Identifier).unwrap();
        let ltpk = inner.get(TlvType::PublicKey).unwrap();
        let device_x = hkdf::derive_controller_sign_key(&k).unwrap();
        let device_info = [&device_x[..], id, ltpk].concat();
        if ed25519::verify(ltpk, &device_info, inner.get(TlvType::Signature).unwrap()).is_err() {
            return error_reply(6, 0x02);
        }
        self.controller = Some((
            String::from_utf8(id.to_vec()).unwrap(),
            ltpk.try_into().unwrap(),
        ));

        let accessory_x = hkdf::derive_accessory_sign_key(&k).unwrap();
        let own_ltpk = self.identity.public_key();
        let accessory_info = [&accessory_x[..], self.pairing_id.as_bytes(), &own_ltpk[..]].concat();
        let reply = Tlv8::new()
            .with(TlvType::Identifier, self.pairing_id.as_bytes().to_vec())
            .with(TlvType::PublicKey, own_ltpk.to_vec())
            .with(TlvType::Signature, self.identity.sign(&accessory_info).to_vec());
        let sealed = encrypt_with_nonce(&key, &nonce_from_string(nonces::PS_MSG06), &reply.encode()).unwrap();

        Tlv8::new()
            .with(TlvType::State, vec![6])
            .with(TlvType::EncryptedData, sealed)
            .encode()
    }

    pub fn handle_verify(&mut self, request: &[u8]) -> Vec<u8> {
        let tlv = Tlv8::parse(request).expect("controller sent malformed TLV");
        match tlv.state() {
            Some(1) => self.verify_m2(&tlv),
            Some(3) => self.verify_m4(&tlv),
            other => error_reply(other.unwrap_or(0) + 1, 0x01),
        }
    }

    fn verify_m2(&mut self, m1: &Tlv8) -> Vec<u8> {
        let controller_public: [u8; 32] = m1.get(TlvType::PublicKey).unwrap().try_into().unwrap();
        let ephemeral = EphemeralKeyPair::generate();
        let public = ephemeral.public_key();
        let shared = SharedSecret::new(ephemeral.diffie_hellman(&controller_public).unwrap());
        let key = hkdf::derive_pair_verify_key(shared.as_bytes()).unwrap();

        let info = [&public[..], self.pairing_id.as_bytes(), &controller_public[..]].concat();
        let inner = Tlv8::new()
            .with(TlvType::Identifier, self.pairing_id.as_bytes().to_vec())
            .with(TlvType::Signature, self.identity.sign(&info).to_vec());
        let sealed = encrypt_with_nonce(&key, &nonce_from_string(nonces::PV_MSG02), &inner.encode()).unwrap();

        self.verify = Some(VerifySession {
            controller_public,
            public,
            shared,
        });
        Tlv8::new()
            .with(TlvType::State, vec![2])
            .with(TlvType::PublicKey, public.to_vec())
            .with(TlvType::EncryptedData, sealed)
            .encode()
    }

    fn verify_m4(&mut self, m3: &Tlv8) -> Vec<u8> {
        let (verify, (controller_id, controller_ltpk)) = match (&self.verify, &self.controller) {
            (Some(v), Some(c)) => (v, c),
            _ => return error_reply(4, 0x02),
        };
        let key = hkdf::derive_pair_verify_key(verify.shared.as_bytes()).unwrap();
        let sealed = m3.get(TlvType::EncryptedData).unwrap();
        let inner = match decrypt_with_nonce(&key, &nonce_from_string(nonces::PV_MSG03), sealed) {
            Ok(plain) => Tlv8::parse(&plain).unwrap(),
            Err(_) => return error_reply(4, 0x02),
        };

        let id = inner.get(TlvType::Identifier).unwrap();
        let info = [&verify.controller_public[..], id, &verify.public[..]].concat();
        if id != controller_id.as_bytes()
            || ed25519::verify(controller_ltpk, &info, inner.get(TlvType::Signature).unwrap()).is_err()
        {
            return error_reply(4, 0x02);
        }
        Tlv8::new().with(TlvType::State, vec![4]).encode()
    }
}

fn error_reply(state: u8, code: u8) -> Vec<u8> {
    Tlv8::new()
        .with(TlvType::State, vec![state])
        .with(TlvType::Error, vec![code])
        .encode()
}

/// Direct pairing transport to a shared accessory.
#[derive(Clone)]
pub struct Direct(pub Arc<Mutex<ScriptedAccessory>>);

impl Direct {
    pub fn new(accessory: ScriptedAccessory) -> Self {
        Self(Arc::new(Mutex::new(accessory)))
    }

    pub fn accessory(&self) -> std::sync::MutexGuard<'_, ScriptedAccessory> {
        self.0.lock().unwrap()
    }
}

#[async_trait]
impl PairingTransport for Direct {
    async fn pair_setup(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        Ok(self.accessory().handle_setup(request))
    }

    async fn pair_verify(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        Ok(self.accessory().handle_verify(request))
    }
}

/// Which pairing characteristic a [`GattLink`] is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Characteristic {
    PairSetup,
    PairVerify,
}

/// In-memory GATT link that unwraps HAP-BLE write PDUs for the accessory.
pub struct GattLink {
    accessory: Arc<Mutex<ScriptedAccessory>>,
    characteristic: Characteristic,
    pending: Mutex<Option<Vec<u8>>>,
    /// Fail this many writes with a disconnect before delivering.
    pub drop_writes: Mutex<u32>,
    pub reconnects: Mutex<u32>,
}

impl GattLink {
    pub fn new(accessory: Arc<Mutex<ScriptedAccessory>>, characteristic: Characteristic) -> Self {
        Self {
            accessory,
            characteristic,
            pending: Mutex::new(None),
            drop_writes: Mutex::new(0),
            reconnects: Mutex::new(0),
        }
    }
}

#[async_trait]
impl CharacteristicTransport for GattLink {
    async fn write(&self, data: &[u8], _require_ack: bool) -> Result<()> {
        {
            let mut drops = self.drop_writes.lock().unwrap();
            if *drops > 0 {
                *drops -= 1;
                return Err(TransportError::Disconnected.into());
            }
        }

        // control, opcode, tid, iid (2), body length (2), body
        let tid = data[2];
        let body = Tlv8::parse(&data[7..]).unwrap();
        let value = body.get_raw(ParamType::VALUE).unwrap();

        let reply = {
            let mut accessory = self.accessory.lock().unwrap();
            match self.characteristic {
                Characteristic::PairSetup => accessory.handle_setup(value),
                Characteristic::PairVerify => accessory.handle_verify(value),
            }
        };

        let reply_body = tlv::encode_to_vec(ParamType::VALUE, &reply);
        let mut response = vec![RESPONSE_CONTROL_FIELD, tid, 0];
        response.extend_from_slice(&(reply_body.len() as u16).to_le_bytes());
        response.extend_from_slice(&reply_body);
        *self.pending.lock().unwrap() = Some(response);
        Ok(())
    }

    async fn read(&self) -> Result<Vec<u8>> {
        self.pending
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TransportError::Other("no response pending".into()).into())
    }

    async fn read_descriptor(&self, _uuid: Uuid) -> Result<Vec<u8>> {
        let iid: u16 = match self.characteristic {
            Characteristic::PairSetup => 0x0022,
            Characteristic::PairVerify => 0x0025,
        };
        Ok(iid.to_le_bytes().to_vec())
    }

    async fn reconnect(&self) -> Result<()> {
        *self.reconnects.lock().unwrap() += 1;
        Ok(())
    }
}
