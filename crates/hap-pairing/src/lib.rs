//! # hap-pairing
//!
//! HAP pairing for BLE controllers.
//!
//! This crate implements:
//! - Pair-Setup (SRP-6a over the setup code, then long-term key exchange)
//! - Pair-Verify (X25519 + Ed25519) yielding session keys
//! - Durable storage of controller and accessory identities
//! - An encrypted characteristic transport for the verified session

mod channel;
mod controller;
mod handshake;
mod pair_setup;
mod pair_verify;
mod session;
mod storage;
mod traits;
mod transport;

pub use channel::{EncryptedChannel, SecureTransport};
pub use controller::{AccessoryIdentity, ControllerIdentity, LongTermIdentity};
pub use pair_setup::{PairSetup, PairSetupState};
pub use pair_verify::{PairVerify, PairVerifyState};
pub use session::{
    normalize_setup_code, PairSetupOutcome, Pairer, PairingConfig, PairingConfigBuilder,
};
pub use storage::{
    fields, load_controller, load_long_term, load_or_generate_controller, save_accessory,
    FileKeyStore, IdentityLocks, KeyStore, MemoryKeyStore,
};
pub use traits::PairingTransport;
pub use transport::BlePairingTransport;
