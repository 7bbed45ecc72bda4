//! # hap-crypto
//!
//! TLV8 codec and cryptographic primitives for HAP pairing.
//!
//! This crate provides:
//! - TLV8 chunking, decoding and reassembly
//! - SRP-6a (3072-bit, SHA-512) for Pair-Setup
//! - X25519 ECDH for Pair-Verify
//! - Ed25519 long-term identity signatures
//! - ChaCha20-Poly1305 for pairing payloads and session PDUs
//! - HKDF-SHA512 for key derivation
//!
//! All secret material is zeroized on drop.

pub mod chacha;
pub mod curve25519;
pub mod ed25519;
pub mod hkdf;
pub mod keys;
pub mod srp;
pub mod tlv;

pub use chacha::SessionCipher;
pub use keys::{EncryptionKey, SessionKeys, SharedSecret};
pub use tlv::{Tlv8, TlvType};
