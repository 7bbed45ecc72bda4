//! # hap-core
//!
//! Error definitions and protocol tables shared across the HAP-BLE crates.
//!
//! This crate provides:
//! - The HAP-BLE parameter type registry with per-type decoders
//! - Status, opcode and pairing TLV tables
//! - Characteristic presentation formats and value decoding
//! - Common error types

pub mod error;
pub mod registry;
pub mod value;

pub use error::{
    CryptoError, Error, PairingError, ParseError, PduError, Result, StorageError, TransportError,
};
pub use registry::{
    param_by_code, param_by_name, CharacteristicFormat, HapStatus, OpCode, PairingMethod,
    ParamType, TlvType, Unit,
};
pub use value::{CharacteristicValue, ParamValue, PresentationFormat};
