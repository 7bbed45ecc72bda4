//! # hap-ble
//!
//! HAP-BLE PDU framing and characteristic access for controllers.
//!
//! This crate provides:
//! - Request header construction and response validation
//! - Characteristic signature read parsing into typed parameters
//! - A transport trait for the embedding Bluetooth stack
//! - Reconnect-and-retry policy for transport calls
//! - [`HapCharacteristic`], the request/response handle used by pairing

pub mod characteristic;
pub mod pdu;
pub mod retry;
pub mod traits;
pub mod uuids;

pub use characteristic::HapCharacteristic;
pub use pdu::{parse_signature_response, ParamMap, PduRequestHeader, PduResponse};
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use traits::CharacteristicTransport;
