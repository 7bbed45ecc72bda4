//! Error types for the HAP-BLE controller.

use thiserror::Error;

use crate::registry::HapStatus;

/// Primary error type for all HAP operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("PDU error: {0}")]
    Pdu(#[from] PduError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl Error {
    /// Whether the failure came from the link rather than the protocol.
    ///
    /// Only transient link failures are worth retrying after a reconnect.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

/// Errors decoding TLV streams and parameter values.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Malformed TLV at offset {offset}: need {needed} bytes, {remaining} remain")]
    MalformedTlv {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("TLV type {type_code:#04x} declared {declared} bytes but carried {actual}")]
    InvalidResponseLength {
        type_code: u8,
        declared: usize,
        actual: usize,
    },

    #[error("Unknown parameter type: {0:#04x}")]
    UnknownParameterType(u8),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Errors framing requests and validating PDU responses.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PduError {
    #[error("Invalid control field: expected {expected:#04x}, got {actual:#04x}")]
    InvalidControlField { expected: u8, actual: u8 },

    #[error("Transaction id mismatch: request {request}, response {response}")]
    TransactionIdMismatch { request: u8, response: u8 },

    #[error("Body length mismatch: declared {declared}, received {actual}")]
    BodyLengthMismatch { declared: usize, actual: usize },

    #[error("Truncated PDU: need at least {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("Accessory returned status {status_code} ({name}): {message}")]
    Protocol {
        status_code: u8,
        name: &'static str,
        message: &'static str,
    },
}

impl PduError {
    /// Build a protocol error from a raw status byte using the status table.
    pub fn from_status(status_code: u8) -> Self {
        match HapStatus::from_code(status_code) {
            Some(status) => PduError::Protocol {
                status_code,
                name: status.name(),
                message: status.message(),
            },
            None => PduError::Protocol {
                status_code,
                name: "Unknown",
                message: "The accessory returned an unrecognized status code.",
            },
        }
    }
}

/// Errors during Pair-Setup and Pair-Verify.
#[derive(Error, Debug)]
pub enum PairingError {
    #[error("Invalid accessory public key")]
    InvalidAccessoryPublicKey,

    #[error("Accessory proof did not match")]
    ProofMismatch,

    #[error("Handshake state mismatch: expected {expected}, got {actual}")]
    HandshakeStateMismatch { expected: u8, actual: u8 },

    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    #[error("Missing required TLV type: {0:#04x}")]
    MissingTlv(u8),

    #[error("Accessory rejected pairing with {name} ({code})")]
    Rejected {
        code: u8,
        name: &'static str,
        retry_delay: Option<u16>,
    },

    #[error("Accessory identifier mismatch: expected {expected}, got {actual}")]
    AccessoryMismatch { expected: String, actual: String },

    #[error("No stored pairing for accessory {0}")]
    NotPaired(String),

    #[error("Invalid setup code: {0}")]
    InvalidSetupCode(String),

    #[error("Invalid pairing state: {0}")]
    InvalidState(String),
}

/// Cryptographic operation errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Authentication tag mismatch")]
    AuthTagMismatch,
}

/// Errors persisting or loading long-term key material.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Field {field} not found for identity {identity}")]
    NotFound { identity: String, field: String },

    #[error("Corrupt value for field {field}: {reason}")]
    Corrupt { field: String, reason: String },
}

/// Errors raised by the BLE link collaborator.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Peripheral disconnected")]
    Disconnected,

    #[error("Operation timed out")]
    Timeout,

    #[error("Descriptor {0} not found")]
    DescriptorNotFound(uuid::Uuid),

    #[error("Link I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Link error: {0}")]
    Other(String),
}

/// Convenience Result type.
pub type Result<T> = std::result::Result<T, Error>;
