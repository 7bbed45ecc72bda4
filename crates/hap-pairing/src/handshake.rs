//! Response checks and sealed sub-TLVs shared by both pairing handshakes.

use hap_core::error::{PairingError, Result};
use hap_core::registry::pairing_error_name;
use hap_crypto::chacha::{decrypt_with_nonce, encrypt_with_nonce, nonce_from_string};
use hap_crypto::tlv::{Tlv8, TlvType};
use hap_crypto::EncryptionKey;

/// Parse an accessory response and check it carries `expected_state`.
///
/// An error TLV wins over the state check: accessories echo the state
/// alongside `kTLVType_Error` when they reject a step.
pub(crate) fn parse_response(data: &[u8], expected_state: u8) -> Result<Tlv8> {
    let tlv = Tlv8::parse(data)?;

    if let Some(code) = tlv.error() {
        return Err(PairingError::Rejected {
            code,
            name: pairing_error_name(code),
            retry_delay: tlv.retry_delay(),
        }
        .into());
    }

    match tlv.state() {
        Some(state) if state == expected_state => Ok(tlv),
        Some(state) => Err(PairingError::HandshakeStateMismatch {
            expected: expected_state,
            actual: state,
        }
        .into()),
        None => Err(PairingError::MissingTlv(TlvType::State as u8).into()),
    }
}

/// Look up a TLV that must be present.
pub(crate) fn require(tlv: &Tlv8, typ: TlvType) -> Result<&[u8]> {
    tlv.get(typ)
        .ok_or_else(|| PairingError::MissingTlv(typ as u8).into())
}

/// Encrypt a sub-TLV under a fixed message nonce.
pub(crate) fn seal(key: &EncryptionKey, nonce: &[u8; 8], inner: &Tlv8) -> Result<Vec<u8>> {
    let nonce = nonce_from_string(nonce);
    Ok(encrypt_with_nonce(key.as_bytes(), &nonce, &inner.encode())?)
}

/// Decrypt and parse a sub-TLV sealed under a fixed message nonce.
pub(crate) fn open(key: &EncryptionKey, nonce: &[u8; 8], sealed: &[u8]) -> Result<Tlv8> {
    let nonce = nonce_from_string(nonce);
    let plaintext = decrypt_with_nonce(key.as_bytes(), &nonce, sealed)?;
    Ok(Tlv8::parse(&plaintext)?)
}

/// First bytes of a public value, for logs.
pub(crate) fn hex_prefix(bytes: &[u8]) -> String {
    hex::encode(&bytes[..bytes.len().min(4)])
}
