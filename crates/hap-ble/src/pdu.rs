//! HAP-BLE PDU framing.
//!
//! Request:  `control | opcode | tid | target id [| body length (LE) | TLV body]`
//! Response: `control | tid | status [| body length (LE) | TLV body]`

use std::collections::HashMap;

use hap_core::error::{ParseError, PduError, Result};
use hap_core::registry::{self, HapStatus, OpCode};
use hap_core::value::ParamValue;
use hap_crypto::tlv;
use rand::{rngs::OsRng, Rng};
use tracing::debug;

/// Control byte bit marking a continuation fragment.
pub const CONTROL_CONTINUATION: u8 = 0b1000_0000;
/// Control byte bit marking a response PDU.
pub const CONTROL_RESPONSE: u8 = 0b0000_0010;

/// Control byte of a complete, unfragmented response.
pub const RESPONSE_CONTROL_FIELD: u8 = CONTROL_RESPONSE;

/// Fixed response header length: control, tid, status.
const RESPONSE_HEADER_LEN: usize = 3;
/// Response header plus the body length field.
const RESPONSE_BODY_OFFSET: usize = 5;

/// Decoded parameters of a response body, keyed by registry name.
pub type ParamMap = HashMap<&'static str, ParamValue>;

/// Header of a HAP-BLE request PDU.
///
/// The transaction id is drawn once when the header is built and then reused
/// for every serialization, so a request resent after a reconnect still
/// matches its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduRequestHeader {
    pub continuation: bool,
    pub is_response: bool,
    pub op_code: u8,
    transaction_id: u8,
    /// Characteristic or service instance id, as sent on the wire.
    pub target_id: Vec<u8>,
}

impl PduRequestHeader {
    /// Create a request header with a fresh random transaction id.
    pub fn new(op_code: OpCode, target_id: impl Into<Vec<u8>>) -> Self {
        Self::with_transaction_id(op_code, target_id, OsRng.gen())
    }

    /// Create a request header with a caller-chosen transaction id.
    pub fn with_transaction_id(
        op_code: OpCode,
        target_id: impl Into<Vec<u8>>,
        transaction_id: u8,
    ) -> Self {
        Self {
            continuation: false,
            is_response: false,
            op_code: op_code.code(),
            transaction_id,
            target_id: target_id.into(),
        }
    }

    /// Header for a request addressed by a 16-bit instance id.
    pub fn for_instance(op_code: OpCode, instance_id: u16) -> Self {
        Self::new(op_code, instance_id.to_le_bytes())
    }

    pub fn transaction_id(&self) -> u8 {
        self.transaction_id
    }

    /// Control byte: bit 7 continuation, bit 1 response, all others zero.
    pub fn control_byte(&self) -> u8 {
        let mut control = 0;
        if self.continuation {
            control |= CONTROL_CONTINUATION;
        }
        if self.is_response {
            control |= CONTROL_RESPONSE;
        }
        control
    }

    /// Serialized header bytes.
    pub fn data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + self.target_id.len());
        out.push(self.control_byte());
        out.push(self.op_code);
        out.push(self.transaction_id);
        out.extend_from_slice(&self.target_id);
        out
    }
}

/// Serialize a body-less request.
pub fn build_request(header: &PduRequestHeader) -> Vec<u8> {
    header.data()
}

/// Serialize a request carrying a TLV body.
pub fn build_body_request(header: &PduRequestHeader, body: &[u8]) -> Result<Vec<u8>> {
    let body_len = u16::try_from(body.len()).map_err(|_| PduError::BodyLengthMismatch {
        declared: u16::MAX as usize,
        actual: body.len(),
    })?;

    let mut out = header.data();
    out.extend_from_slice(&body_len.to_le_bytes());
    out.extend_from_slice(body);
    Ok(out)
}

/// A validated response PDU borrowing its body from the raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PduResponse<'a> {
    pub transaction_id: u8,
    pub status: HapStatus,
    pub body: &'a [u8],
}

impl<'a> PduResponse<'a> {
    /// Validate a response against the request's transaction id.
    ///
    /// Checks run in wire order: control field, transaction id, status and
    /// finally the declared body length. A non-success status stops before
    /// any body is looked at.
    pub fn parse(data: &'a [u8], expected_tid: u8) -> std::result::Result<Self, PduError> {
        if data.len() < RESPONSE_HEADER_LEN {
            return Err(PduError::Truncated {
                needed: RESPONSE_HEADER_LEN,
                actual: data.len(),
            });
        }

        let control = data[0];
        if control != RESPONSE_CONTROL_FIELD {
            return Err(PduError::InvalidControlField {
                expected: RESPONSE_CONTROL_FIELD,
                actual: control,
            });
        }

        let tid = data[1];
        if tid != expected_tid {
            return Err(PduError::TransactionIdMismatch {
                request: expected_tid,
                response: tid,
            });
        }

        let status = match HapStatus::from_code(data[2]) {
            Some(HapStatus::Success) => HapStatus::Success,
            _ => {
                debug!(status = data[2], tid, "Accessory returned error status");
                return Err(PduError::from_status(data[2]));
            }
        };

        // A response without a body ends after the status byte.
        if data.len() == RESPONSE_HEADER_LEN {
            return Ok(Self {
                transaction_id: tid,
                status,
                body: &[],
            });
        }

        if data.len() < RESPONSE_BODY_OFFSET {
            return Err(PduError::Truncated {
                needed: RESPONSE_BODY_OFFSET,
                actual: data.len(),
            });
        }

        let declared = u16::from_le_bytes([data[3], data[4]]) as usize;
        let body = &data[RESPONSE_BODY_OFFSET..];
        if body.len() != declared {
            return Err(PduError::BodyLengthMismatch {
                declared,
                actual: body.len(),
            });
        }

        Ok(Self {
            transaction_id: tid,
            status,
            body,
        })
    }

    /// Decode the TLV body into typed parameters.
    pub fn params(&self) -> Result<ParamMap> {
        decode_params(self.body)
    }
}

/// Decode a TLV parameter body, reassembling fragmented values.
pub fn decode_params(body: &[u8]) -> Result<ParamMap> {
    let raw = tlv::reassemble(tlv::decode(body), registry::param_name)?;

    let mut params = ParamMap::with_capacity(raw.len());
    for (name, bytes) in raw {
        let param = registry::param_by_name(name)
            .ok_or_else(|| ParseError::InvalidValue(format!("unregistered parameter {}", name)))?;
        params.insert(name, param.decode(&bytes)?);
    }
    Ok(params)
}

/// Parse a characteristic signature read response.
///
/// A successful signature response always carries the body length field;
/// only plain acknowledgements may end after the status byte.
pub fn parse_signature_response(response: &[u8], expected_tid: u8) -> Result<ParamMap> {
    let parsed = PduResponse::parse(response, expected_tid)?;
    if response.len() < RESPONSE_BODY_OFFSET {
        return Err(PduError::Truncated {
            needed: RESPONSE_BODY_OFFSET,
            actual: response.len(),
        }
        .into());
    }
    parsed.params()
}
