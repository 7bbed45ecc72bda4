//! Typed values decoded from HAP-BLE parameters and characteristic payloads.
//!
//! All multi-byte integers on the wire are little-endian.

use uuid::Uuid;

use crate::error::ParseError;
use crate::registry::CharacteristicFormat;

/// A decoded HAP parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Uint16(u16),
    Utf8(String),
    PresentationFormat(PresentationFormat),
}

impl ParamValue {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Self::Uint16(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_presentation_format(&self) -> Option<PresentationFormat> {
        match self {
            Self::PresentationFormat(p) => Some(*p),
            _ => None,
        }
    }
}

/// The two fields of a GATT presentation format descriptor HAP cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentationFormat {
    pub format: u8,
    pub unit: u16,
}

impl PresentationFormat {
    /// Wire length of the descriptor.
    pub const LEN: usize = 7;

    /// Parse the 7-byte descriptor.
    ///
    /// HAP requires exponent 0, namespace 1 (Bluetooth SIG) and description 0.
    pub fn parse(b: &[u8]) -> Result<Self, ParseError> {
        if b.len() != Self::LEN {
            return Err(ParseError::InvalidValue(format!(
                "presentation format must be {} bytes, got {}",
                Self::LEN,
                b.len()
            )));
        }

        let format = b[0];
        let exponent = b[1] as i8;
        let unit = u16::from_le_bytes([b[2], b[3]]);
        let namespace = b[4];
        let description = u16::from_le_bytes([b[5], b[6]]);

        if exponent != 0 || namespace != 1 || description != 0 {
            return Err(ParseError::InvalidValue(format!(
                "unexpected presentation format: {:02x?}",
                b
            )));
        }

        Ok(Self { format, unit })
    }

    /// The characteristic format, if it is one HAP defines.
    pub fn characteristic_format(&self) -> Option<CharacteristicFormat> {
        CharacteristicFormat::from_code(self.format)
    }
}

/// Raw bytes, unchanged.
pub fn to_bytes(b: &[u8]) -> Result<ParamValue, ParseError> {
    Ok(ParamValue::Bytes(b.to_vec()))
}

/// A 128-bit UUID sent least-significant byte first.
pub fn to_uuid(b: &[u8]) -> Result<ParamValue, ParseError> {
    let mut bytes: [u8; 16] = b
        .try_into()
        .map_err(|_| ParseError::InvalidValue(format!("UUID must be 16 bytes, got {}", b.len())))?;
    bytes.reverse();
    Ok(ParamValue::Uuid(Uuid::from_bytes(bytes)))
}

pub fn to_uint16(b: &[u8]) -> Result<ParamValue, ParseError> {
    Ok(ParamValue::Uint16(u16::from_le_bytes(fixed(b)?)))
}

pub fn to_utf8(b: &[u8]) -> Result<ParamValue, ParseError> {
    String::from_utf8(b.to_vec())
        .map(ParamValue::Utf8)
        .map_err(|e| ParseError::InvalidValue(e.to_string()))
}

pub fn to_presentation_format(b: &[u8]) -> Result<ParamValue, ParseError> {
    PresentationFormat::parse(b).map(ParamValue::PresentationFormat)
}

fn fixed<const N: usize>(b: &[u8]) -> Result<[u8; N], ParseError> {
    b.try_into()
        .map_err(|_| ParseError::InvalidValue(format!("expected {} bytes, got {}", N, b.len())))
}

/// A characteristic value decoded according to its presentation format.
#[derive(Debug, Clone, PartialEq)]
pub enum CharacteristicValue {
    Bool(bool),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Int(i32),
    Float(f32),
    String(String),
    Data(Vec<u8>),
}

impl CharacteristicFormat {
    /// Decode a characteristic value of this format.
    pub fn decode(self, b: &[u8]) -> Result<CharacteristicValue, ParseError> {
        Ok(match self {
            Self::Bool => {
                let [v] = fixed::<1>(b)?;
                CharacteristicValue::Bool(v != 0)
            }
            Self::Uint8 => CharacteristicValue::Uint8(u8::from_le_bytes(fixed(b)?)),
            Self::Uint16 => CharacteristicValue::Uint16(u16::from_le_bytes(fixed(b)?)),
            Self::Uint32 => CharacteristicValue::Uint32(u32::from_le_bytes(fixed(b)?)),
            Self::Uint64 => CharacteristicValue::Uint64(u64::from_le_bytes(fixed(b)?)),
            Self::Int => CharacteristicValue::Int(i32::from_le_bytes(fixed(b)?)),
            Self::Float => CharacteristicValue::Float(f32::from_le_bytes(fixed(b)?)),
            Self::String => CharacteristicValue::String(
                String::from_utf8(b.to_vec()).map_err(|e| ParseError::InvalidValue(e.to_string()))?,
            ),
            Self::Data => CharacteristicValue::Data(b.to_vec()),
        })
    }
}
