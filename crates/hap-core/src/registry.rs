//! Static HAP-BLE lookup tables.
//!
//! Parameter types, status codes, opcodes and the pairing TLV vocabulary are
//! fixed by the protocol. Everything here is immutable and can be shared
//! freely between sessions.

use crate::error::ParseError;
use crate::value::{self, ParamValue};

/// Converts the raw bytes of one parameter into its typed value.
pub type Decoder = fn(&[u8]) -> Result<ParamValue, ParseError>;

/// One entry of the HAP-BLE parameter type table.
#[derive(Debug, Clone, Copy)]
pub struct ParamType {
    pub code: u8,
    pub name: &'static str,
    pub decode: Decoder,
}

impl ParamType {
    /// HAP-Param-Value.
    pub const VALUE: u8 = 0x01;
    /// HAP-Param-Additional-Authorization-Data.
    pub const ADDITIONAL_AUTHORIZATION_DATA: u8 = 0x02;
    /// HAP-Param-Origin (local vs remote).
    pub const ORIGIN: u8 = 0x03;
    /// HAP-Param-Characteristic-Type.
    pub const CHARACTERISTIC_TYPE: u8 = 0x04;
    /// HAP-Param-Characteristic-Instance-ID.
    pub const CHARACTERISTIC_INSTANCE_ID: u8 = 0x05;
    /// HAP-Param-Service-Type.
    pub const SERVICE_TYPE: u8 = 0x06;
    /// HAP-Param-Service-Instance-ID.
    pub const SERVICE_INSTANCE_ID: u8 = 0x07;
    /// HAP-Param-TTL.
    pub const TTL: u8 = 0x08;
    /// HAP-Param-Return-Response.
    pub const RETURN_RESPONSE: u8 = 0x09;
    /// HAP-Param-HAP-Characteristic-Properties-Descriptor.
    pub const CHARACTERISTIC_PROPERTIES: u8 = 0x0A;
    /// HAP-Param-GATT-User-Description-Descriptor.
    pub const USER_DESCRIPTION: u8 = 0x0B;
    /// HAP-Param-GATT-Presentation-Format-Descriptor.
    pub const PRESENTATION_FORMAT: u8 = 0x0C;

    /// Decode `bytes` with this entry's decoder.
    pub fn decode(&self, bytes: &[u8]) -> Result<ParamValue, ParseError> {
        (self.decode)(bytes)
    }
}

/// Parameter type code to name to decoder.
pub static PARAM_TYPES: [ParamType; 18] = [
    ParamType { code: 1, name: "Value", decode: value::to_bytes },
    ParamType { code: 2, name: "Additional_Authorization_Data", decode: value::to_bytes },
    ParamType { code: 3, name: "Origin_local_vs_remote", decode: value::to_bytes },
    ParamType { code: 4, name: "Characteristic_Type", decode: value::to_uuid },
    ParamType { code: 5, name: "Characteristic_Instance_ID", decode: value::to_uint16 },
    ParamType { code: 6, name: "Service_Type", decode: value::to_uuid },
    ParamType { code: 7, name: "Service_Instance_ID", decode: value::to_uint16 },
    ParamType { code: 8, name: "TTL", decode: value::to_bytes },
    ParamType { code: 9, name: "Return_Response", decode: value::to_bytes },
    ParamType { code: 10, name: "HAP_Characteristic_Properties_Descriptor", decode: value::to_uint16 },
    ParamType { code: 11, name: "GATT_User_Description_Descriptor", decode: value::to_utf8 },
    ParamType { code: 12, name: "GATT_Presentation_Format_Descriptor", decode: value::to_presentation_format },
    ParamType { code: 13, name: "GATT_Valid_Range", decode: value::to_bytes },
    ParamType { code: 14, name: "HAP_Step_Value_Descriptor", decode: value::to_bytes },
    ParamType { code: 15, name: "HAP_Service_Properties", decode: value::to_uint16 },
    ParamType { code: 16, name: "HAP_Linked_Services", decode: value::to_bytes },
    ParamType { code: 17, name: "HAP_Valid_Values_Descriptor", decode: value::to_bytes },
    ParamType { code: 18, name: "HAP_Valid_Values_Range_Descriptor", decode: value::to_bytes },
];

/// Look up a parameter type by its wire code.
pub fn param_by_code(code: u8) -> Option<&'static ParamType> {
    PARAM_TYPES.iter().find(|p| p.code == code)
}

/// Look up a parameter type by name.
pub fn param_by_name(name: &str) -> Option<&'static ParamType> {
    PARAM_TYPES.iter().find(|p| p.name == name)
}

/// Resolve a parameter code to its name, failing on unknown codes.
pub fn param_name(code: u8) -> Result<&'static str, ParseError> {
    param_by_code(code)
        .map(|p| p.name)
        .ok_or(ParseError::UnknownParameterType(code))
}

/// HAP-BLE status codes carried in response PDUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HapStatus {
    Success = 0x00,
    UnsupportedPdu = 0x01,
    MaxProcedures = 0x02,
    InsufficientAuthorization = 0x03,
    InvalidInstanceId = 0x04,
    InsufficientAuthentication = 0x05,
    InvalidRequest = 0x06,
}

impl HapStatus {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::Success),
            0x01 => Some(Self::UnsupportedPdu),
            0x02 => Some(Self::MaxProcedures),
            0x03 => Some(Self::InsufficientAuthorization),
            0x04 => Some(Self::InvalidInstanceId),
            0x05 => Some(Self::InsufficientAuthentication),
            0x06 => Some(Self::InvalidRequest),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::UnsupportedPdu => "Unsupported_PDU",
            Self::MaxProcedures => "Max_Procedures",
            Self::InsufficientAuthorization => "Insufficient Authorization",
            Self::InvalidInstanceId => "Invalid Instance ID",
            Self::InsufficientAuthentication => "Insufficient Authentication",
            Self::InvalidRequest => "Invalid Request",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Success => "The request was successful.",
            Self::UnsupportedPdu => {
                "The request failed as the HAP PDU was not recognized or supported."
            }
            Self::MaxProcedures => {
                "The request failed as the accessory has reached the the limit on the \
                 simultaneous procedures it can handle."
            }
            Self::InsufficientAuthorization => {
                "Characteristic requires additional authorization data."
            }
            Self::InvalidInstanceId => {
                "The HAP Request's characteristic Instance id did not match the addressed \
                 characteristic's instance id."
            }
            Self::InsufficientAuthentication => {
                "Characteristic access required a secure session to be established."
            }
            Self::InvalidRequest => "Accessory was not able to perform the requested operation.",
        }
    }
}

/// HAP-BLE request opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    CharacteristicSignatureRead = 0x01,
    CharacteristicWrite = 0x02,
    CharacteristicRead = 0x03,
    CharacteristicTimedWrite = 0x04,
    CharacteristicExecuteWrite = 0x05,
    ServiceSignatureRead = 0x06,
}

impl OpCode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::CharacteristicSignatureRead),
            0x02 => Some(Self::CharacteristicWrite),
            0x03 => Some(Self::CharacteristicRead),
            0x04 => Some(Self::CharacteristicTimedWrite),
            0x05 => Some(Self::CharacteristicExecuteWrite),
            0x06 => Some(Self::ServiceSignatureRead),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::CharacteristicSignatureRead => "Characteristic_Signature_Read",
            Self::CharacteristicWrite => "Characteristic_Write",
            Self::CharacteristicRead => "Characteristic_Read",
            Self::CharacteristicTimedWrite => "Characteristic_Timed_Write",
            Self::CharacteristicExecuteWrite => "Characteristic_Execute_Write",
            Self::ServiceSignatureRead => "Service_Signature_Read",
        }
    }
}

/// TLV types used in pairing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TlvType {
    Method = 0x00,
    Identifier = 0x01,
    Salt = 0x02,
    PublicKey = 0x03,
    Proof = 0x04,
    EncryptedData = 0x05,
    State = 0x06,
    Error = 0x07,
    RetryDelay = 0x08,
    Certificate = 0x09,
    Signature = 0x0A,
    Permissions = 0x0B,
    FragmentData = 0x0C,
    FragmentLast = 0x0D,
    Separator = 0xFF,
}

impl TlvType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Method),
            0x01 => Some(Self::Identifier),
            0x02 => Some(Self::Salt),
            0x03 => Some(Self::PublicKey),
            0x04 => Some(Self::Proof),
            0x05 => Some(Self::EncryptedData),
            0x06 => Some(Self::State),
            0x07 => Some(Self::Error),
            0x08 => Some(Self::RetryDelay),
            0x09 => Some(Self::Certificate),
            0x0A => Some(Self::Signature),
            0x0B => Some(Self::Permissions),
            0x0C => Some(Self::FragmentData),
            0x0D => Some(Self::FragmentLast),
            0xFF => Some(Self::Separator),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Method => "kTLVType_Method",
            Self::Identifier => "kTLVType_Identifier",
            Self::Salt => "kTLVType_Salt",
            Self::PublicKey => "kTLVType_PublicKey",
            Self::Proof => "kTLVType_Proof",
            Self::EncryptedData => "kTLVType_EncryptedData",
            Self::State => "kTLVType_State",
            Self::Error => "kTLVType_Error",
            Self::RetryDelay => "kTLVType_RetryDelay",
            Self::Certificate => "kTLVType_Certificate",
            Self::Signature => "kTLVType_Signature",
            Self::Permissions => "kTLVType_Permissions",
            Self::FragmentData => "kTLVType_FragmentData",
            Self::FragmentLast => "kTLVType_FragmentLast",
            Self::Separator => "kTLVType_Separator",
        }
    }
}

/// Values carried in `kTLVType_Method`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PairingMethod {
    /// Pair-Setup without MFi authentication. Accessories expect this in M1.
    PairSetup = 0x00,
    PairSetupWithAuth = 0x01,
    PairVerify = 0x02,
    AddPairing = 0x03,
    RemovePairing = 0x04,
    ListPairings = 0x05,
}

impl PairingMethod {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::PairSetup => "Pair_Setup",
            Self::PairSetupWithAuth => "Pair_Setup_With_Auth",
            Self::PairVerify => "Pair_Verify",
            Self::AddPairing => "Add_Pairing",
            Self::RemovePairing => "Remove_Pairing",
            Self::ListPairings => "List_Pairings",
        }
    }
}

/// Name for a `kTLVType_Error` code.
pub fn pairing_error_name(code: u8) -> &'static str {
    match code {
        0x01 => "kTLVError_Unknown",
        0x02 => "kTLVError_Authentication",
        0x03 => "kTLVError_Backoff",
        0x04 => "kTLVError_MaxPeers",
        0x05 => "kTLVError_MaxTries",
        0x06 => "kTLVError_Unavailable",
        0x07 => "kTLVError_Busy",
        _ => "n/a",
    }
}

/// Characteristic value formats from the GATT presentation format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CharacteristicFormat {
    Bool = 0x01,
    Uint8 = 0x04,
    Uint16 = 0x06,
    Uint32 = 0x08,
    Uint64 = 0x0A,
    Int = 0x10,
    Float = 0x14,
    String = 0x19,
    Data = 0x1B,
}

impl CharacteristicFormat {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Bool),
            0x04 => Some(Self::Uint8),
            0x06 => Some(Self::Uint16),
            0x08 => Some(Self::Uint32),
            0x0A => Some(Self::Uint64),
            0x10 => Some(Self::Int),
            0x14 => Some(Self::Float),
            0x19 => Some(Self::String),
            0x1B => Some(Self::Data),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Data => "data",
        }
    }
}

/// Units from the GATT presentation format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Unit {
    Unitless = 0x2700,
    Seconds = 0x2703,
    Celsius = 0x272F,
    Lux = 0x2731,
    ArcDegrees = 0x2763,
    Percentage = 0x27AD,
}

impl Unit {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0x2700 => Some(Self::Unitless),
            0x2703 => Some(Self::Seconds),
            0x272F => Some(Self::Celsius),
            0x2731 => Some(Self::Lux),
            0x2763 => Some(Self::ArcDegrees),
            0x27AD => Some(Self::Percentage),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unitless => "unitless",
            Self::Seconds => "seconds",
            Self::Celsius => "celsius",
            Self::Lux => "lux",
            Self::ArcDegrees => "arcdegrees",
            Self::Percentage => "percentage",
        }
    }
}
