//! TLV8 encoding/decoding for HAP parameters and pairing messages.
//!
//! TLV8 format: [Type: 1 byte][Length: 1 byte][Value: 0-255 bytes]
//! Values longer than 255 bytes are fragmented across consecutive TLVs of the
//! same type and concatenated again on decode.

use std::collections::HashMap;

use hap_core::error::ParseError;
pub use hap_core::registry::TlvType;
use hap_core::registry::PairingMethod;

/// Maximum payload carried by a single TLV chunk.
pub const MAX_CHUNK_LEN: usize = 255;

/// Encode one `(type, value)` pair as a lazy sequence of wire chunks.
///
/// An empty value still produces exactly one zero-length chunk.
pub fn encode(type_code: u8, value: &[u8]) -> Chunks<'_> {
    Chunks {
        type_code,
        remaining: value,
        emitted: false,
    }
}

/// Encode one `(type, value)` pair into a contiguous buffer.
pub fn encode_to_vec(type_code: u8, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 2 * (value.len() / MAX_CHUNK_LEN + 1));
    for chunk in encode(type_code, value) {
        out.extend_from_slice(&chunk);
    }
    out
}

/// Iterator over the wire chunks of one TLV value.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    type_code: u8,
    remaining: &'a [u8],
    emitted: bool,
}

impl Iterator for Chunks<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        if self.remaining.is_empty() && self.emitted {
            return None;
        }
        self.emitted = true;

        let len = self.remaining.len().min(MAX_CHUNK_LEN);
        let (head, tail) = self.remaining.split_at(len);
        self.remaining = tail;

        let mut chunk = Vec::with_capacity(len + 2);
        chunk.push(self.type_code);
        chunk.push(len as u8);
        chunk.extend_from_slice(head);
        Some(chunk)
    }
}

/// One TLV chunk as found on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlvRecord<'a> {
    pub type_code: u8,
    /// Length declared in the chunk header.
    pub length: u8,
    pub value: &'a [u8],
}

/// Decode a byte stream into its TLV chunks, left to right.
///
/// Iteration stops after the first error.
pub fn decode(data: &[u8]) -> Records<'_> {
    Records {
        data,
        offset: 0,
        failed: false,
    }
}

/// Iterator over the chunks of a TLV stream.
#[derive(Debug, Clone)]
pub struct Records<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<TlvRecord<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }

        let remaining = self.data.len() - self.offset;
        if remaining < 2 {
            self.failed = true;
            return Some(Err(ParseError::MalformedTlv {
                offset: self.offset,
                needed: 2,
                remaining,
            }));
        }

        let type_code = self.data[self.offset];
        let length = self.data[self.offset + 1];
        let start = self.offset + 2;

        if start + length as usize > self.data.len() {
            self.failed = true;
            return Some(Err(ParseError::MalformedTlv {
                offset: self.offset,
                needed: length as usize,
                remaining: self.data.len() - start,
            }));
        }

        let value = &self.data[start..start + length as usize];
        self.offset = start + length as usize;

        Some(Ok(TlvRecord {
            type_code,
            length,
            value,
        }))
    }
}

/// Group decoded chunks by resolved name, concatenating repeated names in
/// order of appearance.
pub fn reassemble<'a, I, F>(records: I, mut resolve: F) -> Result<HashMap<&'static str, Vec<u8>>, ParseError>
where
    I: IntoIterator<Item = Result<TlvRecord<'a>, ParseError>>,
    F: FnMut(u8) -> Result<&'static str, ParseError>,
{
    let mut out: HashMap<&'static str, Vec<u8>> = HashMap::new();

    for record in records {
        let record = record?;
        if record.value.len() != record.length as usize {
            return Err(ParseError::InvalidResponseLength {
                type_code: record.type_code,
                declared: record.length as usize,
                actual: record.value.len(),
            });
        }

        let name = resolve(record.type_code)?;
        out.entry(name).or_default().extend_from_slice(record.value);
    }

    Ok(out)
}

/// Parsed TLV8 message keyed by raw type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tlv8 {
    items: HashMap<u8, Vec<u8>>,
}

impl Tlv8 {
    /// Create empty TLV8 message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TLV8 from bytes.
    ///
    /// Every occurrence of a type is concatenated in order of appearance,
    /// including occurrences separated by other types, the same as
    /// [`reassemble`].
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let mut items: HashMap<u8, Vec<u8>> = HashMap::new();
        for record in decode(data) {
            let record = record?;
            items
                .entry(record.type_code)
                .or_default()
                .extend_from_slice(record.value);
        }
        Ok(Self { items })
    }

    /// Encode to bytes.
    ///
    /// Values > 255 bytes are automatically fragmented across multiple TLVs.
    pub fn encode(&self) -> Vec<u8> {
        let mut result = Vec::new();

        // Sort by type for deterministic output
        let mut types: Vec<_> = self.items.keys().copied().collect();
        types.sort_unstable();

        for typ in types {
            for chunk in encode(typ, &self.items[&typ]) {
                result.extend_from_slice(&chunk);
            }
        }

        result
    }

    /// Get value for type.
    pub fn get(&self, typ: TlvType) -> Option<&[u8]> {
        self.get_raw(typ as u8)
    }

    /// Get value for raw type.
    pub fn get_raw(&self, typ: u8) -> Option<&[u8]> {
        self.items.get(&typ).map(|v| v.as_slice())
    }

    /// Set value for type.
    pub fn set(&mut self, typ: TlvType, value: impl Into<Vec<u8>>) {
        self.items.insert(typ as u8, value.into());
    }

    /// Builder-style [`Tlv8::set`].
    pub fn with(mut self, typ: TlvType, value: impl Into<Vec<u8>>) -> Self {
        self.set(typ, value);
        self
    }

    /// Check if type is present.
    pub fn contains(&self, typ: TlvType) -> bool {
        self.items.contains_key(&(typ as u8))
    }

    /// Get state value (single byte).
    pub fn state(&self) -> Option<u8> {
        self.get(TlvType::State).and_then(|v| v.first().copied())
    }

    /// Get error value (single byte).
    pub fn error(&self) -> Option<u8> {
        self.get(TlvType::Error).and_then(|v| v.first().copied())
    }

    /// Get retry delay value in seconds (little-endian, 1-2 bytes).
    pub fn retry_delay(&self) -> Option<u16> {
        self.get(TlvType::RetryDelay).map(|v| match v.len() {
            0 => 0,
            1 => v[0] as u16,
            _ => u16::from_le_bytes([v[0], v[1]]),
        })
    }

    /// Pair-Setup M1: start SRP with the accessory.
    pub fn pair_setup_m1() -> Self {
        Self::new()
            .with(TlvType::State, vec![0x01])
            .with(TlvType::Method, vec![PairingMethod::PairSetup.code()])
    }

    /// Pair-Verify M1: present the controller's ephemeral public key.
    pub fn pair_verify_m1(public_key: &[u8; 32]) -> Self {
        Self::new()
            .with(TlvType::State, vec![0x01])
            .with(TlvType::PublicKey, public_key.to_vec())
    }
}
