//! Storable values - the on-disk form of interpreter values.
//!
//! A storable is a tagged variant covering every kind the engine can
//! persist: primitives, inline collections, composites, out-of-line
//! collection roots, storage references, and raw slab pointers. A single
//! `encode`/`decode` pair dispatches on the tag.
//!
//! Map entries always encode in canonical key order (shorter encoded key
//! first, ties broken lexicographically), so identical value graphs
//! produce byte-identical output regardless of traversal history.

use crate::ledger::Address;
use crate::slab::StorageId;

use super::decoder::CanonicalDecoder;
use super::encoder::CanonicalEncoder;
use super::type_info::TypeInfo;
use super::{
    canonical_key_order, DecodeError, TAG_ADDRESS, TAG_ARRAY_ROOT, TAG_BIG_INT_NEGATIVE,
    TAG_BIG_INT_POSITIVE, TAG_COMPOSITE, TAG_MAP_ROOT, TAG_SLAB_ID, TAG_STORAGE_REFERENCE,
};

/// Maximum nesting depth accepted by the decoder.
const MAX_NESTING_DEPTH: usize = 128;

/// An arbitrary-magnitude signed integer.
///
/// The magnitude is big-endian with no leading zero bytes. Values that fit
/// the basic integer range must use `Storable::Int`; the codec rejects
/// big integers inside that range as non-canonical.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BigInt {
    pub negative: bool,
    pub magnitude: Vec<u8>,
}

impl BigInt {
    /// Creates a big integer from a sign and magnitude, normalizing
    /// leading zeros and the sign of zero.
    pub fn from_magnitude(negative: bool, magnitude: impl Into<Vec<u8>>) -> Self {
        let mut magnitude = magnitude.into();
        let zeros = magnitude.iter().take_while(|&&b| b == 0).count();
        magnitude.drain(..zeros);
        let negative = negative && !magnitude.is_empty();
        BigInt {
            negative,
            magnitude,
        }
    }

    /// Creates a big integer holding an i64 value.
    pub fn from_i64(value: i64) -> Self {
        Self::from_magnitude(value < 0, value.unsigned_abs().to_be_bytes())
    }

    /// Returns the value as an i64 when it fits.
    pub fn to_i64(&self) -> Option<i64> {
        if self.magnitude.len() > 8 {
            return None;
        }
        let mut bytes = [0u8; 8];
        bytes[8 - self.magnitude.len()..].copy_from_slice(&self.magnitude);
        let magnitude = u64::from_be_bytes(bytes);
        if self.negative {
            if magnitude > 1 << 63 {
                return None;
            }
            if magnitude == 1 << 63 {
                return Some(i64::MIN);
            }
            Some(-(magnitude as i64))
        } else {
            i64::try_from(magnitude).ok()
        }
    }

    /// Returns true if the value fits the basic integer range.
    pub fn fits_i64(&self) -> bool {
        self.to_i64().is_some()
    }
}

/// Adds one to a big-endian magnitude.
fn big_increment(bytes: &[u8]) -> Vec<u8> {
    let mut out = bytes.to_vec();
    for byte in out.iter_mut().rev() {
        let (sum, carry) = byte.overflowing_add(1);
        *byte = sum;
        if !carry {
            return out;
        }
    }
    out.insert(0, 1);
    out
}

/// Subtracts one from a non-zero big-endian magnitude.
fn big_decrement(bytes: &[u8]) -> Vec<u8> {
    let mut out = bytes.to_vec();
    for byte in out.iter_mut().rev() {
        let (diff, borrow) = byte.overflowing_sub(1);
        *byte = diff;
        if !borrow {
            break;
        }
    }
    let zeros = out.iter().take_while(|&&b| b == 0).count();
    out.drain(..zeros);
    out
}

/// Returns true if a bignum payload lies outside the basic integer range.
fn bignum_outside_basic_range(payload: &[u8]) -> bool {
    payload.len() > 8 || (payload.len() == 8 && payload[0] >= 0x80)
}

/// A reference to a value in account storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageReference {
    pub address: Address,
    pub key: String,
}

/// A composite value in storable form.
///
/// Fields encode as a map keyed by field name, in canonical key order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositeStorable {
    pub type_info: TypeInfo,
    pub fields: Vec<(String, Storable)>,
}

/// The on-disk form of any value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Storable {
    Bool(bool),
    Int(i64),
    BigInt(BigInt),
    String(String),
    Address(Address),
    /// An inline array, embedded in its parent.
    Array(Vec<Storable>),
    /// An inline map, embedded in its parent.
    Map(Vec<(Storable, Storable)>),
    Composite(Box<CompositeStorable>),
    /// The root of an out-of-line array.
    ArrayRoot(StorageId),
    /// The root of an out-of-line map.
    MapRoot(StorageId),
    /// A reference to a value in account storage.
    StorageReference(StorageReference),
    /// A raw pointer to a slab holding a single oversize storable.
    SlabId(StorageId),
}

impl Storable {
    /// Encodes the storable into `encoder`.
    pub fn encode(&self, encoder: &mut CanonicalEncoder) {
        match self {
            Storable::Bool(value) => encoder.encode_bool(*value),
            Storable::Int(value) => encoder.encode_int(*value),
            Storable::BigInt(value) => {
                if value.negative {
                    encoder.encode_tag(TAG_BIG_INT_NEGATIVE);
                    encoder.encode_bytes(&big_decrement(&value.magnitude));
                } else {
                    encoder.encode_tag(TAG_BIG_INT_POSITIVE);
                    encoder.encode_bytes(&value.magnitude);
                }
            }
            Storable::String(value) => encoder.encode_text(value),
            Storable::Address(address) => {
                encoder.encode_tag(TAG_ADDRESS);
                encoder.encode_bytes(address.as_bytes());
            }
            Storable::Array(elements) => {
                encoder.encode_array_header(elements.len());
                for element in elements {
                    element.encode(encoder);
                }
            }
            Storable::Map(entries) => {
                let mut encoded: Vec<(Vec<u8>, Vec<u8>)> = entries
                    .iter()
                    .map(|(key, value)| {
                        let mut key_encoder = CanonicalEncoder::new();
                        key.encode(&mut key_encoder);
                        let mut value_encoder = CanonicalEncoder::new();
                        value.encode(&mut value_encoder);
                        (key_encoder.into_bytes(), value_encoder.into_bytes())
                    })
                    .collect();
                encoded.sort_by(|a, b| canonical_key_order(&a.0, &b.0));
                for pair in encoded.windows(2) {
                    assert!(
                        pair[0].0 != pair[1].0,
                        "duplicate map key in canonical encoding"
                    );
                }
                encoder.encode_map_header(encoded.len());
                for (key, value) in &encoded {
                    encoder.append_encoded(key);
                    encoder.append_encoded(value);
                }
            }
            Storable::Composite(composite) => {
                encoder.encode_tag(TAG_COMPOSITE);
                encoder.encode_array_header(2);
                composite.type_info.encode(encoder);
                let mut fields: Vec<(&str, &Storable)> = composite
                    .fields
                    .iter()
                    .map(|(name, value)| (name.as_str(), value))
                    .collect();
                fields.sort_by(|a, b| canonical_key_order(a.0.as_bytes(), b.0.as_bytes()));
                for pair in fields.windows(2) {
                    assert!(
                        pair[0].0 != pair[1].0,
                        "duplicate composite field in canonical encoding"
                    );
                }
                encoder.encode_map_header(fields.len());
                for (name, value) in fields {
                    encoder.encode_text(name);
                    value.encode(encoder);
                }
            }
            Storable::ArrayRoot(id) => {
                encoder.encode_tag(TAG_ARRAY_ROOT);
                encoder.encode_bytes(&id.to_bytes());
            }
            Storable::MapRoot(id) => {
                encoder.encode_tag(TAG_MAP_ROOT);
                encoder.encode_bytes(&id.to_bytes());
            }
            Storable::StorageReference(reference) => {
                encoder.encode_tag(TAG_STORAGE_REFERENCE);
                encoder.encode_array_header(2);
                encoder.encode_bytes(reference.address.as_bytes());
                encoder.encode_text(&reference.key);
            }
            Storable::SlabId(id) => {
                encoder.encode_tag(TAG_SLAB_ID);
                encoder.encode_bytes(&id.to_bytes());
            }
        }
    }

    /// Returns the canonical encoded size in bytes.
    pub fn encoded_size(&self) -> usize {
        let mut encoder = CanonicalEncoder::new();
        self.encode(&mut encoder);
        encoder.len()
    }

    /// Decodes a storable from `decoder`.
    pub fn decode(decoder: &mut CanonicalDecoder<'_>) -> Result<Storable, DecodeError> {
        Self::decode_at(decoder, 0)
    }

    fn decode_at(decoder: &mut CanonicalDecoder<'_>, depth: usize) -> Result<Storable, DecodeError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(DecodeError::Malformed("nesting too deep"));
        }
        let head = decoder.peek_head()?;
        match head >> 5 {
            0 | 1 => Ok(Storable::Int(decoder.decode_int()?)),
            2 => Err(DecodeError::Malformed("bare byte string")),
            3 => Ok(Storable::String(decoder.decode_text()?.to_owned())),
            4 => {
                let len = decoder.decode_array_header()?;
                let mut elements = Vec::with_capacity(len.min(1024) as usize);
                for _ in 0..len {
                    elements.push(Self::decode_at(decoder, depth + 1)?);
                }
                Ok(Storable::Array(elements))
            }
            5 => {
                let len = decoder.decode_map_header()?;
                let mut entries = Vec::with_capacity(len.min(1024) as usize);
                let mut previous_key: Option<&[u8]> = None;
                for _ in 0..len {
                    let start = decoder.position();
                    let key = Self::decode_at(decoder, depth + 1)?;
                    let key_bytes = decoder.consumed_since(start);
                    if let Some(previous) = previous_key {
                        if canonical_key_order(previous, key_bytes) != std::cmp::Ordering::Less {
                            return Err(DecodeError::NonCanonical("map keys out of order"));
                        }
                    }
                    previous_key = Some(key_bytes);
                    let value = Self::decode_at(decoder, depth + 1)?;
                    entries.push((key, value));
                }
                Ok(Storable::Map(entries))
            }
            6 => Self::decode_tagged(decoder, depth),
            _ => Ok(Storable::Bool(decoder.decode_bool()?)),
        }
    }

    fn decode_tagged(
        decoder: &mut CanonicalDecoder<'_>,
        depth: usize,
    ) -> Result<Storable, DecodeError> {
        let tag = decoder.decode_tag()?;
        match tag {
            TAG_BIG_INT_POSITIVE | TAG_BIG_INT_NEGATIVE => {
                let payload = decoder.decode_bytes()?;
                if payload.first() == Some(&0) {
                    return Err(DecodeError::NonCanonical("big integer leading zero"));
                }
                if !bignum_outside_basic_range(payload) {
                    return Err(DecodeError::NonCanonical("big integer in basic range"));
                }
                let big = if tag == TAG_BIG_INT_NEGATIVE {
                    BigInt {
                        negative: true,
                        magnitude: big_increment(payload),
                    }
                } else {
                    BigInt {
                        negative: false,
                        magnitude: payload.to_vec(),
                    }
                };
                Ok(Storable::BigInt(big))
            }
            TAG_ADDRESS => {
                let address = Address::from_slice(decoder.decode_bytes()?)
                    .ok_or(DecodeError::Malformed("address must be 8 bytes"))?;
                Ok(Storable::Address(address))
            }
            TAG_ARRAY_ROOT => Ok(Storable::ArrayRoot(Self::decode_storage_id(decoder)?)),
            TAG_MAP_ROOT => Ok(Storable::MapRoot(Self::decode_storage_id(decoder)?)),
            TAG_SLAB_ID => Ok(Storable::SlabId(Self::decode_storage_id(decoder)?)),
            TAG_STORAGE_REFERENCE => {
                decoder.decode_fixed_array_header(2)?;
                let address = Address::from_slice(decoder.decode_bytes()?)
                    .ok_or(DecodeError::Malformed("address must be 8 bytes"))?;
                let key = decoder.decode_text()?.to_owned();
                Ok(Storable::StorageReference(StorageReference {
                    address,
                    key,
                }))
            }
            TAG_COMPOSITE => {
                decoder.decode_fixed_array_header(2)?;
                let type_info = TypeInfo::decode(decoder)?;
                let len = decoder.decode_map_header()?;
                let mut fields = Vec::with_capacity(len.min(1024) as usize);
                let mut previous_name: Option<String> = None;
                for _ in 0..len {
                    let name = decoder.decode_text()?.to_owned();
                    if let Some(previous) = &previous_name {
                        if canonical_key_order(previous.as_bytes(), name.as_bytes())
                            != std::cmp::Ordering::Less
                        {
                            return Err(DecodeError::NonCanonical("composite fields out of order"));
                        }
                    }
                    let value = Self::decode_at(decoder, depth + 1)?;
                    previous_name = Some(name.clone());
                    fields.push((name, value));
                }
                Ok(Storable::Composite(Box::new(CompositeStorable {
                    type_info,
                    fields,
                })))
            }
            other => Err(DecodeError::UnknownTag(other)),
        }
    }

    fn decode_storage_id(decoder: &mut CanonicalDecoder<'_>) -> Result<StorageId, DecodeError> {
        let id = StorageId::from_slice(decoder.decode_bytes()?)
            .ok_or(DecodeError::Malformed("storage id must be 16 bytes"))?;
        if id.is_undefined() {
            return Err(DecodeError::Malformed("undefined storage id"));
        }
        Ok(id)
    }
}
