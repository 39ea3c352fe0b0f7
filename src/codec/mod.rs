//! Canonical binary encoding of storable values.
//!
//! The codec produces deterministic, byte-identical output for identical
//! value graphs: integer arguments are minimal-width, map entries sort by
//! their canonical encoded key, and every top-level encoding starts with a
//! format version byte. The decoder rejects anything the encoder could
//! not have produced, so `decode(encode(v)) == v` and
//! `encode(decode(b)) == b` both hold.

mod decoder;
mod encoder;
mod storable;
mod type_info;

pub use decoder::CanonicalDecoder;
pub use encoder::CanonicalEncoder;
pub use storable::{BigInt, CompositeStorable, Storable, StorageReference};
pub use type_info::{Location, TypeInfo, TRANSACTION_HASH_SIZE};

use std::cmp::Ordering;

use thiserror::Error;

/// Tag for a positive big integer (payload: magnitude bytes).
pub const TAG_BIG_INT_POSITIVE: u64 = 2;
/// Tag for a negative big integer (payload: magnitude of `-1 - value`).
pub const TAG_BIG_INT_NEGATIVE: u64 = 3;
/// Tag for an 8-byte account address.
pub const TAG_ADDRESS: u64 = 224;
/// Tag for the root of an out-of-line array.
pub const TAG_ARRAY_ROOT: u64 = 225;
/// Tag for the root of an out-of-line map.
pub const TAG_MAP_ROOT: u64 = 226;
/// Tag for a raw slab pointer.
pub const TAG_SLAB_ID: u64 = 227;
/// Tag for a reference to a value in account storage.
pub const TAG_STORAGE_REFERENCE: u64 = 228;
/// Tag for a composite value.
pub const TAG_COMPOSITE: u64 = 229;
/// Tag for composite type information.
pub const TAG_TYPE_INFO: u64 = 230;
/// Tag for a string location.
pub const TAG_LOCATION_STRING: u64 = 231;
/// Tag for an identifier location.
pub const TAG_LOCATION_IDENTIFIER: u64 = 232;
/// Tag for an address location.
pub const TAG_LOCATION_ADDRESS: u64 = 233;
/// Tag for a transaction location.
pub const TAG_LOCATION_TRANSACTION: u64 = 234;

/// Decoding errors.
///
/// All of them are fatal to the transaction: they signal data corruption,
/// version skew, or input the canonical encoder could not have produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected type: expected {expected}")]
    UnexpectedType { expected: &'static str },
    #[error("non-canonical encoding: {0}")]
    NonCanonical(&'static str),
    #[error("unknown tag: {0}")]
    UnknownTag(u64),
    #[error("unsupported format version: {0}")]
    UnknownVersion(u8),
    #[error("invalid UTF-8 in text string")]
    InvalidUtf8,
    #[error("integer out of range")]
    IntegerOutOfRange,
    #[error("trailing bytes after value")]
    TrailingBytes,
    #[error("malformed item: {0}")]
    Malformed(&'static str),
}

/// Codec constants fixed at storage construction.
///
/// Changing any of them changes on-disk bytes; the version byte exists to
/// gate that.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodecConfig {
    /// Format version prefixed to every top-level encoding.
    pub version: u8,
    /// Encoded size above which a storable moves to its own slab.
    pub max_inline_element_size: usize,
    /// Encoded size at which a data slab splits.
    pub target_slab_size: usize,
    /// Maximum child references per metadata slab.
    pub meta_fanout: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            version: 1,
            max_inline_element_size: 512,
            target_slab_size: 1024,
            meta_fanout: 64,
        }
    }
}

/// Canonical ordering of encoded map keys: shorter first, then
/// lexicographic on the bytes.
pub fn canonical_key_order(a: &[u8], b: &[u8]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Encodes a bare storable without a version prefix.
pub fn encode_storable(storable: &Storable) -> Vec<u8> {
    let mut encoder = CanonicalEncoder::new();
    storable.encode(&mut encoder);
    encoder.into_bytes()
}

/// Encodes an account value: format version byte followed by the storable.
pub fn encode_account_value(storable: &Storable, config: &CodecConfig) -> Vec<u8> {
    let mut encoder = CanonicalEncoder::new();
    storable.encode(&mut encoder);
    let mut out = Vec::with_capacity(1 + encoder.len());
    out.push(config.version);
    out.extend_from_slice(encoder.as_bytes());
    out
}

/// Decodes an account value, checking the format version.
pub fn decode_account_value(bytes: &[u8], config: &CodecConfig) -> Result<Storable, DecodeError> {
    let (&version, rest) = bytes.split_first().ok_or(DecodeError::UnexpectedEnd)?;
    if version != config.version {
        return Err(DecodeError::UnknownVersion(version));
    }
    let mut decoder = CanonicalDecoder::new(rest);
    let storable = Storable::decode(&mut decoder)?;
    decoder.expect_end()?;
    Ok(storable)
}
