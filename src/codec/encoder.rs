//! Low-level canonical binary writer.
//!
//! The format is a deterministic subset of a self-describing tag/length
//! structure: every item starts with a head byte holding a major type in
//! the top three bits and a length argument in the rest. Arguments always
//! use the smallest valid width, so identical values produce identical
//! bytes no matter how they were built.

/// Major type for unsigned integers.
pub(crate) const MAJOR_UINT: u8 = 0;
/// Major type for negative integers (`-1 - argument`).
pub(crate) const MAJOR_NEGATIVE: u8 = 1;
/// Major type for byte strings.
pub(crate) const MAJOR_BYTES: u8 = 2;
/// Major type for UTF-8 text strings.
pub(crate) const MAJOR_TEXT: u8 = 3;
/// Major type for arrays.
pub(crate) const MAJOR_ARRAY: u8 = 4;
/// Major type for maps.
pub(crate) const MAJOR_MAP: u8 = 5;
/// Major type for tags.
pub(crate) const MAJOR_TAG: u8 = 6;

/// Head byte for `false`.
pub(crate) const HEAD_FALSE: u8 = 0xf4;
/// Head byte for `true`.
pub(crate) const HEAD_TRUE: u8 = 0xf5;
/// Head byte for `null`.
pub(crate) const HEAD_NULL: u8 = 0xf6;

/// Canonical encoder for building deterministic binary output.
#[derive(Clone, Debug, Default)]
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Creates a new empty encoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Creates an encoder with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Returns the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the encoder and returns the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Returns the number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clears the encoder.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Writes a head byte with the minimal-width argument encoding.
    fn write_head(&mut self, major: u8, argument: u64) {
        let base = major << 5;
        if argument < 24 {
            self.buffer.push(base | argument as u8);
        } else if argument <= 0xff {
            self.buffer.push(base | 24);
            self.buffer.push(argument as u8);
        } else if argument <= 0xffff {
            self.buffer.push(base | 25);
            self.buffer.extend_from_slice(&(argument as u16).to_be_bytes());
        } else if argument <= 0xffff_ffff {
            self.buffer.push(base | 26);
            self.buffer.extend_from_slice(&(argument as u32).to_be_bytes());
        } else {
            self.buffer.push(base | 27);
            self.buffer.extend_from_slice(&argument.to_be_bytes());
        }
    }

    /// Encodes an unsigned integer.
    pub fn encode_uint(&mut self, value: u64) {
        self.write_head(MAJOR_UINT, value);
    }

    /// Encodes a signed integer.
    pub fn encode_int(&mut self, value: i64) {
        if value >= 0 {
            self.write_head(MAJOR_UINT, value as u64);
        } else {
            // -1 - value, computed without overflow for i64::MIN
            self.write_head(MAJOR_NEGATIVE, !(value as u64));
        }
    }

    /// Encodes a byte string.
    pub fn encode_bytes(&mut self, bytes: &[u8]) {
        self.write_head(MAJOR_BYTES, bytes.len() as u64);
        self.buffer.extend_from_slice(bytes);
    }

    /// Encodes a UTF-8 text string.
    pub fn encode_text(&mut self, text: &str) {
        self.write_head(MAJOR_TEXT, text.len() as u64);
        self.buffer.extend_from_slice(text.as_bytes());
    }

    /// Encodes an array header for `len` items.
    pub fn encode_array_header(&mut self, len: usize) {
        self.write_head(MAJOR_ARRAY, len as u64);
    }

    /// Encodes a map header for `len` entries.
    pub fn encode_map_header(&mut self, len: usize) {
        self.write_head(MAJOR_MAP, len as u64);
    }

    /// Encodes a tag preceding the next item.
    pub fn encode_tag(&mut self, tag: u64) {
        self.write_head(MAJOR_TAG, tag);
    }

    /// Appends bytes that are already in canonical encoded form.
    pub(crate) fn append_encoded(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Encodes a boolean.
    pub fn encode_bool(&mut self, value: bool) {
        self.buffer.push(if value { HEAD_TRUE } else { HEAD_FALSE });
    }

    /// Encodes a null item.
    pub fn encode_null(&mut self) {
        self.buffer.push(HEAD_NULL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn encoded(f: impl FnOnce(&mut CanonicalEncoder)) -> Vec<u8> {
        let mut enc = CanonicalEncoder::new();
        f(&mut enc);
        enc.into_bytes()
    }

    #[test]
    fn test_uint_widths_are_minimal() {
        assert_eq!(encoded(|e| e.encode_uint(0)), hex!("00"));
        assert_eq!(encoded(|e| e.encode_uint(23)), hex!("17"));
        assert_eq!(encoded(|e| e.encode_uint(24)), hex!("1818"));
        assert_eq!(encoded(|e| e.encode_uint(255)), hex!("18ff"));
        assert_eq!(encoded(|e| e.encode_uint(256)), hex!("190100"));
        assert_eq!(encoded(|e| e.encode_uint(65536)), hex!("1a00010000"));
        assert_eq!(
            encoded(|e| e.encode_uint(u64::MAX)),
            hex!("1bffffffffffffffff")
        );
    }

    #[test]
    fn test_negative_integers() {
        assert_eq!(encoded(|e| e.encode_int(-1)), hex!("20"));
        assert_eq!(encoded(|e| e.encode_int(-24)), hex!("37"));
        assert_eq!(encoded(|e| e.encode_int(-25)), hex!("3818"));
        assert_eq!(encoded(|e| e.encode_int(-256)), hex!("38ff"));
        assert_eq!(
            encoded(|e| e.encode_int(i64::MIN)),
            hex!("3b7fffffffffffffff")
        );
    }

    #[test]
    fn test_text_and_bytes() {
        assert_eq!(encoded(|e| e.encode_text("abc")), hex!("63616263"));
        assert_eq!(encoded(|e| e.encode_bytes(&[1, 2])), hex!("420102"));
    }

    #[test]
    fn test_headers_and_simple_values() {
        assert_eq!(encoded(|e| e.encode_array_header(2)), hex!("82"));
        assert_eq!(encoded(|e| e.encode_map_header(1)), hex!("a1"));
        assert_eq!(encoded(|e| e.encode_tag(2)), hex!("c2"));
        assert_eq!(encoded(|e| e.encode_bool(false)), hex!("f4"));
        assert_eq!(encoded(|e| e.encode_bool(true)), hex!("f5"));
        assert_eq!(encoded(|e| e.encode_null()), hex!("f6"));
    }
}
