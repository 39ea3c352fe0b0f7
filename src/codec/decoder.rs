//! Low-level canonical binary reader.
//!
//! The decoder is the strict inverse of the encoder: it rejects any input
//! the encoder could not have produced. Non-minimal length arguments,
//! indefinite lengths, and invalid UTF-8 are all decode errors, so
//! `encode(decode(bytes)) == bytes` holds for every input it accepts.

use super::encoder::{
    HEAD_FALSE, HEAD_NULL, HEAD_TRUE, MAJOR_ARRAY, MAJOR_BYTES, MAJOR_MAP, MAJOR_NEGATIVE,
    MAJOR_TAG, MAJOR_TEXT, MAJOR_UINT,
};
use super::DecodeError;

/// Canonical decoder over a byte slice.
pub struct CanonicalDecoder<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> CanonicalDecoder<'a> {
    /// Creates a decoder over the given input.
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Returns the current byte offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the bytes consumed since `start`.
    pub fn consumed_since(&self, start: usize) -> &'a [u8] {
        &self.input[start..self.pos]
    }

    /// Returns true if all input has been consumed.
    pub fn is_at_end(&self) -> bool {
        self.pos == self.input.len()
    }

    /// Fails unless all input has been consumed.
    pub fn expect_end(&self) -> Result<(), DecodeError> {
        if self.is_at_end() {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes)
        }
    }

    fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let byte = *self.input.get(self.pos).ok_or(DecodeError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.input.len())
            .ok_or(DecodeError::UnexpectedEnd)?;
        let slice = &self.input[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Peeks at the next head byte without consuming it.
    pub fn peek_head(&self) -> Result<u8, DecodeError> {
        self.input
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEnd)
    }

    /// Reads a head byte, returning its major type and argument.
    ///
    /// Rejects non-minimal argument widths and indefinite lengths.
    fn read_head(&mut self) -> Result<(u8, u64), DecodeError> {
        let head = self.read_byte()?;
        let major = head >> 5;
        let additional = head & 0x1f;
        let argument = match additional {
            0..=23 => u64::from(additional),
            24 => {
                let value = u64::from(self.read_byte()?);
                if value < 24 {
                    return Err(DecodeError::NonCanonical("oversized integer argument"));
                }
                value
            }
            25 => {
                let value = u64::from(u16::from_be_bytes(
                    self.read_slice(2)?.try_into().expect("slice length checked"),
                ));
                if value <= 0xff {
                    return Err(DecodeError::NonCanonical("oversized integer argument"));
                }
                value
            }
            26 => {
                let value = u64::from(u32::from_be_bytes(
                    self.read_slice(4)?.try_into().expect("slice length checked"),
                ));
                if value <= 0xffff {
                    return Err(DecodeError::NonCanonical("oversized integer argument"));
                }
                value
            }
            27 => {
                let value = u64::from_be_bytes(
                    self.read_slice(8)?.try_into().expect("slice length checked"),
                );
                if value <= 0xffff_ffff {
                    return Err(DecodeError::NonCanonical("oversized integer argument"));
                }
                value
            }
            _ => return Err(DecodeError::Malformed("reserved or indefinite length")),
        };
        Ok((major, argument))
    }

    fn expect_major(&mut self, major: u8, expected: &'static str) -> Result<u64, DecodeError> {
        let (found, argument) = self.read_head()?;
        if found != major {
            return Err(DecodeError::UnexpectedType { expected });
        }
        Ok(argument)
    }

    /// Decodes an unsigned integer.
    pub fn decode_uint(&mut self) -> Result<u64, DecodeError> {
        self.expect_major(MAJOR_UINT, "unsigned integer")
    }

    /// Decodes a signed integer.
    pub fn decode_int(&mut self) -> Result<i64, DecodeError> {
        let (major, argument) = self.read_head()?;
        match major {
            MAJOR_UINT => i64::try_from(argument).map_err(|_| DecodeError::IntegerOutOfRange),
            MAJOR_NEGATIVE => {
                if argument > i64::MAX as u64 {
                    return Err(DecodeError::IntegerOutOfRange);
                }
                Ok(-1 - argument as i64)
            }
            _ => Err(DecodeError::UnexpectedType { expected: "integer" }),
        }
    }

    /// Decodes a byte string.
    pub fn decode_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.expect_major(MAJOR_BYTES, "byte string")?;
        self.read_slice(len as usize)
    }

    /// Decodes a UTF-8 text string.
    pub fn decode_text(&mut self) -> Result<&'a str, DecodeError> {
        let len = self.expect_major(MAJOR_TEXT, "text string")?;
        let bytes = self.read_slice(len as usize)?;
        std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)
    }

    /// Decodes an array header, returning the item count.
    pub fn decode_array_header(&mut self) -> Result<u64, DecodeError> {
        self.expect_major(MAJOR_ARRAY, "array")
    }

    /// Decodes an array header, failing unless it holds exactly `expected` items.
    pub fn decode_fixed_array_header(&mut self, expected: u64) -> Result<(), DecodeError> {
        let len = self.decode_array_header()?;
        if len != expected {
            return Err(DecodeError::Malformed("unexpected array length"));
        }
        Ok(())
    }

    /// Decodes a map header, returning the entry count.
    pub fn decode_map_header(&mut self) -> Result<u64, DecodeError> {
        self.expect_major(MAJOR_MAP, "map")
    }

    /// Decodes a tag.
    pub fn decode_tag(&mut self) -> Result<u64, DecodeError> {
        self.expect_major(MAJOR_TAG, "tag")
    }

    /// Decodes a boolean.
    pub fn decode_bool(&mut self) -> Result<bool, DecodeError> {
        match self.read_byte()? {
            HEAD_FALSE => Ok(false),
            HEAD_TRUE => Ok(true),
            _ => Err(DecodeError::UnexpectedType { expected: "boolean" }),
        }
    }

    /// Decodes a null item.
    pub fn decode_null(&mut self) -> Result<(), DecodeError> {
        match self.read_byte()? {
            HEAD_NULL => Ok(()),
            _ => Err(DecodeError::UnexpectedType { expected: "null" }),
        }
    }

    /// Returns true if the next item is null, without consuming it.
    pub fn peek_null(&self) -> Result<bool, DecodeError> {
        Ok(self.peek_head()? == HEAD_NULL)
    }
}

#[cfg(test)]
mod tests {
    use super::super::encoder::CanonicalEncoder;
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_roundtrip_integers() {
        for value in [0i64, 1, 23, 24, -1, -24, -25, 255, 256, i64::MAX, i64::MIN] {
            let mut enc = CanonicalEncoder::new();
            enc.encode_int(value);
            let mut dec = CanonicalDecoder::new(enc.as_bytes());
            assert_eq!(dec.decode_int().unwrap(), value);
            assert!(dec.is_at_end());
        }
    }

    #[test]
    fn test_rejects_oversized_arguments() {
        // 23 encoded with a one-byte argument
        let mut dec = CanonicalDecoder::new(&hex!("1817"));
        assert_eq!(
            dec.decode_uint(),
            Err(DecodeError::NonCanonical("oversized integer argument"))
        );

        // 255 encoded with a two-byte argument
        let mut dec = CanonicalDecoder::new(&hex!("1900ff"));
        assert_eq!(
            dec.decode_uint(),
            Err(DecodeError::NonCanonical("oversized integer argument"))
        );
    }

    #[test]
    fn test_rejects_indefinite_lengths() {
        let mut dec = CanonicalDecoder::new(&hex!("9f"));
        assert_eq!(
            dec.decode_array_header(),
            Err(DecodeError::Malformed("reserved or indefinite length"))
        );
    }

    #[test]
    fn test_rejects_truncated_input() {
        let mut dec = CanonicalDecoder::new(&hex!("6261"));
        assert_eq!(dec.decode_text(), Err(DecodeError::UnexpectedEnd));
    }

    #[test]
    fn test_rejects_invalid_utf8() {
        let mut dec = CanonicalDecoder::new(&hex!("62fffe"));
        assert_eq!(dec.decode_text(), Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn test_trailing_bytes_detected() {
        let mut dec = CanonicalDecoder::new(&hex!("0000"));
        dec.decode_uint().unwrap();
        assert_eq!(dec.expect_end(), Err(DecodeError::TrailingBytes));
    }

    #[test]
    fn test_consumed_since_tracks_spans() {
        let mut enc = CanonicalEncoder::new();
        enc.encode_text("key");
        enc.encode_uint(7);
        let bytes = enc.into_bytes();

        let mut dec = CanonicalDecoder::new(&bytes);
        let start = dec.position();
        dec.decode_text().unwrap();
        assert_eq!(dec.consumed_since(start), &bytes[..4]);
    }
}
