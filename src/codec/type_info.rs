//! Composite type information.
//!
//! Composites (structs, resources, contracts) carry the location of their
//! declaring program and a qualified identifier, encoded per slab and
//! resolved at decode time to reconstruct the typed value.

use crate::ledger::Address;

use super::decoder::CanonicalDecoder;
use super::encoder::CanonicalEncoder;
use super::{
    DecodeError, TAG_LOCATION_ADDRESS, TAG_LOCATION_IDENTIFIER, TAG_LOCATION_STRING,
    TAG_LOCATION_TRANSACTION, TAG_TYPE_INFO,
};

/// Size of a transaction hash in bytes.
pub const TRANSACTION_HASH_SIZE: usize = 32;

/// The location of the program declaring a composite type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Location {
    /// A source string location.
    String(String),
    /// A named identifier location.
    Identifier(String),
    /// A program deployed under an account address.
    Address { address: Address, name: String },
    /// A program embedded in a transaction, identified by its hash.
    Transaction([u8; TRANSACTION_HASH_SIZE]),
}

/// Type information attached to a composite value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeInfo {
    pub location: Location,
    pub qualified_identifier: String,
}

impl TypeInfo {
    /// Creates type info for a program at `location`.
    pub fn new(location: Location, qualified_identifier: impl Into<String>) -> Self {
        TypeInfo {
            location,
            qualified_identifier: qualified_identifier.into(),
        }
    }

    pub(crate) fn encode(&self, encoder: &mut CanonicalEncoder) {
        encoder.encode_tag(TAG_TYPE_INFO);
        encoder.encode_array_header(2);
        self.location.encode(encoder);
        encoder.encode_text(&self.qualified_identifier);
    }

    pub(crate) fn decode(decoder: &mut CanonicalDecoder<'_>) -> Result<Self, DecodeError> {
        let tag = decoder.decode_tag()?;
        if tag != TAG_TYPE_INFO {
            return Err(DecodeError::UnknownTag(tag));
        }
        decoder.decode_fixed_array_header(2)?;
        let location = Location::decode(decoder)?;
        let qualified_identifier = decoder.decode_text()?.to_owned();
        Ok(TypeInfo {
            location,
            qualified_identifier,
        })
    }
}

impl Location {
    fn encode(&self, encoder: &mut CanonicalEncoder) {
        match self {
            Location::String(source) => {
                encoder.encode_tag(TAG_LOCATION_STRING);
                encoder.encode_text(source);
            }
            Location::Identifier(identifier) => {
                encoder.encode_tag(TAG_LOCATION_IDENTIFIER);
                encoder.encode_text(identifier);
            }
            Location::Address { address, name } => {
                encoder.encode_tag(TAG_LOCATION_ADDRESS);
                encoder.encode_array_header(2);
                encoder.encode_bytes(address.as_bytes());
                encoder.encode_text(name);
            }
            Location::Transaction(hash) => {
                encoder.encode_tag(TAG_LOCATION_TRANSACTION);
                encoder.encode_bytes(hash);
            }
        }
    }

    fn decode(decoder: &mut CanonicalDecoder<'_>) -> Result<Self, DecodeError> {
        let tag = decoder.decode_tag()?;
        match tag {
            TAG_LOCATION_STRING => Ok(Location::String(decoder.decode_text()?.to_owned())),
            TAG_LOCATION_IDENTIFIER => Ok(Location::Identifier(decoder.decode_text()?.to_owned())),
            TAG_LOCATION_ADDRESS => {
                decoder.decode_fixed_array_header(2)?;
                let address = Address::from_slice(decoder.decode_bytes()?)
                    .ok_or(DecodeError::Malformed("address must be 8 bytes"))?;
                let name = decoder.decode_text()?.to_owned();
                Ok(Location::Address { address, name })
            }
            TAG_LOCATION_TRANSACTION => {
                let hash: [u8; TRANSACTION_HASH_SIZE] = decoder
                    .decode_bytes()?
                    .try_into()
                    .map_err(|_| DecodeError::Malformed("transaction hash must be 32 bytes"))?;
                Ok(Location::Transaction(hash))
            }
            other => Err(DecodeError::UnknownTag(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(info: &TypeInfo) -> TypeInfo {
        let mut enc = CanonicalEncoder::new();
        info.encode(&mut enc);
        let bytes = enc.into_bytes();
        let mut dec = CanonicalDecoder::new(&bytes);
        let decoded = TypeInfo::decode(&mut dec).unwrap();
        assert!(dec.is_at_end());
        decoded
    }

    #[test]
    fn test_roundtrip_all_location_kinds() {
        let infos = [
            TypeInfo::new(Location::String("test:1".into()), "Vault"),
            TypeInfo::new(Location::Identifier("Crypto".into()), "Crypto.Hash"),
            TypeInfo::new(
                Location::Address {
                    address: Address::repeat_byte(0x42),
                    name: "Token".into(),
                },
                "Token.Vault",
            ),
            TypeInfo::new(Location::Transaction([0xab; 32]), "Deposit"),
        ];
        for info in &infos {
            assert_eq!(&roundtrip(info), info);
        }
    }

    #[test]
    fn test_rejects_short_address() {
        let mut enc = CanonicalEncoder::new();
        enc.encode_tag(TAG_TYPE_INFO);
        enc.encode_array_header(2);
        enc.encode_tag(TAG_LOCATION_ADDRESS);
        enc.encode_array_header(2);
        enc.encode_bytes(&[1, 2, 3]);
        enc.encode_text("Broken");
        enc.encode_text("Broken.T");
        let bytes = enc.into_bytes();

        let mut dec = CanonicalDecoder::new(&bytes);
        assert_eq!(
            TypeInfo::decode(&mut dec),
            Err(DecodeError::Malformed("address must be 8 bytes"))
        );
    }
}
