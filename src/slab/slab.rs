//! Slab representation and encoding.
//!
//! A slab is a variable-size unit of on-disk value state. Data slabs hold
//! an inline-encoded run of storable elements plus an optional next-slab
//! pointer for overflow chains; metadata slabs hold ordered child
//! references with cumulative element counts, forming the trees backing
//! large arrays and maps.
//!
//! Encoded layout: `[version byte][flags byte][body]`. The flags byte
//! carries the slab class in bit 0 (0 = data, 1 = meta) and the content
//! kind in bits 1-2 (0 = array, 1 = map, 2 = single).

use crate::codec::{
    CanonicalDecoder, CanonicalEncoder, CodecConfig, DecodeError, Storable, TAG_SLAB_ID,
};

use super::StorageId;

const FLAG_CLASS_META: u8 = 0b0000_0001;
const KIND_SHIFT: u8 = 1;
const KIND_MASK: u8 = 0b0000_0110;

/// What a slab tree stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectionKind {
    /// An ordered run of elements.
    Array,
    /// Key/value entries, flattened as `k0, v0, k1, v1, ...` in canonical
    /// key order.
    Map,
    /// A single oversize storable promoted out of its parent.
    Single,
}

impl CollectionKind {
    /// Number of storables forming one logical element.
    pub fn unit(self) -> usize {
        match self {
            CollectionKind::Map => 2,
            CollectionKind::Array | CollectionKind::Single => 1,
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            CollectionKind::Array => 0,
            CollectionKind::Map => 1,
            CollectionKind::Single => 2,
        }
    }

    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(CollectionKind::Array),
            1 => Some(CollectionKind::Map),
            2 => Some(CollectionKind::Single),
            _ => None,
        }
    }
}

/// A slab holding encoded elements.
#[derive(Clone, Debug, PartialEq)]
pub struct DataSlab {
    pub kind: CollectionKind,
    pub elements: Vec<Storable>,
    /// The next data slab in the overflow chain.
    pub next: Option<StorageId>,
}

impl DataSlab {
    /// Returns the number of logical elements held by this slab.
    pub fn count(&self) -> u64 {
        (self.elements.len() / self.kind.unit()) as u64
    }
}

/// A child reference inside a metadata slab.
///
/// `cumulative` is the total logical element count of this child's subtree
/// plus every preceding sibling subtree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChildRef {
    pub id: StorageId,
    pub cumulative: u64,
}

/// A slab holding ordered references to child slabs.
#[derive(Clone, Debug, PartialEq)]
pub struct MetaSlab {
    pub kind: CollectionKind,
    pub children: Vec<ChildRef>,
}

impl MetaSlab {
    /// Returns the total logical element count of the subtree.
    pub fn count(&self) -> u64 {
        self.children.last().map_or(0, |child| child.cumulative)
    }

    /// Returns the logical element count of the child at `position`.
    pub fn child_count(&self, position: usize) -> u64 {
        let base = if position == 0 {
            0
        } else {
            self.children[position - 1].cumulative
        };
        self.children[position].cumulative - base
    }
}

/// A unit of on-disk value state, addressable by StorageId.
#[derive(Clone, Debug, PartialEq)]
pub enum Slab {
    Data(DataSlab),
    Meta(MetaSlab),
}

impl Slab {
    /// Returns the content kind of the slab.
    pub fn kind(&self) -> CollectionKind {
        match self {
            Slab::Data(data) => data.kind,
            Slab::Meta(meta) => meta.kind,
        }
    }

    /// Returns the logical element count of the slab's subtree.
    pub fn count(&self) -> u64 {
        match self {
            Slab::Data(data) => data.count(),
            Slab::Meta(meta) => meta.count(),
        }
    }

    /// Encodes the slab into its canonical ledger payload.
    pub fn encode(&self, config: &CodecConfig) -> Vec<u8> {
        let mut encoder = CanonicalEncoder::with_capacity(64);
        match self {
            Slab::Data(data) => {
                match data.next {
                    None => encoder.encode_null(),
                    Some(next) => {
                        encoder.encode_tag(TAG_SLAB_ID);
                        encoder.encode_bytes(&next.to_bytes());
                    }
                }
                encoder.encode_array_header(data.elements.len());
                for element in &data.elements {
                    element.encode(&mut encoder);
                }
            }
            Slab::Meta(meta) => {
                encoder.encode_array_header(meta.children.len());
                for child in &meta.children {
                    encoder.encode_array_header(2);
                    encoder.encode_tag(TAG_SLAB_ID);
                    encoder.encode_bytes(&child.id.to_bytes());
                    encoder.encode_uint(child.cumulative);
                }
            }
        }

        let flags = match self {
            Slab::Data(_) => self.kind().to_bits() << KIND_SHIFT,
            Slab::Meta(_) => FLAG_CLASS_META | (self.kind().to_bits() << KIND_SHIFT),
        };
        let mut out = Vec::with_capacity(2 + encoder.len());
        out.push(config.version);
        out.push(flags);
        out.extend_from_slice(encoder.as_bytes());
        out
    }

    /// Decodes a slab from its canonical ledger payload.
    pub fn decode(bytes: &[u8], config: &CodecConfig) -> Result<Slab, DecodeError> {
        if bytes.len() < 2 {
            return Err(DecodeError::UnexpectedEnd);
        }
        let version = bytes[0];
        if version != config.version {
            return Err(DecodeError::UnknownVersion(version));
        }
        let flags = bytes[1];
        if flags & !(FLAG_CLASS_META | KIND_MASK) != 0 {
            return Err(DecodeError::Malformed("unknown slab flags"));
        }
        let kind = CollectionKind::from_bits((flags & KIND_MASK) >> KIND_SHIFT)
            .ok_or(DecodeError::Malformed("unknown collection kind"))?;
        let is_meta = flags & FLAG_CLASS_META != 0;

        let mut decoder = CanonicalDecoder::new(&bytes[2..]);
        let slab = if is_meta {
            if kind == CollectionKind::Single {
                return Err(DecodeError::Malformed("single-value metadata slab"));
            }
            let len = decoder.decode_array_header()?;
            let mut children = Vec::with_capacity(len.min(1024) as usize);
            let mut previous = 0u64;
            for _ in 0..len {
                decoder.decode_fixed_array_header(2)?;
                let id = decode_slab_id(&mut decoder)?;
                let cumulative = decoder.decode_uint()?;
                if cumulative <= previous {
                    return Err(DecodeError::Malformed("non-increasing cumulative count"));
                }
                previous = cumulative;
                children.push(ChildRef { id, cumulative });
            }
            if children.is_empty() {
                return Err(DecodeError::Malformed("empty metadata slab"));
            }
            Slab::Meta(MetaSlab { kind, children })
        } else {
            let next = if decoder.peek_null()? {
                decoder.decode_null()?;
                None
            } else {
                Some(decode_slab_id(&mut decoder)?)
            };
            let len = decoder.decode_array_header()?;
            let mut elements = Vec::with_capacity(len.min(1024) as usize);
            for _ in 0..len {
                elements.push(Storable::decode(&mut decoder)?);
            }
            if elements.len() % kind.unit() != 0 {
                return Err(DecodeError::Malformed("partial map entry in slab"));
            }
            if kind == CollectionKind::Single && (elements.len() != 1 || next.is_some()) {
                return Err(DecodeError::Malformed("malformed single-value slab"));
            }
            Slab::Data(DataSlab {
                kind,
                elements,
                next,
            })
        };
        decoder.expect_end()?;
        Ok(slab)
    }
}

fn decode_slab_id(decoder: &mut CanonicalDecoder<'_>) -> Result<StorageId, DecodeError> {
    let tag = decoder.decode_tag()?;
    if tag != TAG_SLAB_ID {
        return Err(DecodeError::UnknownTag(tag));
    }
    let id = StorageId::from_slice(decoder.decode_bytes()?)
        .ok_or(DecodeError::Malformed("storage id must be 16 bytes"))?;
    if id.is_undefined() {
        return Err(DecodeError::Malformed("undefined storage id"));
    }
    Ok(id)
}
