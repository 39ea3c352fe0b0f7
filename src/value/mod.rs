//! Interpreter-facing values and their storable conversions.
//!
//! Values are the in-memory form the interpreter works with. Conversion
//! to storable form routes each piece through the inline threshold: small
//! values embed in their parent, oversize collections move to slab trees,
//! and any other oversize storable moves to a single-value slab. Every
//! constructor reports the allocation to the memory gauge.

use crate::codec::{
    canonical_key_order, encode_storable, BigInt, CompositeStorable, Storable, StorageReference,
    TypeInfo,
};
use crate::error::Result;
use crate::ledger::{Address, Ledger};
use crate::meter::{MemoryKind, Meter};
use crate::slab::{CollectionKind, SlabStore};

/// An interpreter value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    BigInt(BigInt),
    String(String),
    Address(Address),
    Array(Vec<Value>),
    Dictionary(Vec<(Value, Value)>),
    Composite(Box<Composite>),
    StorageReference(StorageReference),
}

/// A composite value: typed, named fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Composite {
    pub type_info: TypeInfo,
    pub fields: Vec<(String, Value)>,
}

impl Value {
    /// Creates a boolean, reporting the allocation.
    pub fn new_bool(meter: &Meter, value: bool) -> Value {
        meter.use_memory(MemoryKind::Bool, 1);
        Value::Bool(value)
    }

    /// Creates an integer, reporting the allocation.
    pub fn new_int(meter: &Meter, value: i64) -> Value {
        meter.use_memory(MemoryKind::Number, 1);
        Value::Int(value)
    }

    /// Creates a big integer, reporting its magnitude length.
    ///
    /// Values fitting the basic integer range normalize to `Value::Int`.
    pub fn new_big_int(meter: &Meter, value: BigInt) -> Value {
        if let Some(small) = value.to_i64() {
            return Self::new_int(meter, small);
        }
        meter.use_memory(MemoryKind::BigInteger, value.magnitude.len() as u64);
        Value::BigInt(value)
    }

    /// Creates a string, reporting its length.
    pub fn new_string(meter: &Meter, value: impl Into<String>) -> Value {
        let value = value.into();
        meter.use_memory(MemoryKind::String, value.len() as u64);
        Value::String(value)
    }

    /// Creates an address, reporting the allocation.
    pub fn new_address(meter: &Meter, address: Address) -> Value {
        meter.use_memory(MemoryKind::Address, 1);
        Value::Address(address)
    }

    /// Creates an array, reporting the allocation.
    pub fn new_array(meter: &Meter, elements: Vec<Value>) -> Value {
        meter.use_memory(MemoryKind::Array, 1);
        Value::Array(elements)
    }

    /// Creates a dictionary, reporting the allocation.
    pub fn new_dictionary(meter: &Meter, entries: Vec<(Value, Value)>) -> Value {
        meter.use_memory(MemoryKind::Dictionary, 1);
        Value::Dictionary(entries)
    }

    /// Creates a composite, reporting the allocation.
    pub fn new_composite(meter: &Meter, type_info: TypeInfo, fields: Vec<(String, Value)>) -> Value {
        meter.use_memory(MemoryKind::Composite, 1);
        Value::Composite(Box::new(Composite { type_info, fields }))
    }

    /// Creates a storage reference, reporting the allocation.
    pub fn new_storage_reference(meter: &Meter, address: Address, key: impl Into<String>) -> Value {
        meter.use_memory(MemoryKind::StorageReference, 1);
        Value::StorageReference(StorageReference {
            address,
            key: key.into(),
        })
    }

    /// Converts the value to its storable form under `owner`.
    ///
    /// Oversize pieces are promoted to slabs owned by `owner`; the caller
    /// receives the inline remainder (possibly just a root reference).
    pub fn to_storable<L: Ledger>(
        &self,
        slabs: &mut SlabStore,
        ledger: &mut L,
        owner: Address,
    ) -> Result<Storable> {
        let storable = self.to_storable_shallow(slabs, ledger, owner)?;
        promote_if_oversize(storable, slabs, ledger, owner)
    }

    fn to_storable_shallow<L: Ledger>(
        &self,
        slabs: &mut SlabStore,
        ledger: &mut L,
        owner: Address,
    ) -> Result<Storable> {
        match self {
            Value::Bool(value) => Ok(Storable::Bool(*value)),
            Value::Int(value) => Ok(Storable::Int(*value)),
            Value::BigInt(value) => Ok(match value.to_i64() {
                Some(small) => Storable::Int(small),
                None => Storable::BigInt(value.clone()),
            }),
            Value::String(value) => Ok(Storable::String(value.clone())),
            Value::Address(address) => Ok(Storable::Address(*address)),
            Value::StorageReference(reference) => {
                Ok(Storable::StorageReference(reference.clone()))
            }
            Value::Array(elements) => {
                let storables = elements
                    .iter()
                    .map(|element| element.to_storable(slabs, ledger, owner))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Storable::Array(storables))
            }
            Value::Dictionary(entries) => {
                let mut pairs = entries
                    .iter()
                    .map(|(key, value)| {
                        Ok((
                            key.to_storable(slabs, ledger, owner)?,
                            value.to_storable(slabs, ledger, owner)?,
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;
                pairs.sort_by(|a, b| {
                    canonical_key_order(&encode_storable(&a.0), &encode_storable(&b.0))
                });
                Ok(Storable::Map(pairs))
            }
            Value::Composite(composite) => {
                let fields = composite
                    .fields
                    .iter()
                    .map(|(name, value)| {
                        Ok((name.clone(), value.to_storable(slabs, ledger, owner)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Storable::Composite(Box::new(CompositeStorable {
                    type_info: composite.type_info.clone(),
                    fields,
                })))
            }
        }
    }

    /// Reconstructs a value from its storable form, loading slab-backed
    /// collections through the store and reporting every allocation.
    pub fn from_storable<L: Ledger>(
        storable: Storable,
        slabs: &mut SlabStore,
        ledger: &mut L,
        meter: &Meter,
    ) -> Result<Value> {
        match storable {
            Storable::Bool(value) => Ok(Value::new_bool(meter, value)),
            Storable::Int(value) => Ok(Value::new_int(meter, value)),
            Storable::BigInt(value) => Ok(Value::new_big_int(meter, value)),
            Storable::String(value) => Ok(Value::new_string(meter, value)),
            Storable::Address(address) => Ok(Value::new_address(meter, address)),
            Storable::StorageReference(reference) => Ok(Value::new_storage_reference(
                meter,
                reference.address,
                reference.key,
            )),
            Storable::Array(elements) => {
                let values = elements
                    .into_iter()
                    .map(|element| Self::from_storable(element, slabs, ledger, meter))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::new_array(meter, values))
            }
            Storable::Map(entries) => {
                let values = entries
                    .into_iter()
                    .map(|(key, value)| {
                        Ok((
                            Self::from_storable(key, slabs, ledger, meter)?,
                            Self::from_storable(value, slabs, ledger, meter)?,
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::new_dictionary(meter, values))
            }
            Storable::Composite(composite) => {
                let CompositeStorable { type_info, fields } = *composite;
                let fields = fields
                    .into_iter()
                    .map(|(name, value)| {
                        Ok((name, Self::from_storable(value, slabs, ledger, meter)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::new_composite(meter, type_info, fields))
            }
            Storable::ArrayRoot(id) => {
                let elements = slabs.materialize(ledger, id)?;
                let values = elements
                    .into_iter()
                    .map(|element| Self::from_storable(element, slabs, ledger, meter))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::new_array(meter, values))
            }
            Storable::MapRoot(id) => {
                let elements = slabs.materialize(ledger, id)?;
                let mut entries = Vec::with_capacity(elements.len() / 2);
                let mut iter = elements.into_iter();
                while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
                    entries.push((
                        Self::from_storable(key, slabs, ledger, meter)?,
                        Self::from_storable(value, slabs, ledger, meter)?,
                    ));
                }
                Ok(Value::new_dictionary(meter, entries))
            }
            Storable::SlabId(id) => {
                let inner = slabs.stored_single(ledger, id)?;
                Self::from_storable(inner, slabs, ledger, meter)
            }
        }
    }
}

/// Moves an oversize storable out of line, replacing it with a reference.
fn promote_if_oversize<L: Ledger>(
    storable: Storable,
    slabs: &mut SlabStore,
    ledger: &mut L,
    owner: Address,
) -> Result<Storable> {
    if storable.encoded_size() <= slabs.config().max_inline_element_size {
        return Ok(storable);
    }
    match storable {
        Storable::Array(elements) => {
            let root = slabs.store_collection(ledger, owner, CollectionKind::Array, elements)?;
            Ok(Storable::ArrayRoot(root))
        }
        Storable::Map(entries) => {
            let elements: Vec<Storable> = entries
                .into_iter()
                .flat_map(|(key, value)| [key, value])
                .collect();
            let root = slabs.store_collection(ledger, owner, CollectionKind::Map, elements)?;
            Ok(Storable::MapRoot(root))
        }
        other => {
            let id = slabs.store_single(ledger, owner, other)?;
            Ok(Storable::SlabId(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::codec::CodecConfig;
    use crate::ledger::InMemoryLedger;
    use crate::meter::RecordingGauge;

    fn fixture() -> (SlabStore, InMemoryLedger, Meter) {
        (
            SlabStore::new(CodecConfig::default()),
            InMemoryLedger::new(),
            Meter::disabled(),
        )
    }

    fn owner() -> Address {
        Address::repeat_byte(0x01)
    }

    fn roundtrip(value: &Value) -> Value {
        let (mut slabs, mut ledger, meter) = fixture();
        let storable = value.to_storable(&mut slabs, &mut ledger, owner()).unwrap();
        Value::from_storable(storable, &mut slabs, &mut ledger, &meter).unwrap()
    }

    #[test]
    fn test_small_values_stay_inline() {
        let (mut slabs, mut ledger, _) = fixture();
        let value = Value::Array(vec![Value::Int(1), Value::String("two".into())]);
        let storable = value.to_storable(&mut slabs, &mut ledger, owner()).unwrap();

        assert!(matches!(storable, Storable::Array(_)));
        assert_eq!(slabs.dirty_count(), 0);
    }

    #[test]
    fn test_oversize_array_promotes_to_slabs() {
        let (mut slabs, mut ledger, meter) = fixture();
        let value = Value::Array((0..500).map(Value::Int).collect());
        let storable = value.to_storable(&mut slabs, &mut ledger, owner()).unwrap();

        let Storable::ArrayRoot(root) = storable else {
            panic!("expected array root, got {storable:?}");
        };
        assert!(slabs.dirty_count() >= 2);

        let restored =
            Value::from_storable(Storable::ArrayRoot(root), &mut slabs, &mut ledger, &meter)
                .unwrap();
        assert_eq!(restored, value);
    }

    #[test]
    fn test_oversize_string_promotes_to_single_slab() {
        let (mut slabs, mut ledger, meter) = fixture();
        let value = Value::String("x".repeat(600));
        let storable = value.to_storable(&mut slabs, &mut ledger, owner()).unwrap();

        let Storable::SlabId(id) = storable else {
            panic!("expected slab id, got {storable:?}");
        };
        assert_eq!(slabs.dirty_count(), 1);

        let restored =
            Value::from_storable(Storable::SlabId(id), &mut slabs, &mut ledger, &meter).unwrap();
        assert_eq!(restored, value);
    }

    #[test]
    fn test_dictionary_sorts_entries_canonically() {
        let (mut slabs, mut ledger, _) = fixture();
        let forward = Value::Dictionary(vec![
            (Value::Int(1), Value::String("one".into())),
            (Value::Int(2), Value::String("two".into())),
        ]);
        let reversed = Value::Dictionary(vec![
            (Value::Int(2), Value::String("two".into())),
            (Value::Int(1), Value::String("one".into())),
        ]);

        let a = forward.to_storable(&mut slabs, &mut ledger, owner()).unwrap();
        let b = reversed
            .to_storable(&mut slabs, &mut ledger, owner())
            .unwrap();
        assert_eq!(encode_storable(&a), encode_storable(&b));
    }

    #[test]
    fn test_roundtrip_preserves_values() {
        use crate::codec::Location;

        let values = [
            Value::Bool(true),
            Value::Int(-42),
            Value::String("hello".into()),
            Value::Address(Address::repeat_byte(0x0f)),
            Value::Array(vec![Value::Int(1), Value::Array(vec![Value::Bool(false)])]),
            Value::Composite(Box::new(Composite {
                type_info: TypeInfo::new(Location::Identifier("Test".into()), "Test.S"),
                fields: vec![("a".into(), Value::Int(1)), ("b".into(), Value::Int(2))],
            })),
            Value::StorageReference(StorageReference {
                address: Address::repeat_byte(0x02),
                key: "stored".into(),
            }),
        ];
        for value in &values {
            assert_eq!(&roundtrip(value), value);
        }
    }

    #[test]
    fn test_big_int_normalizes_to_int() {
        let meter = Meter::disabled();
        let small = Value::new_big_int(&meter, BigInt::from_i64(42));
        assert_eq!(small, Value::Int(42));

        let big = BigInt::from_magnitude(false, vec![1; 9]);
        let value = Value::new_big_int(&meter, big.clone());
        assert_eq!(value, Value::BigInt(big));
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn test_constructors_report_memory() {
        let gauge = Rc::new(RecordingGauge::new());
        let meter = Meter::new(gauge.clone());

        Value::new_array(&meter, vec![]);
        Value::new_string(&meter, "hello");
        Value::new_composite(
            &meter,
            TypeInfo::new(crate::codec::Location::Identifier("T".into()), "T.S"),
            vec![],
        );

        assert_eq!(gauge.total(MemoryKind::Array), 1);
        assert_eq!(gauge.total(MemoryKind::String), 5);
        assert_eq!(gauge.total(MemoryKind::Composite), 1);
    }

    #[test]
    fn test_decode_reports_memory() {
        let (mut slabs, mut ledger, _) = fixture();
        let value = Value::Array(vec![Value::String("abc".into()), Value::Int(7)]);
        let storable = value.to_storable(&mut slabs, &mut ledger, owner()).unwrap();

        let gauge = Rc::new(RecordingGauge::new());
        let meter = Meter::new(gauge.clone());
        Value::from_storable(storable, &mut slabs, &mut ledger, &meter).unwrap();

        assert_eq!(gauge.total(MemoryKind::Array), 1);
        assert_eq!(gauge.total(MemoryKind::String), 3);
        assert_eq!(gauge.total(MemoryKind::Number), 1);
    }
}
