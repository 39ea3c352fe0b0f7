//! End-to-end tests for the account storage engine.

use std::rc::Rc;

use account_store::codec::{encode_account_value, CodecConfig, Storable};
use account_store::ledger::{Address, InMemoryLedger, Ledger};
use account_store::meter::{MemoryKind, Meter, Metrics, RecordingGauge};
use account_store::value::Value;
use account_store::Storage;

fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

#[test]
fn test_inline_integer_round_trip() {
    let mut storage = Storage::new(InMemoryLedger::new());
    storage
        .write_value(addr(0x01), "x", Some(Value::Int(42)))
        .unwrap();
    storage.commit().unwrap();

    // Exactly one non-empty write reached the ledger.
    let ledger = storage.into_ledger();
    assert_eq!(ledger.writes().len(), 1);
    let write = &ledger.writes()[0];
    assert_eq!(write.address, addr(0x01));
    assert_eq!(write.key, b"x".to_vec());
    assert!(!write.value.is_empty());

    let mut fresh = Storage::new(ledger);
    assert_eq!(
        fresh.read_value(addr(0x01), "x").unwrap(),
        Some(Value::Int(42))
    );
}

#[test]
fn test_deletion() {
    let mut ledger = InMemoryLedger::new();
    ledger.seed(
        addr(0x0a),
        b"k",
        &encode_account_value(
            &Storable::String("hello".into()),
            &CodecConfig::default(),
        ),
    );

    let mut storage = Storage::new(ledger);
    assert_eq!(
        storage.read_value(addr(0x0a), "k").unwrap(),
        Some(Value::String("hello".into()))
    );

    storage.write_value(addr(0x0a), "k", None).unwrap();
    storage.commit().unwrap();

    let ledger = storage.into_ledger();
    assert_eq!(ledger.writes().len(), 1);
    assert_eq!(ledger.writes()[0].value, Vec::<u8>::new());

    let mut fresh = Storage::new(ledger);
    assert!(!fresh.value_exists(addr(0x0a), "k").unwrap());
}

#[test]
fn test_deterministic_write_ordering() {
    let mut storage = Storage::new(InMemoryLedger::new());
    storage
        .write_value(addr(0x0a), "y", Some(Value::Int(1)))
        .unwrap();
    storage
        .write_value(addr(0x0b), "x", Some(Value::Int(2)))
        .unwrap();
    storage
        .write_value(addr(0x0a), "x", Some(Value::Int(3)))
        .unwrap();
    storage.commit().unwrap();

    let order: Vec<(Address, Vec<u8>)> = storage
        .ledger()
        .writes()
        .iter()
        .map(|write| (write.address, write.key.clone()))
        .collect();
    assert_eq!(
        order,
        vec![
            (addr(0x0a), b"x".to_vec()),
            (addr(0x0a), b"y".to_vec()),
            (addr(0x0b), b"x".to_vec()),
        ]
    );
}

fn large_dictionary() -> Value {
    Value::Dictionary((0..10_000i64).map(|i| (Value::Int(i), Value::Int(i * 2))).collect())
}

#[test]
fn test_large_map_promotion() {
    let config = CodecConfig::default();
    let mut storage = Storage::new(InMemoryLedger::new());
    storage
        .write_value(addr(0x01), "map", Some(large_dictionary()))
        .unwrap();
    storage.commit().unwrap();

    let ledger = storage.into_ledger();

    // The account entry itself stays small; the data lives in slabs.
    let account_entry = ledger.get_value(addr(0x01), b"map").unwrap();
    assert!(account_entry.len() < config.max_inline_element_size);
    assert!(ledger.slab_entries().len() >= 2);

    // The whole dictionary reads back through the slab tree.
    let mut fresh = Storage::new(ledger);
    assert_eq!(
        fresh.read_value(addr(0x01), "map").unwrap(),
        Some(large_dictionary())
    );
}

#[test]
fn test_large_map_replay_is_byte_identical() {
    let run = || {
        let mut storage = Storage::new(InMemoryLedger::new());
        storage
            .write_value(addr(0x01), "map", Some(large_dictionary()))
            .unwrap();
        storage.commit().unwrap();
        storage.into_ledger()
    };

    let first = run();
    let second = run();
    assert_eq!(first.writes(), second.writes());
}

#[test]
fn test_read_through_cache() {
    let mut ledger = InMemoryLedger::new();
    ledger.seed(
        addr(0x01),
        b"k",
        &encode_account_value(&Storable::Int(9), &CodecConfig::default()),
    );

    let mut storage = Storage::new(ledger);

    assert_eq!(storage.read_value(addr(0x01), "k").unwrap(), Some(Value::Int(9)));
    assert_eq!(storage.ledger().get_calls(), 1);

    // Cached: no further ledger traffic.
    assert_eq!(storage.read_value(addr(0x01), "k").unwrap(), Some(Value::Int(9)));
    assert_eq!(storage.ledger().get_calls(), 1);

    // The delta shadows the cache, still without ledger traffic.
    storage
        .write_value(addr(0x01), "k", Some(Value::Int(10)))
        .unwrap();
    assert_eq!(
        storage.read_value(addr(0x01), "k").unwrap(),
        Some(Value::Int(10))
    );
    assert_eq!(storage.ledger().get_calls(), 1);

    storage.commit().unwrap();
    assert_eq!(storage.ledger().writes().len(), 1);
}

#[test]
fn test_memory_metering() {
    let gauge = Rc::new(RecordingGauge::new());
    let storage = Storage::with_config(
        InMemoryLedger::new(),
        CodecConfig::default(),
        Meter::new(gauge.clone()),
        Metrics::disabled(),
    );

    let meter = storage.meter();
    let element = Value::new_string(meter, "hello");
    let _array = Value::new_array(meter, vec![element]);
    let _composite = Value::new_composite(
        meter,
        account_store::codec::TypeInfo::new(
            account_store::codec::Location::Identifier("Test".into()),
            "Test.S",
        ),
        vec![],
    );

    assert_eq!(gauge.total(MemoryKind::Array), 1);
    assert_eq!(gauge.total(MemoryKind::String), 5);
    assert_eq!(gauge.total(MemoryKind::Composite), 1);
}

#[test]
fn test_deleting_large_value_removes_its_slabs() {
    let mut storage = Storage::new(InMemoryLedger::new());
    storage
        .write_value(addr(0x01), "map", Some(large_dictionary()))
        .unwrap();
    storage.commit().unwrap();

    let ledger = storage.into_ledger();
    assert!(!ledger.slab_entries().is_empty());

    let mut fresh = Storage::new(ledger);
    fresh.write_value(addr(0x01), "map", None).unwrap();
    fresh.commit().unwrap();

    let ledger = fresh.into_ledger();
    assert!(ledger.slab_entries().is_empty());
    assert!(ledger.is_empty());
}

#[test]
fn test_last_write_wins_within_transaction() {
    let mut storage = Storage::new(InMemoryLedger::new());
    storage
        .write_value(addr(0x01), "k", Some(Value::Int(1)))
        .unwrap();
    storage
        .write_value(addr(0x01), "k", Some(Value::Int(2)))
        .unwrap();
    storage.write_value(addr(0x01), "k", None).unwrap();
    storage
        .write_value(addr(0x01), "k", Some(Value::Int(3)))
        .unwrap();
    storage.commit().unwrap();

    assert_eq!(storage.ledger().writes().len(), 1);
    let mut fresh = Storage::new(storage.into_ledger());
    assert_eq!(fresh.read_value(addr(0x01), "k").unwrap(), Some(Value::Int(3)));
}

#[test]
fn test_nested_values_persist() {
    use account_store::codec::{Location, TypeInfo};

    let vault = Value::Composite(Box::new(account_store::value::Composite {
        type_info: TypeInfo::new(
            Location::Address {
                address: addr(0x01),
                name: "Token".into(),
            },
            "Token.Vault",
        ),
        fields: vec![
            ("balance".into(), Value::Int(1_000)),
            (
                "history".into(),
                Value::Array(vec![Value::Int(-5), Value::Int(20)]),
            ),
        ],
    }));

    let mut storage = Storage::new(InMemoryLedger::new());
    storage
        .write_value(addr(0x01), "vault", Some(vault.clone()))
        .unwrap();
    storage.commit().unwrap();

    let mut fresh = Storage::new(storage.into_ledger());
    assert_eq!(fresh.read_value(addr(0x01), "vault").unwrap(), Some(vault));
}
