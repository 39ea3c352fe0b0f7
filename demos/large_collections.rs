//! Slab storage example for account_store
//!
//! Shows how an oversize dictionary splits into slabs on commit and how a
//! fresh storage loads only the slabs it needs.

use account_store::codec::{CodecConfig, Storable};
use account_store::ledger::{Address, InMemoryLedger, Ledger};
use account_store::slab::SlabStore;
use account_store::value::Value;
use account_store::Storage;

fn main() {
    println!("=== account_store Large Collections ===\n");

    let owner = Address::repeat_byte(0x01);
    let mut storage = Storage::new(InMemoryLedger::new());

    // A dictionary far over the inline threshold
    let entries = 10_000i64;
    let dictionary =
        Value::Dictionary((0..entries).map(|i| (Value::Int(i), Value::Int(i * 2))).collect());
    storage.write_value(owner, "map", Some(dictionary)).unwrap();
    storage.commit().unwrap();

    let ledger = storage.into_ledger();
    let account_entry = ledger.get_value(owner, b"map").unwrap();
    println!("{entries} entries committed");
    println!("Account entry size: {} bytes (stays inline)", account_entry.len());
    println!("Slab count: {}", ledger.slab_entries().len());

    // Load a single element without materializing the collection
    let config = CodecConfig::default();
    let root = match account_store::codec::decode_account_value(&account_entry, &config).unwrap() {
        Storable::MapRoot(root) => root,
        other => panic!("expected a map root, got {other:?}"),
    };

    let mut slabs = SlabStore::new(config);
    let mut ledger = ledger;
    let value = slabs
        .lookup(&mut ledger, root, &Storable::Int(1234))
        .unwrap();
    println!("\nLookup of key 1234: {value:?}");
    println!(
        "Slabs loaded for the lookup: {} of {}",
        slabs.resident_count(),
        ledger.slab_entries().len()
    );
}
