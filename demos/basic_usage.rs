//! Basic usage example for account_store
//!
//! This example demonstrates the core API: buffered writes, read-through
//! caching, and a deterministic commit.

use account_store::ledger::{Address, InMemoryLedger};
use account_store::value::Value;
use account_store::Storage;

fn main() {
    println!("=== account_store Basic Usage ===\n");

    // 1. Open a storage engine over an in-memory ledger
    let mut storage = Storage::new(InMemoryLedger::new());
    let alice = Address::repeat_byte(0x01);
    let bob = Address::repeat_byte(0x02);
    println!("Created storage for a fresh transaction");

    // 2. Buffer some writes; nothing touches the ledger yet
    storage
        .write_value(alice, "greeting", Some(Value::String("hello".into())))
        .unwrap();
    storage
        .write_value(alice, "count", Some(Value::Int(42)))
        .unwrap();
    storage
        .write_value(bob, "count", Some(Value::Int(7)))
        .unwrap();
    println!(
        "Buffered 3 writes, ledger writes so far: {}",
        storage.ledger().writes().len()
    );

    // 3. Reads see the buffered values
    let greeting = storage.read_value(alice, "greeting").unwrap();
    println!("Read back: {greeting:?}");

    // 4. Commit drains the buffer in (address, key) order
    storage.commit().unwrap();
    println!("\nCommitted. Ledger write order:");
    for write in storage.ledger().writes() {
        println!(
            "  {} / {:?} ({} bytes)",
            write.address,
            String::from_utf8_lossy(&write.key),
            write.value.len()
        );
    }

    // 5. A fresh storage over the same ledger reads it all back
    let mut fresh = Storage::new(storage.into_ledger());
    println!("\nFresh storage sees:");
    println!("  alice/greeting = {:?}", fresh.read_value(alice, "greeting").unwrap());
    println!("  alice/count    = {:?}", fresh.read_value(alice, "count").unwrap());
    println!("  bob/count      = {:?}", fresh.read_value(bob, "count").unwrap());

    // 6. Deletion writes empty bytes
    fresh.write_value(alice, "greeting", None).unwrap();
    fresh.commit().unwrap();
    let mut last = Storage::new(fresh.into_ledger());
    println!(
        "\nAfter deletion, alice/greeting exists: {}",
        last.value_exists(alice, "greeting").unwrap()
    );
}
