//! Ledger interface - the external byte-level key/value store.
//!
//! The ledger is a black box owned by the host. The engine only assumes
//! four operations: existence check, get, set, and monotonic storage index
//! allocation per address. An empty byte payload is equivalent to absence;
//! there is no separate deletion operation.
//!
//! Two kinds of entries share the ledger's key space:
//!
//! - **Account values**: key = user-supplied key string.
//! - **Slabs**: key = `[LEDGER_KEY_VERSION, b'$', index: 8 bytes BE]`.
//!
//! Account keys beginning with the non-printable `LEDGER_KEY_VERSION` byte
//! are rejected at the storage API boundary, so the two key spaces cannot
//! collide.

mod address;
mod memory;

pub use address::Address;
pub use memory::{InMemoryLedger, WriteRecord};

use thiserror::Error;

/// Version byte prefixing every slab ledger key.
pub const LEDGER_KEY_VERSION: u8 = 1;

/// Marker byte identifying a slab ledger key.
pub const SLAB_KEY_MARKER: u8 = b'$';

/// Length of a slab ledger key: version + marker + 8-byte index.
pub const SLAB_KEY_LENGTH: usize = 10;

/// An opaque error reported by the ledger host.
///
/// The engine never interprets it; it is surfaced upward unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("ledger error: {0}")]
pub struct LedgerError(pub String);

impl LedgerError {
    /// Creates a ledger error with the given host message.
    pub fn new(message: impl Into<String>) -> Self {
        LedgerError(message.into())
    }
}

/// The external byte-level key/value store.
///
/// All operations may fail with an opaque host error. Idempotence is not
/// assumed; the engine calls `set_value` at most once per key per commit.
pub trait Ledger {
    /// Returns true if a value exists under `(address, key)`.
    fn value_exists(&self, address: Address, key: &[u8]) -> Result<bool, LedgerError>;

    /// Returns the value stored under `(address, key)`.
    ///
    /// An empty byte vector means the value is absent.
    fn get_value(&self, address: Address, key: &[u8]) -> Result<Vec<u8>, LedgerError>;

    /// Stores `value` under `(address, key)`. Empty bytes delete the entry.
    fn set_value(&mut self, address: Address, key: &[u8], value: &[u8]) -> Result<(), LedgerError>;

    /// Allocates the next storage index for `address`.
    ///
    /// Indices are monotonic per address and never reused for the lifetime
    /// of the ledger. Index 0 is reserved and never returned.
    fn allocate_storage_index(&mut self, address: Address) -> Result<u64, LedgerError>;
}

/// Builds the ledger key for the slab with the given index.
pub fn slab_ledger_key(index: u64) -> [u8; SLAB_KEY_LENGTH] {
    let mut key = [0u8; SLAB_KEY_LENGTH];
    key[0] = LEDGER_KEY_VERSION;
    key[1] = SLAB_KEY_MARKER;
    key[2..].copy_from_slice(&index.to_be_bytes());
    key
}

/// Returns true if `key` falls in the reserved slab key space.
///
/// Account keys must not start with the reserved version byte.
pub fn is_reserved_key(key: &[u8]) -> bool {
    key.first() == Some(&LEDGER_KEY_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slab_ledger_key_layout() {
        let key = slab_ledger_key(0x0102030405060708);
        assert_eq!(key[0], LEDGER_KEY_VERSION);
        assert_eq!(key[1], b'$');
        assert_eq!(&key[2..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_slab_keys_order_by_index() {
        let a = slab_ledger_key(1);
        let b = slab_ledger_key(2);
        let c = slab_ledger_key(0x100);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_reserved_key_detection() {
        assert!(is_reserved_key(&slab_ledger_key(7)));
        assert!(!is_reserved_key(b"storage"));
        assert!(!is_reserved_key(b""));
    }
}
