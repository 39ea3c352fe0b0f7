//! Crate-wide error type for storage operations.

use thiserror::Error;

use crate::codec::DecodeError;
use crate::ledger::LedgerError;
use crate::slab::StorageId;

/// Errors surfaced by the storage engine.
///
/// Host errors pass through unchanged; decode errors are fatal to the
/// transaction because they signal ledger corruption or version skew.
/// Nothing is retried inside the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("slab not found: {0}")]
    SlabNotFound(StorageId),
    #[error("slab {id} is not a {expected} slab")]
    UnexpectedSlab {
        id: StorageId,
        expected: &'static str,
    },
    #[error("element index {index} out of bounds for collection of {count}")]
    IndexOutOfBounds { index: u64, count: u64 },
    #[error("key {0:?} uses the reserved slab key prefix")]
    ReservedKey(String),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
