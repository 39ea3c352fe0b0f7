//! Slab-based persistent storage for large collection values.
//!
//! Large arrays and maps split into reference-addressable slabs over the
//! ledger so they never have to be fully materialized. This module holds
//! the slab identifiers, the slab representation and codec, and the store
//! coordinating residency, dirtiness, and deterministic flushing.

mod slab;
mod storage_id;
mod store;

pub use slab::{ChildRef, CollectionKind, DataSlab, MetaSlab, Slab};
pub use storage_id::StorageId;
pub use store::SlabStore;
