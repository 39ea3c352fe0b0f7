//! Account storage buffer and commit driver.
//!
//! A `Storage` lives for one transaction. During execution it buffers
//! writes in a delta, caches loaded values, and records contract updates
//! in a side table; nothing touches the ledger until `commit`, which
//! drains everything in one deterministic pass: account entries sorted by
//! `(address, key)` first, then the slab store's dirty set sorted by
//! StorageId. The commit output is a pure function of the logical delta.

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use tracing::debug;

use crate::codec::{decode_account_value, encode_account_value, CodecConfig, Storable};
use crate::error::{Result, StorageError};
use crate::ledger::{is_reserved_key, Address, Ledger};
use crate::meter::{Meter, Metric, Metrics};
use crate::slab::SlabStore;
use crate::value::Value;

/// Type alias for our fast HashMap with FxHash.
type FastHashMap<K, V> = HashMap<K, V, FxBuildHasher>;

/// Identifies a value in account storage.
///
/// Ordering is lexicographic on the address, then the key, which defines
/// the commit order of account writes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey {
    pub address: Address,
    pub key: String,
}

impl StorageKey {
    /// Creates a storage key.
    pub fn new(address: Address, key: impl Into<String>) -> Self {
        StorageKey {
            address,
            key: key.into(),
        }
    }
}

/// Per-transaction account storage engine.
///
/// Owns the ledger handle, the slab store, and the three buffer maps.
/// Not safe to share between threads; the host serializes access.
pub struct Storage<L: Ledger> {
    ledger: L,
    slabs: SlabStore,
    config: CodecConfig,
    /// Writes made this transaction. `None` is a deletion.
    delta: FastHashMap<StorageKey, Option<Value>>,
    /// Values loaded from the ledger this transaction. `None` is proven
    /// absence.
    cache: FastHashMap<StorageKey, Option<Value>>,
    /// Pending contract updates, merged with the delta at commit.
    contract_updates: FastHashMap<StorageKey, Value>,
    meter: Meter,
    metrics: Metrics,
}

impl<L: Ledger> Storage<L> {
    /// Creates a storage engine with default configuration and metering
    /// disabled.
    pub fn new(ledger: L) -> Self {
        Self::with_config(
            ledger,
            CodecConfig::default(),
            Meter::disabled(),
            Metrics::disabled(),
        )
    }

    /// Creates a storage engine with explicit codec constants, memory
    /// gauge, and metrics reporter.
    pub fn with_config(ledger: L, config: CodecConfig, meter: Meter, metrics: Metrics) -> Self {
        Storage {
            ledger,
            slabs: SlabStore::new(config),
            config,
            delta: FastHashMap::with_hasher(FxBuildHasher),
            cache: FastHashMap::with_hasher(FxBuildHasher),
            contract_updates: FastHashMap::with_hasher(FxBuildHasher),
            meter,
            metrics,
        }
    }

    /// Returns the ledger handle.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Consumes the storage, returning the ledger handle.
    pub fn into_ledger(self) -> L {
        self.ledger
    }

    /// Returns the memory meter.
    pub fn meter(&self) -> &Meter {
        &self.meter
    }

    /// Returns the slab store.
    pub fn slabs(&self) -> &SlabStore {
        &self.slabs
    }

    /// Returns the codec constants.
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    fn check_key(&self, key: &str) -> Result<()> {
        if is_reserved_key(key.as_bytes()) {
            return Err(StorageError::ReservedKey(key.to_owned()));
        }
        Ok(())
    }

    /// Returns true if a value exists under `(address, key)`.
    ///
    /// Checks the delta, then the cache, then the ledger. A ledger miss
    /// caches proven absence.
    pub fn value_exists(&mut self, address: Address, key: &str) -> Result<bool> {
        self.check_key(key)?;
        let storage_key = StorageKey::new(address, key);

        if let Some(value) = self.delta.get(&storage_key) {
            return Ok(value.is_some());
        }
        if let Some(value) = self.cache.get(&storage_key) {
            return Ok(value.is_some());
        }

        let exists = self.ledger.value_exists(address, key.as_bytes())?;
        if !exists {
            self.cache.insert(storage_key, None);
        }
        Ok(exists)
    }

    /// Reads a value from account storage.
    ///
    /// Checks the delta, then the cache, then loads and decodes from the
    /// ledger, reporting decode time and caching the result.
    pub fn read_value(&mut self, address: Address, key: &str) -> Result<Option<Value>> {
        self.check_key(key)?;
        let storage_key = StorageKey::new(address, key);

        if let Some(value) = self.delta.get(&storage_key) {
            return Ok(value.clone());
        }
        if let Some(value) = self.cache.get(&storage_key) {
            return Ok(value.clone());
        }

        let stored = self.ledger.get_value(address, key.as_bytes())?;
        if stored.is_empty() {
            self.cache.insert(storage_key, None);
            return Ok(None);
        }

        let storable = self
            .metrics
            .measure(Metric::ValueDecoded, || {
                decode_account_value(&stored, &self.config)
            })?;
        let value = Value::from_storable(storable, &mut self.slabs, &mut self.ledger, &self.meter)?;
        self.cache.insert(storage_key, Some(value.clone()));
        Ok(Some(value))
    }

    /// Buffers a write. `None` deletes the key at commit.
    ///
    /// No ledger I/O happens here; subsequent reads in the same
    /// transaction see the written value.
    pub fn write_value(&mut self, address: Address, key: &str, value: Option<Value>) -> Result<()> {
        self.check_key(key)?;
        self.delta.insert(StorageKey::new(address, key), value);
        Ok(())
    }

    /// Records a pending contract update, kept apart from the delta and
    /// merged with it at commit.
    pub fn record_contract_update(
        &mut self,
        address: Address,
        key: &str,
        contract: Value,
    ) -> Result<()> {
        self.check_key(key)?;
        self.contract_updates
            .insert(StorageKey::new(address, key), contract);
        Ok(())
    }

    /// Commits all buffered state to the ledger.
    ///
    /// Account entries are merged (contract updates win over the delta on
    /// the same key), sorted by `(address, key)`, encoded, and written at
    /// most once each; the slab store then flushes its dirty set in
    /// StorageId order. The first error aborts and surfaces unmasked.
    pub fn commit(&mut self) -> Result<()> {
        let mut merged: FastHashMap<StorageKey, Option<Value>> = self.delta.drain().collect();
        for (storage_key, contract) in self.contract_updates.drain() {
            merged.insert(storage_key, Some(contract));
        }

        let mut entries: Vec<(StorageKey, Option<Value>)> = merged.into_iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        debug!(entries = entries.len(), "committing account storage");

        for (storage_key, value) in entries {
            let address = storage_key.address;
            match &value {
                None => {
                    self.release_stored_value(address, &storage_key.key)?;
                    self.ledger
                        .set_value(address, storage_key.key.as_bytes(), &[])?;
                }
                Some(value) => {
                    let storable =
                        value.to_storable(&mut self.slabs, &mut self.ledger, address)?;
                    let encoded = self.metrics.measure(Metric::ValueEncoded, || {
                        encode_account_value(&storable, &self.config)
                    });
                    self.ledger
                        .set_value(address, storage_key.key.as_bytes(), &encoded)?;
                }
            }
            self.cache.insert(storage_key, value);
        }

        self.slabs.commit(&mut self.ledger)
    }

    /// Deletes the slab tree behind a previously committed value, if any,
    /// so a deletion leaves no unreachable slabs on the ledger.
    fn release_stored_value(&mut self, address: Address, key: &str) -> Result<()> {
        let stored = self.ledger.get_value(address, key.as_bytes())?;
        if stored.is_empty() {
            return Ok(());
        }
        let storable = decode_account_value(&stored, &self.config)?;
        match storable {
            Storable::ArrayRoot(id) | Storable::MapRoot(id) | Storable::SlabId(id) => {
                self.slabs.remove_tree(&mut self.ledger, id)
            }
            _ => Ok(()),
        }
    }
}
