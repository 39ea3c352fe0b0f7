//! Persistent slab store layered over the ledger.
//!
//! The store keeps decoded slabs resident, tracks dirty and deleted ids,
//! and flushes them to the ledger in a single deterministic pass sorted by
//! StorageId. Slab payloads are encoded in parallel; ledger writes stay
//! strictly ordered.

use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;
use rustc_hash::FxBuildHasher;
use tracing::{debug, trace};

use crate::codec::{canonical_key_order, encode_storable, CodecConfig, Storable};
use crate::error::{Result, StorageError};
use crate::ledger::{slab_ledger_key, Address, Ledger};

use super::{ChildRef, CollectionKind, DataSlab, MetaSlab, Slab, StorageId};

/// Type alias for our fast HashMap with FxHash.
type FastHashMap<K, V> = HashMap<K, V, FxBuildHasher>;
type FastHashSet<T> = HashSet<T, FxBuildHasher>;

/// Outcome of growing a child subtree by one element.
enum GrowOutcome {
    /// The child absorbed the element.
    Grew,
    /// The child split; the new right sibling must be linked after it.
    Split {
        left_count: u64,
        right: StorageId,
        right_count: u64,
    },
}

/// In-memory front of the persistent slab store.
pub struct SlabStore {
    config: CodecConfig,
    /// Decoded slabs resident in memory.
    resident: FastHashMap<StorageId, Slab>,
    /// Slabs mutated or created since the last commit.
    dirty: FastHashSet<StorageId>,
    /// Slabs allocated since the last commit, never yet on the ledger.
    pending: FastHashSet<StorageId>,
    /// Slabs removed since the last commit.
    deleted: FastHashSet<StorageId>,
}

impl SlabStore {
    /// Creates an empty store with the given codec constants.
    pub fn new(config: CodecConfig) -> Self {
        debug_assert!(config.meta_fanout >= 2, "metadata fanout below 2");
        debug_assert!(config.target_slab_size > 0, "zero target slab size");
        SlabStore {
            config,
            resident: FastHashMap::with_hasher(FxBuildHasher),
            dirty: FastHashSet::with_hasher(FxBuildHasher),
            pending: FastHashSet::with_hasher(FxBuildHasher),
            deleted: FastHashSet::with_hasher(FxBuildHasher),
        }
    }

    /// Returns the codec constants.
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Returns the number of resident slabs.
    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }

    /// Returns the number of dirty slabs.
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Returns the number of deleted slabs awaiting an empty-byte write.
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    /// Returns true if the slab is marked dirty.
    pub fn is_dirty(&self, id: StorageId) -> bool {
        self.dirty.contains(&id)
    }

    /// Loads a slab, fetching and decoding it from the ledger if it is not
    /// resident.
    pub fn retrieve<L: Ledger>(&mut self, ledger: &mut L, id: StorageId) -> Result<&Slab> {
        self.ensure_resident(ledger, id)?;
        Ok(self.resident.get(&id).expect("slab resident after load"))
    }

    fn ensure_resident<L: Ledger>(&mut self, ledger: &mut L, id: StorageId) -> Result<()> {
        if self.deleted.contains(&id) {
            return Err(StorageError::SlabNotFound(id));
        }
        if self.resident.contains_key(&id) {
            return Ok(());
        }
        let bytes = ledger.get_value(id.address, &slab_ledger_key(id.index))?;
        if bytes.is_empty() {
            return Err(StorageError::SlabNotFound(id));
        }
        let slab = Slab::decode(&bytes, &self.config)?;
        trace!(%id, bytes = bytes.len(), "loaded slab");
        self.resident.insert(id, slab);
        Ok(())
    }

    /// Allocates a fresh id for `owner` and installs `slab` under it.
    pub fn allocate<L: Ledger>(
        &mut self,
        ledger: &mut L,
        owner: Address,
        slab: Slab,
    ) -> Result<StorageId> {
        let id = self.reserve_id(ledger, owner)?;
        self.install(id, slab);
        Ok(id)
    }

    fn reserve_id<L: Ledger>(&mut self, ledger: &mut L, owner: Address) -> Result<StorageId> {
        let index = ledger.allocate_storage_index(owner)?;
        debug_assert!(index != 0, "ledger allocated the reserved index");
        Ok(StorageId::new(owner, index))
    }

    fn install(&mut self, id: StorageId, slab: Slab) {
        self.resident.insert(id, slab);
        self.dirty.insert(id);
        self.pending.insert(id);
    }

    /// Stores a single oversize storable in its own slab.
    pub fn store_single<L: Ledger>(
        &mut self,
        ledger: &mut L,
        owner: Address,
        storable: Storable,
    ) -> Result<StorageId> {
        self.allocate(
            ledger,
            owner,
            Slab::Data(DataSlab {
                kind: CollectionKind::Single,
                elements: vec![storable],
                next: None,
            }),
        )
    }

    /// Loads the storable held by a single-value slab.
    pub fn stored_single<L: Ledger>(&mut self, ledger: &mut L, id: StorageId) -> Result<Storable> {
        match self.retrieve(ledger, id)? {
            Slab::Data(data) if data.kind == CollectionKind::Single => {
                Ok(data.elements[0].clone())
            }
            _ => Err(StorageError::UnexpectedSlab {
                id,
                expected: "single-value",
            }),
        }
    }

    /// Stores a collection's elements out of line, returning the root id.
    ///
    /// Elements are chunked into data slabs of at most `target_slab_size`
    /// encoded bytes, linked through next pointers; when more than one
    /// data slab results, a metadata tree with bounded fanout is built
    /// above them. Map elements arrive flattened as `k0, v0, k1, v1, ...`
    /// and never split mid-entry.
    pub fn store_collection<L: Ledger>(
        &mut self,
        ledger: &mut L,
        owner: Address,
        kind: CollectionKind,
        elements: Vec<Storable>,
    ) -> Result<StorageId> {
        let unit = kind.unit();
        debug_assert!(elements.len() % unit == 0, "partial map entry");

        let chunks = self.chunk_elements(kind, elements);

        // Reserve data slab ids first so next pointers can link forward.
        let mut ids = Vec::with_capacity(chunks.len());
        for _ in 0..chunks.len() {
            ids.push(self.reserve_id(ledger, owner)?);
        }
        let mut children = Vec::with_capacity(chunks.len());
        let mut cumulative = 0u64;
        for (position, chunk) in chunks.into_iter().enumerate() {
            let id = ids[position];
            let next = ids.get(position + 1).copied();
            cumulative += (chunk.len() / unit) as u64;
            children.push(ChildRef { id, cumulative });
            self.install(
                id,
                Slab::Data(DataSlab {
                    kind,
                    elements: chunk,
                    next,
                }),
            );
        }

        if children.len() == 1 {
            return Ok(children[0].id);
        }

        // Build metadata levels bottom-up until a single root remains.
        let mut level = children;
        loop {
            let mut next_level = Vec::with_capacity(level.len().div_ceil(self.config.meta_fanout));
            let mut base = 0u64;
            for group in level.chunks(self.config.meta_fanout) {
                let children: Vec<ChildRef> = group
                    .iter()
                    .map(|child| ChildRef {
                        id: child.id,
                        cumulative: child.cumulative - base,
                    })
                    .collect();
                let cumulative = group.last().expect("non-empty group").cumulative;
                let id = self.allocate(ledger, owner, Slab::Meta(MetaSlab { kind, children }))?;
                next_level.push(ChildRef { id, cumulative });
                base = cumulative;
            }
            if next_level.len() == 1 {
                return Ok(next_level[0].id);
            }
            level = next_level;
        }
    }

    /// Splits `elements` into runs whose encoded size stays at or below
    /// the target slab size, each holding at least one logical element.
    fn chunk_elements(&self, kind: CollectionKind, elements: Vec<Storable>) -> Vec<Vec<Storable>> {
        let unit = kind.unit();
        if elements.is_empty() {
            return vec![Vec::new()];
        }

        let mut chunks = Vec::new();
        let mut current = Vec::new();
        let mut current_size = 0usize;
        let mut iter = elements.into_iter();
        loop {
            let group: Vec<Storable> = iter.by_ref().take(unit).collect();
            if group.is_empty() {
                break;
            }
            let group_size: usize = group.iter().map(Storable::encoded_size).sum();
            if !current.is_empty() && current_size + group_size > self.config.target_slab_size {
                chunks.push(std::mem::take(&mut current));
                current_size = 0;
            }
            current_size += group_size;
            current.extend(group);
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }

    /// Returns the logical element count of a stored collection.
    pub fn collection_count<L: Ledger>(&mut self, ledger: &mut L, root: StorageId) -> Result<u64> {
        Ok(self.retrieve(ledger, root)?.count())
    }

    /// Returns the array element at `index`, loading only the slabs on the
    /// path to it.
    pub fn element_at<L: Ledger>(
        &mut self,
        ledger: &mut L,
        root: StorageId,
        index: u64,
    ) -> Result<Storable> {
        let (slab_id, offset) = self.locate(ledger, root, index)?;
        let Slab::Data(data) = self.resident.get(&slab_id).expect("located slab resident") else {
            return Err(StorageError::UnexpectedSlab {
                id: slab_id,
                expected: "data",
            });
        };
        let position = offset as usize * data.kind.unit();
        Ok(data.elements[position].clone())
    }

    /// Returns the map entry at `index` in canonical key order.
    pub fn entry_at<L: Ledger>(
        &mut self,
        ledger: &mut L,
        root: StorageId,
        index: u64,
    ) -> Result<(Storable, Storable)> {
        let (slab_id, offset) = self.locate(ledger, root, index)?;
        let Slab::Data(data) = self.resident.get(&slab_id).expect("located slab resident") else {
            return Err(StorageError::UnexpectedSlab {
                id: slab_id,
                expected: "data",
            });
        };
        if data.kind != CollectionKind::Map {
            return Err(StorageError::UnexpectedSlab {
                id: slab_id,
                expected: "map data",
            });
        }
        let position = offset as usize * 2;
        Ok((
            data.elements[position].clone(),
            data.elements[position + 1].clone(),
        ))
    }

    /// Descends from `root` to the data slab holding logical element
    /// `index`, returning the slab id and the offset within it.
    fn locate<L: Ledger>(
        &mut self,
        ledger: &mut L,
        root: StorageId,
        index: u64,
    ) -> Result<(StorageId, u64)> {
        let count = self.collection_count(ledger, root)?;
        if index >= count {
            return Err(StorageError::IndexOutOfBounds { index, count });
        }

        let mut current = root;
        let mut remaining = index;
        loop {
            match self.retrieve(ledger, current)? {
                Slab::Data(_) => return Ok((current, remaining)),
                Slab::Meta(meta) => {
                    let position = meta
                        .children
                        .iter()
                        .position(|child| child.cumulative > remaining)
                        .expect("index below subtree count");
                    if position > 0 {
                        remaining -= meta.children[position - 1].cumulative;
                    }
                    current = meta.children[position].id;
                }
            }
        }
    }

    /// Looks up a map value by key, comparing canonical encoded keys.
    ///
    /// Walks the data chain from the leftmost slab, loading on demand, and
    /// stops early once stored keys sort after the probe.
    pub fn lookup<L: Ledger>(
        &mut self,
        ledger: &mut L,
        root: StorageId,
        key: &Storable,
    ) -> Result<Option<Storable>> {
        let probe = encode_storable(key);
        let mut current = Some(self.leftmost_data(ledger, root)?);
        while let Some(id) = current {
            let Slab::Data(data) = self.retrieve(ledger, id)? else {
                return Err(StorageError::UnexpectedSlab { id, expected: "data" });
            };
            if data.kind != CollectionKind::Map {
                return Err(StorageError::UnexpectedSlab {
                    id,
                    expected: "map data",
                });
            }
            for entry in data.elements.chunks(2) {
                let stored = encode_storable(&entry[0]);
                match canonical_key_order(&stored, &probe) {
                    std::cmp::Ordering::Less => continue,
                    std::cmp::Ordering::Equal => return Ok(Some(entry[1].clone())),
                    std::cmp::Ordering::Greater => return Ok(None),
                }
            }
            current = data.next;
        }
        Ok(None)
    }

    /// Collects every element of a stored collection, in order.
    pub fn materialize<L: Ledger>(
        &mut self,
        ledger: &mut L,
        root: StorageId,
    ) -> Result<Vec<Storable>> {
        let mut elements = Vec::new();
        let mut current = Some(self.leftmost_data(ledger, root)?);
        while let Some(id) = current {
            let Slab::Data(data) = self.retrieve(ledger, id)? else {
                return Err(StorageError::UnexpectedSlab { id, expected: "data" });
            };
            elements.extend_from_slice(&data.elements);
            current = data.next;
        }
        Ok(elements)
    }

    fn leftmost_data<L: Ledger>(&mut self, ledger: &mut L, root: StorageId) -> Result<StorageId> {
        let mut current = root;
        loop {
            match self.retrieve(ledger, current)? {
                Slab::Data(_) => return Ok(current),
                Slab::Meta(meta) => current = meta.children[0].id,
            }
        }
    }

    /// Appends an element to a stored array.
    ///
    /// Loads only the rightmost path, marks it dirty, and splits slabs
    /// that overflow the target size, growing the tree at the root when
    /// needed. The root id never changes.
    pub fn append_element<L: Ledger>(
        &mut self,
        ledger: &mut L,
        root: StorageId,
        element: Storable,
    ) -> Result<()> {
        // Descend the rightmost path, remembering the metas walked.
        let mut path = Vec::new();
        let mut current = root;
        loop {
            match self.retrieve(ledger, current)? {
                Slab::Meta(meta) => {
                    let child = meta.children.last().expect("non-empty metadata slab").id;
                    path.push(current);
                    current = child;
                }
                Slab::Data(data) => {
                    if data.kind != CollectionKind::Array {
                        return Err(StorageError::UnexpectedSlab {
                            id: current,
                            expected: "array data",
                        });
                    }
                    break;
                }
            }
        }

        let Some(Slab::Data(data)) = self.resident.get_mut(&current) else {
            unreachable!("descent ended on a resident data slab");
        };
        data.elements.push(element);
        self.dirty.insert(current);

        let mut outcome = self.split_overflowing(ledger, current)?;
        while let Some(meta_id) = path.pop() {
            outcome = self.absorb_growth(ledger, meta_id, outcome)?;
        }
        if let GrowOutcome::Split {
            left_count,
            right,
            right_count,
        } = outcome
        {
            self.promote_root(ledger, root, left_count, right, right_count)?;
        }
        Ok(())
    }

    /// Records one element of growth in the rightmost child of `meta_id`,
    /// linking a new right sibling if the child split, and splits the
    /// metadata slab itself when it overflows the fanout.
    fn absorb_growth<L: Ledger>(
        &mut self,
        ledger: &mut L,
        meta_id: StorageId,
        outcome: GrowOutcome,
    ) -> Result<GrowOutcome> {
        let Some(Slab::Meta(meta)) = self.resident.get_mut(&meta_id) else {
            unreachable!("append path holds resident metadata slabs");
        };
        let position = meta.children.len() - 1;
        match outcome {
            GrowOutcome::Grew => {
                meta.children[position].cumulative += 1;
            }
            GrowOutcome::Split {
                left_count,
                right,
                right_count,
            } => {
                let base = if position == 0 {
                    0
                } else {
                    meta.children[position - 1].cumulative
                };
                meta.children[position].cumulative = base + left_count;
                meta.children.push(ChildRef {
                    id: right,
                    cumulative: base + left_count + right_count,
                });
            }
        }
        self.dirty.insert(meta_id);
        self.split_overflowing(ledger, meta_id)
    }

    /// Splits the slab in place when it overflows, keeping the left half
    /// under the existing id and allocating the right half a fresh one.
    fn split_overflowing<L: Ledger>(
        &mut self,
        ledger: &mut L,
        id: StorageId,
    ) -> Result<GrowOutcome> {
        let owner = id.address;
        let slab = self.resident.get(&id).expect("splitting a resident slab");
        match slab {
            Slab::Data(data) => {
                let unit = data.kind.unit();
                if data.elements.len() <= unit
                    || slab.encode(&self.config).len() <= self.config.target_slab_size
                {
                    return Ok(GrowOutcome::Grew);
                }
                let kind = data.kind;
                let mid = (data.elements.len() / unit / 2) * unit;
                let right_id = self.reserve_id(ledger, owner)?;

                let Some(Slab::Data(data)) = self.resident.get_mut(&id) else {
                    unreachable!("slab still resident");
                };
                let right_elements = data.elements.split_off(mid);
                let right_next = data.next;
                data.next = Some(right_id);
                let left_count = data.count();

                let right = DataSlab {
                    kind,
                    elements: right_elements,
                    next: right_next,
                };
                let right_count = right.count();
                self.install(right_id, Slab::Data(right));
                Ok(GrowOutcome::Split {
                    left_count,
                    right: right_id,
                    right_count,
                })
            }
            Slab::Meta(meta) => {
                if meta.children.len() <= self.config.meta_fanout {
                    return Ok(GrowOutcome::Grew);
                }
                let kind = meta.kind;
                let mid = meta.children.len() / 2;
                let right_id = self.reserve_id(ledger, owner)?;

                let Some(Slab::Meta(meta)) = self.resident.get_mut(&id) else {
                    unreachable!("slab still resident");
                };
                let base = meta.children[mid - 1].cumulative;
                let right_children: Vec<ChildRef> = meta
                    .children
                    .split_off(mid)
                    .into_iter()
                    .map(|child| ChildRef {
                        id: child.id,
                        cumulative: child.cumulative - base,
                    })
                    .collect();
                let left_count = base;

                let right = MetaSlab {
                    kind,
                    children: right_children,
                };
                let right_count = right.count();
                self.install(right_id, Slab::Meta(right));
                Ok(GrowOutcome::Split {
                    left_count,
                    right: right_id,
                    right_count,
                })
            }
        }
    }

    /// Grows the tree by one level: the root's contents move to a fresh
    /// id, and the root becomes a metadata slab over the two halves.
    fn promote_root<L: Ledger>(
        &mut self,
        ledger: &mut L,
        root: StorageId,
        left_count: u64,
        right: StorageId,
        right_count: u64,
    ) -> Result<()> {
        let left_slab = self
            .resident
            .remove(&root)
            .expect("promoting a resident root");
        let kind = left_slab.kind();
        let left_id = self.reserve_id(ledger, root.address)?;
        self.install(left_id, left_slab);
        self.resident.insert(
            root,
            Slab::Meta(MetaSlab {
                kind,
                children: vec![
                    ChildRef {
                        id: left_id,
                        cumulative: left_count,
                    },
                    ChildRef {
                        id: right,
                        cumulative: left_count + right_count,
                    },
                ],
            }),
        );
        self.dirty.insert(root);
        Ok(())
    }

    /// Deletes every slab reachable from `root`.
    ///
    /// Slabs that were never persisted are simply forgotten; the rest get
    /// an empty-byte write at commit.
    pub fn remove_tree<L: Ledger>(&mut self, ledger: &mut L, root: StorageId) -> Result<()> {
        let mut stack = vec![root];
        let mut visited = FastHashSet::with_hasher(FxBuildHasher);
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            match self.retrieve(ledger, id)? {
                Slab::Data(data) => {
                    if let Some(next) = data.next {
                        stack.push(next);
                    }
                }
                Slab::Meta(meta) => {
                    stack.extend(meta.children.iter().map(|child| child.id));
                }
            }
            self.resident.remove(&id);
            self.dirty.remove(&id);
            if !self.pending.remove(&id) {
                self.deleted.insert(id);
            }
        }
        Ok(())
    }

    /// Flushes dirty and deleted slabs to the ledger.
    ///
    /// The combined set is sorted by StorageId; payloads are encoded in
    /// parallel (encoding is pure) and written strictly in sorted order.
    /// Each slab is written at most once per commit.
    pub fn commit<L: Ledger>(&mut self, ledger: &mut L) -> Result<()> {
        let mut writes: Vec<(StorageId, Option<&Slab>)> = self
            .dirty
            .iter()
            .map(|id| (*id, Some(self.resident.get(id).expect("dirty slab resident"))))
            .chain(self.deleted.iter().map(|id| (*id, None)))
            .collect();
        writes.sort_unstable_by_key(|(id, _)| *id);

        debug!(
            dirty = self.dirty.len(),
            deleted = self.deleted.len(),
            "committing slabs"
        );

        let config = &self.config;
        let encoded: Vec<(StorageId, Option<Vec<u8>>)> = writes
            .par_iter()
            .map(|(id, slab)| (*id, slab.map(|slab| slab.encode(config))))
            .collect();

        for (id, bytes) in &encoded {
            ledger.set_value(
                id.address,
                &slab_ledger_key(id.index),
                bytes.as_deref().unwrap_or(&[]),
            )?;
        }

        self.dirty.clear();
        self.pending.clear();
        self.deleted.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;

    fn store() -> (SlabStore, InMemoryLedger) {
        (SlabStore::new(CodecConfig::default()), InMemoryLedger::new())
    }

    fn owner() -> Address {
        Address::repeat_byte(0x01)
    }

    fn int_elements(count: usize) -> Vec<Storable> {
        (0..count as i64).map(Storable::Int).collect()
    }

    #[test]
    fn test_store_small_collection_single_slab() {
        let (mut store, mut ledger) = store();
        let root = store
            .store_collection(&mut ledger, owner(), CollectionKind::Array, int_elements(4))
            .unwrap();

        assert_eq!(store.collection_count(&mut ledger, root).unwrap(), 4);
        assert_eq!(store.dirty_count(), 1);
        assert_eq!(
            store.element_at(&mut ledger, root, 2).unwrap(),
            Storable::Int(2)
        );
    }

    #[test]
    fn test_store_large_collection_builds_tree() {
        let (mut store, mut ledger) = store();
        let root = store
            .store_collection(
                &mut ledger,
                owner(),
                CollectionKind::Array,
                int_elements(2000),
            )
            .unwrap();

        assert!(store.dirty_count() > 2);
        assert_eq!(store.collection_count(&mut ledger, root).unwrap(), 2000);
        for index in [0u64, 1, 999, 1998, 1999] {
            assert_eq!(
                store.element_at(&mut ledger, root, index).unwrap(),
                Storable::Int(index as i64)
            );
        }
        assert_eq!(
            store.materialize(&mut ledger, root).unwrap(),
            int_elements(2000)
        );
    }

    #[test]
    fn test_collection_survives_commit_and_reload() {
        let (mut store, mut ledger) = store();
        let root = store
            .store_collection(
                &mut ledger,
                owner(),
                CollectionKind::Array,
                int_elements(1000),
            )
            .unwrap();
        store.commit(&mut ledger).unwrap();

        // Fresh store over the same ledger loads on demand.
        let mut fresh = SlabStore::new(CodecConfig::default());
        assert_eq!(fresh.resident_count(), 0);
        assert_eq!(
            fresh.element_at(&mut ledger, root, 500).unwrap(),
            Storable::Int(500)
        );
        // Only the path to the element was loaded.
        assert!(fresh.resident_count() < store.resident_count());
    }

    #[test]
    fn test_map_lookup() {
        let (mut store, mut ledger) = store();
        let mut elements = Vec::new();
        for i in 0..600i64 {
            elements.push(Storable::Int(i));
            elements.push(Storable::String(format!("value_{i}")));
        }
        let root = store
            .store_collection(&mut ledger, owner(), CollectionKind::Map, elements)
            .unwrap();

        assert_eq!(store.collection_count(&mut ledger, root).unwrap(), 600);
        assert_eq!(
            store.lookup(&mut ledger, root, &Storable::Int(17)).unwrap(),
            Some(Storable::String("value_17".into()))
        );
        assert_eq!(
            store
                .lookup(&mut ledger, root, &Storable::Int(6000))
                .unwrap(),
            None
        );

        let (key, value) = store.entry_at(&mut ledger, root, 0).unwrap();
        assert_eq!(key, Storable::Int(0));
        assert_eq!(value, Storable::String("value_0".into()));
    }

    #[test]
    fn test_append_grows_and_splits() {
        let (mut store, mut ledger) = store();
        let root = store
            .store_collection(&mut ledger, owner(), CollectionKind::Array, int_elements(1))
            .unwrap();

        for i in 1..1500i64 {
            store
                .append_element(&mut ledger, root, Storable::Int(i))
                .unwrap();
        }

        assert_eq!(store.collection_count(&mut ledger, root).unwrap(), 1500);
        assert_eq!(
            store.materialize(&mut ledger, root).unwrap(),
            int_elements(1500)
        );
        // The root grew into a tree without changing id.
        assert!(matches!(
            store.retrieve(&mut ledger, root).unwrap(),
            Slab::Meta(_)
        ));
    }

    #[test]
    fn test_append_after_reload_marks_dirty() {
        let (mut store, mut ledger) = store();
        let root = store
            .store_collection(
                &mut ledger,
                owner(),
                CollectionKind::Array,
                int_elements(1000),
            )
            .unwrap();
        store.commit(&mut ledger).unwrap();
        assert_eq!(store.dirty_count(), 0);

        store
            .append_element(&mut ledger, root, Storable::Int(1000))
            .unwrap();
        assert!(store.dirty_count() >= 1);
        assert_eq!(store.collection_count(&mut ledger, root).unwrap(), 1001);
    }

    #[test]
    fn test_remove_tree_deletes_all_slabs() {
        let (mut store, mut ledger) = store();
        let root = store
            .store_collection(
                &mut ledger,
                owner(),
                CollectionKind::Array,
                int_elements(1000),
            )
            .unwrap();
        store.commit(&mut ledger).unwrap();
        let slab_count = ledger.slab_entries().len();
        assert!(slab_count >= 2);

        store.remove_tree(&mut ledger, root).unwrap();
        assert_eq!(store.deleted_count(), slab_count);
        store.commit(&mut ledger).unwrap();
        assert!(ledger.slab_entries().is_empty());
        assert!(matches!(
            store.retrieve(&mut ledger, root),
            Err(StorageError::SlabNotFound(_))
        ));
    }

    #[test]
    fn test_remove_pending_tree_writes_nothing() {
        let (mut store, mut ledger) = store();
        let root = store
            .store_collection(
                &mut ledger,
                owner(),
                CollectionKind::Array,
                int_elements(1000),
            )
            .unwrap();
        store.remove_tree(&mut ledger, root).unwrap();
        assert_eq!(store.deleted_count(), 0);

        store.commit(&mut ledger).unwrap();
        assert!(ledger.writes().is_empty());
    }

    #[test]
    fn test_commit_writes_in_storage_id_order() {
        let (mut store, mut ledger) = store();
        store
            .store_collection(
                &mut ledger,
                Address::repeat_byte(0x0b),
                CollectionKind::Array,
                int_elements(1000),
            )
            .unwrap();
        store
            .store_collection(
                &mut ledger,
                Address::repeat_byte(0x0a),
                CollectionKind::Array,
                int_elements(1000),
            )
            .unwrap();
        store.commit(&mut ledger).unwrap();

        let keys: Vec<(Address, Vec<u8>)> = ledger
            .writes()
            .iter()
            .map(|write| (write.address, write.key.clone()))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_missing_slab_is_an_error() {
        let (mut store, mut ledger) = store();
        let id = StorageId::new(owner(), 42);
        assert!(matches!(
            store.retrieve(&mut ledger, id),
            Err(StorageError::SlabNotFound(missing)) if missing == id
        ));
    }

    #[test]
    fn test_single_value_slab_roundtrip() {
        let (mut store, mut ledger) = store();
        let big = Storable::String("x".repeat(600));
        let id = store.store_single(&mut ledger, owner(), big.clone()).unwrap();
        store.commit(&mut ledger).unwrap();

        let mut fresh = SlabStore::new(CodecConfig::default());
        assert_eq!(fresh.stored_single(&mut ledger, id).unwrap(), big);
    }
}
