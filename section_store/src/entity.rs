// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Append-only entity registry with stable ids.
//!
//! The registry maps entity names to `EntityId` values using an append-only
//! vocabulary: the name's position in the vocabulary IS the id, so reverse
//! lookups are O(1) and ids never change. A sorted hash index provides
//! O(log n) forward lookups. Entities are never destroyed - a word outlives
//! the run and a class, once minted, keeps its identity however many members
//! it gains.

use std::hash::{Hash, Hasher};

use parking_lot::RwLock;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

/// Hash a name to a u64 using `FxHasher`.
#[inline]
fn hash_name(name: &str) -> u64 {
    let mut hasher = FxHasher::default();
    name.hash(&mut hasher);
    hasher.finish()
}

/// A unique identifier for an entity.
///
/// `EntityId` is simply an index into the registry vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Create a new `EntityId` from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Convert to array index. Truncates on 32-bit platforms.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// What an entity is: a leaf observable or an aggregator over observables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// A word: a leaf observable with its own vector.
    Word,
    /// A grammatical class: aggregates one or more words.
    Class,
}

/// Append-only registry of named entities.
///
/// # Thread Safety
///
/// Uses `parking_lot::RwLock` for concurrent access without lock poisoning.
/// Lookups take the read path; inserts double-check under the write lock.
pub struct EntityRegistry {
    /// The vocabulary: `EntityId` = index into this vector. Append-only.
    records: RwLock<Vec<(String, EntityKind)>>,

    /// Sorted (hash, vocab index) pairs for O(log n) forward lookup.
    /// Binary search by hash, then verify the name on collision.
    reverse: RwLock<Vec<(u64, u32)>>,
}

impl EntityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            reverse: RwLock::new(Vec::new()),
        }
    }

    /// Number of registered entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Look up an `EntityId` by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<EntityId> {
        let hash = hash_name(name);
        let records = self.records.read();
        let reverse = self.reverse.read();

        let mut idx = reverse.partition_point(|(h, _)| *h < hash);
        while idx < reverse.len() && reverse[idx].0 == hash {
            let vocab_idx = reverse[idx].1 as usize;
            if vocab_idx < records.len() && records[vocab_idx].0 == name {
                return Some(EntityId(vocab_idx as u64));
            }
            idx += 1;
        }

        None
    }

    /// Get or create the `EntityId` for a name with the given kind.
    ///
    /// If the name already exists its id is returned regardless of the kind
    /// argument; callers keep word and class namespaces apart by key
    /// convention.
    pub fn get_or_create(&self, name: &str, kind: EntityKind) -> EntityId {
        // Fast path: read-only lookup
        if let Some(id) = self.get(name) {
            return id;
        }

        // Slow path: acquire write locks
        let mut records = self.records.write();
        let mut reverse = self.reverse.write();

        // Double-check after acquiring write locks
        let hash = hash_name(name);
        let insert_pos = reverse.partition_point(|(h, _)| *h < hash);
        let mut idx = insert_pos;
        while idx < reverse.len() && reverse[idx].0 == hash {
            let vocab_idx = reverse[idx].1 as usize;
            if vocab_idx < records.len() && records[vocab_idx].0 == name {
                return EntityId(vocab_idx as u64);
            }
            idx += 1;
        }

        let new_id = records.len() as u64;
        records.push((name.to_string(), kind));
        #[allow(clippy::cast_possible_truncation)] // ids won't exceed 4 billion
        reverse.insert(insert_pos, (hash, new_id as u32));

        EntityId(new_id)
    }

    /// Get the name for an id. `None` if the id was never issued.
    #[must_use]
    pub fn name_for(&self, id: EntityId) -> Option<String> {
        self.records
            .read()
            .get(id.as_index())
            .map(|(name, _)| name.clone())
    }

    /// Get the kind for an id. `None` if the id was never issued.
    #[must_use]
    pub fn kind_for(&self, id: EntityId) -> Option<EntityKind> {
        self.records.read().get(id.as_index()).map(|(_, kind)| *kind)
    }

    /// Whether the id names a class entity.
    #[must_use]
    pub fn is_class(&self, id: EntityId) -> bool {
        matches!(self.kind_for(id), Some(EntityKind::Class))
    }

    /// Check if a name is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All ids of a given kind, in id (creation) order.
    #[must_use]
    pub fn of_kind(&self, kind: EntityKind) -> Vec<EntityId> {
        self.records
            .read()
            .iter()
            .enumerate()
            .filter(|(_, (_, k))| *k == kind)
            .map(|(i, _)| EntityId(i as u64))
            .collect()
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
