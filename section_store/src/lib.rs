//! Section store - observation counts, entity vectors, and class membership.
//!
//! The store keeps one sparse [`SectionVector`] per entity, a cache of
//! per-entity observation totals (wildcards), and the membership records
//! linking words to the classes that absorbed them. Every mutation is
//! written through eagerly to a [`SectionBackend`], the seam behind which a
//! durable database lives; the store itself owns no on-disk format.
//!
//! # Concurrency Model
//!
//! Reads take per-shard locks via `DashMap` and may proceed concurrently.
//! Writers are serialized per entity; the clustering driver issues merges in
//! strict program order, so a merge is atomic from the caller's perspective.

use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;

pub mod entity;
pub mod section_vector;

pub use entity::{EntityId, EntityKind, EntityRegistry};
pub use section_vector::{BasisId, PairedStars, SectionVector};

pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the store adapter.
///
/// A missing pair is never an error - it reads as count zero. Backend I/O
/// failures are fatal to the operation in flight and propagate upward.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The durable backend rejected a write.
    #[error("backend error: {0}")]
    Backend(String),
}

/// The durable side of the store.
///
/// Any database that can upsert and delete `(entity, basis) -> count` pairs,
/// record memberships, and hand back an entity's pairs on demand can sit
/// behind this trait. All writes are eager; the adapter never batches.
pub trait SectionBackend: Send + Sync {
    /// Upsert a pair with a strictly positive count.
    fn upsert_count(&self, entity: EntityId, basis: BasisId, count: f64) -> Result<()>;

    /// Delete a pair. Deleting an absent pair is a no-op.
    fn delete_pair(&self, entity: EntityId, basis: BasisId) -> Result<()>;

    /// Record that `member` belongs to `class`.
    fn persist_membership(&self, member: EntityId, class: EntityId) -> Result<()>;

    /// Fetch an entity's pairs, or `None` if the backend holds nothing for
    /// it. Used by the prefetch hook to materialize cold entities.
    fn fetch(&self, entity: EntityId) -> Result<Option<SectionVector>>;
}

impl<B: SectionBackend + ?Sized> SectionBackend for std::sync::Arc<B> {
    fn upsert_count(&self, entity: EntityId, basis: BasisId, count: f64) -> Result<()> {
        (**self).upsert_count(entity, basis, count)
    }

    fn delete_pair(&self, entity: EntityId, basis: BasisId) -> Result<()> {
        (**self).delete_pair(entity, basis)
    }

    fn persist_membership(&self, member: EntityId, class: EntityId) -> Result<()> {
        (**self).persist_membership(member, class)
    }

    fn fetch(&self, entity: EntityId) -> Result<Option<SectionVector>> {
        (**self).fetch(entity)
    }
}

/// In-memory reference backend.
///
/// Mirrors every write into concurrent maps; used as the default backend
/// and by tests that assert on what was persisted.
#[derive(Default)]
pub struct MemBackend {
    pairs: DashMap<(EntityId, BasisId), f64>,
    memberships: Mutex<Vec<(EntityId, EntityId)>>,
}

impl MemBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted pairs.
    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Persisted count for a pair, 0.0 if absent.
    #[must_use]
    pub fn count(&self, entity: EntityId, basis: BasisId) -> f64 {
        self.pairs.get(&(entity, basis)).map_or(0.0, |c| *c)
    }

    /// Persisted membership records in insertion order.
    #[must_use]
    pub fn memberships(&self) -> Vec<(EntityId, EntityId)> {
        self.memberships.lock().clone()
    }
}

impl SectionBackend for MemBackend {
    fn upsert_count(&self, entity: EntityId, basis: BasisId, count: f64) -> Result<()> {
        self.pairs.insert((entity, basis), count);
        Ok(())
    }

    fn delete_pair(&self, entity: EntityId, basis: BasisId) -> Result<()> {
        self.pairs.remove(&(entity, basis));
        Ok(())
    }

    fn persist_membership(&self, member: EntityId, class: EntityId) -> Result<()> {
        self.memberships.lock().push((member, class));
        Ok(())
    }

    fn fetch(&self, entity: EntityId) -> Result<Option<SectionVector>> {
        let pairs: Vec<(BasisId, f64)> = self
            .pairs
            .iter()
            .filter(|e| e.key().0 == entity)
            .map(|e| (e.key().1, *e.value()))
            .collect();

        if pairs.is_empty() {
            Ok(None)
        } else {
            Ok(Some(SectionVector::from_pairs(pairs)))
        }
    }
}

/// The store adapter: entity registry, pair index, wildcard cache, and
/// membership records, written through to a [`SectionBackend`].
pub struct SectionStore {
    registry: EntityRegistry,
    vectors: DashMap<EntityId, SectionVector>,
    wildcards: DashMap<EntityId, f64>,
    members: DashMap<EntityId, Vec<EntityId>>,
    senses: DashMap<EntityId, Vec<EntityId>>,
    backend: Box<dyn SectionBackend>,
}

impl SectionStore {
    /// Create a store over the in-memory reference backend.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backend(Box::new(MemBackend::new()))
    }

    /// Create a store over an arbitrary backend.
    #[must_use]
    pub fn with_backend(backend: Box<dyn SectionBackend>) -> Self {
        Self {
            registry: EntityRegistry::new(),
            vectors: DashMap::new(),
            wildcards: DashMap::new(),
            members: DashMap::new(),
            senses: DashMap::new(),
            backend,
        }
    }

    /// The entity registry.
    #[must_use]
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Get or register a word entity by name.
    pub fn word(&self, name: &str) -> EntityId {
        self.registry.get_or_create(name, EntityKind::Word)
    }

    /// Mint (or resume) the class identified by its first two constituents.
    ///
    /// Class identity is fixed at creation time: the key is derived from the
    /// two founding members and later expansion never renames it, so a rerun
    /// that merges the same two words picks the same class back up.
    pub fn mint_class(&self, first: EntityId, second: EntityId) -> EntityId {
        let key = format!(
            "cls:{}+{}",
            self.display_name(first),
            self.display_name(second)
        );
        self.registry.get_or_create(&key, EntityKind::Class)
    }

    /// Entity name, falling back to the raw id for ids this registry never
    /// issued.
    #[must_use]
    pub fn display_name(&self, entity: EntityId) -> String {
        self.registry
            .name_for(entity)
            .unwrap_or_else(|| format!("#{}", entity.as_u64()))
    }

    /// Entity kind, `None` for ids this registry never issued.
    #[must_use]
    pub fn kind(&self, entity: EntityId) -> Option<EntityKind> {
        self.registry.kind_for(entity)
    }

    /// Whether the entity is a class.
    #[must_use]
    pub fn is_class(&self, entity: EntityId) -> bool {
        self.registry.is_class(entity)
    }

    /// All word entities in creation order.
    #[must_use]
    pub fn words(&self) -> Vec<EntityId> {
        self.registry.of_kind(EntityKind::Word)
    }

    /// All class entities in creation order.
    #[must_use]
    pub fn classes(&self) -> Vec<EntityId> {
        self.registry.of_kind(EntityKind::Class)
    }

    /// Current count for a pair; 0.0 when the pair does not exist.
    #[must_use]
    pub fn count(&self, entity: EntityId, basis: BasisId) -> f64 {
        self.vectors.get(&entity).map_or(0.0, |v| v.get(basis))
    }

    /// Upsert a pair when `count > 0`; delete it when `count <= 0`.
    ///
    /// Deletion zero-sets the in-memory entry before touching the backend,
    /// so a backend failure cannot leave a negative count visible. Deleting
    /// an absent pair is a no-op.
    pub fn set_count(&self, entity: EntityId, basis: BasisId, count: f64) -> Result<()> {
        if count > 0.0 {
            self.vectors.entry(entity).or_default().set(basis, count);
            self.backend.upsert_count(entity, basis, count)
        } else {
            let existed = match self.vectors.get_mut(&entity) {
                Some(mut v) => {
                    let had = v.has_basis(basis);
                    v.set(basis, 0.0);
                    had
                },
                None => false,
            };
            if existed {
                tracing::trace!(
                    entity = %self.display_name(entity),
                    basis = basis.as_u64(),
                    "pair clamped to zero, deleting"
                );
                self.backend.delete_pair(entity, basis)
            } else {
                Ok(())
            }
        }
    }

    /// Snapshot of every extant pair with this entity on the left.
    #[must_use]
    pub fn right_stars(&self, entity: EntityId) -> Vec<(BasisId, f64)> {
        self.vectors
            .get(&entity)
            .map(|v| v.iter().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the entity's full vector; empty if it has no pairs.
    #[must_use]
    pub fn vector(&self, entity: EntityId) -> SectionVector {
        self.vectors
            .get(&entity)
            .map(|v| v.value().clone())
            .unwrap_or_default()
    }

    /// Co-iterate two entities' pairs over the union of their supports.
    ///
    /// For each basis carrying mass on at least one side, yields the two
    /// counts with `None` in the slot of an absent pair. The enumeration is
    /// a snapshot: consistent within the call, in sorted basis order.
    #[must_use]
    pub fn paired_right_stars(
        &self,
        left: EntityId,
        right: EntityId,
    ) -> Vec<(BasisId, Option<f64>, Option<f64>)> {
        let lv = self.vector(left);
        let rv = self.vector(right);
        lv.paired(&rv).collect()
    }

    /// Refresh and return the cached observation total for an entity.
    ///
    /// Materializes the entity from the backend if the in-memory index has
    /// never seen it, then recomputes the wildcard total. This is the
    /// refresh-on-demand primitive: nothing else rewrites the cache, so
    /// totals read through [`observation_total`](Self::observation_total)
    /// lag any merges performed since the last prefetch.
    pub fn prefetch(&self, entity: EntityId) -> Result<f64> {
        if !self.vectors.contains_key(&entity) {
            if let Some(v) = self.backend.fetch(entity)? {
                self.vectors.insert(entity, v);
            }
        }
        let total = self.vectors.get(&entity).map_or(0.0, |v| v.total());
        self.wildcards.insert(entity, total);
        Ok(total)
    }

    /// Cached observation total, 0.0 for an entity never prefetched.
    ///
    /// The cache is only rewritten by [`prefetch`](Self::prefetch).
    #[must_use]
    pub fn observation_total(&self, entity: EntityId) -> f64 {
        self.wildcards.get(&entity).map_or(0.0, |t| *t)
    }

    /// Record that `member` belongs to `class` and persist the link.
    ///
    /// Membership is many-to-many: a word may belong to several classes
    /// (one per sense). Duplicate links are ignored.
    pub fn persist_membership(&self, member: EntityId, class: EntityId) -> Result<()> {
        {
            let mut members = self.members.entry(class).or_default();
            if members.contains(&member) {
                return Ok(());
            }
            members.push(member);
        }
        self.senses.entry(member).or_default().push(class);
        self.backend.persist_membership(member, class)
    }

    /// Members of a class in join order.
    #[must_use]
    pub fn members_of(&self, class: EntityId) -> Vec<EntityId> {
        self.members
            .get(&class)
            .map(|m| m.value().clone())
            .unwrap_or_default()
    }

    /// Classes a word belongs to, in join order (its senses).
    #[must_use]
    pub fn classes_of(&self, member: EntityId) -> Vec<EntityId> {
        self.senses
            .get(&member)
            .map(|c| c.value().clone())
            .unwrap_or_default()
    }

    /// Number of members in a class.
    #[must_use]
    pub fn member_count(&self, class: EntityId) -> usize {
        self.members.get(&class).map_or(0, |m| m.len())
    }
}

impl Default for SectionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend that rejects every write; for exercising the error path.
    struct FailingBackend;

    impl SectionBackend for FailingBackend {
        fn upsert_count(&self, _: EntityId, _: BasisId, _: f64) -> Result<()> {
            Err(StoreError::Backend("disk on fire".into()))
        }

        fn delete_pair(&self, _: EntityId, _: BasisId) -> Result<()> {
            Err(StoreError::Backend("disk on fire".into()))
        }

        fn persist_membership(&self, _: EntityId, _: EntityId) -> Result<()> {
            Err(StoreError::Backend("disk on fire".into()))
        }

        fn fetch(&self, _: EntityId) -> Result<Option<SectionVector>> {
            Ok(None)
        }
    }

    #[test]
    fn set_count_upserts_and_persists() {
        let store = SectionStore::new();
        let dog = store.word("dog");

        store.set_count(dog, BasisId(1), 4.0).unwrap();
        store.set_count(dog, BasisId(2), 2.0).unwrap();

        assert_eq!(store.count(dog, BasisId(1)), 4.0);
        assert_eq!(store.count(dog, BasisId(2)), 2.0);
        assert_eq!(store.count(dog, BasisId(3)), 0.0); // missing pair reads zero
    }

    #[test]
    fn nonpositive_count_deletes_the_pair() {
        let store = SectionStore::new();
        let dog = store.word("dog");

        store.set_count(dog, BasisId(1), 4.0).unwrap();
        store.set_count(dog, BasisId(1), 0.0).unwrap();

        assert_eq!(store.count(dog, BasisId(1)), 0.0);
        assert!(store.right_stars(dog).is_empty());

        // All stored counts stay strictly positive
        store.set_count(dog, BasisId(2), 3.0).unwrap();
        store.set_count(dog, BasisId(2), -1.5).unwrap();
        assert!(store.vector(dog).iter().all(|(_, c)| c > 0.0));
    }

    #[test]
    fn deleting_absent_pair_is_a_noop() {
        let store = SectionStore::new();
        let dog = store.word("dog");

        store.set_count(dog, BasisId(9), 0.0).unwrap();
        assert!(store.right_stars(dog).is_empty());
    }

    #[test]
    fn right_stars_snapshots_all_pairs() {
        let store = SectionStore::new();
        let dog = store.word("dog");

        store.set_count(dog, BasisId(5), 1.0).unwrap();
        store.set_count(dog, BasisId(2), 2.0).unwrap();

        let stars = store.right_stars(dog);
        assert_eq!(stars, vec![(BasisId(2), 2.0), (BasisId(5), 1.0)]);
    }

    #[test]
    fn paired_right_stars_covers_union_with_empty_slots() {
        let store = SectionStore::new();
        let dog = store.word("dog");
        let cat = store.word("cat");

        store.set_count(dog, BasisId(1), 3.0).unwrap();
        store.set_count(dog, BasisId(2), 3.0).unwrap();
        store.set_count(cat, BasisId(2), 5.0).unwrap();
        store.set_count(cat, BasisId(4), 5.0).unwrap();

        let stars = store.paired_right_stars(dog, cat);
        assert_eq!(
            stars,
            vec![
                (BasisId(1), Some(3.0), None),
                (BasisId(2), Some(3.0), Some(5.0)),
                (BasisId(4), None, Some(5.0)),
            ]
        );
    }

    #[test]
    fn wildcard_totals_lag_until_prefetch() {
        let store = SectionStore::new();
        let dog = store.word("dog");

        store.set_count(dog, BasisId(1), 4.0).unwrap();
        assert_eq!(store.observation_total(dog), 0.0); // never prefetched

        assert_eq!(store.prefetch(dog).unwrap(), 4.0);
        assert_eq!(store.observation_total(dog), 4.0);

        // Mutations don't touch the cache until the next prefetch
        store.set_count(dog, BasisId(2), 6.0).unwrap();
        assert_eq!(store.observation_total(dog), 4.0);
        assert_eq!(store.prefetch(dog).unwrap(), 10.0);
    }

    #[test]
    fn membership_is_many_to_many_and_deduplicated() {
        let store = SectionStore::new();
        let saw = store.word("saw");
        let verbs = store.word("v1");
        let nouns = store.word("n1");
        let class_v = store.mint_class(saw, verbs);
        let class_n = store.mint_class(saw, nouns);

        store.persist_membership(saw, class_v).unwrap();
        store.persist_membership(saw, class_v).unwrap(); // duplicate ignored
        store.persist_membership(saw, class_n).unwrap();

        assert_eq!(store.members_of(class_v), vec![saw]);
        assert_eq!(store.classes_of(saw), vec![class_v, class_n]);
        assert_eq!(store.member_count(class_v), 1);
    }

    #[test]
    fn mint_class_is_stable_across_calls() {
        let store = SectionStore::new();
        let a = store.word("a");
        let b = store.word("b");

        let k1 = store.mint_class(a, b);
        let k2 = store.mint_class(a, b);

        assert_eq!(k1, k2);
        assert!(store.is_class(k1));
        assert_eq!(store.display_name(k1), "cls:a+b");
    }

    #[test]
    fn writes_reach_the_backend_eagerly() {
        let backend = std::sync::Arc::new(MemBackend::new());
        let store = SectionStore::with_backend(Box::new(backend.clone()));
        let dog = store.word("dog");
        let cat = store.word("cat");
        let class = store.mint_class(dog, cat);

        store.set_count(dog, BasisId(1), 2.0).unwrap();
        assert_eq!(backend.count(dog, BasisId(1)), 2.0);

        store.persist_membership(dog, class).unwrap();
        assert_eq!(backend.memberships(), vec![(dog, class)]);

        store.set_count(dog, BasisId(1), 0.0).unwrap();
        assert_eq!(backend.pair_count(), 0);
    }

    #[test]
    fn backend_failure_propagates() {
        let store = SectionStore::with_backend(Box::new(FailingBackend));
        let dog = store.word("dog");

        let err = store.set_count(dog, BasisId(1), 1.0).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[test]
    fn prefetch_materializes_cold_entities_from_backend() {
        let backend = MemBackend::new();
        let dog = EntityId(0);
        backend.upsert_count(dog, BasisId(1), 4.0).unwrap();
        backend.upsert_count(dog, BasisId(2), 2.0).unwrap();

        let store = SectionStore::with_backend(Box::new(backend));
        store.word("dog"); // same id, registry order

        assert_eq!(store.prefetch(dog).unwrap(), 6.0);
        assert_eq!(store.count(dog, BasisId(1)), 4.0);
    }
}
