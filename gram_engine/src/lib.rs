//! Gram Engine - agglomerative clustering over sparse observation vectors.
//!
//! Discovers latent grammatical classes from co-occurrence statistics. Each
//! word is a sparse non-negative vector of observation counts over disjunct
//! bases; the engine compares words pairwise by cosine similarity and, past
//! a threshold, merges them into class entities whose vectors blend the
//! inputs, reprojecting the constituents so they become orthogonal to the
//! class.
//!
//! The engine drives a [`section_store::SectionStore`]; all counts and
//! memberships are persisted eagerly through the store's backend.
//!
//! ```
//! use std::sync::Arc;
//! use gram_engine::GramEngine;
//! use section_store::{BasisId, SectionStore};
//!
//! let store = Arc::new(SectionStore::new());
//! let dog = store.word("dog");
//! store.set_count(dog, BasisId(1), 20.0).unwrap();
//!
//! let engine = GramEngine::new(store);
//! let classes = engine.classify().unwrap();
//! assert!(classes.is_empty()); // one word clusters with nothing
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use section_store::{SectionStore, StoreError};

pub mod agglo;
pub mod assign;
pub mod merge;
pub mod rank;
pub mod similarity;

pub use section_store::{
    BasisId, EntityId, EntityKind, MemBackend, SectionBackend, SectionVector,
};

pub type Result<T> = std::result::Result<T, GramError>;

/// Errors surfaced by the clustering engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GramError {
    /// The store adapter failed; fatal to the merge in flight.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A merge was asked to combine an entity with itself.
    #[error("cannot merge entity with itself: {0}")]
    SelfMerge(String),
}

/// Which driver the clustering loop runs for the whole pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AssignStrategy {
    /// Chunk the ranked list into geometrically growing blocks; words that
    /// match no existing class try to seed a class from the rest of their
    /// block (default).
    #[default]
    GreedyBlocks,
    /// Keep a pool of provisional singletons; a word that matches no true
    /// class pairs off with the first singleton it resembles.
    ProvisionalPairs,
}

/// Tunables for the clustering engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GramConfig {
    /// Cosine similarity at or above which two entities merge.
    pub cosine_threshold: f64,

    /// Fraction of mass from unshared bases that crosses into the class
    /// during a merge. 0 = intersection only, 1 = full union.
    pub merge_fraction: f64,

    /// Entities observed fewer times than this are not clustered.
    pub min_observations: f64,

    /// Size of the first ranked block; each following block doubles.
    pub initial_chunk_size: usize,

    /// Coefficient on `|classes|^2` for the ranked-list skip-ahead.
    pub skip_fraction: f64,

    /// Driver strategy for the whole run.
    pub strategy: AssignStrategy,
}

impl Default for GramConfig {
    fn default() -> Self {
        Self {
            cosine_threshold: 0.65,
            merge_fraction: 0.3,
            min_observations: 20.0,
            initial_chunk_size: 20,
            skip_fraction: 0.35,
            strategy: AssignStrategy::default(),
        }
    }
}

impl GramConfig {
    /// Set the cosine merge threshold.
    #[must_use]
    pub const fn with_cosine_threshold(mut self, theta: f64) -> Self {
        self.cosine_threshold = theta;
        self
    }

    /// Set the unshared-mass merge fraction.
    #[must_use]
    pub const fn with_merge_fraction(mut self, alpha: f64) -> Self {
        self.merge_fraction = alpha;
        self
    }

    /// Set the minimum observation total for clustering.
    #[must_use]
    pub const fn with_min_observations(mut self, min_obs: f64) -> Self {
        self.min_observations = min_obs;
        self
    }

    /// Set the initial block size.
    #[must_use]
    pub const fn with_initial_chunk_size(mut self, size: usize) -> Self {
        self.initial_chunk_size = size;
        self
    }

    /// Set the skip-ahead coefficient.
    #[must_use]
    pub const fn with_skip_fraction(mut self, fraction: f64) -> Self {
        self.skip_fraction = fraction;
        self
    }

    /// Set the driver strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: AssignStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// The clustering engine: similarity oracle, merge algebra, assignment
/// controller, and the full-corpus driver, over a shared store.
pub struct GramEngine {
    store: Arc<SectionStore>,
    config: GramConfig,
}

impl GramEngine {
    /// Create an engine with default configuration.
    #[must_use]
    pub fn new(store: Arc<SectionStore>) -> Self {
        Self::with_config(store, GramConfig::default())
    }

    /// Create an engine with the given configuration.
    #[must_use]
    pub fn with_config(store: Arc<SectionStore>, config: GramConfig) -> Self {
        Self { store, config }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &SectionStore {
        &self.store
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &GramConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = GramConfig::default();

        assert_eq!(config.cosine_threshold, 0.65);
        assert_eq!(config.merge_fraction, 0.3);
        assert_eq!(config.min_observations, 20.0);
        assert_eq!(config.initial_chunk_size, 20);
        assert_eq!(config.skip_fraction, 0.35);
        assert_eq!(config.strategy, AssignStrategy::GreedyBlocks);
    }

    #[test]
    fn builders_override_fields() {
        let config = GramConfig::default()
            .with_cosine_threshold(0.5)
            .with_merge_fraction(1.0)
            .with_strategy(AssignStrategy::ProvisionalPairs);

        assert_eq!(config.cosine_threshold, 0.5);
        assert_eq!(config.merge_fraction, 1.0);
        assert_eq!(config.strategy, AssignStrategy::ProvisionalPairs);
    }

    #[test]
    fn config_serde_round_trip() {
        let config = GramConfig::default()
            .with_min_observations(5.0)
            .with_strategy(AssignStrategy::ProvisionalPairs);

        let json = serde_json::to_string(&config).unwrap();
        let back: GramConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(back, config);
    }
}
