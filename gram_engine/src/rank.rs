//! Support/rank index: cached observation totals and ranked candidate lists.
//!
//! Totals come from the store's wildcard cache, which is only rewritten by
//! an explicit prefetch. The cache therefore lags any merges performed since
//! the last prefetch - a ranking produced mid-run drifts from the live
//! counts. Callers that need fresh totals re-prefetch the entities they care
//! about; the driver prefetches once, before ranking.

use crate::{EntityId, GramEngine, Result};

impl GramEngine {
    /// Cached observation total for an entity; 0.0 if never prefetched.
    #[must_use]
    pub fn observation_total(&self, entity: EntityId) -> f64 {
        self.store().observation_total(entity)
    }

    /// Refresh the cached total for an entity and return it.
    pub fn prefetch(&self, entity: EntityId) -> Result<f64> {
        Ok(self.store().prefetch(entity)?)
    }

    /// Filter out entities below the observation floor and sort the rest by
    /// total, descending. Stable on ties, idempotent on unchanged input.
    ///
    /// Reads the wildcard cache; callers prefetch every candidate first.
    #[must_use]
    pub fn trim_and_rank(&self, candidates: &[EntityId]) -> Vec<EntityId> {
        let min_obs = self.config().min_observations;

        let mut ranked: Vec<EntityId> = candidates
            .iter()
            .copied()
            .filter(|&e| self.observation_total(e) >= min_obs)
            .collect();

        // Stable sort: ties keep input order
        ranked.sort_by(|&a, &b| {
            self.observation_total(b)
                .partial_cmp(&self.observation_total(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        tracing::debug!(
            candidates = candidates.len(),
            ranked = ranked.len(),
            min_obs,
            "trimmed and ranked"
        );

        ranked
    }
}
