// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Similarity oracle: cosine over co-iterated section vectors.

use std::time::Instant;

use crate::{EntityId, GramEngine};

impl GramEngine {
    /// Cosine similarity between two entities' vectors.
    ///
    /// Computed by merge-join co-iteration over the two supports. Returns
    /// 0.0 when either side has empty support; the angle of a zero-length
    /// vector is undefined, so such comparisons never merge.
    #[must_use]
    pub fn cosine(&self, left: EntityId, right: EntityId) -> f64 {
        let lv = self.store().vector(left);
        let rv = self.store().vector(right);
        lv.cosine_similarity(&rv)
    }

    /// Whether two entities are similar enough to merge.
    ///
    /// True when cosine reaches the configured threshold. Symmetric, and a
    /// function of current counts only. Emits one diagnostic event per
    /// comparison.
    #[must_use]
    pub fn should_merge(&self, left: EntityId, right: EntityId) -> bool {
        let start = Instant::now();
        let cosine = self.cosine(left, right);
        let verdict = cosine >= self.config().cosine_threshold;

        let store = self.store();
        tracing::debug!(
            cosine,
            verdict,
            left = %store.display_name(left),
            left_kind = ?store.kind(left),
            right = %store.display_name(right),
            right_kind = ?store.kind(right),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "similarity comparison"
        );

        verdict
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use section_store::{BasisId, SectionStore};

    use crate::{GramConfig, GramEngine};

    fn engine_with(words: &[(&str, &[(u64, f64)])]) -> GramEngine {
        let store = Arc::new(SectionStore::new());
        for (name, pairs) in words {
            let id = store.word(name);
            for &(basis, count) in pairs.iter() {
                store.set_count(id, BasisId(basis), count).unwrap();
            }
        }
        GramEngine::new(store)
    }

    #[test]
    fn identical_profiles_have_unit_cosine() {
        let engine = engine_with(&[("a", &[(1, 4.0), (2, 2.0)]), ("b", &[(1, 2.0), (2, 4.0)])]);
        let a = engine.store().word("a");
        let b = engine.store().word("b");

        // (4*2 + 2*4) / (sqrt(20) * sqrt(20)) = 20/20
        assert!((engine.cosine(a, b) - 1.0).abs() < 1e-12);
        assert!(engine.should_merge(a, b));
    }

    #[test]
    fn disjoint_supports_never_merge() {
        let engine = engine_with(&[("a", &[(1, 10.0)]), ("b", &[(2, 10.0)])]);
        let a = engine.store().word("a");
        let b = engine.store().word("b");

        assert_eq!(engine.cosine(a, b), 0.0);
        assert!(!engine.should_merge(a, b));
    }

    #[test]
    fn empty_support_never_merges() {
        let engine = engine_with(&[("a", &[(1, 10.0)]), ("hollow", &[])]);
        let a = engine.store().word("a");
        let hollow = engine.store().word("hollow");

        assert!(!engine.should_merge(a, hollow));
        assert!(!engine.should_merge(hollow, a));
        assert!(!engine.should_merge(hollow, hollow));
    }

    #[test]
    fn verdict_is_symmetric() {
        let engine = engine_with(&[
            ("a", &[(1, 3.0), (2, 3.0)]),
            ("b", &[(2, 3.0), (3, 3.0)]),
        ]);
        let a = engine.store().word("a");
        let b = engine.store().word("b");

        assert_eq!(engine.cosine(a, b), engine.cosine(b, a));
        assert_eq!(engine.should_merge(a, b), engine.should_merge(b, a));
    }

    #[test]
    fn threshold_is_inclusive() {
        let store = Arc::new(SectionStore::new());
        let a = store.word("a");
        let b = store.word("b");
        store.set_count(a, BasisId(1), 1.0).unwrap();
        for basis in 1..=4 {
            store.set_count(b, BasisId(basis), 1.0).unwrap();
        }

        // cosine(a, b) = 1 / (1 * 2) = 0.5 exactly
        let at_threshold = GramEngine::with_config(
            Arc::clone(&store),
            GramConfig::default().with_cosine_threshold(0.5),
        );
        assert!(at_threshold.should_merge(a, b));

        let above_threshold = GramEngine::with_config(
            store,
            GramConfig::default().with_cosine_threshold(0.5 + 1e-9),
        );
        assert!(!above_threshold.should_merge(a, b));
    }
}
