//! Assignment controller: place one word into a class list, or grow a
//! class from a candidate pool.

use rayon::prelude::*;

use crate::{EntityId, GramEngine, Result};

impl GramEngine {
    /// Try to place a word into the first sufficiently similar class.
    ///
    /// Similarity checks are read-only, so they fan out across the rayon
    /// pool; the hits are gathered and the class with the smallest input
    /// index wins, which keeps the outcome deterministic under the
    /// one-class-per-pass assumption. The single merge then runs serially.
    ///
    /// Returns the class the word merged into, or the word unchanged when
    /// no class matches.
    pub fn assign_word_to_class(&self, word: EntityId, classes: &[EntityId]) -> Result<EntityId> {
        let hit = classes
            .par_iter()
            .copied()
            .enumerate()
            .filter(|&(_, class)| class != word && self.should_merge(class, word))
            .min_by_key(|&(index, _)| index);

        match hit {
            Some((_, class)) => self.merge_ortho(class, word),
            None => Ok(word),
        }
    }

    /// Grow a class (or seed one from a word) by scanning a candidate list.
    ///
    /// Every candidate similar to the current aggregate is merged in, and
    /// the scan continues with the grown aggregate, so one pass enlarges
    /// the class as far as the candidates allow. Returns the final
    /// aggregate: a class if anything merged, otherwise the seed.
    pub fn assign_expand_class(
        &self,
        seed: EntityId,
        candidates: &[EntityId],
    ) -> Result<EntityId> {
        let mut current = seed;

        for &candidate in candidates {
            if candidate == current {
                continue;
            }
            if self.should_merge(current, candidate) {
                current = self.merge_ortho(current, candidate)?;
            }
        }

        Ok(current)
    }
}
