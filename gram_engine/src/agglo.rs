//! Clustering loop: rank, chunk, and drive the full-corpus pass.
//!
//! The driver ranks all words by cached observation total, skips the
//! frontier a previous run already exhausted, and walks the survivors in
//! geometrically growing blocks. Words that match no existing class try to
//! seed a new one; new classes are appended so older classes stay preferred
//! in later comparisons. The alternative driver keeps a pool of provisional
//! singletons and pairs them off instead of scanning block remainders.
//!
//! A failed store write aborts the loop; everything merged so far is
//! already persisted, and the skip-ahead lets a rerun resume from the
//! current store state.

use std::ops::Range;
use std::time::Instant;

use crate::{AssignStrategy, EntityId, GramEngine, Result};

/// Partition `len` items into blocks starting at `initial` and doubling.
fn chunk_spans(len: usize, initial: usize) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut size = initial.max(1);

    while start < len {
        let end = (start + size).min(len);
        spans.push(start..end);
        start = end;
        size *= 2;
    }

    spans
}

impl GramEngine {
    /// Run the full-corpus clustering pass with the configured strategy.
    ///
    /// Returns the final list of true classes (two or more members each),
    /// pre-existing classes included, in preference order.
    pub fn classify(&self) -> Result<Vec<EntityId>> {
        match self.config().strategy {
            AssignStrategy::GreedyBlocks => self.classify_blocks(),
            AssignStrategy::ProvisionalPairs => self.classify_provisional(),
        }
    }

    /// Prefetch, rank, and skip-ahead: the words this pass will visit.
    fn frontier(&self, class_count: usize) -> Result<Vec<EntityId>> {
        let words = self.store().words();
        for &word in &words {
            self.prefetch(word)?;
        }

        let mut ranked = self.trim_and_rank(&words);

        // A previous run exhausted roughly the frontier that produced the
        // classes already in the store; skip past it quadratically.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let skip = ((self.config().skip_fraction * (class_count * class_count) as f64).floor()
            as usize)
            .min(ranked.len());
        ranked.drain(..skip);

        tracing::info!(
            frontier = ranked.len(),
            skipped = skip,
            existing_classes = class_count,
            "ranked clustering frontier"
        );

        Ok(ranked)
    }

    /// Greedy block driver: each block member is placed into an existing
    /// class or seeds one from the rest of its block.
    fn classify_blocks(&self) -> Result<Vec<EntityId>> {
        let start = Instant::now();
        let mut classes = self.store().classes();
        let ranked = self.frontier(classes.len())?;
        let total = ranked.len();

        for span in chunk_spans(total, self.config().initial_chunk_size) {
            let block = &ranked[span.clone()];

            for (offset, &word) in block.iter().enumerate() {
                let placed = self.assign_word_to_class(word, &classes)?;
                if placed != word {
                    continue;
                }

                let grown = self.assign_expand_class(word, &block[offset + 1..])?;
                if self.store().is_class(grown) && !classes.contains(&grown) {
                    // Appended, never inserted: older classes stay preferred
                    classes.push(grown);
                }
            }

            tracing::info!(
                remaining = total - span.end,
                classes = classes.len(),
                elapsed_secs = start.elapsed().as_secs_f64(),
                "block finished"
            );
        }

        Ok(classes)
    }

    /// Provisional-singleton driver: a word that matches no true class
    /// pairs off with the first singleton it resembles; the pair becomes a
    /// new true class.
    fn classify_provisional(&self) -> Result<Vec<EntityId>> {
        let start = Instant::now();
        let mut classes = self.store().classes();
        let ranked = self.frontier(classes.len())?;
        let total = ranked.len();
        let mut singles: Vec<EntityId> = Vec::new();

        for (done, &word) in ranked.iter().enumerate() {
            let placed = self.assign_word_to_class(word, &classes)?;
            if placed == word {
                match singles.iter().position(|&s| self.should_merge(s, word)) {
                    Some(pos) => {
                        let partner = singles.remove(pos);
                        let class = self.merge_ortho(partner, word)?;
                        if self.store().is_class(class) && !classes.contains(&class) {
                            classes.push(class);
                        }
                    },
                    None => singles.push(word),
                }
            }

            if (done + 1) % self.config().initial_chunk_size == 0 {
                tracing::info!(
                    remaining = total - done - 1,
                    classes = classes.len(),
                    provisional = singles.len(),
                    elapsed_secs = start.elapsed().as_secs_f64(),
                    "progress"
                );
            }
        }

        Ok(classes)
    }
}
