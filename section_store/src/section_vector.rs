//! Section vector - sparse observation counts where zero doesn't exist.
//!
//! An entity's vector maps basis elements (disjuncts) to observation counts.
//! A count of zero represents absence of observation, not a value to store:
//! only strictly positive counts are kept. Unlike a positional embedding,
//! the basis space is an open vocabulary of opaque identifiers, so there is
//! no fixed dimension; the support of the vector is whatever bases carry
//! mass.

use serde::{Deserialize, Serialize};

/// An opaque identifier for a basis element (a disjunct).
///
/// Basis ids index one dimension of the observation space. They carry no
/// structure here; the process that produces observations assigns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BasisId(pub u64);

impl BasisId {
    /// Create a new `BasisId` from a raw u64 value.
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
}

impl From<u64> for BasisId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A sparse vector of observation counts keyed by basis id.
///
/// Bases are kept sorted and unique; counts are parallel to bases and
/// strictly positive. Setting a count to zero or below removes the entry.
///
/// # Example
///
/// ```
/// use section_store::section_vector::{BasisId, SectionVector};
///
/// let mut v = SectionVector::new();
/// v.set(BasisId(3), 4.0);
/// v.set(BasisId(7), 2.0);
///
/// assert_eq!(v.support_size(), 2);
/// assert_eq!(v.get(BasisId(3)), 4.0);
/// assert_eq!(v.get(BasisId(5)), 0.0); // absent, contextual zero
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionVector {
    /// Bases carrying mass (sorted, unique).
    bases: Vec<BasisId>,
    /// Observation counts (parallel to bases, all > 0).
    counts: Vec<f64>,
}

impl SectionVector {
    /// Create an empty section vector.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bases: Vec::new(),
            counts: Vec::new(),
        }
    }

    /// Create a section vector with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bases: Vec::with_capacity(capacity),
            counts: Vec::with_capacity(capacity),
        }
    }

    /// Create from (basis, count) pairs.
    ///
    /// Filters out non-positive counts and sorts by basis. On duplicate
    /// bases the last count wins.
    #[must_use]
    pub fn from_pairs(pairs: impl IntoIterator<Item = (BasisId, f64)>) -> Self {
        let mut entries: Vec<(BasisId, f64)> =
            pairs.into_iter().filter(|(_, c)| *c > 0.0).collect();
        entries.sort_by_key(|(b, _)| *b);
        entries.dedup_by(|a, b| {
            if a.0 == b.0 {
                b.1 = a.1;
                true
            } else {
                false
            }
        });

        let (bases, counts) = entries.into_iter().unzip();
        Self { bases, counts }
    }

    /// Number of bases carrying mass.
    #[inline]
    #[must_use]
    pub fn support_size(&self) -> usize {
        self.counts.len()
    }

    /// Whether no basis carries mass.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Get the count at a basis.
    ///
    /// Returns 0.0 for a basis with no stored count - absence of
    /// observation, not a stored zero.
    #[inline]
    #[must_use]
    pub fn get(&self, basis: BasisId) -> f64 {
        match self.bases.binary_search(&basis) {
            Ok(i) => self.counts[i],
            Err(_) => 0.0,
        }
    }

    /// Check whether a basis carries mass.
    #[inline]
    #[must_use]
    pub fn has_basis(&self, basis: BasisId) -> bool {
        self.bases.binary_search(&basis).is_ok()
    }

    /// Set the count at a basis.
    ///
    /// A count of zero or below removes the entry: non-positive counts do
    /// not exist in this space.
    pub fn set(&mut self, basis: BasisId, count: f64) {
        match self.bases.binary_search(&basis) {
            Ok(i) => {
                if count > 0.0 {
                    self.counts[i] = count;
                } else {
                    self.bases.remove(i);
                    self.counts.remove(i);
                }
            },
            Err(i) => {
                if count > 0.0 {
                    self.bases.insert(i, basis);
                    self.counts.insert(i, count);
                }
            },
        }
    }

    /// Access the sorted support slice.
    #[must_use]
    pub fn support(&self) -> &[BasisId] {
        &self.bases
    }

    /// Access the raw counts slice (parallel to `support`).
    #[must_use]
    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Iterate over (basis, count) pairs in basis order.
    pub fn iter(&self) -> impl Iterator<Item = (BasisId, f64)> + '_ {
        self.bases.iter().copied().zip(self.counts.iter().copied())
    }

    /// Total observation count over all bases.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Squared L2 norm.
    #[must_use]
    pub fn norm_sq(&self) -> f64 {
        self.counts.iter().map(|c| c * c).sum()
    }

    /// L2 norm (magnitude).
    #[must_use]
    pub fn magnitude(&self) -> f64 {
        self.norm_sq().sqrt()
    }

    /// Dot product with another section vector.
    ///
    /// O(support_a + support_b) merge-join; only bases carrying mass on
    /// both sides contribute.
    #[must_use]
    pub fn dot(&self, other: &SectionVector) -> f64 {
        let mut result = 0.0;
        let mut i = 0;
        let mut j = 0;

        while i < self.bases.len() && j < other.bases.len() {
            match self.bases[i].cmp(&other.bases[j]) {
                std::cmp::Ordering::Equal => {
                    result += self.counts[i] * other.counts[j];
                    i += 1;
                    j += 1;
                },
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
            }
        }

        result
    }

    /// Cosine similarity with another section vector.
    ///
    /// Returns 0.0 when either side has empty support (the angle is
    /// undefined for a zero-length vector).
    #[must_use]
    pub fn cosine_similarity(&self, other: &SectionVector) -> f64 {
        let mag_a = self.magnitude();
        let mag_b = other.magnitude();

        if mag_a == 0.0 || mag_b == 0.0 {
            0.0
        } else {
            self.dot(other) / (mag_a * mag_b)
        }
    }

    /// Co-iterate this vector with another over the union of supports.
    ///
    /// Yields `(basis, left, right)` for every basis carrying mass on at
    /// least one side; the slot of an absent side is `None`. Bases arrive
    /// in sorted order, so the enumeration is consistent across calls on
    /// unchanged vectors.
    #[must_use]
    pub fn paired<'a>(&'a self, other: &'a SectionVector) -> PairedStars<'a> {
        PairedStars {
            left: self,
            right: other,
            i: 0,
            j: 0,
        }
    }

    /// Jaccard index on supports: |intersection| / |union|.
    ///
    /// Structural overlap independent of counts. Both empty counts as
    /// identical structure.
    #[must_use]
    pub fn jaccard_index(&self, other: &SectionVector) -> f64 {
        if self.bases.is_empty() && other.bases.is_empty() {
            return 1.0;
        }
        if self.bases.is_empty() || other.bases.is_empty() {
            return 0.0;
        }

        let intersection = self.intersection_size(other);
        let union = self.bases.len() + other.bases.len() - intersection;
        intersection as f64 / union as f64
    }

    /// Overlap coefficient: |intersection| / min(|support_a|, |support_b|).
    ///
    /// 1.0 when the smaller support is contained in the larger.
    #[must_use]
    pub fn overlap_coefficient(&self, other: &SectionVector) -> f64 {
        if self.bases.is_empty() || other.bases.is_empty() {
            return 0.0;
        }

        let intersection = self.intersection_size(other);
        let min_size = self.bases.len().min(other.bases.len());
        intersection as f64 / min_size as f64
    }

    fn intersection_size(&self, other: &SectionVector) -> usize {
        let mut intersection = 0usize;
        let mut i = 0;
        let mut j = 0;

        while i < self.bases.len() && j < other.bases.len() {
            match self.bases[i].cmp(&other.bases[j]) {
                std::cmp::Ordering::Equal => {
                    intersection += 1;
                    i += 1;
                    j += 1;
                },
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
            }
        }

        intersection
    }
}

/// Paired-star enumeration over the union of two supports.
///
/// Produced by [`SectionVector::paired`]. At most one slot per item is
/// `None`, never both.
pub struct PairedStars<'a> {
    left: &'a SectionVector,
    right: &'a SectionVector,
    i: usize,
    j: usize,
}

impl Iterator for PairedStars<'_> {
    type Item = (BasisId, Option<f64>, Option<f64>);

    fn next(&mut self) -> Option<Self::Item> {
        let left_done = self.i >= self.left.bases.len();
        let right_done = self.j >= self.right.bases.len();

        if left_done && right_done {
            return None;
        }

        if left_done {
            let item = (self.right.bases[self.j], None, Some(self.right.counts[self.j]));
            self.j += 1;
            return Some(item);
        }
        if right_done {
            let item = (self.left.bases[self.i], Some(self.left.counts[self.i]), None);
            self.i += 1;
            return Some(item);
        }

        match self.left.bases[self.i].cmp(&self.right.bases[self.j]) {
            std::cmp::Ordering::Equal => {
                let item = (
                    self.left.bases[self.i],
                    Some(self.left.counts[self.i]),
                    Some(self.right.counts[self.j]),
                );
                self.i += 1;
                self.j += 1;
                Some(item)
            },
            std::cmp::Ordering::Less => {
                let item = (self.left.bases[self.i], Some(self.left.counts[self.i]), None);
                self.i += 1;
                Some(item)
            },
            std::cmp::Ordering::Greater => {
                let item = (self.right.bases[self.j], None, Some(self.right.counts[self.j]));
                self.j += 1;
                Some(item)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(pairs: &[(u64, f64)]) -> SectionVector {
        SectionVector::from_pairs(pairs.iter().map(|&(b, c)| (BasisId(b), c)))
    }

    #[test]
    fn from_pairs_filters_nonpositive() {
        let v = vector(&[(1, 1.0), (2, 0.0), (3, -2.0), (5, 4.0)]);

        assert_eq!(v.support_size(), 2);
        assert_eq!(v.support(), &[BasisId(1), BasisId(5)]);
        assert_eq!(v.counts(), &[1.0, 4.0]);
    }

    #[test]
    fn from_pairs_last_duplicate_wins() {
        let v = vector(&[(3, 1.0), (3, 2.0), (7, 5.0)]);

        assert_eq!(v.support_size(), 2);
        assert_eq!(v.get(BasisId(3)), 2.0);
    }

    #[test]
    fn get_returns_contextual_zero() {
        let v = vector(&[(1, 1.0), (3, 2.0)]);

        assert_eq!(v.get(BasisId(0)), 0.0);
        assert_eq!(v.get(BasisId(1)), 1.0);
        assert_eq!(v.get(BasisId(2)), 0.0);
        assert_eq!(v.get(BasisId(3)), 2.0);
    }

    #[test]
    fn set_removes_nonpositive() {
        let mut v = vector(&[(1, 1.0), (2, 2.0), (3, 3.0)]);

        v.set(BasisId(2), 0.0);
        assert_eq!(v.support_size(), 2);
        assert!(!v.has_basis(BasisId(2)));

        v.set(BasisId(3), -0.5);
        assert_eq!(v.support_size(), 1);
        assert!(!v.has_basis(BasisId(3)));
    }

    #[test]
    fn set_inserts_sorted() {
        let mut v = SectionVector::new();

        v.set(BasisId(9), 1.5);
        v.set(BasisId(2), 2.5);
        v.set(BasisId(5), 3.5);

        assert_eq!(v.support(), &[BasisId(2), BasisId(5), BasisId(9)]);
    }

    #[test]
    fn dot_overlap_only() {
        let a = vector(&[(0, 1.0), (2, 2.0)]);
        let b = vector(&[(1, 3.0), (2, 4.0)]);

        // Only basis 2 overlaps: 2.0 * 4.0
        assert_eq!(a.dot(&b), 8.0);
    }

    #[test]
    fn dot_disjoint_supports() {
        let a = vector(&[(0, 1.0)]);
        let b = vector(&[(3, 2.0)]);

        assert_eq!(a.dot(&b), 0.0);
    }

    #[test]
    fn total_and_norms() {
        let v = vector(&[(0, 3.0), (1, 4.0)]);

        assert_eq!(v.total(), 7.0);
        assert_eq!(v.norm_sq(), 25.0);
        assert_eq!(v.magnitude(), 5.0);
    }

    #[test]
    fn cosine_identical() {
        let a = vector(&[(0, 1.0), (1, 2.0), (2, 3.0)]);
        let b = vector(&[(0, 1.0), (1, 2.0), (2, 3.0)]);

        assert!((a.cosine_similarity(&b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cosine_disjoint_is_zero() {
        let a = vector(&[(0, 1.0)]);
        let b = vector(&[(1, 1.0)]);

        assert!(a.cosine_similarity(&b).abs() < 1e-12);
    }

    #[test]
    fn cosine_empty_side_is_zero() {
        let a = vector(&[(0, 1.0)]);
        let empty = SectionVector::new();

        assert_eq!(a.cosine_similarity(&empty), 0.0);
        assert_eq!(empty.cosine_similarity(&a), 0.0);
    }

    #[test]
    fn paired_covers_union_in_order() {
        let a = vector(&[(1, 1.0), (3, 3.0)]);
        let b = vector(&[(2, 2.0), (3, 4.0), (5, 5.0)]);

        let stars: Vec<_> = a.paired(&b).collect();

        assert_eq!(
            stars,
            vec![
                (BasisId(1), Some(1.0), None),
                (BasisId(2), None, Some(2.0)),
                (BasisId(3), Some(3.0), Some(4.0)),
                (BasisId(5), None, Some(5.0)),
            ]
        );
    }

    #[test]
    fn paired_never_yields_double_none() {
        let a = vector(&[(1, 1.0), (4, 4.0)]);
        let b = vector(&[(2, 2.0)]);

        for (_, left, right) in a.paired(&b) {
            assert!(left.is_some() || right.is_some());
        }
    }

    #[test]
    fn paired_with_empty_side() {
        let a = vector(&[(1, 1.0), (2, 2.0)]);
        let empty = SectionVector::new();

        let stars: Vec<_> = empty.paired(&a).collect();
        assert_eq!(
            stars,
            vec![
                (BasisId(1), None, Some(1.0)),
                (BasisId(2), None, Some(2.0)),
            ]
        );
    }

    #[test]
    fn jaccard_partial_overlap() {
        let a = vector(&[(0, 1.0), (1, 2.0)]);
        let b = vector(&[(1, 3.0), (2, 4.0)]);

        // Intersection {1}, union {0, 1, 2}
        assert!((a.jaccard_index(&b) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn overlap_coefficient_subset() {
        let small = vector(&[(1, 1.0)]);
        let large = vector(&[(0, 1.0), (1, 2.0), (2, 3.0)]);

        assert!((small.overlap_coefficient(&large) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_vector_properties() {
        let v = SectionVector::new();

        assert!(v.is_empty());
        assert_eq!(v.total(), 0.0);
        assert_eq!(v.magnitude(), 0.0);
        assert_eq!(v.jaccard_index(&SectionVector::new()), 1.0);
    }
}
