//! Merge engine: orthogonal and semantic merge policies.
//!
//! Both policies fold two entities into a class entity and reproject the
//! constituents. Counts live in a non-negative space, so any reprojection
//! that would drive a count below zero deletes the pair instead - the clamp
//! that breaks linearity. The merge fraction governs how much mass from
//! unshared bases crosses into the class: 0 keeps the intersection only,
//! 1 takes the full union.

use section_store::SectionVector;

use crate::{EntityId, GramEngine, GramError, Result};

impl GramEngine {
    /// Orthogonal merge: blend `wa` and `wb` into a class, then project
    /// each atomic constituent onto the complement of the class.
    ///
    /// `wa` may be a word or an existing class; `wb` is a word. When `wa`
    /// is a word a new class is minted with both words as members; when it
    /// is a class, `wb` joins it. Returns the class, or `wa` unchanged when
    /// the blended vector carries no mass (nothing is persisted in that
    /// case).
    ///
    /// Three passes, in order: build the class vector, compute the dot
    /// products against the pre-merge constituents, orthogonalize. The
    /// class vector is buffered and committed whole, so no reader observes
    /// a partial build.
    pub fn merge_ortho(&self, wa: EntityId, wb: EntityId) -> Result<EntityId> {
        if wa == wb {
            return Err(GramError::SelfMerge(self.store().display_name(wa)));
        }

        let store = self.store();
        let va = store.vector(wa);
        let vb = store.vector(wb);
        let wa_is_class = store.is_class(wa);
        let wb_is_class = store.is_class(wb);
        let frac = self.config().merge_fraction;

        // Pass 1: blended union. A basis present on both sides contributes
        // in full; a basis present on one side only is attenuated by the
        // merge fraction, unless the lone side belongs to a class - a merge
        // never shrinks a class.
        let mut merged = SectionVector::with_capacity(va.support_size() + vb.support_size());
        for (basis, a, w) in va.paired(&vb) {
            let k = match (a, w) {
                (Some(a), Some(w)) => a + w,
                (Some(a), None) => {
                    if wa_is_class {
                        a
                    } else {
                        frac * a
                    }
                },
                (None, Some(w)) => {
                    if wb_is_class {
                        w
                    } else {
                        frac * w
                    }
                },
                (None, None) => 0.0,
            };
            if k > 0.0 {
                merged.set(basis, k);
            }
        }

        let norm_sq = merged.norm_sq();
        if norm_sq <= 0.0 {
            tracing::debug!(
                left = %store.display_name(wa),
                right = %store.display_name(wb),
                "blended vector is empty, merge is a no-op"
            );
            return Ok(wa);
        }

        let (class, minted) = if wa_is_class {
            (wa, false)
        } else {
            (store.mint_class(wa, wb), true)
        };

        for (basis, k) in merged.iter() {
            store.set_count(class, basis, k)?;
        }

        // Passes 2 and 3: each atomic constituent loses its component along
        // the class. An existing class is not re-projected against itself.
        if !wa_is_class {
            self.orthogonalize(wa, &va, &merged, norm_sq)?;
        }
        self.orthogonalize(wb, &vb, &merged, norm_sq)?;

        if minted {
            store.persist_membership(wa, class)?;
        }
        store.persist_membership(wb, class)?;

        tracing::debug!(
            class = %store.display_name(class),
            minted,
            left = %store.display_name(wa),
            right = %store.display_name(wb),
            class_norm_sq = norm_sq,
            "orthogonal merge complete"
        );

        Ok(class)
    }

    /// Project a constituent onto the complement of the class vector.
    ///
    /// For each basis in the co-iteration of class and constituent, the
    /// residual is `count - u * class_count` with `u = <class, pre> / L2`.
    /// A positive residual is stored; anything else deletes the pair (a
    /// basis the constituent never had yields the same deletion, which is
    /// a no-op).
    fn orthogonalize(
        &self,
        constituent: EntityId,
        pre: &SectionVector,
        class_vec: &SectionVector,
        norm_sq: f64,
    ) -> Result<()> {
        let u = class_vec.dot(pre) / norm_sq;

        for (basis, k, c) in class_vec.paired(pre) {
            let orth = c.unwrap_or(0.0) - u * k.unwrap_or(0.0);
            self.store().set_count(constituent, basis, orth)?;
        }

        Ok(())
    }

    /// Semantic merge: the class takes the overlap, constituents keep what
    /// lies outside it.
    ///
    /// The class vector gains `va(b) + vb(b)` on every basis in the
    /// intersection of supports, and both constituents drop those bases.
    /// With a nonzero merge fraction, the class additionally gains
    /// `frac * (vb - clamp(perp))` where `perp` is the component of `wb`
    /// orthogonal to `wa` and the clamp zeroes its negative entries; that
    /// extra lands only on overlap bases, whose `wb` mass the projection
    /// already surrendered, so it grows the class rather than moving more
    /// mass out of the residual.
    ///
    /// When `wa` is already a class, only `wb` is projected against it.
    /// Returns the class, or `wa` unchanged when the overlap is empty.
    pub fn merge_semantic(&self, wa: EntityId, wb: EntityId) -> Result<EntityId> {
        if wa == wb {
            return Err(GramError::SelfMerge(self.store().display_name(wa)));
        }

        let store = self.store();
        let va = store.vector(wa);
        let vb = store.vector(wb);
        let wa_is_class = store.is_class(wa);
        let frac = self.config().merge_fraction;

        // Overlap projection: bases carrying mass on both sides
        let mut overlap = SectionVector::new();
        for (basis, a, b) in va.paired(&vb) {
            if let (Some(a), Some(b)) = (a, b) {
                overlap.set(basis, a + b);
            }
        }

        if overlap.is_empty() {
            tracing::debug!(
                left = %store.display_name(wa),
                right = %store.display_name(wb),
                "no overlap, semantic merge is a no-op"
            );
            return Ok(wa);
        }

        let (class, minted) = if wa_is_class {
            (wa, false)
        } else {
            (store.mint_class(wa, wb), true)
        };

        // Fractional redistribution of wb's non-orthogonal component
        let mut extra = SectionVector::new();
        let a_norm_sq = va.norm_sq();
        if frac > 0.0 && a_norm_sq > 0.0 {
            let u = vb.dot(&va) / a_norm_sq;
            for (basis, a, b) in va.paired(&vb) {
                let b_count = b.unwrap_or(0.0);
                let perp = b_count - u * a.unwrap_or(0.0);
                let surrendered = frac * (b_count - perp.max(0.0));
                if surrendered > 0.0 {
                    extra.set(basis, surrendered);
                }
            }
        }

        for (basis, sum) in overlap.iter() {
            store.set_count(class, basis, sum + extra.get(basis))?;
            if !wa_is_class {
                store.set_count(wa, basis, 0.0)?;
            }
            store.set_count(wb, basis, 0.0)?;
        }

        if minted {
            store.persist_membership(wa, class)?;
        }
        store.persist_membership(wb, class)?;

        tracing::debug!(
            class = %store.display_name(class),
            minted,
            overlap_bases = overlap.support_size(),
            "semantic merge complete"
        );

        Ok(class)
    }
}
