//! Relations and induced part membership.

use tracing::debug;

use stratamesh_foundation::{
    ConnectivityOrdinal, Entity, EntityKey, EntityRank, Error, ErrorContext, ErrorKind,
    OrdinalSet, PartOrdinal, Permutation, Result,
};
use stratamesh_storage::SlotConnectivity;

use crate::bulk::BulkData;

/// One relation of a batch passed to [`BulkData::declare_relations`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RelationSpec {
    /// The other endpoint.
    pub target: Entity,
    /// Relation ordinal.
    pub ordinal: ConnectivityOrdinal,
    /// Relation permutation.
    pub permutation: Permutation,
}

impl RelationSpec {
    /// Creates a spec without a permutation.
    #[must_use]
    pub fn new(target: Entity, ordinal: ConnectivityOrdinal) -> Self {
        Self {
            target,
            ordinal,
            permutation: Permutation::INVALID,
        }
    }

    /// Sets the permutation.
    #[must_use]
    pub fn with_permutation(mut self, permutation: Permutation) -> Self {
        self.permutation = permutation;
        self
    }
}

impl BulkData {
    fn check_relation(&self, action: &'static str, from: Entity, to: Entity) -> Result<()> {
        self.require_valid(from)?;
        self.require_valid(to)?;
        let from_key = self.entity_key(from);
        let to_key = self.entity_key(to);
        if from_key.rank() <= to_key.rank() {
            return Err(Error::new(ErrorKind::InvalidRelation {
                action,
                from: from_key,
                to: to_key,
                reason: "source rank must exceed target rank",
            }));
        }
        if !self.connectivity.tracks(from_key.rank(), to_key.rank()) {
            return Err(Error::new(ErrorKind::ConnectivityNotTracked {
                from: from_key.rank(),
                to: to_key.rank(),
            }));
        }
        Ok(())
    }

    fn inverse_error(&self, from: Entity, to: Entity, ordinal: ConnectivityOrdinal) -> Error {
        Error::new(ErrorKind::InverseRelation {
            from: self.entity_key(from),
            to: self.entity_key(to),
            ordinal,
        })
    }

    /// Declares a relation from a higher-rank entity to a lower-rank one.
    ///
    /// The back-relation is recorded too when the connectivity map tracks
    /// it. Both endpoints are marked modified, and `to` gains every part of
    /// `from` that induces onto its rank. Redeclaring an existing relation
    /// only refreshes induced membership.
    ///
    /// # Errors
    ///
    /// Returns an error outside a modification cycle, for a destroyed
    /// endpoint, if `from` does not outrank `to`, if the map does not track
    /// the rank pair, or if `ordinal` already targets a different entity.
    pub fn declare_relation(
        &mut self,
        from: Entity,
        to: Entity,
        ordinal: ConnectivityOrdinal,
        permutation: Permutation,
    ) -> Result<()> {
        self.require_ok_to_modify("declare_relation")?;
        self.check_relation("declare", from, to)?;
        let from_rank = self.entity_rank(from);
        let to_rank = self.entity_rank(to);

        if let Some(existing) = self
            .slot(from, to_rank)
            .and_then(|s| s.targets_at(ordinal).find(|&t| t != to))
        {
            return Err(Error::new(ErrorKind::DegenerateRelation {
                from: self.entity_key(from),
                ordinal,
                existing: self.entity_key(existing),
                requested: self.entity_key(to),
            }));
        }

        let added = self
            .slot_mut(from, to_rank)
            .ok_or_else(|| Error::internal(format!("{from:?} has no connectivity slot")))?
            .add(to, ordinal, permutation);

        if added {
            if self.connectivity.tracks(to_rank, from_rank) {
                let mirrored = self
                    .slot_mut(to, from_rank)
                    .is_some_and(|s| s.add(from, ordinal, permutation));
                debug_assert!(mirrored, "back-relation already present");
                if !mirrored {
                    return Err(self.inverse_error(from, to, ordinal));
                }
            }
            self.mark_modified(to);
            self.mark_modified(from);
            debug!(
                from = %self.entity_key(from),
                to = %self.entity_key(to),
                ordinal,
                "declared relation"
            );
        }

        let induced = self.inducing_parts(from, to_rank);
        self.add_induced_parts(to, &induced);
        self.refresh_membership(to)?;
        Ok(())
    }

    /// Declares several relations of one entity.
    ///
    /// Each pair is oriented so that the higher-rank entity is the source.
    ///
    /// # Errors
    ///
    /// Returns the first error of [`BulkData::declare_relation`], or
    /// [`ErrorKind::InvalidRelation`] for a same-rank pair. Relations
    /// declared before the failure stay declared.
    pub fn declare_relations(&mut self, entity: Entity, relations: &[RelationSpec]) -> Result<()> {
        self.require_ok_to_modify("declare_relations")?;
        self.require_valid(entity)?;
        let rank = self.entity_rank(entity);
        for spec in relations {
            self.require_valid(spec.target)?;
            let target_rank = self.entity_rank(spec.target);
            let (from, to) = match target_rank.cmp(&rank) {
                std::cmp::Ordering::Less => (entity, spec.target),
                std::cmp::Ordering::Greater => (spec.target, entity),
                std::cmp::Ordering::Equal => {
                    return Err(Error::new(ErrorKind::InvalidRelation {
                        action: "declare",
                        from: self.entity_key(entity),
                        to: self.entity_key(spec.target),
                        reason: "entities have the same rank",
                    }));
                }
            };
            self.declare_relation(from, to, spec.ordinal, spec.permutation)?;
        }
        Ok(())
    }

    /// Destroys a relation and its back-relation.
    ///
    /// If no other relation of `from` still targets `to`, the parts `from`
    /// induced are dropped from `to` unless another higher-rank entity still
    /// induces them. On a shared `to` the drop waits for
    /// `modification_end`. Returns `false` if the relation did not exist.
    ///
    /// # Errors
    ///
    /// Returns the same precondition errors as
    /// [`BulkData::declare_relation`].
    pub fn destroy_relation(
        &mut self,
        from: Entity,
        to: Entity,
        ordinal: ConnectivityOrdinal,
    ) -> Result<bool> {
        self.require_ok_to_modify("destroy_relation")?;
        self.check_relation("destroy", from, to)
            .map_err(|e| e.with_context(ErrorContext::new().with_operation("destroy_relation")))?;
        self.internal_destroy_relation(from, to, ordinal)
    }

    pub(crate) fn internal_destroy_relation(
        &mut self,
        from: Entity,
        to: Entity,
        ordinal: ConnectivityOrdinal,
    ) -> Result<bool> {
        let from_rank = self.entity_rank(from);
        let to_rank = self.entity_rank(to);

        let removed = self
            .slot_mut(from, to_rank)
            .is_some_and(|s| s.remove(to, ordinal));
        if !removed {
            return Ok(false);
        }
        if self.connectivity.tracks(to_rank, from_rank) {
            let mirrored = self
                .slot_mut(to, from_rank)
                .is_some_and(|s| s.remove(from, ordinal));
            debug_assert!(mirrored, "back-relation missing");
            if !mirrored {
                return Err(self.inverse_error(from, to, ordinal));
            }
        }
        self.mark_modified(to);
        self.mark_modified(from);

        let still_related = self
            .slot(from, to_rank)
            .is_some_and(|s| s.targets().contains(&to));
        if !still_related {
            let induced = self.inducing_parts(from, to_rank);
            self.remove_induced_parts(to, &induced);
            self.refresh_membership(to)?;
        }
        debug!(
            from = %self.entity_key(from),
            to = %self.entity_key(to),
            ordinal,
            "destroyed relation"
        );
        Ok(true)
    }

    // =========================================================================
    // Induced Parts
    // =========================================================================

    /// Parts of `from` that induce onto `to_rank` entities.
    fn inducing_parts(&self, from: Entity, to_rank: EntityRank) -> OrdinalSet<PartOrdinal> {
        let from_rank = self.entity_rank(from);
        self.signature(from)
            .map(|s| self.induced_subset(s.parts(), from_rank, to_rank))
            .unwrap_or_default()
    }

    fn induced_subset(
        &self,
        parts: &[PartOrdinal],
        from_rank: EntityRank,
        to_rank: EntityRank,
    ) -> OrdinalSet<PartOrdinal> {
        parts
            .iter()
            .copied()
            .filter(|&p| {
                self.meta
                    .part(p)
                    .is_some_and(|part| part.induces(from_rank, to_rank))
            })
            .collect()
    }

    /// Higher-rank entities of `from_rank` that relate to `to`.
    ///
    /// Uses the back-relations when they are tracked and scans the
    /// `from_rank` buckets otherwise.
    pub(crate) fn upward_sources(&self, to: Entity, from_rank: EntityRank) -> Vec<Entity> {
        let to_rank = self.entity_rank(to);
        if self.connectivity.tracks(to_rank, from_rank) {
            return self
                .slot(to, from_rank)
                .map(|s| {
                    let mut sources = s.targets().to_vec();
                    sources.dedup();
                    sources
                })
                .unwrap_or_default();
        }
        if !self.connectivity.tracks(from_rank, to_rank) {
            return Vec::new();
        }

        let mut sources = Vec::new();
        for bucket in self.buckets.buckets(from_rank) {
            for (ordinal, &source) in bucket.entities().iter().enumerate() {
                if bucket
                    .connectivity(ordinal, to_rank)
                    .is_some_and(|s| s.targets().contains(&to))
                {
                    sources.push(source);
                }
            }
        }
        sources
    }

    /// Parts induced on `to` by its surviving relations.
    fn induced_from_relations(&self, to: Entity) -> OrdinalSet<PartOrdinal> {
        let to_rank = self.entity_rank(to);
        let mut kept = OrdinalSet::new();
        for r in (to_rank.index() + 1)..self.meta.rank_count() {
            let from_rank = EntityRank::from_index(r);
            for source in self.upward_sources(to, from_rank) {
                if self.entities.is_valid(source) {
                    kept.extend_from(&self.inducing_parts(source, to_rank));
                }
            }
        }
        kept
    }

    /// Adds induced parts and withdraws any deferred removal of them.
    pub(crate) fn add_induced_parts(&mut self, to: Entity, parts: &OrdinalSet<PartOrdinal>) {
        if parts.is_empty() {
            return;
        }
        self.membership.slot_mut(to).induced_mut().extend_from(parts);
        if let Some(pending) = self.deferred_induced.get_mut(&to) {
            for &part in parts.iter() {
                pending.remove(part);
            }
            if pending.is_empty() {
                self.deferred_induced.remove(&to);
            }
        }
    }

    /// Drops induced parts no surviving relation still induces.
    ///
    /// Shared entities keep the parts until `modification_end`, where every
    /// sharer's view is reconciled.
    pub(crate) fn remove_induced_parts(&mut self, to: Entity, parts: &OrdinalSet<PartOrdinal>) {
        if parts.is_empty() {
            return;
        }
        let kept = self.induced_from_relations(to);
        let lost = parts.difference(&kept);
        if lost.is_empty() {
            return;
        }

        let key = self.entity_key(to);
        if self.comm_list.is_shared(key) {
            debug!(%key, ?lost, "deferred induced part removal");
            self.deferred_induced
                .entry(to)
                .or_default()
                .extend_from(&lost);
            return;
        }
        let induced = self.membership.slot_mut(to).induced_mut();
        for &part in lost.iter() {
            induced.remove(part);
        }
    }

    /// Pushes a change of `entity`'s parts down to the entities it relates
    /// to.
    pub(crate) fn propagate_induced_parts(
        &mut self,
        entity: Entity,
        gained: &OrdinalSet<PartOrdinal>,
        lost: &OrdinalSet<PartOrdinal>,
    ) -> Result<()> {
        let rank = self.entity_rank(entity);
        for r in 0..rank.index() {
            let to_rank = EntityRank::from_index(r);
            let gained_here = self.induced_subset(gained, rank, to_rank);
            let lost_here = self.induced_subset(lost, rank, to_rank);
            if gained_here.is_empty() && lost_here.is_empty() {
                continue;
            }

            let mut targets = self.related_entities(entity, to_rank).to_vec();
            targets.sort_unstable();
            targets.dedup();
            for target in targets {
                if !self.entities.is_valid(target) {
                    continue;
                }
                self.add_induced_parts(target, &gained_here);
                self.remove_induced_parts(target, &lost_here);
                self.refresh_membership(target)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Returns the relations of `entity` to `rank` entities.
    #[must_use]
    pub fn connectivity(&self, entity: Entity, rank: EntityRank) -> Option<&SlotConnectivity> {
        self.slot(entity, rank)
    }

    /// Returns the `rank` entities related to `entity`, in ordinal order.
    #[must_use]
    pub fn related_entities(&self, entity: Entity, rank: EntityRank) -> &[Entity] {
        self.slot(entity, rank).map_or(&[], SlotConnectivity::targets)
    }

    /// Returns the ordinals of the relations to `rank` entities.
    #[must_use]
    pub fn relation_ordinals(&self, entity: Entity, rank: EntityRank) -> &[ConnectivityOrdinal] {
        self.slot(entity, rank).map_or(&[], SlotConnectivity::ordinals)
    }

    /// Returns the permutations of the relations to `rank` entities.
    #[must_use]
    pub fn relation_permutations(&self, entity: Entity, rank: EntityRank) -> &[Permutation] {
        self.slot(entity, rank)
            .map_or(&[], SlotConnectivity::permutations)
    }

    /// Returns the number of relations to `rank` entities.
    #[must_use]
    pub fn num_connectivity(&self, entity: Entity, rank: EntityRank) -> usize {
        self.slot(entity, rank).map_or(0, SlotConnectivity::len)
    }

    /// Returns the number of relations of every rank.
    #[must_use]
    pub fn count_relations(&self, entity: Entity) -> usize {
        (0..self.meta.rank_count())
            .map(|r| self.num_connectivity(entity, EntityRank::from_index(r)))
            .sum()
    }

    /// Returns true if the entity has no relations of any rank.
    #[must_use]
    pub fn has_no_relations(&self, entity: Entity) -> bool {
        self.count_relations(entity) == 0
    }

    /// Counts relations to `rank` entities whose target is still valid.
    ///
    /// Forward-only connectivity can hold handles to entities destroyed
    /// while the relation stood; those are skipped.
    #[must_use]
    pub fn count_valid_connectivity(&self, entity: Entity, rank: EntityRank) -> usize {
        self.related_entities(entity, rank)
            .iter()
            .filter(|&&t| self.entities.is_valid(t))
            .count()
    }

    /// Counts valid relations of every rank.
    #[must_use]
    pub fn count_all_valid_connectivity(&self, entity: Entity) -> usize {
        (0..self.meta.rank_count())
            .map(|r| self.count_valid_connectivity(entity, EntityRank::from_index(r)))
            .sum()
    }

    /// Returns the keys of the `rank` entities related to `entity`.
    #[must_use]
    pub fn related_keys(&self, entity: Entity, rank: EntityRank) -> Vec<EntityKey> {
        self.related_entities(entity, rank)
            .iter()
            .map(|&e| self.entity_key(e))
            .collect()
    }
}
