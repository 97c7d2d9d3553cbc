//! The modification-cycle controller.
//!
//! `BulkData` owns every per-process structure of a mesh: the entity table,
//! the key repository, the buckets and their field storage, the comm list,
//! and the ghostings. All mutation goes through it, and only between
//! `modification_begin` and `modification_end`.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use bytemuck::Pod;
use tracing::{debug, info, instrument};

use stratamesh_foundation::{
    ConnectivityOrdinal, Entity, EntityId, EntityKey, EntityRank, EntityState, Error,
    ErrorContext, ErrorKind, FieldOrdinal, GhostingOrdinal, OrdinalSet, PartOrdinal, ProcRank,
    Result,
};
use stratamesh_parallel::{
    DistributedIndex, EntityCommList, Ghosting, ParallelMachine, SerialDistributedIndex,
    SerialMachine,
};
use stratamesh_storage::{
    Bucket, BucketRepository, ConnectivityMap, EntityRepository, EntityTable, MeshIndex, MetaData,
    PartSignature, Relocation, SlotConnectivity,
};

use crate::config::BulkDataConfig;
use crate::membership::{MembershipTable, PartMembership};

/// Whether local mutation is currently legal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SyncState {
    /// Inside a modification cycle.
    Modifiable,
    /// Between cycles; every process agrees on ownership and sharing.
    Synchronized,
}

/// The per-process mesh database.
///
/// Each process of an SPMD run owns one `BulkData`. Processes exchange
/// nothing directly; every cross-process decision goes through the
/// [`ParallelMachine`] and [`DistributedIndex`] collaborators at the
/// collective points `modification_begin` and `modification_end`.
#[derive(Debug)]
pub struct BulkData {
    pub(crate) meta: MetaData,
    pub(crate) config: BulkDataConfig,
    pub(crate) connectivity: ConnectivityMap,
    pub(crate) entities: EntityTable,
    pub(crate) repository: EntityRepository,
    pub(crate) buckets: BucketRepository,
    pub(crate) membership: MembershipTable,
    pub(crate) comm_list: EntityCommList,
    pub(crate) ghostings: Vec<Ghosting>,
    pub(crate) machine: Box<dyn ParallelMachine>,
    pub(crate) index: Box<dyn DistributedIndex>,
    /// Induced parts of shared entities whose removal waits for the
    /// end-of-cycle reconciliation.
    pub(crate) deferred_induced: BTreeMap<Entity, OrdinalSet<PartOrdinal>>,
    pub(crate) sync_count: u64,
    state: SyncState,
    meta_data_verified: bool,
    finalized: bool,
}

impl BulkData {
    /// Creates a single-process mesh with the default configuration.
    #[must_use]
    pub fn new(meta: MetaData) -> Self {
        Self::with_config(meta, BulkDataConfig::default())
    }

    /// Creates a single-process mesh.
    #[must_use]
    pub fn with_config(meta: MetaData, config: BulkDataConfig) -> Self {
        Self::with_collaborators(
            meta,
            config,
            Box::new(SerialMachine),
            Box::new(SerialDistributedIndex::new()),
        )
    }

    /// Creates a mesh distributed over `machine`, with global key
    /// bookkeeping delegated to `index`.
    #[must_use]
    pub fn with_collaborators(
        meta: MetaData,
        config: BulkDataConfig,
        machine: Box<dyn ParallelMachine>,
        index: Box<dyn DistributedIndex>,
    ) -> Self {
        let rank_count = meta.rank_count();
        let ghostings = vec![
            Ghosting::new("shared", GhostingOrdinal::SHARED, 0),
            Ghosting::new("shared_aura", GhostingOrdinal::SHARED_AURA, 0),
        ];

        Self {
            connectivity: config.connectivity_map(rank_count),
            entities: EntityTable::new(config.maintain_aux_tables),
            repository: EntityRepository::new(),
            buckets: BucketRepository::new(rank_count, config.bucket_capacity),
            membership: MembershipTable::default(),
            comm_list: EntityCommList::new(),
            ghostings,
            machine,
            index,
            deferred_induced: BTreeMap::new(),
            sync_count: 0,
            state: SyncState::Synchronized,
            meta_data_verified: false,
            finalized: false,
            meta,
            config,
        }
    }

    /// Returns the mesh metadata.
    #[must_use]
    pub fn meta_data(&self) -> &MetaData {
        &self.meta
    }

    /// Returns the metadata for further declarations.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::MetaDataCommitted`] once the first modification
    /// cycle has begun.
    pub fn meta_data_mut(&mut self) -> Result<&mut MetaData> {
        if self.meta.is_committed() {
            return Err(Error::new(ErrorKind::MetaDataCommitted));
        }
        Ok(&mut self.meta)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BulkDataConfig {
        &self.config
    }

    /// Returns the connectivity map in effect.
    #[must_use]
    pub fn connectivity_map(&self) -> &ConnectivityMap {
        &self.connectivity
    }

    /// Returns the rank of this process.
    #[must_use]
    pub fn parallel_rank(&self) -> ProcRank {
        self.machine.rank()
    }

    /// Returns the number of processes.
    #[must_use]
    pub fn parallel_size(&self) -> usize {
        self.machine.size()
    }

    /// Returns the number of completed `modification_begin` increments.
    #[must_use]
    pub fn synchronized_count(&self) -> u64 {
        self.sync_count
    }

    /// Returns the current state.
    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        self.state
    }

    /// Returns true inside a modification cycle.
    #[must_use]
    pub fn in_modifiable_state(&self) -> bool {
        self.state == SyncState::Modifiable
    }

    /// Returns true between modification cycles.
    #[must_use]
    pub fn in_synchronized_state(&self) -> bool {
        self.state == SyncState::Synchronized
    }

    /// Returns true once [`BulkData::finalize`] has run.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Returns the dense per-offset entity arrays.
    #[must_use]
    pub fn entity_table(&self) -> &EntityTable {
        &self.entities
    }

    /// Returns the key repository.
    #[must_use]
    pub fn entity_repository(&self) -> &EntityRepository {
        &self.repository
    }

    /// Returns the buckets and their field storage.
    #[must_use]
    pub fn bucket_repository(&self) -> &BucketRepository {
        &self.buckets
    }

    /// Returns the distributed index.
    #[must_use]
    pub fn distributed_index(&self) -> &dyn DistributedIndex {
        self.index.as_ref()
    }

    // =========================================================================
    // Modification Cycle
    // =========================================================================

    /// Opens a modification cycle.
    ///
    /// Collective: every process must call it. The first call commits the
    /// metadata and verifies that every process declared the same metadata.
    /// Later calls advance the sync count and reset every entity to
    /// [`EntityState::Unchanged`].
    ///
    /// Returns `false` without effect if a cycle is already open.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::MeshFinalized`] after [`BulkData::finalize`], or
    /// a collective error from the machine.
    #[instrument(skip(self))]
    pub fn modification_begin(&mut self) -> Result<bool> {
        self.machine.barrier()?;

        if self.finalized {
            return Err(Error::new(ErrorKind::MeshFinalized)
                .with_context(ErrorContext::new().with_operation("modification_begin")));
        }
        if self.state == SyncState::Modifiable {
            return Ok(false);
        }

        if self.meta_data_verified {
            self.sync_count += 1;
            self.entities.reset_states();
        } else {
            self.meta.commit();
            if self.machine.size() > 1 {
                self.machine.verify_consistent(self.meta.fingerprint())?;
            }
            self.meta_data_verified = true;
        }

        self.state = SyncState::Modifiable;
        info!(sync_count = self.sync_count, "modification cycle began");
        Ok(true)
    }

    /// Closes the modification cycle.
    ///
    /// Collective: resolves ownership and sharing of every created or
    /// modified entity through the distributed index, reconciles deferred
    /// induced-part removals, erases stale comm entries, renumbers buckets,
    /// and releases the offsets destroyed this cycle for reuse.
    ///
    /// Returns `false` without effect if no cycle is open.
    ///
    /// # Errors
    ///
    /// Returns a collective error from the distributed index, or an
    /// internal error if storage is inconsistent.
    #[instrument(skip(self))]
    pub fn modification_end(&mut self) -> Result<bool> {
        if self.state == SyncState::Synchronized {
            return Ok(false);
        }

        self.resolve_ownership_and_sharing()?;
        self.resolve_deferred_induced_parts()?;

        let erased = self.comm_list.erase_stale();
        self.internal_sort_buckets()?;
        self.entities.update_deleted_entities_container();

        self.state = SyncState::Synchronized;
        info!(
            sync_count = self.sync_count,
            erased,
            entities = self.entities.len(),
            "modification cycle ended"
        );
        Ok(true)
    }

    /// Permanently freezes the mesh.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotSynchronized`] inside a modification cycle.
    pub fn finalize(&mut self) -> Result<()> {
        if self.state == SyncState::Modifiable {
            return Err(Error::new(ErrorKind::NotSynchronized)
                .with_context(ErrorContext::new().with_operation("finalize")));
        }
        self.finalized = true;
        info!(sync_count = self.sync_count, "mesh finalized");
        Ok(())
    }

    fn internal_sort_buckets(&mut self) -> Result<()> {
        for r in 0..self.meta.rank_count() {
            let rank = EntityRank::from_index(r);
            if self.config.optimize_buckets {
                for relocation in self.buckets.optimize_buckets(&self.meta, rank)? {
                    self.apply_relocation(relocation);
                }
            }
            for relocation in self.buckets.sync_bucket_ids(rank) {
                self.apply_relocation(relocation);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Preconditions
    // =========================================================================

    pub(crate) fn require_ok_to_modify(&self, operation: &'static str) -> Result<()> {
        if self.state == SyncState::Modifiable {
            Ok(())
        } else {
            Err(Error::not_modifiable(operation))
        }
    }

    pub(crate) fn require_synchronized(&self, operation: &'static str) -> Result<()> {
        if self.state == SyncState::Synchronized {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::NotSynchronized)
                .with_context(ErrorContext::new().with_operation(operation)))
        }
    }

    pub(crate) fn require_valid(&self, entity: Entity) -> Result<()> {
        if self.entities.is_valid(entity) {
            Ok(())
        } else {
            Err(Error::destroyed_entity(entity))
        }
    }

    pub(crate) fn require_entity_owner(&self, entity: Entity, owner: ProcRank) -> Result<()> {
        let actual = self.entities.owner(entity);
        if actual == owner {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::OwnerMismatch {
                key: self.entities.key(entity),
                owner: actual,
                expected: owner,
            }))
        }
    }

    pub(crate) fn require_good_rank_and_id(&self, rank: EntityRank, id: EntityId) -> Result<()> {
        self.meta.check_rank(rank, id)?;
        if EntityKey::is_valid_id(id) {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::BadId(id)))
        }
    }

    /// Resolves caller-supplied parts. Reserved parts are rejected except
    /// the universal part, which every entity carries anyway.
    pub(crate) fn validate_user_parts(
        &self,
        rank: EntityRank,
        parts: &[PartOrdinal],
        check_rank: bool,
    ) -> Result<OrdinalSet<PartOrdinal>> {
        let mut validated = OrdinalSet::new();
        for &ordinal in parts {
            let part = self.meta.part_or_err(ordinal)?;
            if ordinal == PartOrdinal::UNIVERSAL {
                continue;
            }
            if ordinal.is_reserved() {
                return Err(Error::new(ErrorKind::ReservedPart(part.name().to_string())));
            }
            if check_rank {
                if let Some(primary) = part.primary_rank() {
                    if primary.index() < rank.index() {
                        return Err(Error::new(ErrorKind::RankMismatch {
                            what: format!("part {}", part.name()),
                            expected: primary,
                            actual: rank,
                        }));
                    }
                }
            }
            validated.insert(ordinal);
        }
        Ok(validated)
    }

    // =========================================================================
    // Entity Lifecycle
    // =========================================================================

    /// Declares an entity owned by this process, or adds parts to an
    /// existing one.
    ///
    /// New entities belong to the universal and locally owned parts plus
    /// `parts` and their supersets.
    ///
    /// # Errors
    ///
    /// Returns an error outside a modification cycle, for a bad rank or id,
    /// for reserved, unknown, or lower-rank parts, or if an existing entity
    /// is owned by another process.
    pub fn declare_entity(
        &mut self,
        rank: EntityRank,
        id: EntityId,
        parts: &[PartOrdinal],
    ) -> Result<Entity> {
        self.require_ok_to_modify("declare_entity")?;
        self.require_good_rank_and_id(rank, id)?;
        let key = EntityKey::new(rank, id);
        let add = self
            .validate_user_parts(rank, parts, true)
            .map_err(|e| e.with_context(ErrorContext::new().with_key(key)))?;
        let local = self.parallel_rank();

        if let Some(existing) = self.repository.get(key) {
            self.require_entity_owner(existing, local)?;
            self.internal_change_entity_parts(existing, &add, &OrdinalSet::new())?;
            return Ok(existing);
        }

        let mut explicit = add;
        explicit.insert(PartOrdinal::LOCALLY_OWNED);
        let (entity, _) = self.internal_create_entity(key, local, explicit);
        Ok(entity)
    }

    /// Creates `key` if absent, with `owner` and the given explicit parts.
    /// Returns the handle and whether it was created.
    pub(crate) fn internal_create_entity(
        &mut self,
        key: EntityKey,
        owner: ProcRank,
        explicit: OrdinalSet<PartOrdinal>,
    ) -> (Entity, bool) {
        let sync_count = self.sync_count;
        let entities = &mut self.entities;
        let (entity, created) = self
            .repository
            .create(key, || entities.allocate(key, owner, sync_count));
        if !created {
            return (entity, false);
        }

        self.membership.reset(entity, explicit);
        let signature = self.compute_signature(entity);
        let index = self
            .buckets
            .add_entity(&self.meta, entity, key.rank(), &signature);
        self.entities.set_mesh_index(entity, index);
        debug!(%key, ?entity, owner, "declared entity");
        (entity, true)
    }

    /// Creates locally owned entities with globally unique keys.
    ///
    /// `requests[rank]` is the number of entities wanted of each rank. The
    /// returned handles are grouped by rank in request order.
    ///
    /// # Errors
    ///
    /// Returns an error outside a modification cycle, if the request names a
    /// rank past the rank count, if the index fails, or if a generated key is
    /// already active locally.
    pub fn generate_new_entities(&mut self, requests: &[usize]) -> Result<Vec<Entity>> {
        self.require_ok_to_modify("generate_new_entities")?;
        if requests.len() > self.meta.rank_count() {
            let rank = EntityRank::from_index(requests.len() - 1);
            return Err(Error::new(ErrorKind::BadRank { rank, id: 0 }));
        }

        let batches = self.index.generate_new_keys(requests)?;
        let local = self.parallel_rank();
        let mut created = Vec::with_capacity(requests.iter().sum());
        for key in batches.into_iter().flatten() {
            self.require_good_rank_and_id(key.rank(), key.id())?;
            if self.repository.get(key).is_some() {
                return Err(Error::new(ErrorKind::KeyAlreadyUsed(key)));
            }
            let explicit: OrdinalSet<PartOrdinal> = [PartOrdinal::LOCALLY_OWNED].into_iter().collect();
            let (entity, _) = self.internal_create_entity(key, local, explicit);
            created.push(entity);
        }
        debug!(count = created.len(), "generated entities");
        Ok(created)
    }

    /// Changes the identifier of an entity. Serial only.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::SerialOnly`] on more than one process, and an
    /// error outside a modification cycle, for a bad id, a destroyed entity,
    /// or a key already in use.
    pub fn change_entity_id(&mut self, id: EntityId, entity: Entity) -> Result<()> {
        if self.machine.size() > 1 {
            return Err(Error::new(ErrorKind::SerialOnly("change_entity_id")));
        }
        self.require_ok_to_modify("change_entity_id")?;
        self.require_valid(entity)?;
        let old_key = self.entities.key(entity);
        self.require_good_rank_and_id(old_key.rank(), id)?;

        let new_key = EntityKey::new(old_key.rank(), id);
        self.repository.update_key(old_key, new_key, entity)?;
        self.entities.set_key(entity, new_key);
        self.mark_modified(entity);
        debug!(%old_key, %new_key, "changed entity id");
        Ok(())
    }

    /// Destroys an entity and its downward relations.
    ///
    /// The entity leaves its bucket and the repository immediately; its
    /// offset becomes reusable after `modification_end`. Returns `false`
    /// without effect if the entity is already invalid or a higher-rank
    /// entity still relates to it.
    ///
    /// # Errors
    ///
    /// Returns an error outside a modification cycle, or an internal error
    /// if a mirrored relation is missing.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<bool> {
        self.require_ok_to_modify("destroy_entity")?;
        if !self.entities.is_valid(entity) {
            return Ok(false);
        }

        let key = self.entities.key(entity);
        let rank_count = self.meta.rank_count();
        // Untracked back-relations are found by scanning the higher rank.
        for r in (key.rank().index() + 1)..rank_count {
            if !self.upward_sources(entity, EntityRank::from_index(r)).is_empty() {
                debug!(%key, "entity still has upward relations");
                return Ok(false);
            }
        }

        for r in (0..key.rank().index()).rev() {
            let to_rank = EntityRank::from_index(r);
            let relations: Vec<(Entity, ConnectivityOrdinal)> = self
                .slot(entity, to_rank)
                .map(|s| s.iter().map(|(target, ordinal, _)| (target, ordinal)).collect())
                .unwrap_or_default();
            for (target, ordinal) in relations.into_iter().rev() {
                if self.entities.is_valid(target) {
                    self.internal_destroy_relation(entity, target, ordinal)?;
                }
            }
        }

        // The comm entry keeps its sorted position until cycle end.
        self.comm_list.invalidate(key);
        self.index.register_removed_key(key);
        self.deferred_induced.remove(&entity);

        let index = self.mesh_index_or_err(entity)?;
        if let Some(relocation) = self.buckets.remove_entity(&self.meta, key.rank(), index)? {
            self.apply_relocation(relocation);
        }
        self.repository.destroy(key, entity);
        self.entities.release(entity);
        self.membership.clear(entity);
        debug!(%key, ?entity, "destroyed entity");
        Ok(true)
    }

    // =========================================================================
    // Part Membership
    // =========================================================================

    /// Adds and removes explicit parts of a locally owned entity.
    ///
    /// Supersets follow automatically. Induced membership of lower-rank
    /// neighbours is updated: gained parts always, lost parts only on
    /// neighbours that are not shared (shared ones wait for
    /// `modification_end`). Removing a part that is only induced, or implied
    /// by a remaining subset, has no effect.
    ///
    /// # Errors
    ///
    /// Returns an error outside a modification cycle, for a destroyed or
    /// remotely owned entity, or for reserved, unknown, or lower-rank parts.
    pub fn change_entity_parts(
        &mut self,
        entity: Entity,
        add: &[PartOrdinal],
        remove: &[PartOrdinal],
    ) -> Result<()> {
        self.require_ok_to_modify("change_entity_parts")?;
        self.require_valid(entity)?;
        self.require_entity_owner(entity, self.parallel_rank())?;
        let rank = self.entity_rank(entity);
        let add = self.validate_user_parts(rank, add, true)?;
        let remove = self.validate_user_parts(rank, remove, false)?;
        self.internal_change_entity_parts(entity, &add, &remove)
    }

    /// Changes explicit parts without validation. Reserved parts allowed.
    pub(crate) fn internal_change_entity_parts(
        &mut self,
        entity: Entity,
        add: &OrdinalSet<PartOrdinal>,
        remove: &OrdinalSet<PartOrdinal>,
    ) -> Result<()> {
        {
            let explicit = self.membership.slot_mut(entity).explicit_mut();
            explicit.extend_from(add);
            for &part in remove {
                explicit.remove(part);
            }
        }
        if let Some((gained, lost)) = self.refresh_membership(entity)? {
            self.propagate_induced_parts(entity, &gained, &lost)?;
        }
        Ok(())
    }

    fn compute_signature(&self, entity: Entity) -> PartSignature {
        let mut parts = self
            .membership
            .get(entity)
            .map(PartMembership::union)
            .unwrap_or_default();
        self.meta.add_supersets(&mut parts);
        PartSignature::new(parts).with_part(PartOrdinal::UNIVERSAL)
    }

    /// Moves `entity` to the bucket matching its membership.
    ///
    /// Returns the parts gained and lost, or `None` if the signature did not
    /// change.
    pub(crate) fn refresh_membership(
        &mut self,
        entity: Entity,
    ) -> Result<Option<(OrdinalSet<PartOrdinal>, OrdinalSet<PartOrdinal>)>> {
        let rank = self.entity_rank(entity);
        let from = self.mesh_index_or_err(entity)?;
        let old = self
            .buckets
            .bucket(rank, from.bucket_id)
            .map(|b| b.signature().clone())
            .ok_or_else(|| Error::internal(format!("{entity:?} has no bucket")))?;
        let new = self.compute_signature(entity);
        if old == new {
            return Ok(None);
        }

        let (to, moved) = self
            .buckets
            .change_entity_bucket(&self.meta, entity, rank, from, &new)?;
        self.entities.set_mesh_index(entity, to);
        if let Some(relocation) = moved {
            self.apply_relocation(relocation);
        }
        self.mark_modified(entity);

        let gained = new.as_set().difference(old.as_set());
        let lost = old.as_set().difference(new.as_set());
        Ok(Some((gained, lost)))
    }

    /// Marks an unchanged entity modified and floods the change upward.
    ///
    /// Only unchanged entities are marked, and only their higher-rank
    /// neighbours are visited, so the walk stops at created or already
    /// modified entities.
    pub(crate) fn mark_modified(&mut self, entity: Entity) {
        let rank_count = self.meta.rank_count();
        let mut pending = vec![entity];
        while let Some(current) = pending.pop() {
            if self.entities.state(current) != EntityState::Unchanged {
                continue;
            }
            self.entities.set_state(current, EntityState::Modified);
            self.entities.set_sync_count(current, self.sync_count);

            let rank = self.entities.key(current).rank().index();
            for r in (rank + 1)..rank_count {
                if let Some(slot) = self.slot(current, EntityRank::from_index(r)) {
                    pending.extend(
                        slot.targets()
                            .iter()
                            .copied()
                            .filter(|&e| self.entities.state(e) == EntityState::Unchanged),
                    );
                }
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Returns true if the handle names a live entity.
    #[must_use]
    pub fn is_valid(&self, entity: Entity) -> bool {
        self.entities.is_valid(entity)
    }

    /// Returns the key recorded for the handle.
    #[must_use]
    pub fn entity_key(&self, entity: Entity) -> EntityKey {
        self.entities.key(entity)
    }

    /// Returns the rank of the entity.
    #[must_use]
    pub fn entity_rank(&self, entity: Entity) -> EntityRank {
        self.entities.key(entity).rank()
    }

    /// Returns the per-cycle state of the entity.
    #[must_use]
    pub fn state(&self, entity: Entity) -> EntityState {
        self.entities.state(entity)
    }

    /// Returns the owning process of the entity.
    #[must_use]
    pub fn parallel_owner_rank(&self, entity: Entity) -> ProcRank {
        self.entities.owner(entity)
    }

    /// Returns the sync count of the cycle that last touched the entity.
    #[must_use]
    pub fn entity_sync_count(&self, entity: Entity) -> u64 {
        self.entities.sync_count(entity)
    }

    /// Returns true if this process owns the entity.
    #[must_use]
    pub fn is_locally_owned(&self, entity: Entity) -> bool {
        self.entities.is_valid(entity) && self.entities.owner(entity) == self.parallel_rank()
    }

    /// Looks up an entity by rank and id.
    #[must_use]
    pub fn get_entity(&self, rank: EntityRank, id: EntityId) -> Option<Entity> {
        self.repository.get(EntityKey::new(rank, id))
    }

    /// Looks up an entity by key.
    #[must_use]
    pub fn get_entity_by_key(&self, key: EntityKey) -> Option<Entity> {
        self.repository.get(key)
    }

    /// Iterates over the live entities of a rank in key order.
    pub fn entities(&self, rank: EntityRank) -> impl Iterator<Item = Entity> + '_ {
        self.repository.iter_rank(rank).map(|(_, entity)| entity)
    }

    /// Returns the number of live entities of a rank.
    #[must_use]
    pub fn entity_count(&self, rank: EntityRank) -> usize {
        self.repository.iter_rank(rank).count()
    }

    /// Returns the bucket position of the entity.
    #[must_use]
    pub fn mesh_index(&self, entity: Entity) -> Option<MeshIndex> {
        self.entities.mesh_index(entity)
    }

    pub(crate) fn mesh_index_or_err(&self, entity: Entity) -> Result<MeshIndex> {
        self.entities
            .mesh_index(entity)
            .ok_or_else(|| Error::internal(format!("{entity:?} has no bucket slot")))
    }

    /// Returns the bucket holding the entity.
    #[must_use]
    pub fn bucket(&self, entity: Entity) -> Option<&Bucket> {
        let index = self.entities.mesh_index(entity)?;
        self.buckets.bucket(self.entity_rank(entity), index.bucket_id)
    }

    /// Iterates over the buckets of a rank in id order.
    pub fn buckets(&self, rank: EntityRank) -> impl Iterator<Item = &Bucket> + '_ {
        self.buckets.buckets(rank)
    }

    /// Returns the sorted parts of the entity, supersets included.
    #[must_use]
    pub fn parts(&self, entity: Entity) -> &[PartOrdinal] {
        self.bucket(entity).map_or(&[], Bucket::parts)
    }

    pub(crate) fn signature(&self, entity: Entity) -> Option<&PartSignature> {
        self.bucket(entity).map(Bucket::signature)
    }

    /// Returns the explicit and induced parts of the entity.
    #[must_use]
    pub fn membership(&self, entity: Entity) -> Option<&PartMembership> {
        if self.entities.is_valid(entity) {
            self.membership.get(entity)
        } else {
            None
        }
    }

    /// Returns true if the entity belongs to `part`.
    #[must_use]
    pub fn member(&self, entity: Entity, part: PartOrdinal) -> bool {
        self.bucket(entity).is_some_and(|b| b.member(part))
    }

    pub(crate) fn slot(&self, entity: Entity, to_rank: EntityRank) -> Option<&SlotConnectivity> {
        let index = self.entities.mesh_index(entity)?;
        self.buckets
            .bucket(self.entity_rank(entity), index.bucket_id)?
            .connectivity(index.bucket_ordinal, to_rank)
    }

    pub(crate) fn slot_mut(
        &mut self,
        entity: Entity,
        to_rank: EntityRank,
    ) -> Option<&mut SlotConnectivity> {
        let index = self.entities.mesh_index(entity)?;
        let rank = self.entity_rank(entity);
        self.buckets
            .bucket_mut(rank, index.bucket_id)?
            .connectivity_mut(index.bucket_ordinal, to_rank)
    }

    fn apply_relocation(&mut self, relocation: Relocation) {
        self.entities
            .set_mesh_index(relocation.entity, relocation.index);
    }

    // =========================================================================
    // Aux Tables
    // =========================================================================

    /// Returns the legacy local id of the entity, if aux tables are kept.
    #[must_use]
    pub fn local_id(&self, entity: Entity) -> Option<u32> {
        self.entities.local_id(entity)
    }

    /// Sets the legacy local id of the entity. Ignored without aux tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is destroyed.
    pub fn set_local_id(&mut self, entity: Entity, id: u32) -> Result<()> {
        self.require_valid(entity)?;
        self.entities.set_local_id(entity, id);
        Ok(())
    }

    /// Returns the legacy framework id of the entity, if aux tables are kept.
    #[must_use]
    pub fn framework_id(&self, entity: Entity) -> Option<EntityId> {
        self.entities.framework_id(entity)
    }

    /// Sets the legacy framework id of the entity. Ignored without aux tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is destroyed.
    pub fn set_framework_id(&mut self, entity: Entity, id: EntityId) -> Result<()> {
        self.require_valid(entity)?;
        self.entities.set_framework_id(entity, id);
        Ok(())
    }

    // =========================================================================
    // Field Data
    // =========================================================================

    fn scalar_matches<T: Pod>(&self, field: FieldOrdinal) -> bool {
        self.meta
            .field(field)
            .is_some_and(|f| f.scalar().size_of() == std::mem::size_of::<T>())
    }

    /// Returns the entity's values of `field`, or `None` if the field does
    /// not exist on its bucket or `T` does not match the field's scalar.
    #[must_use]
    pub fn field_data<T: Pod>(&self, field: FieldOrdinal, entity: Entity) -> Option<&[T]> {
        if !self.scalar_matches::<T>(field) {
            return None;
        }
        let index = self.entities.mesh_index(entity)?;
        let bytes = self.buckets.field_data().entity_bytes(
            self.entity_rank(entity),
            index.bucket_id,
            index.bucket_ordinal,
            field,
        )?;
        bytemuck::try_cast_slice(bytes).ok()
    }

    /// Returns the entity's mutable values of `field`.
    pub fn field_data_mut<T: Pod>(&mut self, field: FieldOrdinal, entity: Entity) -> Option<&mut [T]> {
        if !self.scalar_matches::<T>(field) {
            return None;
        }
        let index = self.entities.mesh_index(entity)?;
        let rank = self.entity_rank(entity);
        let bytes = self.buckets.field_data_mut().entity_bytes_mut(
            rank,
            index.bucket_id,
            index.bucket_ordinal,
            field,
        )?;
        bytemuck::try_cast_slice_mut(bytes).ok()
    }

    /// Returns the values of `field` for every entity of a bucket, in bucket
    /// order.
    #[must_use]
    pub fn bucket_field_data<T: Pod>(&self, field: FieldOrdinal, bucket: &Bucket) -> Option<&[T]> {
        if !self.scalar_matches::<T>(field) {
            return None;
        }
        let storage = self.buckets.field_data();
        let per_entity = storage.bytes_per_entity(bucket.rank(), bucket.id(), field);
        let bytes = storage.bucket_bytes(bucket.rank(), bucket.id(), field)?;
        bytemuck::try_cast_slice(&bytes[..per_entity * bucket.size()]).ok()
    }

    /// Returns the bytes one entity of the bucket holding `entity` occupies
    /// for `field`; zero if the field does not exist there.
    #[must_use]
    pub fn field_bytes_per_entity(&self, field: FieldOrdinal, entity: Entity) -> usize {
        self.entities.mesh_index(entity).map_or(0, |index| {
            self.buckets
                .field_data()
                .bytes_per_entity(self.entity_rank(entity), index.bucket_id, field)
        })
    }

    /// Rotates the states of every multi-state field.
    ///
    /// Afterwards state `s + 1` reads what state `s` held and state 0 reads
    /// the previous oldest state. Only storage offsets move.
    pub fn update_field_data_states(&mut self) {
        let rotations: Vec<(FieldOrdinal, u32)> = self
            .meta
            .fields()
            .iter()
            .filter(|f| f.state() == 0 && f.number_of_states() > 1)
            .map(|f| (f.ordinal(), f.number_of_states()))
            .collect();
        for (field, states) in rotations {
            self.buckets
                .field_data_mut()
                .update_field_data_states(field, states);
        }
    }

    /// Rotates the states of one multi-state field.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is unknown.
    pub fn update_field_data_states_of(&mut self, field: FieldOrdinal) -> Result<()> {
        let meta = self.meta.field_or_err(field)?;
        let Some(first) = meta.state_ordinal(0) else {
            return Ok(());
        };
        let states = meta.number_of_states();
        if states > 1 {
            self.buckets
                .field_data_mut()
                .update_field_data_states(first, states);
        }
        Ok(())
    }

    /// Returns the bytes allocated for field data on every bucket of `rank`.
    #[must_use]
    pub fn total_field_data_footprint(&self, rank: EntityRank) -> usize {
        self.buckets.field_data().total_bytes(rank)
    }

    /// Returns the bytes allocated for one field across every bucket.
    #[must_use]
    pub fn field_data_footprint(&self, field: FieldOrdinal) -> usize {
        self.buckets.field_data().field_footprint(field)
    }
}
