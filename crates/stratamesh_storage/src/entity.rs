//! Dense per-entity arrays indexed by local offset.
//!
//! The `EntityTable` allocates local offsets from a free list and records
//! each entity's key, state, owner, sync count, and bucket position. Slot 0
//! is reserved so that `Entity::INVALID` never names a live entity.
//! Offsets released during a modification cycle are only recycled once the
//! cycle ends.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use stratamesh_foundation::{Entity, EntityId, EntityKey, EntityState, ProcRank};

/// Position of an entity inside the bucket storage.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MeshIndex {
    /// Bucket id within the entity's rank.
    pub bucket_id: usize,
    /// Slot within the bucket.
    pub bucket_ordinal: usize,
}

/// Optional side tables kept in lockstep with the core arrays.
///
/// Used by legacy I/O layers that attach their own numbering to entities.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AuxTables {
    local_ids: Vec<u32>,
    framework_ids: Vec<EntityId>,
}

impl AuxTables {
    fn push(&mut self) {
        self.local_ids.push(u32::MAX);
        self.framework_ids.push(0);
    }

    fn reset(&mut self, offset: usize) {
        self.local_ids[offset] = u32::MAX;
        self.framework_ids[offset] = 0;
    }
}

/// Dense per-offset entity records.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityTable {
    keys: Vec<EntityKey>,
    states: Vec<EntityState>,
    owners: Vec<ProcRank>,
    sync_counts: Vec<u64>,
    mesh_indexes: Vec<Option<MeshIndex>>,
    /// Offsets available for reuse.
    free_list: Vec<Entity>,
    /// Offsets released in the current cycle.
    deleted_this_cycle: Vec<Entity>,
    live_count: usize,
    aux: Option<AuxTables>,
}

impl Default for EntityTable {
    fn default() -> Self {
        Self::new(false)
    }
}

impl EntityTable {
    /// Creates a table with only the reserved slot 0.
    #[must_use]
    pub fn new(maintain_aux_tables: bool) -> Self {
        let mut table = Self {
            keys: Vec::new(),
            states: Vec::new(),
            owners: Vec::new(),
            sync_counts: Vec::new(),
            mesh_indexes: Vec::new(),
            free_list: Vec::new(),
            deleted_this_cycle: Vec::new(),
            live_count: 0,
            aux: maintain_aux_tables.then(AuxTables::default),
        };
        table.push_slot();
        table.states[0] = EntityState::Deleted;
        table
    }

    fn push_slot(&mut self) -> Entity {
        let offset = self.keys.len();
        self.keys.push(EntityKey::INVALID);
        self.states.push(EntityState::Created);
        self.owners.push(0);
        self.sync_counts.push(0);
        self.mesh_indexes.push(None);
        if let Some(aux) = &mut self.aux {
            aux.push();
        }
        Entity::from_local_offset(offset)
    }

    /// Allocates an offset for a new entity.
    ///
    /// Reuses offsets from the free list when available.
    pub fn allocate(&mut self, key: EntityKey, owner: ProcRank, sync_count: u64) -> Entity {
        let entity = match self.free_list.pop() {
            Some(entity) => entity,
            None => self.push_slot(),
        };
        let offset = entity.local_offset();
        self.keys[offset] = key;
        self.states[offset] = EntityState::Created;
        self.owners[offset] = owner;
        self.sync_counts[offset] = sync_count;
        self.mesh_indexes[offset] = None;
        if let Some(aux) = &mut self.aux {
            aux.reset(offset);
        }
        self.live_count += 1;
        entity
    }

    /// Marks an entity deleted and queues its offset for recycling.
    ///
    /// The key stays recorded until the offset is reused so that stale
    /// handles can still be reported.
    pub fn release(&mut self, entity: Entity) {
        if !self.is_valid(entity) {
            return;
        }
        let offset = entity.local_offset();
        self.states[offset] = EntityState::Deleted;
        self.mesh_indexes[offset] = None;
        self.deleted_this_cycle.push(entity);
        self.live_count -= 1;
    }

    /// Makes the offsets released this cycle available for reuse.
    pub fn update_deleted_entities_container(&mut self) {
        self.free_list.append(&mut self.deleted_this_cycle);
    }

    /// Returns true if the handle names a live entity.
    #[must_use]
    pub fn is_valid(&self, entity: Entity) -> bool {
        entity.is_local_offset_valid()
            && self
                .states
                .get(entity.local_offset())
                .is_some_and(|s| *s != EntityState::Deleted)
    }

    /// Returns the recorded key, or the invalid key for an unknown offset.
    #[must_use]
    pub fn key(&self, entity: Entity) -> EntityKey {
        self.keys
            .get(entity.local_offset())
            .copied()
            .unwrap_or(EntityKey::INVALID)
    }

    /// Re-keys a live entity.
    pub fn set_key(&mut self, entity: Entity, key: EntityKey) {
        if let Some(slot) = self.keys.get_mut(entity.local_offset()) {
            *slot = key;
        }
    }

    /// Returns the entity state; unknown offsets read as deleted.
    #[must_use]
    pub fn state(&self, entity: Entity) -> EntityState {
        self.states
            .get(entity.local_offset())
            .copied()
            .unwrap_or(EntityState::Deleted)
    }

    /// Sets the entity state.
    pub fn set_state(&mut self, entity: Entity, state: EntityState) {
        if let Some(slot) = self.states.get_mut(entity.local_offset()) {
            *slot = state;
        }
    }

    /// Returns the owning process.
    #[must_use]
    pub fn owner(&self, entity: Entity) -> ProcRank {
        self.owners.get(entity.local_offset()).copied().unwrap_or(0)
    }

    /// Sets the owning process. Returns true if it changed.
    pub fn set_owner(&mut self, entity: Entity, owner: ProcRank) -> bool {
        match self.owners.get_mut(entity.local_offset()) {
            Some(slot) if *slot != owner => {
                *slot = owner;
                true
            }
            _ => false,
        }
    }

    /// Returns the sync count of the last cycle that touched the entity.
    #[must_use]
    pub fn sync_count(&self, entity: Entity) -> u64 {
        self.sync_counts
            .get(entity.local_offset())
            .copied()
            .unwrap_or(0)
    }

    /// Records the cycle that touched the entity.
    pub fn set_sync_count(&mut self, entity: Entity, sync_count: u64) {
        if let Some(slot) = self.sync_counts.get_mut(entity.local_offset()) {
            *slot = sync_count;
        }
    }

    /// Returns the bucket position of a live entity.
    #[must_use]
    pub fn mesh_index(&self, entity: Entity) -> Option<MeshIndex> {
        self.mesh_indexes.get(entity.local_offset()).copied().flatten()
    }

    /// Records the bucket position of an entity.
    pub fn set_mesh_index(&mut self, entity: Entity, index: MeshIndex) {
        if let Some(slot) = self.mesh_indexes.get_mut(entity.local_offset()) {
            *slot = Some(index);
        }
    }

    /// Resets every live entity to [`EntityState::Unchanged`].
    pub fn reset_states(&mut self) {
        for state in self.states.iter_mut().skip(1) {
            if *state != EntityState::Deleted {
                *state = EntityState::Unchanged;
            }
        }
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live_count
    }

    /// Returns true if there are no live entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Returns the number of slots, including the reserved one.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.keys.len()
    }

    /// Returns the offsets released in the current cycle.
    #[must_use]
    pub fn deleted_this_cycle(&self) -> &[Entity] {
        &self.deleted_this_cycle
    }

    /// Iterates over all live entities in offset order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.states
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, s)| **s != EntityState::Deleted)
            .map(|(offset, _)| Entity::from_local_offset(offset))
    }

    /// Returns true when the side tables are maintained.
    #[must_use]
    pub fn has_aux_tables(&self) -> bool {
        self.aux.is_some()
    }

    /// Returns the legacy local id of an entity.
    #[must_use]
    pub fn local_id(&self, entity: Entity) -> Option<u32> {
        let aux = self.aux.as_ref()?;
        aux.local_ids
            .get(entity.local_offset())
            .copied()
            .filter(|id| *id != u32::MAX)
    }

    /// Sets the legacy local id of an entity.
    pub fn set_local_id(&mut self, entity: Entity, id: u32) {
        if let Some(slot) = self
            .aux
            .as_mut()
            .and_then(|aux| aux.local_ids.get_mut(entity.local_offset()))
        {
            *slot = id;
        }
    }

    /// Returns the framework id of an entity.
    #[must_use]
    pub fn framework_id(&self, entity: Entity) -> Option<EntityId> {
        let aux = self.aux.as_ref()?;
        aux.framework_ids
            .get(entity.local_offset())
            .copied()
            .filter(|id| *id != 0)
    }

    /// Sets the framework id of an entity.
    pub fn set_framework_id(&mut self, entity: Entity, id: EntityId) {
        if let Some(slot) = self
            .aux
            .as_mut()
            .and_then(|aux| aux.framework_ids.get_mut(entity.local_offset()))
        {
            *slot = id;
        }
    }
}
