//! The entity comm list.
//!
//! One entry per entity that is shared with or ghosted to or from another
//! process, sorted by key. Each entry carries a small sorted run of
//! `(ghosting, proc)` records. Every query is a binary search on the key
//! followed by a scan of that run.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use stratamesh_foundation::{Entity, EntityKey, GhostingOrdinal, ProcRank};

/// One `(ghosting, process)` record of an entity.
///
/// Under [`GhostingOrdinal::SHARED`] `proc` is a sharing process. Under any
/// other ghosting it is the receiver (on the owner) or the owner (on a
/// receiver).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityCommInfo {
    /// Ghosting the record belongs to.
    pub ghost_id: GhostingOrdinal,
    /// The other process.
    pub proc: ProcRank,
}

impl EntityCommInfo {
    /// Creates a record.
    #[must_use]
    pub const fn new(ghost_id: GhostingOrdinal, proc: ProcRank) -> Self {
        Self { ghost_id, proc }
    }
}

/// Comm list entry of one entity.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityCommListInfo {
    /// Entity key.
    pub key: EntityKey,
    /// Owning process.
    pub owner: ProcRank,
    /// Local handle; invalid once the entity is destroyed this cycle.
    pub entity: Entity,
    /// Sorted `(ghosting, proc)` records.
    pub infos: Vec<EntityCommInfo>,
}

impl EntityCommListInfo {
    /// Returns the distinct processes of every record, sorted.
    #[must_use]
    pub fn procs(&self) -> Vec<ProcRank> {
        let mut procs: Vec<ProcRank> = self.infos.iter().map(|i| i.proc).collect();
        procs.sort_unstable();
        procs.dedup();
        procs
    }

    /// Returns the processes recorded under one ghosting.
    pub fn procs_for(&self, ghost_id: GhostingOrdinal) -> impl Iterator<Item = ProcRank> + '_ {
        self.infos
            .iter()
            .filter(move |i| i.ghost_id == ghost_id)
            .map(|i| i.proc)
    }
}

/// Sorted comm list of a mesh.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityCommList {
    entries: Vec<EntityCommListInfo>,
}

impl EntityCommList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: EntityKey) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| e.key.cmp(&key))
    }

    /// Returns the entry of a key.
    #[must_use]
    pub fn find(&self, key: EntityKey) -> Option<&EntityCommListInfo> {
        self.position(key).ok().map(|i| &self.entries[i])
    }

    /// Returns the mutable entry of a key.
    pub fn find_mut(&mut self, key: EntityKey) -> Option<&mut EntityCommListInfo> {
        self.position(key).ok().map(|i| &mut self.entries[i])
    }

    /// Returns the entry of a key, inserting an empty one at its sorted
    /// position if absent.
    ///
    /// An entry left behind by a destroyed entity of the same key is reset
    /// to the new entity and owner with no records.
    pub fn insert(&mut self, key: EntityKey, entity: Entity, owner: ProcRank) -> &mut EntityCommListInfo {
        let i = match self.position(key) {
            Ok(i) => {
                let entry = &mut self.entries[i];
                if entry.entity != entity {
                    entry.entity = entity;
                    entry.owner = owner;
                    entry.infos.clear();
                }
                i
            }
            Err(i) => {
                self.entries.insert(
                    i,
                    EntityCommListInfo {
                        key,
                        owner,
                        entity,
                        infos: Vec::new(),
                    },
                );
                i
            }
        };
        &mut self.entries[i]
    }

    /// Adds a record to an existing entry. Returns true if it was new.
    pub fn insert_info(&mut self, key: EntityKey, info: EntityCommInfo) -> bool {
        let Some(entry) = self.find_mut(key) else {
            return false;
        };
        match entry.infos.binary_search(&info) {
            Ok(_) => false,
            Err(pos) => {
                entry.infos.insert(pos, info);
                true
            }
        }
    }

    /// Removes a record. Returns true if it was present.
    pub fn erase_info(&mut self, key: EntityKey, info: EntityCommInfo) -> bool {
        let Some(entry) = self.find_mut(key) else {
            return false;
        };
        match entry.infos.binary_search(&info) {
            Ok(pos) => {
                entry.infos.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Removes every record of one ghosting. Returns true if any was present.
    pub fn erase_ghosting(&mut self, key: EntityKey, ghost_id: GhostingOrdinal) -> bool {
        let Some(entry) = self.find_mut(key) else {
            return false;
        };
        let before = entry.infos.len();
        entry.infos.retain(|i| i.ghost_id != ghost_id);
        entry.infos.len() != before
    }

    /// Returns the distinct processes an entity communicates with.
    #[must_use]
    pub fn comm_procs(&self, key: EntityKey) -> Vec<ProcRank> {
        self.find(key).map(EntityCommListInfo::procs).unwrap_or_default()
    }

    /// Returns the processes an entity communicates with under one ghosting.
    #[must_use]
    pub fn comm_procs_for(&self, ghost_id: GhostingOrdinal, key: EntityKey) -> Vec<ProcRank> {
        self.find(key)
            .map(|e| e.procs_for(ghost_id).collect())
            .unwrap_or_default()
    }

    /// Returns the processes sharing an entity.
    #[must_use]
    pub fn sharing_procs(&self, key: EntityKey) -> Vec<ProcRank> {
        self.comm_procs_for(GhostingOrdinal::SHARED, key)
    }

    /// Returns true if `proc` shares the entity.
    #[must_use]
    pub fn in_shared(&self, key: EntityKey, proc: ProcRank) -> bool {
        self.in_ghost(GhostingOrdinal::SHARED, key, proc)
    }

    /// Returns true if any process shares the entity.
    #[must_use]
    pub fn is_shared(&self, key: EntityKey) -> bool {
        self.find(key)
            .is_some_and(|e| e.procs_for(GhostingOrdinal::SHARED).next().is_some())
    }

    /// Returns true if the entity has a record `(ghost_id, proc)`.
    #[must_use]
    pub fn in_ghost(&self, ghost_id: GhostingOrdinal, key: EntityKey, proc: ProcRank) -> bool {
        self.find(key).is_some_and(|e| {
            e.infos
                .binary_search(&EntityCommInfo::new(ghost_id, proc))
                .is_ok()
        })
    }

    /// Returns true if the entity has any record under `ghost_id`.
    #[must_use]
    pub fn in_ghosting(&self, ghost_id: GhostingOrdinal, key: EntityKey) -> bool {
        self.find(key)
            .is_some_and(|e| e.procs_for(ghost_id).next().is_some())
    }

    /// Invalidates the entity reference of an entry in place.
    ///
    /// The entry keeps its sorted position until [`EntityCommList::erase_stale`].
    pub fn invalidate(&mut self, key: EntityKey) -> bool {
        match self.find_mut(key) {
            Some(entry) => {
                entry.entity = Entity::INVALID;
                true
            }
            None => false,
        }
    }

    /// Sets the owner of an entry. Returns true if it changed.
    pub fn change_owner(&mut self, key: EntityKey, owner: ProcRank) -> bool {
        match self.find_mut(key) {
            Some(entry) if entry.owner != owner => {
                entry.owner = owner;
                true
            }
            _ => false,
        }
    }

    /// Erases entries whose entity was invalidated or that have no records
    /// left. Returns the number erased.
    pub fn erase_stale(&mut self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| e.entity.is_local_offset_valid() && !e.infos.is_empty());
        before - self.entries.len()
    }

    /// Iterates over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityCommListInfo> + '_ {
        self.entries.iter()
    }

    /// Iterates mutably over all entries in key order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut EntityCommListInfo> + '_ {
        self.entries.iter_mut()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
