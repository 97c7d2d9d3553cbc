//! Key to handle lookup.
//!
//! The repository is the single source of truth for whether a global key
//! exists locally. It is an ordered persistent map so that iteration is in
//! key order and snapshots are cheap.

use im::OrdMap;
use stratamesh_foundation::{Entity, EntityKey, EntityRank, Error, ErrorKind, Result};

/// Maps `EntityKey -> Entity` for every live local entity.
#[derive(Clone, Debug, Default)]
pub struct EntityRepository {
    entities: OrdMap<EntityKey, Entity>,
}

impl EntityRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the handle of a key.
    #[must_use]
    pub fn get(&self, key: EntityKey) -> Option<Entity> {
        self.entities.get(&key).copied()
    }

    /// Returns the existing entity for `key`, or records a fresh handle from
    /// `allocate`. The flag is true if the entity was created.
    ///
    /// Destroyed keys are no longer in the map, so re-creating one always
    /// allocates a fresh handle.
    pub fn create(&mut self, key: EntityKey, allocate: impl FnOnce() -> Entity) -> (Entity, bool) {
        if let Some(existing) = self.get(key) {
            return (existing, false);
        }
        let entity = allocate();
        self.entities.insert(key, entity);
        (entity, true)
    }

    /// Re-indexes an entity under a new key.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_key` is already in use or `old_key` does not
    /// map to `entity`.
    pub fn update_key(&mut self, old_key: EntityKey, new_key: EntityKey, entity: Entity) -> Result<()> {
        if self.entities.contains_key(&new_key) {
            return Err(Error::new(ErrorKind::KeyAlreadyUsed(new_key)));
        }
        if self.get(old_key) != Some(entity) {
            return Err(Error::internal(format!(
                "key {old_key} does not map to {entity:?}"
            )));
        }
        self.entities.remove(&old_key);
        self.entities.insert(new_key, entity);
        Ok(())
    }

    /// Removes the mapping of `key` if it names `entity`.
    ///
    /// The offset itself is not freed here.
    pub fn destroy(&mut self, key: EntityKey, entity: Entity) -> bool {
        if self.get(key) == Some(entity) {
            self.entities.remove(&key);
            true
        } else {
            false
        }
    }

    /// Returns the number of mapped keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if no keys are mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterates over all mappings in key order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, Entity)> + '_ {
        self.entities.iter().map(|(k, e)| (*k, *e))
    }

    /// Iterates over the mappings of one rank in id order.
    pub fn iter_rank(&self, rank: EntityRank) -> impl Iterator<Item = (EntityKey, Entity)> + '_ {
        let lo = EntityKey::new(rank, 0);
        let hi = EntityKey::new(EntityRank(rank.0.saturating_add(1)), 0);
        self.entities.range(lo..hi).map(|(k, e)| (*k, *e))
    }
}
