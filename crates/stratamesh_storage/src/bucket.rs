//! Buckets, partitions, and the bucket repository.
//!
//! Entities of one rank with the same sorted part signature share a
//! partition. A partition is a list of fixed-capacity buckets; a full
//! partition opens a new bucket. Every structural change runs through the
//! [`FieldDataManager`] callbacks so that field storage follows entities.

use std::collections::BTreeMap;

use stratamesh_foundation::{Entity, EntityRank, Error, OrdinalSet, PartOrdinal, Result};
use tracing::trace;

use crate::connectivity::SlotConnectivity;
use crate::entity::MeshIndex;
use crate::field::{FieldDataManager, FieldLayoutSource};

/// Bucket id within one rank.
pub type BucketId = usize;

/// A sorted, deduplicated set of parts shared by every entity of a bucket.
///
/// Two signatures with the same parts are equal regardless of the order
/// the parts were added in.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartSignature(OrdinalSet<PartOrdinal>);

impl PartSignature {
    /// Creates a signature from a part set.
    #[must_use]
    pub fn new(parts: OrdinalSet<PartOrdinal>) -> Self {
        Self(parts)
    }

    /// Returns the parts in sorted order.
    #[must_use]
    pub fn parts(&self) -> &[PartOrdinal] {
        self.0.as_slice()
    }

    /// Returns the underlying set.
    #[must_use]
    pub fn as_set(&self) -> &OrdinalSet<PartOrdinal> {
        &self.0
    }

    /// Checks membership of a part.
    #[must_use]
    pub fn contains(&self, part: PartOrdinal) -> bool {
        self.0.contains(part)
    }

    /// Returns a new signature with `part` added.
    #[must_use]
    pub fn with_part(&self, part: PartOrdinal) -> Self {
        let mut parts = self.0.clone();
        parts.insert(part);
        Self(parts)
    }
}

/// An entity that changed position during a structural operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Relocation {
    /// The entity that moved.
    pub entity: Entity,
    /// Its new position.
    pub index: MeshIndex,
}

/// Fixed-capacity storage for entities of one rank and one part signature.
#[derive(Clone, Debug)]
pub struct Bucket {
    id: BucketId,
    rank: EntityRank,
    signature: PartSignature,
    capacity: usize,
    entities: Vec<Entity>,
    /// `connectivity[ordinal][to_rank]`.
    connectivity: Vec<Vec<SlotConnectivity>>,
    rank_count: usize,
}

impl Bucket {
    fn new(id: BucketId, rank: EntityRank, signature: PartSignature, capacity: usize, rank_count: usize) -> Self {
        Self {
            id,
            rank,
            signature,
            capacity,
            entities: Vec::with_capacity(capacity),
            connectivity: Vec::with_capacity(capacity),
            rank_count,
        }
    }

    /// Returns the id of this bucket within its rank.
    #[must_use]
    pub fn id(&self) -> BucketId {
        self.id
    }

    /// Returns the rank of every entity in this bucket.
    #[must_use]
    pub fn rank(&self) -> EntityRank {
        self.rank
    }

    /// Returns the part signature.
    #[must_use]
    pub fn signature(&self) -> &PartSignature {
        &self.signature
    }

    /// Returns the sorted parts of this bucket.
    #[must_use]
    pub fn parts(&self) -> &[PartOrdinal] {
        self.signature.parts()
    }

    /// Returns true if every entity of the bucket is in `part`.
    #[must_use]
    pub fn member(&self, part: PartOrdinal) -> bool {
        self.signature.contains(part)
    }

    /// Returns the number of entities.
    #[must_use]
    pub fn size(&self) -> usize {
        self.entities.len()
    }

    /// Returns the fixed capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true when no slot is free.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entities.len() >= self.capacity
    }

    /// Returns true when the bucket holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns the entities in slot order.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Returns the entity in a slot.
    #[must_use]
    pub fn entity(&self, ordinal: usize) -> Option<Entity> {
        self.entities.get(ordinal).copied()
    }

    /// Returns the relations of a slot to `to_rank` entities.
    #[must_use]
    pub fn connectivity(&self, ordinal: usize, to_rank: EntityRank) -> Option<&SlotConnectivity> {
        self.connectivity.get(ordinal)?.get(to_rank.index())
    }

    /// Returns the mutable relations of a slot to `to_rank` entities.
    pub fn connectivity_mut(&mut self, ordinal: usize, to_rank: EntityRank) -> Option<&mut SlotConnectivity> {
        self.connectivity.get_mut(ordinal)?.get_mut(to_rank.index())
    }

    fn push(&mut self, entity: Entity) -> usize {
        self.entities.push(entity);
        self.connectivity
            .push(vec![SlotConnectivity::default(); self.rank_count]);
        self.entities.len() - 1
    }

    fn take_slot_connectivity(&mut self, ordinal: usize) -> Vec<SlotConnectivity> {
        self.connectivity
            .get_mut(ordinal)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    fn set_slot_connectivity(&mut self, ordinal: usize, connectivity: Vec<SlotConnectivity>) {
        if let Some(slot) = self.connectivity.get_mut(ordinal) {
            *slot = connectivity;
        }
    }

    /// Removes a slot by moving the last slot into it. Returns the entity
    /// that now occupies `ordinal`, if any moved.
    fn swap_remove(&mut self, ordinal: usize) -> Option<Entity> {
        self.entities.swap_remove(ordinal);
        self.connectivity.swap_remove(ordinal);
        self.entities.get(ordinal).copied()
    }
}

/// Buckets of one rank sharing one part signature.
#[derive(Clone, Debug)]
pub struct Partition {
    rank: EntityRank,
    signature: PartSignature,
    buckets: Vec<BucketId>,
}

impl Partition {
    /// Returns the rank of this partition.
    #[must_use]
    pub fn rank(&self) -> EntityRank {
        self.rank
    }

    /// Returns the part signature.
    #[must_use]
    pub fn signature(&self) -> &PartSignature {
        &self.signature
    }

    /// Returns the bucket ids in fill order.
    #[must_use]
    pub fn buckets(&self) -> &[BucketId] {
        &self.buckets
    }
}

/// Owns every bucket and partition of a mesh, plus their field storage.
#[derive(Clone, Debug)]
pub struct BucketRepository {
    rank_count: usize,
    capacity: usize,
    /// `buckets[rank][id]`; `None` marks a destroyed bucket until the next
    /// id sync.
    buckets: Vec<Vec<Option<Bucket>>>,
    partitions: Vec<BTreeMap<PartSignature, Partition>>,
    field_data: FieldDataManager,
}

impl BucketRepository {
    /// Creates an empty repository whose buckets hold `capacity` entities.
    #[must_use]
    pub fn new(rank_count: usize, capacity: usize) -> Self {
        Self {
            rank_count,
            capacity: capacity.max(1),
            buckets: vec![Vec::new(); rank_count],
            partitions: vec![BTreeMap::new(); rank_count],
            field_data: FieldDataManager::new(rank_count),
        }
    }

    /// Returns the bucket capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the field storage.
    #[must_use]
    pub fn field_data(&self) -> &FieldDataManager {
        &self.field_data
    }

    /// Returns the mutable field storage.
    pub fn field_data_mut(&mut self) -> &mut FieldDataManager {
        &mut self.field_data
    }

    /// Returns a bucket by id.
    #[must_use]
    pub fn bucket(&self, rank: EntityRank, id: BucketId) -> Option<&Bucket> {
        self.buckets.get(rank.index())?.get(id)?.as_ref()
    }

    /// Returns a mutable bucket by id.
    pub fn bucket_mut(&mut self, rank: EntityRank, id: BucketId) -> Option<&mut Bucket> {
        self.buckets.get_mut(rank.index())?.get_mut(id)?.as_mut()
    }

    fn bucket_or_err(&mut self, rank: EntityRank, id: BucketId) -> Result<&mut Bucket> {
        self.bucket_mut(rank, id)
            .ok_or_else(|| Error::internal(format!("no {rank} bucket {id}")))
    }

    /// Iterates over the live buckets of a rank in id order.
    pub fn buckets(&self, rank: EntityRank) -> impl Iterator<Item = &Bucket> + '_ {
        self.buckets
            .get(rank.index())
            .into_iter()
            .flatten()
            .flatten()
    }

    /// Returns the number of live buckets of a rank.
    #[must_use]
    pub fn bucket_count(&self, rank: EntityRank) -> usize {
        self.buckets(rank).count()
    }

    /// Iterates over the partitions of a rank in signature order.
    pub fn partitions(&self, rank: EntityRank) -> impl Iterator<Item = &Partition> + '_ {
        self.partitions.get(rank.index()).into_iter().flat_map(BTreeMap::values)
    }

    /// Returns the partition for a signature, if any entity carries it.
    #[must_use]
    pub fn partition(&self, rank: EntityRank, signature: &PartSignature) -> Option<&Partition> {
        self.partitions.get(rank.index())?.get(signature)
    }

    fn bucket_with_space(
        &mut self,
        layouts: &impl FieldLayoutSource,
        rank: EntityRank,
        signature: &PartSignature,
    ) -> BucketId {
        let r = rank.index();
        if let Some(partition) = self.partitions[r].get(signature) {
            let free = partition.buckets.iter().copied().find(|&id| {
                self.buckets[r][id]
                    .as_ref()
                    .is_some_and(|b| !b.is_full())
            });
            if let Some(id) = free {
                return id;
            }
        }

        let id = self.buckets[r].len();
        self.buckets[r].push(Some(Bucket::new(
            id,
            rank,
            signature.clone(),
            self.capacity,
            self.rank_count,
        )));
        self.field_data
            .allocate_bucket_field_data(layouts, rank, id, signature.parts(), self.capacity);
        self.partitions[r]
            .entry(signature.clone())
            .or_insert_with(|| Partition {
                rank,
                signature: signature.clone(),
                buckets: Vec::new(),
            })
            .buckets
            .push(id);
        trace!(%rank, bucket_id = id, parts = ?signature.parts(), "created bucket");
        id
    }

    fn destroy_bucket(&mut self, rank: EntityRank, id: BucketId) {
        let r = rank.index();
        let Some(bucket) = self.buckets[r].get_mut(id).and_then(Option::take) else {
            return;
        };
        let signature = bucket.signature;
        if let Some(partition) = self.partitions[r].get_mut(&signature) {
            partition.buckets.retain(|b| *b != id);
            if partition.buckets.is_empty() {
                self.partitions[r].remove(&signature);
            }
        }
        self.field_data.deallocate_bucket_field_data(rank, id);
        trace!(%rank, bucket_id = id, "destroyed bucket");
    }

    /// Places an entity into a bucket with the given signature, opening a
    /// new bucket when every bucket of the partition is full.
    ///
    /// The slot's fields hold their initial values.
    pub fn add_entity(
        &mut self,
        layouts: &impl FieldLayoutSource,
        entity: Entity,
        rank: EntityRank,
        signature: &PartSignature,
    ) -> MeshIndex {
        let bucket_id = self.bucket_with_space(layouts, rank, signature);
        let bucket_ordinal = self.buckets[rank.index()][bucket_id]
            .as_mut()
            .map_or(0, |b| b.push(entity));
        MeshIndex {
            bucket_id,
            bucket_ordinal,
        }
    }

    /// Removes the entity at `index`, moving the bucket's last entity into
    /// the hole. Empty buckets are destroyed.
    ///
    /// The vacated slot's fields are reset to their initial values.
    ///
    /// # Errors
    ///
    /// Returns an internal error if `index` names no bucket.
    pub fn remove_entity(
        &mut self,
        layouts: &impl FieldLayoutSource,
        rank: EntityRank,
        index: MeshIndex,
    ) -> Result<Option<Relocation>> {
        let bucket = self.bucket_or_err(rank, index.bucket_id)?;
        let last = bucket.size().saturating_sub(1);
        if index.bucket_ordinal > last {
            return Err(Error::internal(format!(
                "slot {} past end of {rank} bucket {}",
                index.bucket_ordinal, index.bucket_id
            )));
        }

        if index.bucket_ordinal != last {
            self.field_data.copy_entity_fields(
                layouts,
                (rank, index.bucket_id, last),
                (rank, index.bucket_id, index.bucket_ordinal),
            )?;
        }
        self.field_data
            .reset_entity_fields(layouts, rank, index.bucket_id, last);

        let bucket = self.bucket_or_err(rank, index.bucket_id)?;
        let moved = bucket.swap_remove(index.bucket_ordinal);
        let empty = bucket.is_empty();
        if empty {
            self.destroy_bucket(rank, index.bucket_id);
        }

        Ok(moved.map(|entity| Relocation { entity, index }))
    }

    /// Moves an entity to a bucket with a new signature, carrying its field
    /// bytes and relations along.
    ///
    /// Returns the entity's new position and the entity that filled its old
    /// slot, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if field sizes differ between the two buckets.
    pub fn change_entity_bucket(
        &mut self,
        layouts: &impl FieldLayoutSource,
        entity: Entity,
        rank: EntityRank,
        from: MeshIndex,
        signature: &PartSignature,
    ) -> Result<(MeshIndex, Option<Relocation>)> {
        if self
            .bucket(rank, from.bucket_id)
            .is_some_and(|b| b.signature() == signature)
        {
            return Ok((from, None));
        }

        let to = self.add_entity(layouts, entity, rank, signature);
        if let Err(err) = self.field_data.copy_entity_fields(
            layouts,
            (rank, from.bucket_id, from.bucket_ordinal),
            (rank, to.bucket_id, to.bucket_ordinal),
        ) {
            self.remove_entity(layouts, rank, to)?;
            return Err(err);
        }
        self.move_slot_connectivity(rank, from, to)?;
        let moved = self.remove_entity(layouts, rank, from)?;
        trace!(%rank, ?entity, from = from.bucket_id, to = to.bucket_id, "moved entity");
        Ok((to, moved))
    }

    fn move_slot_connectivity(&mut self, rank: EntityRank, from: MeshIndex, to: MeshIndex) -> Result<()> {
        let connectivity = self
            .bucket_or_err(rank, from.bucket_id)?
            .take_slot_connectivity(from.bucket_ordinal);
        self.bucket_or_err(rank, to.bucket_id)?
            .set_slot_connectivity(to.bucket_ordinal, connectivity);
        Ok(())
    }

    /// Coalesces partially filled buckets of every partition of `rank`.
    ///
    /// Entities move from the tail bucket of a partition into the earliest
    /// bucket with room, through the same field-copy path as any other move.
    ///
    /// # Errors
    ///
    /// Returns an error if a move fails.
    pub fn optimize_buckets(
        &mut self,
        layouts: &impl FieldLayoutSource,
        rank: EntityRank,
    ) -> Result<Vec<Relocation>> {
        let r = rank.index();
        let signatures: Vec<PartSignature> = self.partitions[r].keys().cloned().collect();
        let mut relocations = Vec::new();

        for signature in signatures {
            loop {
                let Some(ids) = self.partitions[r].get(&signature).map(|p| p.buckets.clone()) else {
                    break;
                };
                let Some(&tail) = ids.last() else { break };
                let Some(dst_id) = ids[..ids.len() - 1].iter().copied().find(|&id| {
                    self.bucket(rank, id).is_some_and(|b| !b.is_full())
                }) else {
                    break;
                };

                let src_bucket = self.bucket_or_err(rank, tail)?;
                let src = MeshIndex {
                    bucket_id: tail,
                    bucket_ordinal: src_bucket.size() - 1,
                };
                let Some(entity) = src_bucket.entity(src.bucket_ordinal) else {
                    break;
                };

                let dst = MeshIndex {
                    bucket_id: dst_id,
                    bucket_ordinal: self.bucket_or_err(rank, dst_id)?.push(entity),
                };
                self.field_data.copy_entity_fields(
                    layouts,
                    (rank, src.bucket_id, src.bucket_ordinal),
                    (rank, dst.bucket_id, dst.bucket_ordinal),
                )?;
                self.move_slot_connectivity(rank, src, dst)?;
                self.remove_entity(layouts, rank, src)?;
                relocations.push(Relocation { entity, index: dst });
            }
        }
        Ok(relocations)
    }

    /// Renumbers the buckets of `rank` densely, in partition order, and
    /// drops destroyed ids.
    ///
    /// Field storage is permuted through the reorder callback. Returns every
    /// entity whose bucket id changed.
    pub fn sync_bucket_ids(&mut self, rank: EntityRank) -> Vec<Relocation> {
        let r = rank.index();
        let id_map: Vec<BucketId> = self.partitions[r]
            .values()
            .flat_map(|p| p.buckets.iter().copied())
            .collect();
        let identity = id_map.len() == self.buckets[r].len()
            && id_map.iter().enumerate().all(|(new, old)| new == *old);
        if identity {
            return Vec::new();
        }

        self.field_data.reorder_buckets(rank, &id_map);

        let mut old_buckets = std::mem::take(&mut self.buckets[r]);
        let mut old_to_new = vec![usize::MAX; old_buckets.len()];
        let mut relocations = Vec::new();
        for (new_id, &old_id) in id_map.iter().enumerate() {
            old_to_new[old_id] = new_id;
            let mut bucket = old_buckets[old_id].take();
            if let Some(bucket) = bucket.as_mut() {
                bucket.id = new_id;
                if new_id != old_id {
                    relocations.extend(bucket.entities.iter().enumerate().map(|(ordinal, &entity)| {
                        Relocation {
                            entity,
                            index: MeshIndex {
                                bucket_id: new_id,
                                bucket_ordinal: ordinal,
                            },
                        }
                    }));
                }
            }
            self.buckets[r].push(bucket);
        }
        for partition in self.partitions[r].values_mut() {
            for id in &mut partition.buckets {
                *id = old_to_new[*id];
            }
        }
        trace!(%rank, buckets = id_map.len(), "renumbered buckets");
        relocations
    }
}
