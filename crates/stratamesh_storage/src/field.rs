//! Raw field storage backing buckets.
//!
//! Each bucket owns one allocation holding a region per field that exists
//! on the bucket's parts. Regions are 8-byte aligned so they can be viewed
//! as typed slices. The manager is driven entirely through callbacks from
//! [`BucketRepository`](crate::BucketRepository): bucket creation, entity
//! moves, entity removal, bucket destruction, state rotation, and bucket
//! renumbering.

// Field counts are bounded by u32 ordinals.
#![allow(clippy::cast_possible_truncation)]

use stratamesh_foundation::{EntityRank, Error, ErrorKind, FieldOrdinal, PartOrdinal, Result};
use tracing::trace;

/// Byte layout of a field on one bucket.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FieldLayout {
    /// Number of scalar components per entity.
    pub dimension: usize,
    /// Byte size of one component.
    pub scalar_bytes: usize,
}

impl FieldLayout {
    /// Bytes one entity occupies.
    #[must_use]
    pub fn bytes_per_entity(&self) -> usize {
        self.dimension * self.scalar_bytes
    }
}

/// Restriction and initial-value lookup consumed by the field manager.
pub trait FieldLayoutSource {
    /// Number of declared field states.
    fn field_count(&self) -> usize;

    /// Layout of `field` on `rank` entities whose sorted part signature is
    /// `parts`, or `None` if the field does not exist there.
    fn layout(&self, field: FieldOrdinal, rank: EntityRank, parts: &[PartOrdinal])
    -> Option<FieldLayout>;

    /// Declared initial value of `field`; `None` means zero-fill.
    fn initial_value(&self, field: FieldOrdinal) -> Option<&[u8]>;
}

/// Per (field, bucket) storage record.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldMetaData {
    /// Bytes per entity; 0 when the field does not exist on the bucket.
    pub bytes_per_entity: usize,
    /// Byte offset of the field's region in the bucket allocation.
    pub offset: Option<usize>,
}

#[derive(Clone, Debug)]
struct BucketFieldData {
    capacity: usize,
    fields: Vec<FieldMetaData>,
    /// Region storage; `u64` words keep every region 8-byte aligned.
    words: Box<[u64]>,
}

impl BucketFieldData {
    fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.words)
    }

    fn slot_range(&self, field: usize, ordinal: usize) -> Option<std::ops::Range<usize>> {
        let meta = self.fields.get(field)?;
        let offset = meta.offset?;
        let start = offset + ordinal * meta.bytes_per_entity;
        Some(start..start + meta.bytes_per_entity)
    }
}

fn align8(n: usize) -> usize {
    n.div_ceil(8) * 8
}

fn fill_initial(slot: &mut [u8], initial: Option<&[u8]>) {
    match initial {
        Some(value) => {
            let n = value.len().min(slot.len());
            slot[..n].copy_from_slice(&value[..n]);
            slot[n..].fill(0);
        }
        None => slot.fill(0),
    }
}

/// Owns the field allocations of every bucket, per rank.
#[derive(Clone, Debug)]
pub struct FieldDataManager {
    /// `buckets[rank][bucket_id]`.
    buckets: Vec<Vec<Option<BucketFieldData>>>,
}

impl FieldDataManager {
    /// Creates an empty manager for `rank_count` ranks.
    #[must_use]
    pub fn new(rank_count: usize) -> Self {
        Self {
            buckets: vec![Vec::new(); rank_count],
        }
    }

    fn data(&self, rank: EntityRank, bucket_id: usize) -> Option<&BucketFieldData> {
        self.buckets.get(rank.index())?.get(bucket_id)?.as_ref()
    }

    fn data_mut(&mut self, rank: EntityRank, bucket_id: usize) -> Option<&mut BucketFieldData> {
        self.buckets.get_mut(rank.index())?.get_mut(bucket_id)?.as_mut()
    }

    /// Sizes and allocates every field for a new bucket and fills each slot
    /// with the field's initial value.
    pub fn allocate_bucket_field_data(
        &mut self,
        layouts: &impl FieldLayoutSource,
        rank: EntityRank,
        bucket_id: usize,
        parts: &[PartOrdinal],
        capacity: usize,
    ) {
        let field_count = layouts.field_count();
        let mut fields = Vec::with_capacity(field_count);
        let mut total = 0usize;
        for f in 0..field_count {
            let ordinal = FieldOrdinal::from_index(f as u32);
            match layouts.layout(ordinal, rank, parts) {
                Some(layout) => {
                    let bytes_per_entity = layout.bytes_per_entity();
                    fields.push(FieldMetaData {
                        bytes_per_entity,
                        offset: Some(total),
                    });
                    total += align8(bytes_per_entity * capacity);
                }
                None => fields.push(FieldMetaData::default()),
            }
        }

        let mut data = BucketFieldData {
            capacity,
            fields,
            words: vec![0u64; total / 8].into_boxed_slice(),
        };
        for f in 0..field_count {
            let initial = layouts.initial_value(FieldOrdinal::from_index(f as u32));
            if initial.is_none() {
                continue;
            }
            for ordinal in 0..capacity {
                if let Some(range) = data.slot_range(f, ordinal) {
                    fill_initial(&mut data.bytes_mut()[range], initial);
                }
            }
        }

        trace!(%rank, bucket_id, capacity, bytes = total, "allocated bucket field data");

        let per_rank = &mut self.buckets[rank.index()];
        if per_rank.len() <= bucket_id {
            per_rank.resize(bucket_id + 1, None);
        }
        per_rank[bucket_id] = Some(data);
    }

    /// Releases a bucket's allocation.
    ///
    /// Every per-field record is invalidated before the allocation is
    /// dropped.
    pub fn deallocate_bucket_field_data(&mut self, rank: EntityRank, bucket_id: usize) {
        if let Some(mut data) = self
            .buckets
            .get_mut(rank.index())
            .and_then(|b| b.get_mut(bucket_id))
            .and_then(Option::take)
        {
            for meta in &mut data.fields {
                *meta = FieldMetaData::default();
            }
            trace!(%rank, bucket_id, "deallocated bucket field data");
        }
    }

    /// Copies every field of one entity slot into another, possibly across
    /// buckets.
    ///
    /// Fields absent on the destination are skipped; fields absent on the
    /// source are reset to their initial value on the destination.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::FieldSizeMismatch`] if a field exists on both
    /// buckets with different sizes.
    pub fn copy_entity_fields(
        &mut self,
        layouts: &impl FieldLayoutSource,
        src: (EntityRank, usize, usize),
        dst: (EntityRank, usize, usize),
    ) -> Result<()> {
        let (src_rank, src_bucket, src_ordinal) = src;
        let (dst_rank, dst_bucket, dst_ordinal) = dst;
        let field_count = self
            .data(dst_rank, dst_bucket)
            .map_or(0, |d| d.fields.len());

        for f in 0..field_count {
            let Some(dst_range) = self
                .data(dst_rank, dst_bucket)
                .and_then(|d| d.slot_range(f, dst_ordinal))
            else {
                continue;
            };

            let src_bytes: Option<Vec<u8>> = self
                .data(src_rank, src_bucket)
                .and_then(|d| d.slot_range(f, src_ordinal).map(|r| d.bytes()[r].to_vec()));

            let Some(dst_data) = self.data_mut(dst_rank, dst_bucket) else {
                continue;
            };
            let dst_slot = &mut dst_data.bytes_mut()[dst_range];
            match src_bytes {
                Some(bytes) if bytes.len() == dst_slot.len() => dst_slot.copy_from_slice(&bytes),
                Some(bytes) => {
                    debug_assert_eq!(bytes.len(), dst_slot.len(), "field {f} size mismatch");
                    return Err(Error::new(ErrorKind::FieldSizeMismatch {
                        field: f as u32,
                        dst: dst_slot.len(),
                        src: bytes.len(),
                    }));
                }
                None => fill_initial(dst_slot, layouts.initial_value(FieldOrdinal::from_index(f as u32))),
            }
        }
        Ok(())
    }

    /// Resets one slot of every field to its initial value.
    pub fn reset_entity_fields(
        &mut self,
        layouts: &impl FieldLayoutSource,
        rank: EntityRank,
        bucket_id: usize,
        ordinal: usize,
    ) {
        let Some(data) = self.data_mut(rank, bucket_id) else {
            return;
        };
        for f in 0..data.fields.len() {
            if let Some(range) = data.slot_range(f, ordinal) {
                let initial = layouts.initial_value(FieldOrdinal::from_index(f as u32));
                fill_initial(&mut data.bytes_mut()[range], initial);
            }
        }
    }

    /// Rotates the states of a multi-state field on every bucket.
    ///
    /// Only region offsets move; no entity bytes are copied. After the call
    /// state `s + 1` holds what state `s` held, and state 0 holds the
    /// previous oldest state.
    pub fn update_field_data_states(&mut self, first_state: FieldOrdinal, number_of_states: u32) {
        let base = first_state.index() as usize;
        let n = number_of_states as usize;
        if n < 2 {
            return;
        }
        for data in self.buckets.iter_mut().flatten().flatten() {
            if data.fields.len() < base + n {
                continue;
            }
            for s in 1..n {
                data.fields.swap(base, base + s);
            }
        }
    }

    /// Renumbers the buckets of `rank`: new bucket `i` takes the storage of
    /// old bucket `id_map[i]`.
    pub fn reorder_buckets(&mut self, rank: EntityRank, id_map: &[usize]) {
        let Some(per_rank) = self.buckets.get_mut(rank.index()) else {
            return;
        };
        let mut old: Vec<Option<BucketFieldData>> = std::mem::take(per_rank);
        *per_rank = id_map
            .iter()
            .map(|&old_id| old.get_mut(old_id).and_then(Option::take))
            .collect();
    }

    /// Returns the storage record of `field` on a bucket.
    #[must_use]
    pub fn field_meta_data(
        &self,
        rank: EntityRank,
        bucket_id: usize,
        field: FieldOrdinal,
    ) -> FieldMetaData {
        self.data(rank, bucket_id)
            .and_then(|d| d.fields.get(field.index() as usize).copied())
            .unwrap_or_default()
    }

    /// Returns the bytes one entity of the bucket occupies for `field`.
    #[must_use]
    pub fn bytes_per_entity(&self, rank: EntityRank, bucket_id: usize, field: FieldOrdinal) -> usize {
        self.field_meta_data(rank, bucket_id, field).bytes_per_entity
    }

    /// Returns the whole region of `field` on a bucket, `capacity` slots long.
    #[must_use]
    pub fn bucket_bytes(&self, rank: EntityRank, bucket_id: usize, field: FieldOrdinal) -> Option<&[u8]> {
        let data = self.data(rank, bucket_id)?;
        let meta = data.fields.get(field.index() as usize)?;
        let offset = meta.offset?;
        Some(&data.bytes()[offset..offset + meta.bytes_per_entity * data.capacity])
    }

    /// Returns the whole mutable region of `field` on a bucket.
    pub fn bucket_bytes_mut(
        &mut self,
        rank: EntityRank,
        bucket_id: usize,
        field: FieldOrdinal,
    ) -> Option<&mut [u8]> {
        let data = self.data_mut(rank, bucket_id)?;
        let meta = *data.fields.get(field.index() as usize)?;
        let offset = meta.offset?;
        let len = meta.bytes_per_entity * data.capacity;
        Some(&mut data.bytes_mut()[offset..offset + len])
    }

    /// Returns one entity's bytes of `field`.
    #[must_use]
    pub fn entity_bytes(
        &self,
        rank: EntityRank,
        bucket_id: usize,
        ordinal: usize,
        field: FieldOrdinal,
    ) -> Option<&[u8]> {
        let data = self.data(rank, bucket_id)?;
        let range = data.slot_range(field.index() as usize, ordinal)?;
        Some(&data.bytes()[range])
    }

    /// Returns one entity's mutable bytes of `field`.
    pub fn entity_bytes_mut(
        &mut self,
        rank: EntityRank,
        bucket_id: usize,
        ordinal: usize,
        field: FieldOrdinal,
    ) -> Option<&mut [u8]> {
        let data = self.data_mut(rank, bucket_id)?;
        let range = data.slot_range(field.index() as usize, ordinal)?;
        Some(&mut data.bytes_mut()[range])
    }

    /// Returns the bytes allocated for all buckets of `rank`.
    #[must_use]
    pub fn total_bytes(&self, rank: EntityRank) -> usize {
        self.buckets
            .get(rank.index())
            .map_or(0, |b| b.iter().flatten().map(|d| d.words.len() * 8).sum())
    }

    /// Returns the bytes allocated for `field` across every bucket.
    #[must_use]
    pub fn field_footprint(&self, field: FieldOrdinal) -> usize {
        self.buckets
            .iter()
            .flatten()
            .flatten()
            .filter_map(|d| {
                let meta = d.fields.get(field.index() as usize)?;
                meta.offset.map(|_| meta.bytes_per_entity * d.capacity)
            })
            .sum()
    }
}
