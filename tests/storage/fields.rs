//! Integration tests for per-bucket field storage

use stratamesh_foundation::{Entity, EntityRank, FieldOrdinal, OrdinalSet, PartOrdinal, ScalarType};
use stratamesh_storage::{BucketRepository, MeshIndex, MetaData, PartSignature};

struct Fixture {
    meta: MetaData,
    repo: BucketRepository,
    temperature: FieldOrdinal,
    flux: FieldOrdinal,
    plain: PartSignature,
    marked: PartSignature,
}

fn fixture() -> Fixture {
    let mut meta = MetaData::new(4);
    let boundary = meta.declare_part("boundary", None).unwrap();
    let temperature = meta.declare_field("temperature", ScalarType::F64, 2).unwrap();
    meta.put_field_on_entire_mesh(temperature, EntityRank::NODE, 1)
        .unwrap();
    meta.set_initial_value(temperature, &[300.0f64]).unwrap();
    let flux = meta.declare_field("flux", ScalarType::F64, 1).unwrap();
    meta.put_field_on_mesh(flux, EntityRank::NODE, boundary, 3).unwrap();

    let sig = |parts: &[PartOrdinal]| {
        let set: OrdinalSet<PartOrdinal> = parts.iter().copied().collect();
        PartSignature::new(set)
    };
    Fixture {
        plain: sig(&[PartOrdinal::UNIVERSAL]),
        marked: sig(&[PartOrdinal::UNIVERSAL, boundary]),
        meta,
        repo: BucketRepository::new(4, 4),
        temperature,
        flux,
    }
}

fn read(fx: &Fixture, at: MeshIndex, field: FieldOrdinal) -> Option<Vec<f64>> {
    let bytes = fx
        .repo
        .field_data()
        .entity_bytes(EntityRank::NODE, at.bucket_id, at.bucket_ordinal, field)?;
    Some(
        bytes
            .chunks_exact(8)
            .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
            .collect(),
    )
}

fn write(fx: &mut Fixture, at: MeshIndex, field: FieldOrdinal, value: f64) {
    let bytes = fx
        .repo
        .field_data_mut()
        .entity_bytes_mut(EntityRank::NODE, at.bucket_id, at.bucket_ordinal, field)
        .unwrap();
    bytes[..8].copy_from_slice(&value.to_ne_bytes());
}

fn state(fx: &Fixture, field: FieldOrdinal, s: u32) -> FieldOrdinal {
    fx.meta.field(field).unwrap().state_ordinal(s).unwrap()
}

#[test]
fn new_slots_hold_the_initial_value() {
    let mut fx = fixture();
    let at = fx.repo.add_entity(&fx.meta, Entity::from_local_offset(1), EntityRank::NODE, &fx.plain);

    assert_eq!(read(&fx, at, fx.temperature), Some(vec![300.0]));
    let older = state(&fx, fx.temperature, 1);
    assert_eq!(read(&fx, at, older), Some(vec![300.0]));
}

#[test]
fn fields_only_exist_where_restricted() {
    let mut fx = fixture();
    let plain = fx.plain.clone();
    let marked = fx.marked.clone();
    let a = fx.repo.add_entity(&fx.meta, Entity::from_local_offset(1), EntityRank::NODE, &plain);
    let b = fx.repo.add_entity(&fx.meta, Entity::from_local_offset(2), EntityRank::NODE, &marked);

    let data = fx.repo.field_data();
    assert_eq!(data.bytes_per_entity(EntityRank::NODE, a.bucket_id, fx.flux), 0);
    assert_eq!(data.bytes_per_entity(EntityRank::NODE, b.bucket_id, fx.flux), 24);
    assert!(data.field_meta_data(EntityRank::NODE, a.bucket_id, fx.flux).offset.is_none());

    assert_eq!(read(&fx, a, fx.flux), None);
    assert_eq!(read(&fx, b, fx.flux), Some(vec![0.0, 0.0, 0.0]));
}

#[test]
fn moving_between_buckets_carries_shared_fields() {
    let mut fx = fixture();
    let plain = fx.plain.clone();
    let marked = fx.marked.clone();
    let entity = Entity::from_local_offset(1);
    let at = fx.repo.add_entity(&fx.meta, entity, EntityRank::NODE, &plain);
    let temperature = fx.temperature;
    write(&mut fx, at, temperature, 42.0);

    let (to, _) = fx
        .repo
        .change_entity_bucket(&fx.meta, entity, EntityRank::NODE, at, &marked)
        .unwrap();
    assert_eq!(read(&fx, to, fx.temperature), Some(vec![42.0]));
    assert_eq!(read(&fx, to, fx.flux), Some(vec![0.0, 0.0, 0.0]));
}

#[test]
fn removal_moves_values_and_resets_the_vacated_slot() {
    let mut fx = fixture();
    let plain = fx.plain.clone();
    let a = fx.repo.add_entity(&fx.meta, Entity::from_local_offset(1), EntityRank::NODE, &plain);
    let b = fx.repo.add_entity(&fx.meta, Entity::from_local_offset(2), EntityRank::NODE, &plain);
    let temperature = fx.temperature;
    write(&mut fx, a, temperature, 1.0);
    let temperature = fx.temperature;
    write(&mut fx, b, temperature, 2.0);

    let moved = fx.repo.remove_entity(&fx.meta, EntityRank::NODE, a).unwrap().unwrap();
    assert_eq!(moved.index, a);
    assert_eq!(read(&fx, a, fx.temperature), Some(vec![2.0]));
    assert_eq!(read(&fx, b, fx.temperature), Some(vec![300.0]));
}

#[test]
fn rotating_states_swaps_regions_not_bytes() {
    let mut fx = fixture();
    let plain = fx.plain.clone();
    let at = fx.repo.add_entity(&fx.meta, Entity::from_local_offset(1), EntityRank::NODE, &plain);
    let older = state(&fx, fx.temperature, 1);
    let temperature = fx.temperature;
    write(&mut fx, at, temperature, 1.0);
    write(&mut fx, at, older, 2.0);

    fx.repo
        .field_data_mut()
        .update_field_data_states(fx.temperature, 2);
    assert_eq!(read(&fx, at, fx.temperature), Some(vec![2.0]));
    assert_eq!(read(&fx, at, older), Some(vec![1.0]));

    fx.repo
        .field_data_mut()
        .update_field_data_states(fx.temperature, 2);
    assert_eq!(read(&fx, at, fx.temperature), Some(vec![1.0]));
}

#[test]
fn footprints_count_capacity_not_size() {
    let mut fx = fixture();
    let plain = fx.plain.clone();
    fx.repo.add_entity(&fx.meta, Entity::from_local_offset(1), EntityRank::NODE, &plain);

    let data = fx.repo.field_data();
    assert_eq!(data.field_footprint(fx.temperature), 4 * 8);
    assert_eq!(data.field_footprint(fx.flux), 0);
    assert_eq!(data.total_bytes(EntityRank::NODE), 2 * 4 * 8);
    assert_eq!(data.total_bytes(EntityRank::ELEMENT), 0);
}

#[test]
fn renumbering_keeps_values_with_their_bucket() {
    let mut fx = fixture();
    let plain = fx.plain.clone();
    let marked = fx.marked.clone();
    let a = fx.repo.add_entity(&fx.meta, Entity::from_local_offset(1), EntityRank::NODE, &plain);
    let b = fx.repo.add_entity(&fx.meta, Entity::from_local_offset(2), EntityRank::NODE, &marked);
    let temperature = fx.temperature;
    write(&mut fx, b, temperature, 7.0);

    fx.repo.remove_entity(&fx.meta, EntityRank::NODE, a).unwrap();
    let relocations = fx.repo.sync_bucket_ids(EntityRank::NODE);
    assert_eq!(relocations.len(), 1);
    assert_eq!(read(&fx, relocations[0].index, fx.temperature), Some(vec![7.0]));
}
