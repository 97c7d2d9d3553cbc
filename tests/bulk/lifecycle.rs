//! Integration tests for the modification cycle and entity lifecycle

use stratamesh_bulk::{BulkDataConfig, SyncState};
use stratamesh_foundation::{EntityKey, EntityRank, EntityState, ErrorKind, PartOrdinal};

use crate::common::{element, fixture, fixture_with, nodes};

#[test]
fn mutations_require_an_open_cycle() {
    let mut f = fixture();
    assert_eq!(f.mesh.sync_state(), SyncState::Synchronized);
    let err = f.mesh.declare_entity(EntityRank::NODE, 1, &[]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NotModifiable));
    assert!(!f.mesh.modification_end().unwrap());

    f.mesh.modification_begin().unwrap();
    assert!(f.mesh.in_modifiable_state());
    let node = nodes(&mut f.mesh, [1])[0];
    f.mesh.modification_end().unwrap();
    assert!(f.mesh.in_synchronized_state());

    let err = f.mesh.destroy_entity(node).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NotModifiable));
    assert!(f.mesh.create_ghosting("halo").is_err());
}

#[test]
fn finalized_meshes_stay_frozen() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();
    let err = f.mesh.finalize().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NotSynchronized));

    f.mesh.modification_end().unwrap();
    f.mesh.finalize().unwrap();
    assert!(f.mesh.is_finalized());
    let err = f.mesh.modification_begin().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MeshFinalized));
}

#[test]
fn declaration_validates_keys_and_parts() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();

    let err = f.mesh.declare_entity(EntityRank::NODE, 0, &[]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::BadId(0)));
    let err = f.mesh.declare_entity(EntityRank::CONSTRAINT, 1, &[]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::BadRank { .. }));
    let err = f
        .mesh
        .declare_entity(EntityRank::NODE, 1, &[PartOrdinal::AURA])
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ReservedPart(_)));
    let err = f
        .mesh
        .declare_entity(EntityRank::ELEMENT, 1, &[f.skin])
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RankMismatch { .. }));

    assert_eq!(f.mesh.entity_count(EntityRank::NODE), 0);
    assert_eq!(f.mesh.entity_count(EntityRank::ELEMENT), 0);
}

#[test]
fn redeclaring_adds_parts_to_the_same_entity() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();
    let first = f.mesh.declare_entity(EntityRank::NODE, 7, &[]).unwrap();
    let again = f
        .mesh
        .declare_entity(EntityRank::NODE, 7, &[f.boundary])
        .unwrap();
    assert_eq!(first, again);
    assert!(f.mesh.member(first, f.boundary));
    assert!(f.mesh.member(first, PartOrdinal::UNIVERSAL));
    assert!(f.mesh.member(first, PartOrdinal::LOCALLY_OWNED));
    assert!(f.mesh.is_locally_owned(first));
    assert_eq!(f.mesh.entity_count(EntityRank::NODE), 1);
}

#[test]
fn modification_floods_upward_through_unchanged_entities() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();
    let n = nodes(&mut f.mesh, 1..=6);
    let left = element(&mut f.mesh, 1, &[f.block], &n[0..4]);
    let right = element(&mut f.mesh, 2, &[f.block], &n[2..6]);
    f.mesh.modification_end().unwrap();

    f.mesh.modification_begin().unwrap();
    assert_eq!(f.mesh.synchronized_count(), 1);
    f.mesh.change_entity_parts(n[0], &[f.boundary], &[]).unwrap();

    assert_eq!(f.mesh.state(n[0]), EntityState::Modified);
    assert_eq!(f.mesh.state(left), EntityState::Modified);
    assert_eq!(f.mesh.state(right), EntityState::Unchanged);
    assert_eq!(f.mesh.state(n[1]), EntityState::Unchanged);
    assert_eq!(f.mesh.entity_sync_count(n[0]), 1);
    assert_eq!(f.mesh.entity_sync_count(n[1]), 0);
}

#[test]
fn generated_entities_get_unused_keys() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();
    nodes(&mut f.mesh, 1..=4);
    f.mesh.modification_end().unwrap();

    f.mesh.modification_begin().unwrap();
    let created = f.mesh.generate_new_entities(&[2, 0, 0, 1]).unwrap();
    let keys: Vec<EntityKey> = created.iter().map(|&e| f.mesh.entity_key(e)).collect();
    assert_eq!(
        keys,
        vec![
            EntityKey::new(EntityRank::NODE, 5),
            EntityKey::new(EntityRank::NODE, 6),
            EntityKey::new(EntityRank::ELEMENT, 1),
        ]
    );
    assert!(created.iter().all(|&e| f.mesh.is_locally_owned(e)));

    let err = f.mesh.generate_new_entities(&[0, 0, 0, 0, 1]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::BadRank { .. }));
}

#[test]
fn generated_keys_colliding_with_local_declarations_fail() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();
    nodes(&mut f.mesh, [1]);
    // Node 1 is not registered with the index until the cycle ends.
    let err = f.mesh.generate_new_entities(&[1]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::KeyAlreadyUsed(k) if k == EntityKey::new(EntityRank::NODE, 1)));
}

#[test]
fn identifiers_can_change_in_serial() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();
    let n = nodes(&mut f.mesh, [1, 2]);

    f.mesh.change_entity_id(10, n[0]).unwrap();
    assert_eq!(f.mesh.entity_key(n[0]), EntityKey::new(EntityRank::NODE, 10));
    assert_eq!(f.mesh.get_entity(EntityRank::NODE, 10), Some(n[0]));
    assert_eq!(f.mesh.get_entity(EntityRank::NODE, 1), None);

    let err = f.mesh.change_entity_id(2, n[0]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::KeyAlreadyUsed(_)));
    assert!(matches!(
        f.mesh.change_entity_id(0, n[1]).unwrap_err().kind,
        ErrorKind::BadId(0)
    ));
}

#[test]
fn destroyed_offsets_are_recycled_after_the_cycle() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();
    let n = nodes(&mut f.mesh, [1, 2]);
    assert!(f.mesh.destroy_entity(n[0]).unwrap());
    assert!(!f.mesh.destroy_entity(n[0]).unwrap());

    let fresh = nodes(&mut f.mesh, [3])[0];
    assert_ne!(fresh, n[0]);
    f.mesh.modification_end().unwrap();

    f.mesh.modification_begin().unwrap();
    let recycled = nodes(&mut f.mesh, [4])[0];
    assert_eq!(recycled, n[0]);
    assert_eq!(f.mesh.entity_key(recycled), EntityKey::new(EntityRank::NODE, 4));
    assert_eq!(f.mesh.state(recycled), EntityState::Created);
}

#[test]
fn entities_iterate_in_key_order() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();
    let n = nodes(&mut f.mesh, [9, 3, 5]);
    let ordered: Vec<_> = f.mesh.entities(EntityRank::NODE).collect();
    assert_eq!(ordered, vec![n[1], n[2], n[0]]);
}

#[test]
fn optimized_buckets_are_coalesced_at_cycle_end() {
    let mut f = fixture_with(
        BulkDataConfig::default()
            .with_bucket_capacity(2)
            .with_optimize_buckets(true),
    );
    f.mesh.modification_begin().unwrap();
    let n = nodes(&mut f.mesh, 1..=4);
    f.mesh.modification_end().unwrap();
    assert_eq!(f.mesh.buckets(EntityRank::NODE).count(), 2);

    f.mesh.modification_begin().unwrap();
    f.mesh.destroy_entity(n[1]).unwrap();
    f.mesh.destroy_entity(n[3]).unwrap();
    f.mesh.modification_end().unwrap();

    assert_eq!(f.mesh.buckets(EntityRank::NODE).count(), 1);
    for &node in &[n[0], n[2]] {
        let index = f.mesh.mesh_index(node).unwrap();
        assert_eq!(index.bucket_id, 0);
        assert_eq!(f.mesh.bucket(node).unwrap().entity(index.bucket_ordinal), Some(node));
    }
}

#[test]
fn aux_tables_follow_the_configuration() {
    let mut f = fixture_with(BulkDataConfig::legacy());
    f.mesh.modification_begin().unwrap();
    let node = nodes(&mut f.mesh, [1])[0];
    f.mesh.set_local_id(node, 0).unwrap();
    f.mesh.set_framework_id(node, 41).unwrap();
    assert_eq!(f.mesh.local_id(node), Some(0));
    assert_eq!(f.mesh.framework_id(node), Some(41));

    let mut plain = fixture();
    plain.mesh.modification_begin().unwrap();
    let node = nodes(&mut plain.mesh, [1])[0];
    plain.mesh.set_local_id(node, 0).unwrap();
    assert_eq!(plain.mesh.local_id(node), None);
}
