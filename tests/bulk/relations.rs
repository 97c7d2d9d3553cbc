//! Integration tests for relations and induced membership

use stratamesh_bulk::{BulkData, BulkDataConfig, RelationSpec};
use stratamesh_foundation::{EntityKey, EntityRank, ErrorKind, PartOrdinal, Permutation};
use stratamesh_storage::{ConnectivityMap, ConnectivityType};

use crate::common::{declarations, element, fixture, fixture_with, nodes};

#[test]
fn parts_induce_through_every_rank() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();
    let n = nodes(&mut f.mesh, 1..=4);
    let face = f.mesh.declare_entity(EntityRank::FACE, 1, &[f.skin]).unwrap();
    let face_nodes: Vec<RelationSpec> = n
        .iter()
        .enumerate()
        .map(|(i, &node)| RelationSpec::new(node, i as u32))
        .collect();
    f.mesh.declare_relations(face, &face_nodes).unwrap();
    let elem = element(&mut f.mesh, 1, &[f.block], &n);
    f.mesh.declare_relation(elem, face, 0, Permutation::INVALID).unwrap();
    f.mesh.modification_end().unwrap();

    let node = f.mesh.membership(n[0]).unwrap();
    assert!(node.induced().contains(f.skin));
    assert!(node.induced().contains(f.block));
    assert!(!node.explicit().contains(f.block));
    assert!(f.mesh.membership(face).unwrap().induced().contains(f.block));
    assert!(!f.mesh.member(elem, f.skin));
}

#[test]
fn bucket_parts_are_closed_over_supersets() {
    let mut d = declarations();
    let all_blocks = d
        .meta
        .declare_part("all_blocks", Some(EntityRank::ELEMENT))
        .unwrap();
    let everything = d.meta.declare_part("everything", None).unwrap();
    d.meta.declare_part_subset(all_blocks, d.block).unwrap();
    d.meta.declare_part_subset(everything, d.block).unwrap();
    let mut mesh = BulkData::new(d.meta);

    mesh.modification_begin().unwrap();
    let n = nodes(&mut mesh, 1..=4);
    let elem = element(&mut mesh, 1, &[d.block], &n);

    assert!(mesh.member(elem, all_blocks));
    assert!(mesh.member(elem, everything));
    assert!(mesh.member(n[0], d.block));
    assert!(mesh.member(n[0], all_blocks));
    assert!(mesh.member(n[0], everything));

    // Only ranked parts induce; the unranked superset comes from closure.
    let induced = mesh.membership(n[0]).unwrap().induced();
    assert!(induced.contains(all_blocks));
    assert!(!induced.contains(everything));
}

#[test]
fn permutations_are_recorded_on_both_sides() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();
    let face = f.mesh.declare_entity(EntityRank::FACE, 1, &[]).unwrap();
    let elem = f.mesh.declare_entity(EntityRank::ELEMENT, 1, &[]).unwrap();

    // Declared from the face; the element ends up as the source.
    f.mesh
        .declare_relations(
            face,
            &[RelationSpec::new(elem, 4).with_permutation(Permutation(3))],
        )
        .unwrap();

    assert_eq!(f.mesh.related_entities(elem, EntityRank::FACE), &[face]);
    assert_eq!(f.mesh.relation_ordinals(elem, EntityRank::FACE), &[4]);
    assert_eq!(f.mesh.relation_permutations(elem, EntityRank::FACE), &[Permutation(3)]);
    assert_eq!(f.mesh.related_entities(face, EntityRank::ELEMENT), &[elem]);
    assert_eq!(f.mesh.relation_ordinals(face, EntityRank::ELEMENT), &[4]);
    assert_eq!(
        f.mesh.relation_permutations(face, EntityRank::ELEMENT),
        &[Permutation(3)]
    );
}

#[test]
fn relation_preconditions() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();
    let n = nodes(&mut f.mesh, [1, 2]);
    let elem = element(&mut f.mesh, 1, &[], &n[..1]);

    let err = f
        .mesh
        .declare_relations(n[0], &[RelationSpec::new(n[1], 0)])
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidRelation { action: "declare", .. }));

    let err = f
        .mesh
        .declare_relation(elem, n[1], 0, Permutation::INVALID)
        .unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::DegenerateRelation { ordinal: 0, existing, requested, .. }
            if existing == EntityKey::new(EntityRank::NODE, 1)
                && requested == EntityKey::new(EntityRank::NODE, 2)
    ));

    assert!(!f.mesh.destroy_relation(elem, n[1], 0).unwrap());
    f.mesh.destroy_entity(n[1]).unwrap();
    let err = f
        .mesh
        .declare_relation(elem, n[1], 1, Permutation::INVALID)
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DestroyedEntity(_)));
}

#[test]
fn untracked_rank_pairs_are_rejected() {
    let map = ConnectivityMap::all(4).with(
        EntityRank::ELEMENT,
        EntityRank::NODE,
        ConnectivityType::Invalid,
    );
    let mut f = fixture_with(BulkDataConfig::default().with_connectivity(map));
    f.mesh.modification_begin().unwrap();
    let node = nodes(&mut f.mesh, [1])[0];
    let elem = f.mesh.declare_entity(EntityRank::ELEMENT, 1, &[]).unwrap();
    let face = f.mesh.declare_entity(EntityRank::FACE, 1, &[]).unwrap();

    let err = f
        .mesh
        .declare_relation(elem, node, 0, Permutation::INVALID)
        .unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::ConnectivityNotTracked {
            from: EntityRank::ELEMENT,
            to: EntityRank::NODE
        }
    ));
    f.mesh.declare_relation(face, node, 0, Permutation::INVALID).unwrap();
    assert_eq!(f.mesh.related_entities(node, EntityRank::FACE), &[face]);
}

#[test]
fn forward_only_induction_is_recovered_by_scanning() {
    let mut f = fixture_with(BulkDataConfig::forward_only(4));
    f.mesh.modification_begin().unwrap();
    let n = nodes(&mut f.mesh, 1..=6);
    let left = element(&mut f.mesh, 1, &[f.block], &n[0..4]);
    let right = element(&mut f.mesh, 2, &[f.block], &n[2..6]);
    assert!(f.mesh.related_entities(n[2], EntityRank::ELEMENT).is_empty());

    assert!(f.mesh.destroy_relation(left, n[2], 2).unwrap());
    assert!(f.mesh.member(n[2], f.block));
    assert!(f.mesh.destroy_relation(right, n[2], 0).unwrap());
    assert!(!f.mesh.member(n[2], f.block));
    assert!(f.mesh.member(n[3], f.block));
}

#[test]
fn forward_only_targets_cannot_be_destroyed_while_related() {
    let mut f = fixture_with(BulkDataConfig::forward_only(4));
    f.mesh.modification_begin().unwrap();
    let n = nodes(&mut f.mesh, [1, 2]);
    let elem = element(&mut f.mesh, 1, &[], &n[..1]);

    assert!(!f.mesh.destroy_entity(n[0]).unwrap());
    assert!(f.mesh.is_valid(n[0]));
    assert!(f.mesh.destroy_entity(n[1]).unwrap());
    f.mesh.modification_end().unwrap();

    // The freed offset is reused without touching the element's relation.
    f.mesh.modification_begin().unwrap();
    nodes(&mut f.mesh, [9]);
    assert_eq!(
        f.mesh.related_keys(elem, EntityRank::NODE),
        vec![EntityKey::new(EntityRank::NODE, 1)]
    );

    assert!(f.mesh.destroy_relation(elem, n[0], 0).unwrap());
    assert!(f.mesh.destroy_entity(n[0]).unwrap());
}

#[test]
fn relation_counts() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();
    let n = nodes(&mut f.mesh, [4, 2, 9]);
    let lonely = nodes(&mut f.mesh, [10])[0];
    let elem = element(&mut f.mesh, 1, &[], &n);
    let face = f.mesh.declare_entity(EntityRank::FACE, 1, &[]).unwrap();
    f.mesh.declare_relation(elem, face, 0, Permutation::INVALID).unwrap();

    assert_eq!(f.mesh.count_relations(elem), 4);
    assert_eq!(f.mesh.num_connectivity(elem, EntityRank::NODE), 3);
    assert_eq!(f.mesh.count_valid_connectivity(elem, EntityRank::NODE), 3);
    assert_eq!(f.mesh.count_all_valid_connectivity(elem), 4);
    assert_eq!(f.mesh.count_relations(n[0]), 1);
    assert!(f.mesh.has_no_relations(lonely));
    assert_eq!(
        f.mesh.related_keys(elem, EntityRank::NODE),
        vec![
            EntityKey::new(EntityRank::NODE, 4),
            EntityKey::new(EntityRank::NODE, 2),
            EntityKey::new(EntityRank::NODE, 9),
        ]
    );
}

#[test]
fn explicit_membership_outlives_induction() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();
    let node = f.mesh.declare_entity(EntityRank::NODE, 1, &[f.block]).unwrap();
    let elem = element(&mut f.mesh, 1, &[f.block], &[node]);

    assert!(f.mesh.membership(node).unwrap().induced().contains(f.block));
    f.mesh.destroy_relation(elem, node, 0).unwrap();
    let membership = f.mesh.membership(node).unwrap();
    assert!(membership.explicit().contains(f.block));
    assert!(!membership.induced().contains(f.block));
    assert!(f.mesh.member(node, f.block));
}

#[test]
fn element_part_changes_reach_their_nodes() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();
    let n = nodes(&mut f.mesh, 1..=4);
    let elem = element(&mut f.mesh, 1, &[f.block], &n);

    f.mesh.change_entity_parts(elem, &[], &[f.block]).unwrap();
    assert!(n.iter().all(|&node| !f.mesh.member(node, f.block)));

    f.mesh.change_entity_parts(elem, &[f.block], &[]).unwrap();
    assert!(n.iter().all(|&node| f.mesh.member(node, f.block)));

    assert!(f.mesh.destroy_entity(elem).unwrap());
    for &node in &n {
        assert!(!f.mesh.member(node, f.block));
        assert!(f.mesh.has_no_relations(node));
        assert!(f.mesh.destroy_entity(node).unwrap());
    }
    assert_eq!(f.mesh.entity_count(EntityRank::NODE), 0);
    assert!(!f.mesh.member(n[0], PartOrdinal::UNIVERSAL));
}
