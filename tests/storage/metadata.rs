//! Integration tests for part and field declarations

use stratamesh_foundation::{EntityRank, ErrorKind, OrdinalSet, PartOrdinal, ScalarType};
use stratamesh_storage::MetaData;

// =============================================================================
// Parts
// =============================================================================

#[test]
fn builtin_parts_are_reserved() {
    let mut meta = MetaData::new(4);
    assert_eq!(meta.parts().len(), 4);
    for builtin in [
        PartOrdinal::UNIVERSAL,
        PartOrdinal::LOCALLY_OWNED,
        PartOrdinal::GLOBALLY_SHARED,
        PartOrdinal::AURA,
    ] {
        assert!(builtin.is_reserved());
        let name = meta.part(builtin).unwrap().name().to_string();
        let err = meta.declare_part(&name, None).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ReservedPart(_)));
    }
}

#[test]
fn redeclaring_a_part_is_idempotent_only_with_the_same_rank() {
    let mut meta = MetaData::new(4);
    let block = meta.declare_part("block_1", Some(EntityRank::ELEMENT)).unwrap();
    assert_eq!(
        meta.declare_part("block_1", Some(EntityRank::ELEMENT)).unwrap(),
        block
    );

    let err = meta.declare_part("block_1", Some(EntityRank::FACE)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DuplicateName(_)));
    assert_eq!(meta.get_part("block_1").unwrap().ordinal(), block);
}

#[test]
fn part_rank_must_be_in_range() {
    let mut meta = MetaData::new(4);
    assert!(meta.declare_part("constraints", Some(EntityRank::CONSTRAINT)).is_err());

    let mut meta = MetaData::new(5);
    assert!(meta.declare_part("constraints", Some(EntityRank::CONSTRAINT)).is_ok());
}

#[test]
fn subsets_propagate_transitively() {
    let mut meta = MetaData::new(4);
    let all = meta.declare_part("all_blocks", None).unwrap();
    let solid = meta.declare_part("solid", Some(EntityRank::ELEMENT)).unwrap();
    let block = meta.declare_part("block_1", Some(EntityRank::ELEMENT)).unwrap();

    meta.declare_part_subset(solid, block).unwrap();
    meta.declare_part_subset(all, solid).unwrap();

    let supersets = meta.part(block).unwrap().supersets();
    assert!(supersets.contains(solid));
    assert!(supersets.contains(all));
    assert!(meta.part(all).unwrap().subsets().contains(block));

    let mut parts: OrdinalSet<PartOrdinal> = [block].into_iter().collect();
    meta.add_supersets(&mut parts);
    assert_eq!(parts.as_slice(), &[all, solid, block]);
}

#[test]
fn subset_cycles_and_rank_conflicts_are_rejected() {
    let mut meta = MetaData::new(4);
    let a = meta.declare_part("a", None).unwrap();
    let b = meta.declare_part("b", None).unwrap();
    meta.declare_part_subset(a, b).unwrap();

    let err = meta.declare_part_subset(b, a).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidSubset { .. }));
    let err = meta.declare_part_subset(a, a).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidSubset { .. }));
    let err = meta.declare_part_subset(PartOrdinal::UNIVERSAL, a).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidSubset { .. }));

    let faces = meta.declare_part("faces", Some(EntityRank::FACE)).unwrap();
    let elems = meta.declare_part("elems", Some(EntityRank::ELEMENT)).unwrap();
    let err = meta.declare_part_subset(faces, elems).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RankMismatch { .. }));
}

#[test]
fn only_ranked_parts_induce_downward() {
    let mut meta = MetaData::new(4);
    let block = meta.declare_part("block_1", Some(EntityRank::ELEMENT)).unwrap();
    let loose = meta.declare_part("loose", None).unwrap();

    let block = meta.part(block).unwrap();
    assert!(block.induces(EntityRank::ELEMENT, EntityRank::NODE));
    assert!(!block.induces(EntityRank::FACE, EntityRank::NODE));
    assert!(!block.induces(EntityRank::ELEMENT, EntityRank::ELEMENT));

    assert!(!meta.part(loose).unwrap().induces(EntityRank::ELEMENT, EntityRank::NODE));
    assert!(
        !meta
            .part(PartOrdinal::LOCALLY_OWNED)
            .unwrap()
            .induces(EntityRank::ELEMENT, EntityRank::NODE)
    );
}

// =============================================================================
// Fields
// =============================================================================

#[test]
fn field_states_get_consecutive_ordinals() {
    let mut meta = MetaData::new(4);
    let velocity = meta.declare_field("velocity", ScalarType::F64, 3).unwrap();
    let field = meta.field(velocity).unwrap();

    assert_eq!(field.number_of_states(), 3);
    assert_eq!(field.state(), 0);
    let s1 = field.state_ordinal(1).unwrap();
    let s2 = field.state_ordinal(2).unwrap();
    assert_eq!(s1.index(), velocity.index() + 1);
    assert_eq!(s2.index(), velocity.index() + 2);
    assert!(field.state_ordinal(3).is_none());
    assert_eq!(meta.field(s2).unwrap().state(), 2);
    assert_eq!(meta.fields().len(), 3);
}

#[test]
fn field_redeclaration_must_match() {
    let mut meta = MetaData::new(4);
    let t = meta.declare_field("temperature", ScalarType::F64, 2).unwrap();
    assert_eq!(meta.declare_field("temperature", ScalarType::F64, 2).unwrap(), t);
    assert!(meta.declare_field("temperature", ScalarType::F32, 2).is_err());
    assert!(meta.declare_field("temperature", ScalarType::F64, 1).is_err());
}

#[test]
fn state_counts_are_bounded() {
    let mut meta = MetaData::new(4);
    let err = meta.declare_field("none", ScalarType::I32, 0).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::BadStateCount { states: 0, .. }));
    assert!(meta.declare_field("many", ScalarType::I32, 7).is_err());
    assert!(meta.declare_field("six", ScalarType::I32, 6).is_ok());
}

#[test]
fn restrictions_apply_to_every_state_and_keep_the_largest_dimension() {
    let mut meta = MetaData::new(4);
    let block = meta.declare_part("block_1", Some(EntityRank::ELEMENT)).unwrap();
    let stress = meta.declare_field("stress", ScalarType::F64, 2).unwrap();

    meta.put_field_on_mesh(stress, EntityRank::ELEMENT, block, 6).unwrap();
    meta.put_field_on_mesh(stress, EntityRank::ELEMENT, block, 3).unwrap();

    for s in 0..2 {
        let ordinal = meta.field(stress).unwrap().state_ordinal(s).unwrap();
        let field = meta.field(ordinal).unwrap();
        assert_eq!(field.restrictions().len(), 1);
        assert_eq!(field.max_dimension(), 6);
    }
}

#[test]
fn initial_values_must_match_the_scalar() {
    let mut meta = MetaData::new(4);
    let t = meta.declare_field("temperature", ScalarType::F64, 2).unwrap();

    let err = meta.set_initial_value(t, &[1.0f32]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::IncompatibleInitialValue { expected: 8, .. }));
    assert!(meta.set_initial_value::<f64>(t, &[]).is_err());

    meta.set_initial_value(t, &[300.0f64]).unwrap();
    let s1 = meta.field(t).unwrap().state_ordinal(1).unwrap();
    assert_eq!(
        meta.field(s1).unwrap().initial_value(),
        Some(300.0f64.to_ne_bytes().as_slice())
    );
}

#[test]
fn committed_metadata_rejects_declarations() {
    let mut meta = MetaData::new(4);
    let field = meta.declare_field("mass", ScalarType::F64, 1).unwrap();
    meta.commit();
    assert!(meta.is_committed());

    for err in [
        meta.declare_part("late", None).unwrap_err(),
        meta.declare_field("late", ScalarType::F64, 1).unwrap_err(),
        meta.put_field_on_entire_mesh(field, EntityRank::NODE, 1).unwrap_err(),
    ] {
        assert!(matches!(err.kind, ErrorKind::MetaDataCommitted));
    }
}

#[test]
fn fingerprints_differ_on_any_declaration() {
    let build = |dimension| {
        let mut meta = MetaData::new(4);
        meta.declare_part("block_1", Some(EntityRank::ELEMENT)).unwrap();
        let coords = meta.declare_field("coords", ScalarType::F64, 1).unwrap();
        meta.put_field_on_entire_mesh(coords, EntityRank::NODE, dimension)
            .unwrap();
        meta
    };
    assert_eq!(build(3).fingerprint(), build(3).fingerprint());
    assert_ne!(build(3).fingerprint(), build(2).fingerprint());
}
