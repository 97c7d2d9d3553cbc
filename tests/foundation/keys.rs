//! Integration tests for entity keys and handles

use stratamesh_foundation::{Entity, EntityKey, EntityRank};

// =============================================================================
// Keys
// =============================================================================

#[test]
fn keys_sort_by_rank_then_id() {
    let mut keys = vec![
        EntityKey::new(EntityRank::ELEMENT, 1),
        EntityKey::new(EntityRank::NODE, 9),
        EntityKey::new(EntityRank::NODE, 2),
        EntityKey::new(EntityRank::FACE, 4),
    ];
    keys.sort();
    assert_eq!(
        keys,
        vec![
            EntityKey::new(EntityRank::NODE, 2),
            EntityKey::new(EntityRank::NODE, 9),
            EntityKey::new(EntityRank::FACE, 4),
            EntityKey::new(EntityRank::ELEMENT, 1),
        ]
    );
}

#[test]
fn key_validity() {
    assert!(EntityKey::new(EntityRank::NODE, 1).is_valid());
    assert!(EntityKey::new(EntityRank::NODE, EntityKey::MAX_ID).is_valid());
    assert!(!EntityKey::new(EntityRank::NODE, 0).is_valid());
    assert!(!EntityKey::new(EntityRank::NODE, EntityKey::MAX_ID + 1).is_valid());
    assert!(!EntityKey::new(EntityRank::INVALID, 1).is_valid());
    assert!(!EntityKey::default().is_valid());
}

#[test]
fn key_display() {
    assert_eq!(EntityKey::new(EntityRank::EDGE, 12).to_string(), "edge[12]");
    assert_eq!(EntityKey::new(EntityRank(7), 3).to_string(), "rank7[3]");
}

// =============================================================================
// Handles
// =============================================================================

#[test]
fn offset_zero_is_reserved() {
    assert!(!Entity::INVALID.is_local_offset_valid());
    assert!(!Entity::default().is_local_offset_valid());
    let e = Entity::from_local_offset(17);
    assert!(e.is_local_offset_valid());
    assert_eq!(e.local_offset(), 17);
}

#[test]
fn rank_indices_round_trip_through_u8() {
    assert_eq!(EntityRank::from_index(3), EntityRank::ELEMENT);
    assert_eq!(EntityRank::from_index(1_000), EntityRank::INVALID);
    assert!(EntityRank::NODE < EntityRank::ELEMENT);
}
