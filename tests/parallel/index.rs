//! Integration tests for the serial collective seams and ghosting records

use stratamesh_foundation::{
    EntityKey, EntityRank, GhostingOrdinal, OrdinalSet, PartOrdinal,
};
use stratamesh_parallel::{
    DistributedIndex, Ghosting, InducedParts, KeyClaim, ParallelMachine, SerialDistributedIndex,
    SerialMachine,
};

fn key(rank: EntityRank, id: u64) -> EntityKey {
    EntityKey::new(rank, id)
}

// =============================================================================
// SerialMachine
// =============================================================================

#[test]
fn serial_machine_collectives_succeed() {
    let machine = SerialMachine;
    assert_eq!(machine.rank(), 0);
    assert_eq!(machine.size(), 1);
    assert!(machine.barrier().is_ok());
    assert!(machine.verify_consistent(0xdead_beef).is_ok());
}

// =============================================================================
// SerialDistributedIndex
// =============================================================================

#[test]
fn generated_keys_fill_gaps_per_rank() {
    let mut index = SerialDistributedIndex::new();
    index
        .resolve_sharing(&[
            KeyClaim {
                key: key(EntityRank::NODE, 1),
                proc: 0,
                owner: 0,
            },
            KeyClaim {
                key: key(EntityRank::NODE, 3),
                proc: 0,
                owner: 0,
            },
        ])
        .unwrap();

    let batches = index.generate_new_keys(&[3, 0, 0, 1]).unwrap();
    assert_eq!(batches.len(), 4);
    assert_eq!(
        batches[0],
        vec![
            key(EntityRank::NODE, 2),
            key(EntityRank::NODE, 4),
            key(EntityRank::NODE, 5)
        ]
    );
    assert!(batches[1].is_empty());
    assert_eq!(batches[3], vec![key(EntityRank::ELEMENT, 1)]);
    assert_eq!(index.len(), 6);
}

#[test]
fn removed_keys_are_handed_out_again() {
    let mut index = SerialDistributedIndex::new();
    let first = index.generate_new_keys(&[2]).unwrap();
    index.register_removed_key(first[0][0]);
    assert!(!index.contains(first[0][0]));

    let again = index.generate_new_keys(&[1]).unwrap();
    assert_eq!(again[0], vec![first[0][0]]);
}

#[test]
fn serial_sharing_keeps_the_claimed_owner() {
    let mut index = SerialDistributedIndex::new();
    let claims = [KeyClaim {
        key: key(EntityRank::FACE, 8),
        proc: 0,
        owner: 0,
    }];
    let resolved = index.resolve_sharing(&claims).unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].owner, 0);
    assert!(resolved[0].sharing_procs.is_empty());
    assert!(index.contains(key(EntityRank::FACE, 8)));
}

#[test]
fn serial_reconcile_echoes_local_parts() {
    let mut index = SerialDistributedIndex::new();
    let parts: OrdinalSet<PartOrdinal> = [PartOrdinal::from_index(5)].into_iter().collect();
    let local = vec![InducedParts {
        key: key(EntityRank::NODE, 1),
        parts,
    }];
    assert_eq!(index.reconcile_induced_parts(&local).unwrap(), local);
}

// =============================================================================
// Ghosting
// =============================================================================

#[test]
fn builtin_ghostings_are_recognised_by_ordinal() {
    let shared = Ghosting::new("shared", GhostingOrdinal::SHARED, 0);
    let aura = Ghosting::new("shared_aura", GhostingOrdinal::SHARED_AURA, 0);
    let custom = Ghosting::new("halo", GhostingOrdinal::from_index(2), 4);
    assert!(shared.is_builtin());
    assert!(aura.is_builtin());
    assert!(!custom.is_builtin());
    assert_eq!(custom.name(), "halo");
}

#[test]
fn touching_records_the_cycle() {
    let mut ghosting = Ghosting::new("halo", GhostingOrdinal::from_index(2), 1);
    ghosting.touch(7);
    assert_eq!(ghosting.sync_count(), 7);
    assert_eq!(ghosting.ordinal(), GhostingOrdinal::from_index(2));
}
