//! Integration tests for error classification and messages

use stratamesh_foundation::{
    Entity, EntityKey, EntityRank, Error, ErrorContext, ErrorKind,
};

#[test]
fn usage_and_internal_errors_are_distinguished() {
    let usage = [
        Error::not_modifiable("declare_entity"),
        Error::destroyed_entity(Entity::from_local_offset(3)),
        Error::new(ErrorKind::BadId(0)),
        Error::new(ErrorKind::KeyAlreadyUsed(EntityKey::new(EntityRank::NODE, 1))),
    ];
    assert!(usage.iter().all(|e| !e.is_internal()));

    let internal = [
        Error::internal("slot past end"),
        Error::new(ErrorKind::InverseRelation {
            from: EntityKey::new(EntityRank::ELEMENT, 1),
            to: EntityKey::new(EntityRank::NODE, 1),
            ordinal: 0,
        }),
    ];
    assert!(internal.iter().all(Error::is_internal));
}

#[test]
fn messages_name_the_entities() {
    let err = Error::new(ErrorKind::OwnerMismatch {
        key: EntityKey::new(EntityRank::FACE, 8),
        owner: 2,
        expected: 0,
    });
    assert_eq!(err.to_string(), "entity face[8] owner is 2, expected 0");

    let err = Error::new(ErrorKind::InvalidRelation {
        action: "destroy",
        from: EntityKey::new(EntityRank::NODE, 1),
        to: EntityKey::new(EntityRank::ELEMENT, 1),
        reason: "source rank must exceed target rank",
    });
    assert!(err.to_string().starts_with("could not destroy relation from node[1] to element[1]"));
}

#[test]
fn context_is_attached() {
    let err = Error::new(ErrorKind::MeshFinalized).with_context(
        ErrorContext::new()
            .with_operation("modification_begin")
            .with_key(EntityKey::new(EntityRank::NODE, 4)),
    );
    let context = err.context.unwrap();
    assert_eq!(context.operation, Some("modification_begin"));
    assert_eq!(context.to_string(), "in modification_begin on node[4]");
}
