//! Explicit and induced part membership.
//!
//! A bucket signature is the superset closure of an entity's explicit parts
//! and its induced parts. The two sets are kept apart so that losing the
//! last inducing relation never strips a part the caller assigned.

use stratamesh_foundation::{Entity, OrdinalSet, PartOrdinal};

/// The parts of one entity, by origin.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartMembership {
    explicit: OrdinalSet<PartOrdinal>,
    induced: OrdinalSet<PartOrdinal>,
}

impl PartMembership {
    /// Parts assigned directly, builtin bookkeeping parts included.
    #[must_use]
    pub fn explicit(&self) -> &OrdinalSet<PartOrdinal> {
        &self.explicit
    }

    /// Parts induced by higher-rank relations.
    #[must_use]
    pub fn induced(&self) -> &OrdinalSet<PartOrdinal> {
        &self.induced
    }

    /// Returns both sets merged, before superset closure.
    #[must_use]
    pub fn union(&self) -> OrdinalSet<PartOrdinal> {
        let mut parts = self.explicit.clone();
        parts.extend_from(&self.induced);
        parts
    }

    pub(crate) fn explicit_mut(&mut self) -> &mut OrdinalSet<PartOrdinal> {
        &mut self.explicit
    }

    pub(crate) fn induced_mut(&mut self) -> &mut OrdinalSet<PartOrdinal> {
        &mut self.induced
    }
}

/// Per-offset membership, recycled with the entity table.
#[derive(Clone, Debug, Default)]
pub(crate) struct MembershipTable {
    slots: Vec<PartMembership>,
}

impl MembershipTable {
    /// Starts a fresh membership for a newly allocated offset.
    pub(crate) fn reset(&mut self, entity: Entity, explicit: OrdinalSet<PartOrdinal>) {
        let slot = self.slot_mut(entity);
        slot.explicit = explicit;
        slot.induced.clear();
    }

    pub(crate) fn get(&self, entity: Entity) -> Option<&PartMembership> {
        self.slots.get(entity.local_offset())
    }

    pub(crate) fn slot_mut(&mut self, entity: Entity) -> &mut PartMembership {
        let offset = entity.local_offset();
        if offset >= self.slots.len() {
            self.slots.resize_with(offset + 1, PartMembership::default);
        }
        &mut self.slots[offset]
    }

    pub(crate) fn clear(&mut self, entity: Entity) {
        if let Some(slot) = self.slots.get_mut(entity.local_offset()) {
            *slot = PartMembership::default();
        }
    }
}
