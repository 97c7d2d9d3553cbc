//! Entity keys, local handles, and modification states.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Global entity identifier within a rank.
pub type EntityId = u64;

/// Local ordinal of a relation (e.g. "node 3 of this element").
pub type ConnectivityOrdinal = u32;

/// Rank of a process in the parallel machine.
pub type ProcRank = u32;

/// Topological rank of an entity (node, edge, face, element, ...).
///
/// Ranks are a closed small-integer tag bounded by the mesh-wide rank count
/// fixed at metadata setup.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityRank(pub u8);

impl EntityRank {
    /// Rank of nodes.
    pub const NODE: EntityRank = EntityRank(0);
    /// Rank of edges.
    pub const EDGE: EntityRank = EntityRank(1);
    /// Rank of faces.
    pub const FACE: EntityRank = EntityRank(2);
    /// Rank of elements.
    pub const ELEMENT: EntityRank = EntityRank(3);
    /// Rank of constraints.
    pub const CONSTRAINT: EntityRank = EntityRank(4);
    /// Sentinel for "no rank".
    pub const INVALID: EntityRank = EntityRank(u8::MAX);

    /// Returns the rank as an array index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Builds a rank from an array index.
    ///
    /// Indices that do not fit a rank map to [`EntityRank::INVALID`].
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        u8::try_from(index).map_or(Self::INVALID, EntityRank)
    }

    /// Returns true unless this is the invalid sentinel.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != u8::MAX
    }
}

impl fmt::Debug for EntityRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "EntityRank({})", self.0)
        } else {
            write!(f, "EntityRank(invalid)")
        }
    }
}

impl fmt::Display for EntityRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NODE => write!(f, "node"),
            Self::EDGE => write!(f, "edge"),
            Self::FACE => write!(f, "face"),
            Self::ELEMENT => write!(f, "element"),
            Self::CONSTRAINT => write!(f, "constraint"),
            Self::INVALID => write!(f, "invalid"),
            EntityRank(other) => write!(f, "rank{other}"),
        }
    }
}

/// Globally unique `(rank, id)` key of an entity.
///
/// Keys order by rank first, then id, so a sorted key sequence groups
/// entities of the same rank together.
///
/// # Invariants
/// - `id` is in `1..=EntityKey::MAX_ID` for every valid key
/// - the same entity carries the same key on every process that references it
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityKey {
    rank: EntityRank,
    id: EntityId,
}

impl EntityKey {
    /// Largest identifier a key may carry.
    pub const MAX_ID: EntityId = (1 << 56) - 1;

    /// The invalid key.
    pub const INVALID: EntityKey = EntityKey {
        rank: EntityRank::INVALID,
        id: 0,
    };

    /// Creates a key. Validity is checked separately with [`EntityKey::is_valid`].
    #[must_use]
    pub const fn new(rank: EntityRank, id: EntityId) -> Self {
        Self { rank, id }
    }

    /// Returns the rank component.
    #[must_use]
    pub const fn rank(self) -> EntityRank {
        self.rank
    }

    /// Returns the id component.
    #[must_use]
    pub const fn id(self) -> EntityId {
        self.id
    }

    /// Returns true if `id` may appear in a valid key.
    #[must_use]
    pub const fn is_valid_id(id: EntityId) -> bool {
        id >= 1 && id <= Self::MAX_ID
    }

    /// Returns true if both components are valid.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.rank.is_valid() && Self::is_valid_id(self.id)
    }
}

impl Default for EntityKey {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "EntityKey({}[{}])", self.rank, self.id)
        } else {
            write!(f, "EntityKey(invalid)")
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.rank, self.id)
    }
}

/// Process-local handle to an entity: a dense offset into per-entity arrays.
///
/// Offset 0 is reserved and always invalid. Offsets of destroyed entities
/// are recycled, so a handle alone does not prove identity; compare the key
/// recorded for the offset when a handle may be stale.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Entity(u32);

impl Entity {
    /// The reserved invalid handle.
    pub const INVALID: Entity = Entity(0);

    /// Creates a handle from a local offset.
    ///
    /// # Panics
    ///
    /// Panics if the offset does not fit in 32 bits.
    #[must_use]
    pub fn from_local_offset(offset: usize) -> Self {
        Self(u32::try_from(offset).expect("entity offset exceeds u32 range"))
    }

    /// Returns the local offset.
    #[must_use]
    pub const fn local_offset(self) -> usize {
        self.0 as usize
    }

    /// Returns true unless this is the reserved offset 0.
    #[must_use]
    pub const fn is_local_offset_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_local_offset_valid() {
            write!(f, "Entity({})", self.0)
        } else {
            write!(f, "Entity(invalid)")
        }
    }
}

/// Per-entity state within one modification cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EntityState {
    /// Untouched since the cycle began.
    Unchanged,
    /// Created during the current cycle.
    Created,
    /// Changed (parts, relations, owner) during the current cycle.
    Modified,
    /// Destroyed; bookkeeping is released at cycle end.
    Deleted,
}

/// Relative orientation of a relation target.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Permutation(pub u8);

impl Permutation {
    /// No orientation recorded.
    pub const INVALID: Permutation = Permutation(u8::MAX);
}

impl Default for Permutation {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for Permutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "Permutation(invalid)")
        } else {
            write!(f, "Permutation({})", self.0)
        }
    }
}
