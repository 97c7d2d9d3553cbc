//! Relation storage.
//!
//! Relations live inside the source entity's bucket slot, one
//! [`SlotConnectivity`] per target rank, as parallel arrays of target,
//! ordinal, and permutation sorted by `(ordinal, target)`. The
//! [`ConnectivityMap`] decides which rank pairs keep relations at all; a
//! forward-only map stores no back-relations.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use stratamesh_foundation::{ConnectivityOrdinal, Entity, EntityRank, Permutation};

/// Storage policy for one `(from, to)` rank pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConnectivityType {
    /// Relations are stored and may grow without bound.
    Dynamic,
    /// No relations are stored for the pair.
    Invalid,
}

/// Which rank pairs store relations.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectivityMap {
    rank_count: usize,
    /// Row-major `from * rank_count + to`.
    table: Vec<ConnectivityType>,
}

impl ConnectivityMap {
    /// Creates a map that stores nothing.
    #[must_use]
    pub fn none(rank_count: usize) -> Self {
        Self {
            rank_count,
            table: vec![ConnectivityType::Invalid; rank_count * rank_count],
        }
    }

    /// Stores relations between every pair of distinct ranks.
    #[must_use]
    pub fn all(rank_count: usize) -> Self {
        let mut map = Self::none(rank_count);
        for from in 0..rank_count {
            for to in 0..rank_count {
                if from != to {
                    map.table[from * rank_count + to] = ConnectivityType::Dynamic;
                }
            }
        }
        map
    }

    /// Stores only downward relations (higher rank to lower rank).
    #[must_use]
    pub fn downward_only(rank_count: usize) -> Self {
        let mut map = Self::none(rank_count);
        for from in 0..rank_count {
            for to in 0..from {
                map.table[from * rank_count + to] = ConnectivityType::Dynamic;
            }
        }
        map
    }

    /// Builder method to set the policy of one rank pair.
    #[must_use]
    pub fn with(mut self, from: EntityRank, to: EntityRank, ty: ConnectivityType) -> Self {
        if let Some(slot) = self.slot_index(from, to) {
            self.table[slot] = ty;
        }
        self
    }

    fn slot_index(&self, from: EntityRank, to: EntityRank) -> Option<usize> {
        (from.index() < self.rank_count && to.index() < self.rank_count)
            .then(|| from.index() * self.rank_count + to.index())
    }

    /// Returns the number of ranks the map covers.
    #[must_use]
    pub fn rank_count(&self) -> usize {
        self.rank_count
    }

    /// Returns the policy of a rank pair.
    #[must_use]
    pub fn get(&self, from: EntityRank, to: EntityRank) -> ConnectivityType {
        self.slot_index(from, to)
            .map_or(ConnectivityType::Invalid, |i| self.table[i])
    }

    /// Returns true if relations from `from` to `to` are stored.
    #[must_use]
    pub fn tracks(&self, from: EntityRank, to: EntityRank) -> bool {
        self.get(from, to) == ConnectivityType::Dynamic
    }
}

/// Relations of one entity slot to one target rank.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlotConnectivity {
    targets: Vec<Entity>,
    ordinals: Vec<ConnectivityOrdinal>,
    permutations: Vec<Permutation>,
}

impl SlotConnectivity {
    fn position(&self, target: Entity, ordinal: ConnectivityOrdinal) -> Result<usize, usize> {
        let mut lo = 0;
        let mut hi = self.targets.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            match (self.ordinals[mid], self.targets[mid]).cmp(&(ordinal, target)) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(mid),
            }
        }
        Err(lo)
    }

    /// Adds a relation. Returns false if `(target, ordinal)` was already
    /// present, in which case the stored permutation is kept.
    pub fn add(&mut self, target: Entity, ordinal: ConnectivityOrdinal, permutation: Permutation) -> bool {
        match self.position(target, ordinal) {
            Ok(_) => false,
            Err(pos) => {
                self.targets.insert(pos, target);
                self.ordinals.insert(pos, ordinal);
                self.permutations.insert(pos, permutation);
                true
            }
        }
    }

    /// Removes a relation. Returns true if it was present.
    pub fn remove(&mut self, target: Entity, ordinal: ConnectivityOrdinal) -> bool {
        match self.position(target, ordinal) {
            Ok(pos) => {
                self.targets.remove(pos);
                self.ordinals.remove(pos);
                self.permutations.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Returns true if `(target, ordinal)` is present.
    #[must_use]
    pub fn contains(&self, target: Entity, ordinal: ConnectivityOrdinal) -> bool {
        self.position(target, ordinal).is_ok()
    }

    /// Returns the targets stored at `ordinal`.
    pub fn targets_at(&self, ordinal: ConnectivityOrdinal) -> impl Iterator<Item = Entity> + '_ {
        let start = self.ordinals.partition_point(|o| *o < ordinal);
        self.ordinals[start..]
            .iter()
            .take_while(move |o| **o == ordinal)
            .zip(&self.targets[start..])
            .map(|(_, t)| *t)
    }

    /// Returns the stored permutation of `(target, ordinal)`.
    #[must_use]
    pub fn permutation(&self, target: Entity, ordinal: ConnectivityOrdinal) -> Option<Permutation> {
        self.position(target, ordinal)
            .ok()
            .map(|pos| self.permutations[pos])
    }

    /// Returns the number of relations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Returns true if there are no relations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Returns the targets in `(ordinal, target)` order.
    #[must_use]
    pub fn targets(&self) -> &[Entity] {
        &self.targets
    }

    /// Returns the ordinals, parallel to [`SlotConnectivity::targets`].
    #[must_use]
    pub fn ordinals(&self) -> &[ConnectivityOrdinal] {
        &self.ordinals
    }

    /// Returns the permutations, parallel to [`SlotConnectivity::targets`].
    #[must_use]
    pub fn permutations(&self) -> &[Permutation] {
        &self.permutations
    }

    /// Iterates over `(target, ordinal, permutation)` triples.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, ConnectivityOrdinal, Permutation)> + '_ {
        self.targets
            .iter()
            .zip(&self.ordinals)
            .zip(&self.permutations)
            .map(|((t, o), p)| (*t, *o, *p))
    }
}
