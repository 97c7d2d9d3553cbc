//! The global key-ownership seam.
//!
//! The distributed index is authoritative for which keys exist anywhere,
//! who owns them, and which processes share them. The mesh never decides
//! these things on its own; it submits claims at the end of a modification
//! cycle and applies the answers.

use std::collections::BTreeSet;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use stratamesh_foundation::{
    EntityKey, EntityRank, Error, ErrorKind, OrdinalSet, PartOrdinal, ProcRank, Result,
};
use tracing::debug;

/// A process's claim to hold an entity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeyClaim {
    /// Entity key.
    pub key: EntityKey,
    /// Process holding the entity.
    pub proc: ProcRank,
    /// Owner the claiming process currently records.
    pub owner: ProcRank,
}

/// The resolved ownership and sharing of a key.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeySharing {
    /// Entity key.
    pub key: EntityKey,
    /// Owning process.
    pub owner: ProcRank,
    /// Processes other than the owner that hold the entity, sorted.
    pub sharing_procs: Vec<ProcRank>,
}

/// Induced parts of one entity.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InducedParts {
    /// Entity key.
    pub key: EntityKey,
    /// Parts induced on the entity.
    pub parts: OrdinalSet<PartOrdinal>,
}

/// Global key bookkeeping shared by all processes of a mesh.
pub trait DistributedIndex: fmt::Debug {
    /// Releases a key destroyed on this process.
    fn register_removed_key(&mut self, key: EntityKey);

    /// Allocates `requests[rank]` globally unique keys for every rank.
    ///
    /// # Errors
    ///
    /// Returns an error if the id space is exhausted or the collective fails.
    fn generate_new_keys(&mut self, requests: &[usize]) -> Result<Vec<Vec<EntityKey>>>;

    /// Resolves owner and sharers for every claimed key.
    ///
    /// # Errors
    ///
    /// Returns an error if the collective fails.
    fn resolve_sharing(&mut self, claims: &[KeyClaim]) -> Result<Vec<KeySharing>>;

    /// Merges locally computed induced parts of shared entities with every
    /// other sharer's view and returns the agreed parts.
    ///
    /// # Errors
    ///
    /// Returns an error if the collective fails.
    fn reconcile_induced_parts(&mut self, local: &[InducedParts]) -> Result<Vec<InducedParts>>;
}

/// Single-process distributed index.
///
/// Every claimed key keeps the owner the claim records and is shared with
/// no one. Generated keys take the lowest ids not in use.
#[derive(Clone, Debug, Default)]
pub struct SerialDistributedIndex {
    used: BTreeSet<EntityKey>,
}

impl SerialDistributedIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the key is registered.
    #[must_use]
    pub fn contains(&self, key: EntityKey) -> bool {
        self.used.contains(&key)
    }

    /// Returns the number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.used.len()
    }

    /// Returns true if no keys are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

impl DistributedIndex for SerialDistributedIndex {
    fn register_removed_key(&mut self, key: EntityKey) {
        self.used.remove(&key);
    }

    fn generate_new_keys(&mut self, requests: &[usize]) -> Result<Vec<Vec<EntityKey>>> {
        let mut batches = Vec::with_capacity(requests.len());
        for (r, &count) in requests.iter().enumerate() {
            let rank = EntityRank::from_index(r);
            let mut batch = Vec::with_capacity(count);
            let mut id = 1;
            while batch.len() < count {
                let key = EntityKey::new(rank, id);
                if !key.is_valid() {
                    return Err(Error::new(ErrorKind::BadId(id)));
                }
                if self.used.insert(key) {
                    batch.push(key);
                }
                id += 1;
            }
            batches.push(batch);
        }
        debug!(?requests, "generated keys");
        Ok(batches)
    }

    fn resolve_sharing(&mut self, claims: &[KeyClaim]) -> Result<Vec<KeySharing>> {
        debug!(claims = claims.len(), "resolving sharing");
        Ok(claims
            .iter()
            .map(|claim| {
                self.used.insert(claim.key);
                KeySharing {
                    key: claim.key,
                    owner: claim.owner,
                    sharing_procs: Vec::new(),
                }
            })
            .collect())
    }

    fn reconcile_induced_parts(&mut self, local: &[InducedParts]) -> Result<Vec<InducedParts>> {
        Ok(local.to_vec())
    }
}
