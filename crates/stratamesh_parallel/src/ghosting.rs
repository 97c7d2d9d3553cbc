//! Named ghostings.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use stratamesh_foundation::GhostingOrdinal;

/// A named policy of which processes receive copies of which entities.
///
/// The per-entity records live in the comm list; this only names the
/// ghosting and remembers when it last changed.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ghosting {
    name: String,
    ordinal: GhostingOrdinal,
    sync_count: u64,
}

impl Ghosting {
    /// Creates a ghosting record.
    #[must_use]
    pub fn new(name: impl Into<String>, ordinal: GhostingOrdinal, sync_count: u64) -> Self {
        Self {
            name: name.into(),
            ordinal,
            sync_count,
        }
    }

    /// Returns the name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the ordinal.
    #[must_use]
    pub fn ordinal(&self) -> GhostingOrdinal {
        self.ordinal
    }

    /// Returns the sync count of the cycle that last changed the ghosting.
    #[must_use]
    pub fn sync_count(&self) -> u64 {
        self.sync_count
    }

    /// Records a change in cycle `sync_count`.
    pub fn touch(&mut self, sync_count: u64) {
        self.sync_count = sync_count;
    }

    /// Returns true for the builtin `shared` and `shared_aura` ghostings.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.ordinal.index() <= GhostingOrdinal::SHARED_AURA.index()
    }
}
