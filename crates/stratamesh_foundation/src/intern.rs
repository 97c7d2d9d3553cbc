//! Name interning for parts, fields, and ghostings.
//!
//! Names are interned so that part membership, field lookup, and ghosting
//! records work with small dense ordinals instead of strings.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Interned part ordinal.
///
/// Part ordinals are dense and ordered by declaration; sorted vectors of
/// them form bucket signatures.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PartOrdinal(pub(crate) u32);

impl PartOrdinal {
    /// Builds an ordinal from a raw index.
    #[must_use]
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index of this part.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    // =========================================================================
    // Reserved Parts
    // =========================================================================
    // These are always interned at startup with fixed indices.

    /// Every entity belongs to the universal part.
    pub const UNIVERSAL: PartOrdinal = PartOrdinal(0);

    /// Entities owned by this process.
    pub const LOCALLY_OWNED: PartOrdinal = PartOrdinal(1);

    /// Entities shared with at least one other process.
    pub const GLOBALLY_SHARED: PartOrdinal = PartOrdinal(2);

    /// Ghost copies received from other processes.
    pub const AURA: PartOrdinal = PartOrdinal(3);

    /// Returns true for the builtin bookkeeping parts.
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        self.0 <= Self::AURA.0
    }
}

impl fmt::Debug for PartOrdinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartOrdinal({})", self.0)
    }
}

/// Interned field ordinal.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldOrdinal(pub(crate) u32);

impl FieldOrdinal {
    /// Builds an ordinal from a raw index.
    #[must_use]
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index of this field.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Builds the ordinal `offset` positions after this one.
    ///
    /// State fields of a multi-state field are declared consecutively.
    #[must_use]
    pub const fn offset_by(self, offset: u32) -> Self {
        Self(self.0 + offset)
    }
}

impl fmt::Debug for FieldOrdinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldOrdinal({})", self.0)
    }
}

/// Interned ghosting ordinal.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GhostingOrdinal(pub(crate) u32);

impl GhostingOrdinal {
    /// Builds an ordinal from a raw index.
    #[must_use]
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index of this ghosting.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Entities shared between processes.
    pub const SHARED: GhostingOrdinal = GhostingOrdinal(0);

    /// One layer of ghosts around the shared boundary.
    pub const SHARED_AURA: GhostingOrdinal = GhostingOrdinal(1);
}

impl fmt::Debug for GhostingOrdinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GhostingOrdinal({})", self.0)
    }
}

/// One namespace of interned names.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct Namespace {
    names: Vec<Arc<str>>,
    index: HashMap<Arc<str>, u32>,
}

impl Namespace {
    fn intern(&mut self, s: &str) -> (u32, bool) {
        if let Some(&idx) = self.index.get(s) {
            return (idx, false);
        }
        let idx = u32::try_from(self.names.len()).expect("too many interned names");
        let arc: Arc<str> = s.into();
        self.names.push(arc.clone());
        self.index.insert(arc, idx);
        (idx, true)
    }

    fn lookup(&self, s: &str) -> Option<u32> {
        self.index.get(s).copied()
    }

    fn name(&self, idx: u32) -> Option<&str> {
        self.names.get(idx as usize).map(AsRef::as_ref)
    }

    fn len(&self) -> usize {
        self.names.len()
    }
}

/// Interner for part, field, and ghosting names.
///
/// This is a simple interner that maps strings to unique IDs and back.
/// It is not thread-safe; a mesh is owned by one thread per process.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Interner {
    parts: Namespace,
    fields: Namespace,
    ghostings: Namespace,
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

impl Interner {
    /// Reserved parts that are pre-interned at startup.
    const RESERVED_PARTS: &'static [&'static str] = &[
        "{UNIVERSAL}",       // PartOrdinal(0) = UNIVERSAL
        "{LOCALLY_OWNED}",   // PartOrdinal(1) = LOCALLY_OWNED
        "{GLOBALLY_SHARED}", // PartOrdinal(2) = GLOBALLY_SHARED
        "{AURA}",            // PartOrdinal(3) = AURA
    ];

    /// Reserved ghostings that are pre-interned at startup.
    const RESERVED_GHOSTINGS: &'static [&'static str] = &[
        "shared",      // GhostingOrdinal(0) = SHARED
        "shared_aura", // GhostingOrdinal(1) = SHARED_AURA
    ];

    /// Creates a new interner with reserved names pre-interned.
    #[must_use]
    pub fn new() -> Self {
        let mut interner = Self {
            parts: Namespace::default(),
            fields: Namespace::default(),
            ghostings: Namespace::default(),
        };

        for (i, &name) in Self::RESERVED_PARTS.iter().enumerate() {
            let (id, _) = interner.intern_part(name);
            debug_assert_eq!(id.0 as usize, i, "reserved part '{name}' out of place");
        }
        for (i, &name) in Self::RESERVED_GHOSTINGS.iter().enumerate() {
            let (id, _) = interner.intern_ghosting(name);
            debug_assert_eq!(id.0 as usize, i, "reserved ghosting '{name}' out of place");
        }

        interner
    }

    /// Interns a part name. The flag is true if the name was new.
    pub fn intern_part(&mut self, name: &str) -> (PartOrdinal, bool) {
        let (idx, fresh) = self.parts.intern(name);
        (PartOrdinal(idx), fresh)
    }

    /// Looks up a part by name without interning.
    #[must_use]
    pub fn lookup_part(&self, name: &str) -> Option<PartOrdinal> {
        self.parts.lookup(name).map(PartOrdinal)
    }

    /// Gets the name of a part.
    #[must_use]
    pub fn part_name(&self, id: PartOrdinal) -> Option<&str> {
        self.parts.name(id.0)
    }

    /// Interns a field name. The flag is true if the name was new.
    pub fn intern_field(&mut self, name: &str) -> (FieldOrdinal, bool) {
        let (idx, fresh) = self.fields.intern(name);
        (FieldOrdinal(idx), fresh)
    }

    /// Looks up a field by name without interning.
    #[must_use]
    pub fn lookup_field(&self, name: &str) -> Option<FieldOrdinal> {
        self.fields.lookup(name).map(FieldOrdinal)
    }

    /// Gets the name of a field.
    #[must_use]
    pub fn field_name(&self, id: FieldOrdinal) -> Option<&str> {
        self.fields.name(id.0)
    }

    /// Interns a ghosting name. The flag is true if the name was new.
    pub fn intern_ghosting(&mut self, name: &str) -> (GhostingOrdinal, bool) {
        let (idx, fresh) = self.ghostings.intern(name);
        (GhostingOrdinal(idx), fresh)
    }

    /// Looks up a ghosting by name without interning.
    #[must_use]
    pub fn lookup_ghosting(&self, name: &str) -> Option<GhostingOrdinal> {
        self.ghostings.lookup(name).map(GhostingOrdinal)
    }

    /// Gets the name of a ghosting.
    #[must_use]
    pub fn ghosting_name(&self, id: GhostingOrdinal) -> Option<&str> {
        self.ghostings.name(id.0)
    }

    /// Returns the number of interned parts.
    #[must_use]
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Returns the number of interned fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Returns the number of interned ghostings.
    #[must_use]
    pub fn ghosting_count(&self) -> usize {
        self.ghostings.len()
    }
}
