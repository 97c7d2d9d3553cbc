//! Mesh metadata: parts, fields, and field restrictions.
//!
//! Metadata is declared up front and committed by the first
//! `modification_begin`. After commit every declaration fails with
//! [`ErrorKind::MetaDataCommitted`].

// Part and field counts are bounded by u32 ordinals.
#![allow(clippy::cast_possible_truncation)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use stratamesh_foundation::{
    EntityRank, Error, ErrorKind, FieldOrdinal, Interner, OrdinalSet, PartOrdinal, Result,
    ScalarType,
};

use crate::field::{FieldLayout, FieldLayoutSource};

/// Largest number of states a multi-state field may declare.
pub const MAX_FIELD_STATES: u32 = 6;

/// Name suffix of the extra state fields of a multi-state field.
const STATE_SUFFIX: &str = ".state";

/// A named classification of entities.
#[derive(Clone, Debug)]
pub struct Part {
    ordinal: PartOrdinal,
    name: String,
    primary_rank: Option<EntityRank>,
    /// Transitive supersets, excluding the part itself.
    supersets: OrdinalSet<PartOrdinal>,
    /// Transitive subsets, excluding the part itself.
    subsets: OrdinalSet<PartOrdinal>,
}

impl Part {
    /// Returns the ordinal of this part.
    #[must_use]
    pub fn ordinal(&self) -> PartOrdinal {
        self.ordinal
    }

    /// Returns the name of this part.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the rank of entities this part is declared for, if any.
    #[must_use]
    pub fn primary_rank(&self) -> Option<EntityRank> {
        self.primary_rank
    }

    /// Returns every superset of this part.
    #[must_use]
    pub fn supersets(&self) -> &OrdinalSet<PartOrdinal> {
        &self.supersets
    }

    /// Returns every subset of this part.
    #[must_use]
    pub fn subsets(&self) -> &OrdinalSet<PartOrdinal> {
        &self.subsets
    }

    /// Returns true if a relation from a `from_rank` entity in this part
    /// induces membership on a `to_rank` entity.
    ///
    /// Only ranked, non-builtin parts induce, and only downward from their
    /// own rank.
    #[must_use]
    pub fn induces(&self, from_rank: EntityRank, to_rank: EntityRank) -> bool {
        !self.ordinal.is_reserved() && to_rank < from_rank && self.primary_rank == Some(from_rank)
    }
}

/// A field restriction: the field exists on `entity_rank` entities in
/// `part` with `dimension` components each.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FieldRestriction {
    /// Rank the restriction applies to.
    pub entity_rank: EntityRank,
    /// Part the restriction applies to.
    pub part: PartOrdinal,
    /// Number of scalar components per entity.
    pub dimension: usize,
}

/// Declaration of one field state.
#[derive(Clone, Debug)]
pub struct FieldMeta {
    ordinal: FieldOrdinal,
    name: String,
    scalar: ScalarType,
    number_of_states: u32,
    state: u32,
    restrictions: Vec<FieldRestriction>,
    initial_value: Option<Vec<u8>>,
}

impl FieldMeta {
    /// Returns the ordinal of this field state.
    #[must_use]
    pub fn ordinal(&self) -> FieldOrdinal {
        self.ordinal
    }

    /// Returns the name of this field state.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the scalar type of one component.
    #[must_use]
    pub fn scalar(&self) -> ScalarType {
        self.scalar
    }

    /// Returns the number of states of the field this state belongs to.
    #[must_use]
    pub fn number_of_states(&self) -> u32 {
        self.number_of_states
    }

    /// Returns which state this is (0 is the newest).
    #[must_use]
    pub fn state(&self) -> u32 {
        self.state
    }

    /// Returns the ordinal of another state of the same field.
    #[must_use]
    pub fn state_ordinal(&self, state: u32) -> Option<FieldOrdinal> {
        (state < self.number_of_states)
            .then(|| FieldOrdinal::from_index(self.ordinal.index() - self.state + state))
    }

    /// Returns the restrictions of this field.
    #[must_use]
    pub fn restrictions(&self) -> &[FieldRestriction] {
        &self.restrictions
    }

    /// Returns the declared initial value, if any.
    #[must_use]
    pub fn initial_value(&self) -> Option<&[u8]> {
        self.initial_value.as_deref()
    }

    /// Returns the largest dimension among all restrictions.
    #[must_use]
    pub fn max_dimension(&self) -> usize {
        self.restrictions
            .iter()
            .map(|r| r.dimension)
            .max()
            .unwrap_or(0)
    }
}

/// Parts, fields, and restrictions of one mesh.
#[derive(Clone, Debug)]
pub struct MetaData {
    interner: Interner,
    rank_count: usize,
    parts: Vec<Part>,
    fields: Vec<FieldMeta>,
    committed: bool,
}

impl MetaData {
    /// Creates metadata for a mesh with `rank_count` entity ranks.
    ///
    /// The builtin parts are declared immediately.
    #[must_use]
    pub fn new(rank_count: usize) -> Self {
        let interner = Interner::new();
        let parts = (0..interner.part_count())
            .map(|i| {
                let ordinal = PartOrdinal::from_index(i as u32);
                Part {
                    ordinal,
                    name: interner.part_name(ordinal).unwrap_or_default().to_string(),
                    primary_rank: None,
                    supersets: OrdinalSet::new(),
                    subsets: OrdinalSet::new(),
                }
            })
            .collect();

        Self {
            interner,
            rank_count: rank_count.min(usize::from(u8::MAX)),
            parts,
            fields: Vec::new(),
            committed: false,
        }
    }

    /// Returns the number of entity ranks.
    #[must_use]
    pub fn rank_count(&self) -> usize {
        self.rank_count
    }

    /// Returns the name interner.
    #[must_use]
    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    /// Checks that `rank` is below the rank count.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::BadRank`] otherwise.
    pub fn check_rank(&self, rank: EntityRank, id: u64) -> Result<()> {
        if rank.index() < self.rank_count {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::BadRank { rank, id }))
        }
    }

    /// Returns true once the metadata has been committed.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Freezes the metadata.
    pub fn commit(&mut self) {
        self.committed = true;
    }

    fn ensure_uncommitted(&self) -> Result<()> {
        if self.committed {
            Err(Error::new(ErrorKind::MetaDataCommitted))
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Parts
    // =========================================================================

    /// Declares a part, optionally tied to an entity rank.
    ///
    /// Redeclaring a part with the same rank returns the existing ordinal.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata is committed, the rank is out of
    /// range, the name is a builtin part, or the part exists with another
    /// rank.
    pub fn declare_part(&mut self, name: &str, rank: Option<EntityRank>) -> Result<PartOrdinal> {
        self.ensure_uncommitted()?;
        if let Some(rank) = rank {
            self.check_rank(rank, 0)?;
        }

        if let Some(existing) = self.interner.lookup_part(name) {
            if existing.is_reserved() {
                return Err(Error::new(ErrorKind::ReservedPart(name.to_string())));
            }
            if self.parts[existing.index() as usize].primary_rank != rank {
                return Err(Error::new(ErrorKind::DuplicateName(format!(
                    "part {name} redeclared with a different rank"
                ))));
            }
            return Ok(existing);
        }

        let (ordinal, _) = self.interner.intern_part(name);
        self.parts.push(Part {
            ordinal,
            name: name.to_string(),
            primary_rank: rank,
            supersets: OrdinalSet::new(),
            subsets: OrdinalSet::new(),
        });
        Ok(ordinal)
    }

    /// Declares `subset` to be a subset of `superset`.
    ///
    /// Membership in a part implies membership in all of its supersets.
    ///
    /// # Errors
    ///
    /// Returns an error if either part is unknown or builtin, the relation
    /// would form a cycle, or both parts are ranked with different ranks.
    pub fn declare_part_subset(&mut self, superset: PartOrdinal, subset: PartOrdinal) -> Result<()> {
        self.ensure_uncommitted()?;
        let sup = self.part_or_err(superset)?;
        let sub = self.part_or_err(subset)?;

        if superset == subset
            || superset.is_reserved()
            || subset.is_reserved()
            || sup.supersets.contains(subset)
        {
            return Err(Error::new(ErrorKind::InvalidSubset {
                subset: sub.name.clone(),
                superset: sup.name.clone(),
            }));
        }
        if let (Some(expected), Some(actual)) = (sup.primary_rank, sub.primary_rank) {
            if expected != actual {
                return Err(Error::new(ErrorKind::RankMismatch {
                    what: format!("superset {}", sup.name),
                    expected,
                    actual,
                }));
            }
        }

        let mut new_supersets = sup.supersets.clone();
        new_supersets.insert(superset);
        let mut new_subsets = sub.subsets.clone();
        new_subsets.insert(subset);

        for &lower in new_subsets.iter() {
            self.parts[lower.index() as usize]
                .supersets
                .extend_from(&new_supersets);
        }
        for &upper in new_supersets.iter() {
            self.parts[upper.index() as usize]
                .subsets
                .extend_from(&new_subsets);
        }
        Ok(())
    }

    /// Returns a part by ordinal.
    #[must_use]
    pub fn part(&self, ordinal: PartOrdinal) -> Option<&Part> {
        self.parts.get(ordinal.index() as usize)
    }

    /// Returns a part by ordinal or an [`ErrorKind::UnknownPart`] error.
    ///
    /// # Errors
    ///
    /// Returns an error if the ordinal was never declared.
    pub fn part_or_err(&self, ordinal: PartOrdinal) -> Result<&Part> {
        self.part(ordinal)
            .ok_or_else(|| Error::new(ErrorKind::UnknownPart(format!("{ordinal:?}"))))
    }

    /// Looks up a part by name.
    #[must_use]
    pub fn get_part(&self, name: &str) -> Option<&Part> {
        self.interner.lookup_part(name).and_then(|p| self.part(p))
    }

    /// Returns every declared part in ordinal order.
    #[must_use]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Adds every superset of every member to `parts`.
    pub fn add_supersets(&self, parts: &mut OrdinalSet<PartOrdinal>) {
        let members: Vec<PartOrdinal> = parts.iter().copied().collect();
        for p in members {
            if let Some(part) = self.part(p) {
                parts.extend_from(&part.supersets);
            }
        }
    }

    // =========================================================================
    // Fields
    // =========================================================================

    /// Declares a field with `number_of_states` states.
    ///
    /// The states receive consecutive ordinals, the returned one first.
    /// Redeclaring a field with the same scalar and state count returns the
    /// existing ordinal.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata is committed, the state count is out
    /// of range, or the name clashes with an incompatible field.
    pub fn declare_field(
        &mut self,
        name: &str,
        scalar: ScalarType,
        number_of_states: u32,
    ) -> Result<FieldOrdinal> {
        self.ensure_uncommitted()?;
        if !(1..=MAX_FIELD_STATES).contains(&number_of_states) {
            return Err(Error::new(ErrorKind::BadStateCount {
                field: name.to_string(),
                states: number_of_states,
            }));
        }

        if let Some(existing) = self.interner.lookup_field(name) {
            let meta = &self.fields[existing.index() as usize];
            if meta.scalar != scalar || meta.number_of_states != number_of_states || meta.state != 0
            {
                return Err(Error::new(ErrorKind::DuplicateName(format!(
                    "field {name} redeclared with a different type or state count"
                ))));
            }
            return Ok(existing);
        }

        let state_names: Vec<String> = std::iter::once(name.to_string())
            .chain((1..number_of_states).map(|s| format!("{name}{STATE_SUFFIX}{s}")))
            .collect();
        if let Some(clash) = state_names
            .iter()
            .find(|n| self.interner.lookup_field(n).is_some())
        {
            return Err(Error::new(ErrorKind::DuplicateName(format!(
                "field state {clash} already declared"
            ))));
        }

        let mut first = None;
        for (state, state_name) in state_names.into_iter().enumerate() {
            let (ordinal, _) = self.interner.intern_field(&state_name);
            debug_assert_eq!(ordinal.index() as usize, self.fields.len());
            first.get_or_insert(ordinal);
            self.fields.push(FieldMeta {
                ordinal,
                name: state_name,
                scalar,
                number_of_states,
                state: state as u32,
                restrictions: Vec::new(),
                initial_value: None,
            });
        }
        first.ok_or_else(|| Error::internal("field declared without states"))
    }

    /// Restricts a field to `rank` entities of `part` with `dimension`
    /// components, for every state of the field.
    ///
    /// Restricting the same (rank, part) twice keeps the larger dimension.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata is committed or any argument is
    /// unknown or out of range.
    pub fn put_field_on_mesh(
        &mut self,
        field: FieldOrdinal,
        rank: EntityRank,
        part: PartOrdinal,
        dimension: usize,
    ) -> Result<()> {
        self.ensure_uncommitted()?;
        self.check_rank(rank, 0)?;
        self.part_or_err(part)?;

        for ordinal in self.state_ordinals(field)? {
            let restrictions = &mut self.fields[ordinal.index() as usize].restrictions;
            match restrictions
                .iter_mut()
                .find(|r| r.entity_rank == rank && r.part == part)
            {
                Some(existing) => existing.dimension = existing.dimension.max(dimension),
                None => restrictions.push(FieldRestriction {
                    entity_rank: rank,
                    part,
                    dimension,
                }),
            }
        }
        Ok(())
    }

    /// Restricts a field to every `rank` entity of the mesh.
    ///
    /// # Errors
    ///
    /// See [`MetaData::put_field_on_mesh`].
    pub fn put_field_on_entire_mesh(
        &mut self,
        field: FieldOrdinal,
        rank: EntityRank,
        dimension: usize,
    ) -> Result<()> {
        self.put_field_on_mesh(field, rank, PartOrdinal::UNIVERSAL, dimension)
    }

    /// Sets the value every new or vacated slot of the field is reset to.
    ///
    /// The value is given per component; slots wider than the value have
    /// their remaining bytes zeroed.
    ///
    /// # Errors
    ///
    /// Returns an error if `T` does not match the field's scalar size or
    /// `values` is empty.
    pub fn set_initial_value<T: bytemuck::Pod>(
        &mut self,
        field: FieldOrdinal,
        values: &[T],
    ) -> Result<()> {
        self.ensure_uncommitted()?;
        let meta = self.field_or_err(field)?;
        let expected = meta.scalar.size_of();
        let actual = std::mem::size_of_val(values);
        if values.is_empty() || std::mem::size_of::<T>() != expected {
            return Err(Error::new(ErrorKind::IncompatibleInitialValue {
                field: meta.name.clone(),
                expected,
                actual,
            }));
        }

        let bytes: Vec<u8> = bytemuck::cast_slice(values).to_vec();
        for ordinal in self.state_ordinals(field)? {
            self.fields[ordinal.index() as usize].initial_value = Some(bytes.clone());
        }
        Ok(())
    }

    /// Returns a field state by ordinal.
    #[must_use]
    pub fn field(&self, ordinal: FieldOrdinal) -> Option<&FieldMeta> {
        self.fields.get(ordinal.index() as usize)
    }

    /// Returns a field state by ordinal or an [`ErrorKind::UnknownField`] error.
    ///
    /// # Errors
    ///
    /// Returns an error if the ordinal was never declared.
    pub fn field_or_err(&self, ordinal: FieldOrdinal) -> Result<&FieldMeta> {
        self.field(ordinal)
            .ok_or_else(|| Error::new(ErrorKind::UnknownField(format!("{ordinal:?}"))))
    }

    /// Looks up a field state by name.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&FieldMeta> {
        self.interner.lookup_field(name).and_then(|f| self.field(f))
    }

    /// Returns every field state in ordinal order.
    #[must_use]
    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    fn state_ordinals(&self, field: FieldOrdinal) -> Result<Vec<FieldOrdinal>> {
        let meta = self.field_or_err(field)?;
        Ok((0..meta.number_of_states)
            .filter_map(|s| meta.state_ordinal(s))
            .collect())
    }

    /// Hashes every declaration.
    ///
    /// Processes compare fingerprints at the first modification cycle to
    /// verify they declared identical metadata.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.rank_count.hash(&mut hasher);
        for part in &self.parts {
            part.name.hash(&mut hasher);
            part.primary_rank.hash(&mut hasher);
            part.supersets.hash(&mut hasher);
        }
        for field in &self.fields {
            field.name.hash(&mut hasher);
            field.scalar.hash(&mut hasher);
            field.number_of_states.hash(&mut hasher);
            for r in &field.restrictions {
                (r.entity_rank, r.part, r.dimension).hash(&mut hasher);
            }
        }
        hasher.finish()
    }
}

impl FieldLayoutSource for MetaData {
    fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn layout(
        &self,
        field: FieldOrdinal,
        rank: EntityRank,
        parts: &[PartOrdinal],
    ) -> Option<FieldLayout> {
        let meta = self.field(field)?;
        let dimension = meta
            .restrictions
            .iter()
            .filter(|r| r.entity_rank == rank && parts.binary_search(&r.part).is_ok())
            .map(|r| r.dimension)
            .max()?;
        (dimension > 0).then(|| FieldLayout {
            dimension,
            scalar_bytes: meta.scalar.size_of(),
        })
    }

    fn initial_value(&self, field: FieldOrdinal) -> Option<&[u8]> {
        self.field(field).and_then(FieldMeta::initial_value)
    }
}
