//! Error types for stratamesh.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.
//! Every error here is fatal for the operation that raised it; expected
//! negative outcomes (destroying an already-invalid entity, a missing
//! relation) are reported as `Ok(false)` by the operations themselves.

use std::fmt;

use thiserror::Error;

use crate::entity::{ConnectivityOrdinal, Entity, EntityId, EntityKey, EntityRank, ProcRank};

/// Result type alias using the stratamesh [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for stratamesh operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Returns true for internal-consistency errors (a bug in this core),
    /// false for usage errors (a bug in the caller).
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::FieldSizeMismatch { .. }
                | ErrorKind::InverseRelation { .. }
                | ErrorKind::Internal(_)
        )
    }

    /// Creates a "not in the ok-to-modify state" error.
    #[must_use]
    pub fn not_modifiable(operation: &'static str) -> Self {
        Self::new(ErrorKind::NotModifiable)
            .with_context(ErrorContext::new().with_operation(operation))
    }

    /// Creates a destroyed-entity error.
    #[must_use]
    pub fn destroyed_entity(entity: Entity) -> Self {
        Self::new(ErrorKind::DestroyedEntity(entity))
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// A mutation was attempted outside a modification cycle.
    #[error("not in the ok-to-modify state")]
    NotModifiable,

    /// A query that needs a consistent comm list ran mid-cycle.
    #[error("operation requires a synchronized mesh")]
    NotSynchronized,

    /// The mesh has been finalized and can no longer be modified.
    #[error("unable to modify, mesh has been finalized")]
    MeshFinalized,

    /// Rank outside the configured rank count.
    #[error("bad key rank: {rank} for id {id}")]
    BadRank {
        /// The offending rank.
        rank: EntityRank,
        /// The id it was paired with.
        id: EntityId,
    },

    /// Identifier outside `1..=EntityKey::MAX_ID`.
    #[error("bad id: {0}")]
    BadId(EntityId),

    /// Relation endpoints violate the rank-descending rule.
    #[error("could not {action} relation from {from} to {to}: {reason}")]
    InvalidRelation {
        /// `"declare"` or `"destroy"`.
        action: &'static str,
        /// Key of the source entity.
        from: EntityKey,
        /// Key of the target entity.
        to: EntityKey,
        /// Human readable reason.
        reason: &'static str,
    },

    /// Handle refers to a destroyed or never-created entity.
    #[error("entity was destroyed: {0:?}")]
    DestroyedEntity(Entity),

    /// The entity is not owned by the expected process.
    #[error("entity {key} owner is {owner}, expected {expected}")]
    OwnerMismatch {
        /// Entity key.
        key: EntityKey,
        /// Current owner.
        owner: ProcRank,
        /// Owner the operation required.
        expected: ProcRank,
    },

    /// Two different targets share one ordinal on the same source.
    #[error("degenerate relation: {from} ordinal {ordinal} already targets {existing}, not {requested}")]
    DegenerateRelation {
        /// Source entity key.
        from: EntityKey,
        /// The shared ordinal.
        ordinal: ConnectivityOrdinal,
        /// Target already recorded at the ordinal.
        existing: EntityKey,
        /// Target that was requested.
        requested: EntityKey,
    },

    /// Builtin bookkeeping parts cannot be changed by callers.
    #[error("part {0} is reserved for internal bookkeeping")]
    ReservedPart(String),

    /// Part ordinal or name is not declared.
    #[error("unknown part: {0}")]
    UnknownPart(String),

    /// Field ordinal or name is not declared.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// Ghosting ordinal or name is not declared.
    #[error("unknown ghosting: {0}")]
    UnknownGhosting(String),

    /// Builtin ghostings are maintained internally.
    #[error("ghosting {0} is reserved for internal bookkeeping")]
    ReservedGhosting(String),

    /// A subset declaration would make a part its own superset.
    #[error("part {subset} cannot be a subset of {superset}")]
    InvalidSubset {
        /// Proposed subset name.
        subset: String,
        /// Proposed superset name.
        superset: String,
    },

    /// Field state count outside `1..=MAX_FIELD_STATES`.
    #[error("field {field} declared with {states} states")]
    BadStateCount {
        /// Field name.
        field: String,
        /// Requested number of states.
        states: u32,
    },

    /// Metadata was changed after commit.
    #[error("metadata already committed")]
    MetaDataCommitted,

    /// A name was declared twice with incompatible definitions.
    #[error("duplicate declaration: {0}")]
    DuplicateName(String),

    /// Initial value does not match the field's declared size.
    #[error("initial value for field {field} has {actual} bytes, expected {expected}")]
    IncompatibleInitialValue {
        /// Field name.
        field: String,
        /// Expected byte count.
        expected: usize,
        /// Provided byte count.
        actual: usize,
    },

    /// Part or field rank does not fit the entity.
    #[error("rank mismatch: {what} has rank {expected}, entity has rank {actual}")]
    RankMismatch {
        /// Description of the ranked item.
        what: String,
        /// The item's rank.
        expected: EntityRank,
        /// The entity's rank.
        actual: EntityRank,
    },

    /// The connectivity map has no storage for this rank pair.
    #[error("connectivity from {from} to {to} is not tracked")]
    ConnectivityNotTracked {
        /// Source rank.
        from: EntityRank,
        /// Target rank.
        to: EntityRank,
    },

    /// A ghost was received from the process that would hold it.
    #[error("cannot receive a ghost of {0} from the local process")]
    LocalGhost(EntityKey),

    /// Process rank outside the process group.
    #[error("process {proc} is outside a group of {size}")]
    BadProcRank {
        /// The offending rank.
        proc: ProcRank,
        /// Number of processes.
        size: usize,
    },

    /// Operation only supported on a single process.
    #[error("{0} is only supported in serial")]
    SerialOnly(&'static str),

    /// A generated key collided with a locally active entity.
    #[error("generated key {0} was already used in this modification cycle")]
    KeyAlreadyUsed(EntityKey),

    /// Field byte sizes differ between source and destination buckets.
    #[error("incompatible field sizes for field {field}: {dst} != {src}")]
    FieldSizeMismatch {
        /// Field ordinal index.
        field: u32,
        /// Destination bytes per entity.
        dst: usize,
        /// Source bytes per entity.
        src: usize,
    },

    /// The mirrored back-relation could not be created or destroyed.
    #[error("could not mirror relation of {from} to {to} with ordinal {ordinal}")]
    InverseRelation {
        /// Source entity key.
        from: EntityKey,
        /// Target entity key.
        to: EntityKey,
        /// Relation ordinal.
        ordinal: ConnectivityOrdinal,
    },

    /// An external collaborator (barrier, distributed index) failed.
    #[error("collective failed: {0}")]
    Collective(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Operation that raised the error (e.g. `declare_relation`).
    pub operation: Option<&'static str>,
    /// Entity the operation was acting on.
    pub key: Option<EntityKey>,
    /// Chain of enclosing operations.
    pub stack: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the operation name.
    #[must_use]
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Sets the entity key.
    #[must_use]
    pub fn with_key(mut self, key: EntityKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Adds a stack frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(operation) = self.operation {
            write!(f, "in {operation}")?;
            if let Some(key) = self.key {
                write!(f, " on {key}")?;
            }
        }
        if !self.stack.is_empty() {
            writeln!(f)?;
            for frame in &self.stack {
                writeln!(f, "  in {frame}")?;
            }
        }
        Ok(())
    }
}
