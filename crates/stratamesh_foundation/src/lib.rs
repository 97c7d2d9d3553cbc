//! Core types for stratamesh.
//!
//! This crate provides:
//! - [`EntityKey`] - Globally meaningful `(rank, id)` entity keys
//! - [`Entity`] - Process-local recyclable entity handles
//! - [`EntityState`] - Per-cycle modification state
//! - [`Interner`] - Name tables for parts, fields, and ghostings
//! - [`OrdinalSet`] - Sorted, deduplicated ordinal sets
//! - [`ScalarType`] - Scalar descriptors for field storage
//! - [`Error`] - Rich error types with context

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collections;
pub mod entity;
pub mod error;
pub mod intern;
pub mod types;

pub use collections::OrdinalSet;
pub use entity::{
    ConnectivityOrdinal, Entity, EntityId, EntityKey, EntityRank, EntityState, Permutation,
    ProcRank,
};
pub use error::{Error, ErrorContext, ErrorKind, Result};
pub use intern::{FieldOrdinal, GhostingOrdinal, Interner, PartOrdinal};
pub use types::ScalarType;
