//! The stratamesh modification-cycle controller.
//!
//! This crate provides:
//! - [`BulkData`] - The single entry point for entity, relation, and part
//!   mutation, bracketed by `modification_begin`/`modification_end`
//! - [`BulkDataConfig`] - Bucket capacity, connectivity, and bookkeeping options
//! - [`RelationSpec`] - One relation of a batch declaration
//! - [`PartMembership`] - Explicit and relation-induced parts of an entity
//!
//! # Example
//!
//! ```
//! use stratamesh_bulk::BulkData;
//! use stratamesh_foundation::{EntityRank, Permutation};
//! use stratamesh_storage::MetaData;
//!
//! let mut meta = MetaData::new(4);
//! let block = meta.declare_part("block_1", Some(EntityRank::ELEMENT)).unwrap();
//!
//! let mut mesh = BulkData::new(meta);
//! mesh.modification_begin().unwrap();
//! let elem = mesh.declare_entity(EntityRank::ELEMENT, 1, &[block]).unwrap();
//! let node = mesh.declare_entity(EntityRank::NODE, 1, &[]).unwrap();
//! mesh.declare_relation(elem, node, 0, Permutation::INVALID).unwrap();
//! mesh.modification_end().unwrap();
//!
//! assert!(mesh.member(node, block));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod bulk;
pub mod config;
pub mod membership;
mod parallel;
mod relation;

pub use bulk::{BulkData, SyncState};
pub use config::BulkDataConfig;
pub use membership::PartMembership;
pub use relation::RelationSpec;
