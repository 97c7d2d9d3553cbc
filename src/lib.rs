//! Stratamesh - Distributed, bucketed entity-relation mesh database core
//!
//! This crate re-exports all layers of the Stratamesh system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: stratamesh_bulk       - Modification cycle, relations, sharing, ghosting
//! Layer 1: stratamesh_storage    - Metadata, entity table, buckets, field data
//!          stratamesh_parallel   - Comm list, ghostings, collective seams
//! Layer 0: stratamesh_foundation - Core types (EntityKey, Entity, Error)
//! ```

pub use stratamesh_bulk as bulk;
pub use stratamesh_foundation as foundation;
pub use stratamesh_parallel as parallel;
pub use stratamesh_storage as storage;
