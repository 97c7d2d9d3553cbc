//! Integration tests for Layer 2: Bulk
//!
//! Tests for the modification cycle, relations and induced parts, field
//! access through the mesh, and the parallel bookkeeping driven by a
//! two-process collaborator.

mod fields;
mod lifecycle;
mod relations;
