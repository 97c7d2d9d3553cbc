//! Integration tests for Layer 0: Foundation
//!
//! Tests for core types: EntityKey, Entity, OrdinalSet, Interner, and Error.

mod errors;
mod keys;
