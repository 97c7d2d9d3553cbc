//! Integration tests for Layer 1: Storage
//!
//! Tests for part and field metadata, the entity table, buckets, field
//! storage, and connectivity.

mod fields;
mod metadata;
