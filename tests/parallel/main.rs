//! Integration tests for Layer 1: Parallel
//!
//! Tests for the comm list, ghosting records, and the serial collective
//! and key-index implementations.

mod index;
