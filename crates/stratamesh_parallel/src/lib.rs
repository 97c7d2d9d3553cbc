//! Parallel bookkeeping for stratamesh.
//!
//! This crate provides:
//! - [`ParallelMachine`] - The collective seam (rank, size, barrier)
//! - [`DistributedIndex`] - The global key-ownership seam
//! - [`EntityCommList`] - Sorted per-key sharing and ghosting records
//! - [`Ghosting`] - Named ghosting records
//!
//! Serial implementations of both seams ship with the crate; a
//! message-passing backend plugs in through the same traits.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod comm;
pub mod ghosting;
pub mod index;
pub mod machine;

pub use comm::{EntityCommInfo, EntityCommList, EntityCommListInfo};
pub use ghosting::Ghosting;
pub use index::{DistributedIndex, InducedParts, KeyClaim, KeySharing, SerialDistributedIndex};
pub use machine::{ParallelMachine, SerialMachine};
