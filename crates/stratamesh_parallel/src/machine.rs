//! The collective seam.
//!
//! A mesh is replicated SPMD across processes; every process runs the same
//! sequence of collective calls. `ParallelMachine` is the narrow interface
//! the mesh uses to reach the other processes.

use std::fmt;

use stratamesh_foundation::{ProcRank, Result};

/// Process group a mesh is distributed over.
pub trait ParallelMachine: fmt::Debug {
    /// Rank of this process.
    fn rank(&self) -> ProcRank;

    /// Number of processes.
    fn size(&self) -> usize;

    /// Blocks until every process has called `barrier`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Collective`](stratamesh_foundation::ErrorKind::Collective)
    /// if the transport fails.
    fn barrier(&self) -> Result<()>;

    /// Checks that every process passed the same fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Collective`](stratamesh_foundation::ErrorKind::Collective)
    /// if any process disagrees.
    fn verify_consistent(&self, fingerprint: u64) -> Result<()>;
}

/// A single-process machine. Every collective is trivially satisfied.
#[derive(Copy, Clone, Debug, Default)]
pub struct SerialMachine;

impl ParallelMachine for SerialMachine {
    fn rank(&self) -> ProcRank {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }

    fn verify_consistent(&self, _fingerprint: u64) -> Result<()> {
        Ok(())
    }
}
