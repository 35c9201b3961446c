//! Sandboxed execution of the compiler under test.
//!
//! One fuzzing trial goes through this crate twice: first the compiler is
//! run over the candidate source (stdin pipe in, coverage out through a
//! System V shared-memory segment, stderr into a bounded capture, all
//! under a wall-clock timeout), then — in the valid engine — the produced
//! artifact is assembled and executed so its output can be compared
//! against the program's target value.
//!
//! No child outlives a trial: timeouts kill and reap, and the shared
//! memory segment is released when its handle drops, even on an engine
//! panic.

pub mod artifact;
pub mod outcome;
pub mod sandbox;
pub mod shm;

pub use artifact::{persist_reproducer, ArtifactRunner, ArtifactVerdict};
pub use outcome::{IceFilter, RunOutcome, RunStatus};
pub use sandbox::{Sandbox, SandboxConfig};
pub use shm::CoverageShm;

use thiserror::Error;

/// Errors from the execution layer. These are engine-internal failures —
/// a rejected or crashing compiler is a classified [`RunOutcome`], not an
/// error.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{call}() failed: {source}")]
    Shm {
        call: &'static str,
        source: std::io::Error,
    },

    #[error("compiler command line is empty")]
    EmptyCommand,

    #[error("assembler exited with {status}")]
    AssembleFailed { status: std::process::ExitStatus },
}
