//! Coverage-guided scheduling for the icehunt fuzzer.
//!
//! Two engines share this crate's bookkeeping:
//!
//! - [`GrammarEngine`](grammar::GrammarEngine) grows textual program trees
//!   from a production table, keeps the most promising ones in a bounded
//!   priority queue, and periodically restarts from scratch when coverage
//!   goes stale;
//! - [`ValidEngine`](valid::ValidEngine) mutates typed programs through
//!   value-preserving transformations and keeps a mutation only when it
//!   lights up new coverage, with a per-test-case EWMA deciding how many
//!   transformations to stack per trial.
//!
//! Both fold the child's coverage bitmap into a persistent
//! [`CoverageLedger`](coverage::CoverageLedger) and stop at the first
//! defect, leaving a reproducer on disk.
//!
//! The engines are single-threaded; concurrency exists only across the
//! process boundary, one compiler child per trial.

pub mod checkpoint;
pub mod coverage;
pub mod grammar;
pub mod queue;
pub mod report;
pub mod testcase;
pub mod valid;

pub use coverage::CoverageLedger;
pub use grammar::{GrammarConfig, GrammarEngine};
pub use queue::{BoundedQueue, Score};
pub use report::{format_report, Defect, DefectKind, SessionStats};
pub use testcase::{GrammarTestcase, ValidTestcase};
pub use valid::{ValidConfig, ValidEngine};

use thiserror::Error;

/// Errors from the scheduling layer. Rejected candidates are not errors;
/// these are the fatal engine-internal kinds.
#[derive(Error, Debug)]
pub enum ExploreError {
    #[error("execution error: {0}")]
    Exec(#[from] icehunt_exec::ExecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] checkpoint::CheckpointError),
}
