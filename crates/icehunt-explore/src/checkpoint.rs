//! Restart checkpoints.
//!
//! When the grammar engine restarts, the state worth keeping is small:
//! session counters and the best test case's rendered source. The queue
//! itself is deliberately discarded — restarting from a fresh root is the
//! point of the exercise.

use serde::{Deserialize, Serialize};
use snafu::Snafu;
use std::fs;
use std::path::Path;

/// Errors from checkpoint operations.
#[derive(Debug, Snafu)]
pub enum CheckpointError {
    #[snafu(display("I/O error"), context(false))]
    Io { source: std::io::Error },

    #[snafu(display("JSON error"), context(false))]
    Json { source: serde_json::Error },
}

/// Snapshot written at each restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Total executions up to the restart.
    pub nr_execs: u64,
    /// How many restarts have happened, this one included.
    pub restarts: u32,
    /// Unique bits at the time of the restart (reset afterwards).
    pub total_bits: usize,
    /// Best queue entry's score, if the queue was non-empty.
    pub top_score: Option<f32>,
    /// Best queue entry's rendered source.
    pub top_source: Option<String>,
}

impl Checkpoint {
    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
