//! Progress reporting and run summaries.

use parameta_core::{Checkpoint, FlagCounts, JobKind, ProgressReporter};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// Logs each checkpoint with the wall time elapsed since construction.
#[derive(Debug, Clone)]
pub struct TracingReporter {
    started: Instant,
}

impl TracingReporter {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for TracingReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for TracingReporter {
    fn checkpoint(&self, job: JobKind, checkpoint: &Checkpoint) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        match checkpoint {
            Checkpoint::LoadComplete { rows } => {
                info!(job = job.name(), elapsed_ms, rows, "load complete");
            }
            Checkpoint::ComputeComplete { rows, flagged_rows } => {
                info!(job = job.name(), elapsed_ms, rows, flagged_rows, "compute complete");
            }
            Checkpoint::WriteComplete { rows, path } => {
                info!(
                    job = job.name(),
                    elapsed_ms,
                    rows,
                    path = %path.display(),
                    "write complete"
                );
            }
        }
    }
}

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Job name.
    pub job: &'static str,
    /// Input rows (primary table only).
    pub rows_in: usize,
    /// Output rows written.
    pub rows_out: usize,
    /// Flag counts over the output rows.
    pub flags: FlagCounts,
    /// Output file.
    pub output: PathBuf,
}
