//! Progress checkpoints reported by the batch jobs.
//!
//! Jobs receive a [`ProgressReporter`] and call it at fixed points instead of
//! keeping process-wide timers.

use std::path::PathBuf;

/// Which job is reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Conversion,
    RollingStdev,
}

impl JobKind {
    pub fn name(self) -> &'static str {
        match self {
            JobKind::Conversion => "price_conversion",
            JobKind::RollingStdev => "rolling_stdev",
        }
    }
}

/// A point in a job's lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Checkpoint {
    /// All inputs are in memory.
    LoadComplete { rows: usize },
    /// The computation finished.
    ComputeComplete { rows: usize, flagged_rows: u64 },
    /// The output file is in place.
    WriteComplete { rows: usize, path: PathBuf },
}

/// Receives job checkpoints.
pub trait ProgressReporter: Send + Sync {
    fn checkpoint(&self, job: JobKind, checkpoint: &Checkpoint);
}

/// Reporter that ignores every checkpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn checkpoint(&self, _job: JobKind, _checkpoint: &Checkpoint) {}
}
