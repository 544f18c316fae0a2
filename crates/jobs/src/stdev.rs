//! Rolling standard deviation job: load snapshots, compute windows, write.

use parameta_core::{
    Checkpoint, Config, JobKind, NoopReporter, PriceSnapshot, ProgressReporter, Result,
    StdevResult,
};
use parameta_features::RollingStdevCalculator;
use parameta_ingestion::{write_stdev, DataLoader};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::count_flags;
use crate::progress::RunSummary;

/// Runs the rolling stdev computation end to end.
pub struct StdevJob {
    config: Config,
    reporter: Arc<dyn ProgressReporter>,
}

impl StdevJob {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            reporter: Arc::new(NoopReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Compute results for in-memory snapshots.
    pub fn compute(&self, snapshots: &[PriceSnapshot]) -> Vec<StdevResult> {
        RollingStdevCalculator::new(&self.config.rolling)
            .with_parallel(self.config.run.parallel)
            .compute_all(snapshots)
    }

    /// Load snapshots from `input`, compute and write the result to `output`.
    pub fn run(&self, input: &Path, output: &Path) -> Result<RunSummary> {
        let snapshots = DataLoader::new()?.load_snapshots(input)?;
        self.reporter.checkpoint(
            JobKind::RollingStdev,
            &Checkpoint::LoadComplete {
                rows: snapshots.len(),
            },
        );

        let results = self.compute(&snapshots);
        let flags = count_flags(results.iter().map(|r| r.flags));
        self.reporter.checkpoint(
            JobKind::RollingStdev,
            &Checkpoint::ComputeComplete {
                rows: results.len(),
                flagged_rows: flags.flagged_rows,
            },
        );

        let rows_out = write_stdev(output, &results)?;
        self.reporter.checkpoint(
            JobKind::RollingStdev,
            &Checkpoint::WriteComplete {
                rows: rows_out,
                path: output.to_path_buf(),
            },
        );

        let summary = RunSummary {
            job: JobKind::RollingStdev.name(),
            rows_in: snapshots.len(),
            rows_out,
            flags,
            output: output.to_path_buf(),
        };
        info!(
            rows_in = summary.rows_in,
            rows_out = summary.rows_out,
            flagged_rows = summary.flags.flagged_rows,
            "rolling stdev finished"
        );
        Ok(summary)
    }
}
