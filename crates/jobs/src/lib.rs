//! Batch job orchestration.
//!
//! Each job loads its inputs, runs the computation from `parameta-features`
//! and writes one CSV file, reporting progress at each stage.

pub mod conversion;
pub mod progress;
pub mod stdev;

pub use conversion::{ConversionInputs, ConversionJob};
pub use progress::{RunSummary, TracingReporter};
pub use stdev::StdevJob;

use parameta_core::{FlagCounts, Flags};

pub(crate) fn count_flags(flags: impl IntoIterator<Item = Flags>) -> FlagCounts {
    let mut counts = FlagCounts::default();
    for row in flags {
        counts.record(row);
    }
    counts
}
