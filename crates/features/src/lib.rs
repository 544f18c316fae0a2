//! Computations for the price snapshot jobs.
//!
//! This crate handles:
//! - Spot rate lookup with staleness detection
//! - Price conversion with per-row data-quality flags
//! - Contiguous window detection over hourly series
//! - Rolling standard deviation of bid/mid/ask

pub mod spot_rate;
pub mod converter;
pub mod contiguity;
pub mod rolling_stdev;

pub use spot_rate::{ResolvedRate, SpotRateResolver};
pub use converter::PriceConverter;
pub use contiguity::{ContiguityValidator, WindowResult, Windows};
pub use rolling_stdev::{window_stdev, RollingStdevCalculator};
