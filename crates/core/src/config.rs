//! Configuration structures for the price snapshot jobs.
//!
//! Every tunable used by the algorithms lives here with its default spelled
//! out in the `Default` impls. The algorithms themselves take these values as
//! constructor arguments and carry no defaults of their own.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{naive_to_ts, TimestampMs};

/// Main configuration for both jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Price conversion configuration.
    pub conversion: ConversionConfig,
    /// Rolling standard deviation configuration.
    pub rolling: RollingStdevConfig,
    /// Execution configuration.
    pub run: RunConfig,
}

impl Config {
    /// Parse a JSON document. Missing sections and fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        self.rolling.validate()
    }
}

/// Which metadata column rows are joined on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKey {
    /// Join on the row's currency pair.
    #[default]
    CcyPair,
    /// Join on the row's security id.
    SecurityId,
}

impl MetadataKey {
    /// Input column holding the key.
    pub fn column(self) -> &'static str {
        match self {
            MetadataKey::CcyPair => "ccy_pair",
            MetadataKey::SecurityId => "security_id",
        }
    }
}

/// Price conversion configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// A spot rate older than this (relative to the price) is flagged stale.
    pub max_spot_age_hours: u32,
    /// Metadata join key.
    pub metadata_key: MetadataKey,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            // Rates are expected from within the hour preceding the price.
            max_spot_age_hours: 1,
            metadata_key: MetadataKey::CcyPair,
        }
    }
}

/// Sample (n - 1) or population (n) standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdevMode {
    #[default]
    Sample,
    Population,
}

impl std::str::FromStr for StdevMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sample" => Ok(StdevMode::Sample),
            "population" => Ok(StdevMode::Population),
            other => Err(Error::config(format!("unknown stdev mode '{other}'"))),
        }
    }
}

/// Rolling standard deviation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollingStdevConfig {
    /// Rows per window.
    pub window_size: usize,
    /// Required spacing between consecutive rows, in hours.
    pub window_step_hours: u32,
    /// Standard deviation convention.
    pub stdev_mode: StdevMode,
    /// Emit non-contiguous windows as flagged rows with null statistics.
    pub emit_invalid_windows: bool,
    /// Earliest window end to emit (inclusive).
    pub start: Option<NaiveDateTime>,
    /// Latest window end to emit (inclusive).
    pub end: Option<NaiveDateTime>,
}

impl Default for RollingStdevConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            window_step_hours: 1,
            stdev_mode: StdevMode::Sample,
            emit_invalid_windows: true,
            start: None,
            end: None,
        }
    }
}

impl RollingStdevConfig {
    /// Check window and range constraints.
    pub fn validate(&self) -> Result<()> {
        if self.window_size < 2 {
            return Err(Error::config(format!(
                "window_size must be at least 2, got {}",
                self.window_size
            )));
        }
        if self.window_step_hours == 0 {
            return Err(Error::config("window_step_hours must be at least 1"));
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(Error::config(format!("start {start} is after end {end}")));
            }
        }
        Ok(())
    }

    /// `start` as epoch milliseconds.
    pub fn start_ts(&self) -> Option<TimestampMs> {
        self.start.map(naive_to_ts)
    }

    /// `end` as epoch milliseconds.
    pub fn end_ts(&self) -> Option<TimestampMs> {
        self.end.map(naive_to_ts)
    }
}

/// Execution configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Process independent rows / securities on the rayon pool.
    pub parallel: bool,
}
