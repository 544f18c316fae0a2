//! Command-line arguments.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `convert` | Convert raw prices into the common currency |
//! | `stdev` | Rolling standard deviation over contiguous hourly windows |
//!
//! Values given on the command line override the `--config` file, which in
//! turn overrides the built-in defaults.

use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand, ValueEnum};
use parameta_core::{parse_datetime, Config, MetadataKey, Result, StdevMode};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "parameta",
    version,
    about = "Hourly price snapshot batch jobs"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// JSON configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Process rows and securities on a thread pool.
    #[arg(long, global = true)]
    pub parallel: bool,

    /// Log output format. Logs go to stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert raw prices using metadata and spot rates.
    Convert(ConvertArgs),
    /// Compute rolling standard deviations of bid/mid/ask.
    Stdev(StdevArgs),
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Raw price file (.csv or .parquet).
    #[arg(long)]
    pub prices: PathBuf,

    /// Currency metadata file.
    #[arg(long)]
    pub metadata: PathBuf,

    /// Spot rate file.
    #[arg(long)]
    pub spot_rates: PathBuf,

    /// Output CSV path.
    #[arg(long)]
    pub output: PathBuf,

    /// Spot rates older than this many hours are flagged stale.
    #[arg(long)]
    pub max_spot_age_hours: Option<u32>,

    /// Metadata join column.
    #[arg(long, value_enum)]
    pub metadata_key: Option<KeyColumn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyColumn {
    CcyPair,
    SecurityId,
}

impl From<KeyColumn> for MetadataKey {
    fn from(value: KeyColumn) -> Self {
        match value {
            KeyColumn::CcyPair => MetadataKey::CcyPair,
            KeyColumn::SecurityId => MetadataKey::SecurityId,
        }
    }
}

#[derive(Debug, Args)]
pub struct StdevArgs {
    /// Snapshot file (.csv or .parquet).
    #[arg(long)]
    pub input: PathBuf,

    /// Output CSV path.
    #[arg(long)]
    pub output: PathBuf,

    /// Rows per window.
    #[arg(long)]
    pub window_size: Option<usize>,

    /// Expected spacing between rows, in hours.
    #[arg(long)]
    pub window_step_hours: Option<u32>,

    /// `sample` or `population`.
    #[arg(long)]
    pub stdev_mode: Option<StdevMode>,

    /// Write rows for windows that fail the contiguity check.
    #[arg(long)]
    pub emit_invalid_windows: Option<bool>,

    /// Earliest window end to emit.
    #[arg(long, value_parser = parse_datetime)]
    pub start: Option<NaiveDateTime>,

    /// Latest window end to emit.
    #[arg(long, value_parser = parse_datetime)]
    pub end: Option<NaiveDateTime>,
}

impl Cli {
    /// Resolve the effective configuration for the selected command.
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };
        if self.parallel {
            config.run.parallel = true;
        }

        match &self.command {
            Command::Convert(args) => {
                if let Some(hours) = args.max_spot_age_hours {
                    config.conversion.max_spot_age_hours = hours;
                }
                if let Some(key) = args.metadata_key {
                    config.conversion.metadata_key = key.into();
                }
            }
            Command::Stdev(args) => {
                let rolling = &mut config.rolling;
                if let Some(size) = args.window_size {
                    rolling.window_size = size;
                }
                if let Some(step) = args.window_step_hours {
                    rolling.window_step_hours = step;
                }
                if let Some(mode) = args.stdev_mode {
                    rolling.stdev_mode = mode;
                }
                if let Some(emit) = args.emit_invalid_windows {
                    rolling.emit_invalid_windows = emit;
                }
                if args.start.is_some() {
                    rolling.start = args.start;
                }
                if args.end.is_some() {
                    rolling.end = args.end;
                }
            }
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parameta_core::Error;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_convert() {
        let cli = Cli::try_parse_from([
            "parameta",
            "convert",
            "--prices",
            "p.csv",
            "--metadata",
            "m.csv",
            "--spot-rates",
            "s.csv",
            "--output",
            "out.csv",
            "--metadata-key",
            "security-id",
            "--max-spot-age-hours",
            "3",
        ])
        .unwrap();

        let config = cli.resolve_config().unwrap();
        assert_eq!(config.conversion.max_spot_age_hours, 3);
        assert_eq!(config.conversion.metadata_key, MetadataKey::SecurityId);
        assert!(!config.run.parallel);
        match cli.command {
            Command::Convert(args) => assert_eq!(args.spot_rates, PathBuf::from("s.csv")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_stdev_overrides() {
        let cli = Cli::try_parse_from([
            "parameta",
            "stdev",
            "--input",
            "snaps.parquet",
            "--output",
            "out.csv",
            "--window-size",
            "5",
            "--stdev-mode",
            "population",
            "--emit-invalid-windows",
            "false",
            "--start",
            "2021-11-20 00:00:00",
            "--end",
            "2021-11-23T09:00:00",
            "--parallel",
        ])
        .unwrap();

        let config = cli.resolve_config().unwrap();
        assert_eq!(config.rolling.window_size, 5);
        assert_eq!(config.rolling.window_step_hours, 1);
        assert_eq!(config.rolling.stdev_mode, StdevMode::Population);
        assert!(!config.rolling.emit_invalid_windows);
        assert!(config.rolling.start.is_some());
        assert!(config.rolling.end.is_some());
        assert!(config.run.parallel);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"rolling": {"window_size": 10, "stdev_mode": "population"}}"#).unwrap();

        let cli = Cli::try_parse_from([
            "parameta",
            "--config",
            path.to_str().unwrap(),
            "stdev",
            "--input",
            "in.csv",
            "--output",
            "out.csv",
            "--window-size",
            "4",
        ])
        .unwrap();

        let config = cli.resolve_config().unwrap();
        assert_eq!(config.rolling.window_size, 4);
        assert_eq!(config.rolling.stdev_mode, StdevMode::Population);
    }

    #[test]
    fn test_start_after_end_is_config_error() {
        let cli = Cli::try_parse_from([
            "parameta",
            "stdev",
            "--input",
            "in.csv",
            "--output",
            "out.csv",
            "--start",
            "2021-11-23",
            "--end",
            "2021-11-20",
        ])
        .unwrap();

        assert!(matches!(cli.resolve_config(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad_mode = Cli::try_parse_from([
            "parameta", "stdev", "--input", "a", "--output", "b", "--stdev-mode", "median",
        ]);
        assert!(bad_mode.is_err());

        let bad_time = Cli::try_parse_from([
            "parameta", "stdev", "--input", "a", "--output", "b", "--start", "yesterday",
        ]);
        assert!(bad_time.is_err());

        let missing = Cli::try_parse_from(["parameta", "convert", "--prices", "p.csv"]);
        assert!(missing.is_err());
    }
}
