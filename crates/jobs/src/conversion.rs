//! Price conversion job: load prices, metadata and spot rates, convert, write.

use parameta_core::{
    CcyMetadata, Checkpoint, Config, ConvertedPriceRecord, JobKind, NoopReporter, PriceRecord,
    ProgressReporter, Result, SpotRateRecord,
};
use parameta_features::PriceConverter;
use parameta_ingestion::{write_converted, DataLoader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::progress::RunSummary;
use crate::count_flags;

/// Input files of a conversion run.
#[derive(Debug, Clone)]
pub struct ConversionInputs {
    pub prices: PathBuf,
    pub metadata: PathBuf,
    pub spot_rates: PathBuf,
}

/// Runs the price conversion end to end.
pub struct ConversionJob {
    config: Config,
    reporter: Arc<dyn ProgressReporter>,
}

impl ConversionJob {
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

    /// Convert in-memory rows without touching the filesystem.
    pub fn convert(
        &self,
        prices: &[PriceRecord],
        metadata: &[CcyMetadata],
        spot_rates: &[SpotRateRecord],
    ) -> Vec<ConvertedPriceRecord> {
        PriceConverter::new(metadata, spot_rates, &self.config.conversion)
            .with_parallel(self.config.run.parallel)
            .convert(prices)
    }

    /// Load `inputs`, convert and write the result to `output`.
    pub fn run(&self, inputs: &ConversionInputs, output: &Path) -> Result<RunSummary> {
        let loader = DataLoader::new()?;
        let prices = loader.load_prices(&inputs.prices)?;
        let metadata = loader.load_metadata(&inputs.metadata, self.config.conversion.metadata_key)?;
        let spot_rates = loader.load_spot_rates(&inputs.spot_rates)?;
        self.reporter.checkpoint(
            JobKind::Conversion,
            &Checkpoint::LoadComplete {
                rows: prices.len() + metadata.len() + spot_rates.len(),
            },
        );

        let converted = self.convert(&prices, &metadata, &spot_rates);
        let flags = count_flags(converted.iter().map(|r| r.flags));
        self.reporter.checkpoint(
            JobKind::Conversion,
            &Checkpoint::ComputeComplete {
                rows: converted.len(),
                flagged_rows: flags.flagged_rows,
            },
        );

        let rows_out = write_converted(output, &converted)?;
        self.reporter.checkpoint(
            JobKind::Conversion,
            &Checkpoint::WriteComplete {
                rows: rows_out,
                path: output.to_path_buf(),
            },
        );

        let summary = RunSummary {
            job: JobKind::Conversion.name(),
            rows_in: prices.len(),
            rows_out,
            flags,
            output: output.to_path_buf(),
        };
        info!(
            rows_in = summary.rows_in,
            rows_out = summary.rows_out,
            flagged_rows = summary.flags.flagged_rows,
            "price conversion finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::testing::RecordingReporter;
    use approx::assert_relative_eq;
    use parameta_core::{parse_ts, Error, FlagReason, PriceTriple};
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn inputs(dir: &TempDir) -> ConversionInputs {
        ConversionInputs {
            prices: write(
                dir,
                "prices.csv",
                "security_id,ccy_pair,timestamp,bid,mid,ask\n\
                 S2,XXXYYY,2024-01-01 06:00:00,1.0,1.0,1.0\n\
                 S1,EURUSD,2024-01-01 10:00:00,1.5,2.0,2.5\n\
                 S1,EURUSD,2024-01-01 06:00:00,1.5,2.0,2.5\n\
                 S3,USDUSD,2024-01-01 06:00:00,9.0,,9.5\n",
            ),
            metadata: write(
                dir,
                "meta.csv",
                "ccy_pair,conversion_factor,convert_flag\n\
                 EURUSD,100,true\n\
                 USDUSD,,false\n",
            ),
            spot_rates: write(
                dir,
                "spot.csv",
                "ccy_pair,timestamp,rate\n\
                 EURUSD,2024-01-01 05:00:00,1.12\n",
            ),
        }
    }

    #[test]
    fn test_in_memory_convert() {
        let job = ConversionJob::new(Config::default());
        let ts = parse_ts("2024-01-01T06:00:00").unwrap();
        let prices = vec![PriceRecord {
            security_id: "S1".into(),
            ccy_pair: "EURUSD".into(),
            source_ccy: None,
            ts_ms: ts,
            prices: PriceTriple::new(Some(1.5), Some(2.0), Some(2.5)),
        }];
        let metadata = vec![CcyMetadata {
            key: "EURUSD".into(),
            conversion_factor: Some(100.0),
            convert: true,
        }];
        let spot = vec![SpotRateRecord {
            ccy_pair: "EURUSD".into(),
            ts_ms: ts - parameta_core::HOUR_MS,
            rate: Some(1.12),
        }];

        let out = job.convert(&prices, &metadata, &spot);
        assert_eq!(out.len(), 1);
        assert!(out[0].flags.is_empty());
        assert_relative_eq!(out[0].converted.mid.unwrap(), 224.0, epsilon = 1e-9);
    }

    #[test]
    fn test_run_end_to_end() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("converted.csv");
        let reporter = Arc::new(RecordingReporter::default());
        let job = ConversionJob::new(Config::default()).with_reporter(reporter.clone());

        let summary = job.run(&inputs(&dir), &output).unwrap();
        assert_eq!(summary.job, "price_conversion");
        assert_eq!(summary.rows_in, 4);
        assert_eq!(summary.rows_out, 4);
        assert_eq!(summary.flags.flagged_rows, 3);
        assert_eq!(summary.flags.get(FlagReason::InvalidCcyPair), 1);
        assert_eq!(summary.flags.get(FlagReason::StaleSpotRate), 1);
        assert_eq!(summary.flags.get(FlagReason::MissingPrice), 1);

        let text = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("S1,EURUSD,,2024-01-01T06:00:00,"));
        assert!(lines[1].ends_with(','));
        assert!(lines[2].starts_with("S1,EURUSD,,2024-01-01T10:00:00,"));
        assert!(lines[2].ends_with(",STALE_SPOT_RATE"));
        assert!(lines[3].starts_with("S2,XXXYYY,"));
        assert!(lines[3].ends_with(",,,,,INVALID_CCY_PAIR"));
        assert!(lines[4].starts_with("S3,USDUSD,"));
        assert!(lines[4].ends_with(",MISSING_PRICE"));

        let seen = reporter.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|(job, _)| *job == JobKind::Conversion));
        assert_eq!(seen[0].1, Checkpoint::LoadComplete { rows: 7 });
        assert_eq!(
            seen[1].1,
            Checkpoint::ComputeComplete {
                rows: 4,
                flagged_rows: 3
            }
        );
        assert_eq!(
            seen[2].1,
            Checkpoint::WriteComplete {
                rows: 4,
                path: output.clone()
            }
        );
    }

    #[test]
    fn test_rerun_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let inputs = inputs(&dir);
        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.csv");

        ConversionJob::new(Config::default()).run(&inputs, &first).unwrap();
        let mut config = Config::default();
        config.run.parallel = true;
        ConversionJob::new(config).run(&inputs, &second).unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn test_nan_price_flagged_missing() {
        let dir = TempDir::new().unwrap();
        let mut inputs = inputs(&dir);
        inputs.prices = write(
            &dir,
            "nan.csv",
            "security_id,ccy_pair,timestamp,bid,mid,ask\n\
             S1,EURUSD,2024-01-01 06:00:00,1.5,nan,2.5\n",
        );
        let output = dir.path().join("converted.csv");

        let summary = ConversionJob::new(Config::default())
            .run(&inputs, &output)
            .unwrap();
        assert_eq!(summary.flags.get(FlagReason::MissingPrice), 1);

        let text = fs::read_to_string(&output).unwrap();
        let fields: Vec<&str> = text.lines().nth(1).unwrap().split(',').collect();
        assert_eq!(fields[5], "");
        assert_eq!(fields[8], "");
        assert_relative_eq!(fields[7].parse::<f64>().unwrap(), 1.5 * 100.0 * 1.12, epsilon = 1e-9);
        assert_eq!(fields[11], "MISSING_PRICE");
    }

    #[test]
    fn test_schema_error_leaves_no_output() {
        let dir = TempDir::new().unwrap();
        let mut inputs = inputs(&dir);
        inputs.prices = write(&dir, "bad.csv", "security_id,timestamp,bid\nS1,2024-01-01 06:00:00,1\n");
        let output = dir.path().join("converted.csv");

        let err = ConversionJob::new(Config::default())
            .run(&inputs, &output)
            .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
        assert!(!output.exists());
    }
}
