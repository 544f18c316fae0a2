//! CSV output.
//!
//! Rows are written to a temporary file next to the destination and renamed
//! into place once complete, so a failed run never leaves a partial file.

use parameta_core::{format_ts, ConvertedPriceRecord, Error, Result, StdevResult};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

/// Header of the conversion output.
pub const CONVERTED_HEADER: [&str; 12] = [
    "security_id",
    "ccy_pair",
    "source_ccy",
    "timestamp",
    "bid",
    "mid",
    "ask",
    "converted_bid",
    "converted_mid",
    "converted_ask",
    "spot_rate_used",
    "flags",
];

/// Header of the rolling stdev output.
pub const STDEV_HEADER: [&str; 6] = [
    "security_id",
    "window_end_timestamp",
    "bid_stdev",
    "mid_stdev",
    "ask_stdev",
    "flags",
];

#[derive(Serialize)]
struct ConvertedRow<'a> {
    security_id: &'a str,
    ccy_pair: &'a str,
    source_ccy: Option<&'a str>,
    timestamp: String,
    bid: Option<f64>,
    mid: Option<f64>,
    ask: Option<f64>,
    converted_bid: Option<f64>,
    converted_mid: Option<f64>,
    converted_ask: Option<f64>,
    spot_rate_used: Option<f64>,
    flags: String,
}

impl<'a> From<&'a ConvertedPriceRecord> for ConvertedRow<'a> {
    fn from(r: &'a ConvertedPriceRecord) -> Self {
        Self {
            security_id: &r.record.security_id,
            ccy_pair: &r.record.ccy_pair,
            source_ccy: r.record.source_ccy.as_deref(),
            timestamp: format_ts(r.record.ts_ms),
            bid: r.record.prices.bid,
            mid: r.record.prices.mid,
            ask: r.record.prices.ask,
            converted_bid: r.converted.bid,
            converted_mid: r.converted.mid,
            converted_ask: r.converted.ask,
            spot_rate_used: r.spot_rate_used,
            flags: r.flags.to_delimited(),
        }
    }
}

#[derive(Serialize)]
struct StdevRow<'a> {
    security_id: &'a str,
    window_end_timestamp: String,
    bid_stdev: Option<f64>,
    mid_stdev: Option<f64>,
    ask_stdev: Option<f64>,
    flags: String,
}

impl<'a> From<&'a StdevResult> for StdevRow<'a> {
    fn from(r: &'a StdevResult) -> Self {
        Self {
            security_id: &r.security_id,
            window_end_timestamp: format_ts(r.window_end_ts),
            bid_stdev: r.stdev.bid,
            mid_stdev: r.stdev.mid,
            ask_stdev: r.stdev.ask,
            flags: r.flags.to_delimited(),
        }
    }
}

/// Write converted prices to `path`. Returns the number of data rows.
pub fn write_converted(path: &Path, rows: &[ConvertedPriceRecord]) -> Result<usize> {
    let written = write_atomic(path, &CONVERTED_HEADER, rows.iter().map(ConvertedRow::from))?;
    info!(path = %path.display(), rows = written, "wrote converted prices");
    Ok(written)
}

/// Write rolling stdev results to `path`. Returns the number of data rows.
pub fn write_stdev(path: &Path, rows: &[StdevResult]) -> Result<usize> {
    let written = write_atomic(path, &STDEV_HEADER, rows.iter().map(StdevRow::from))?;
    info!(path = %path.display(), rows = written, "wrote rolling stdev");
    Ok(written)
}

fn write_atomic<T, I>(path: &Path, header: &[&str], rows: I) -> Result<usize>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".parameta-")
        .suffix(".tmp")
        .tempfile_in(dir)?;

    let csv_err = |e: csv::Error| Error::output(format!("{}: {e}", path.display()));
    let mut count = 0usize;
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(tmp.as_file_mut());
        writer.write_record(header).map_err(csv_err)?;
        for row in rows {
            writer.serialize(row).map_err(csv_err)?;
            count += 1;
        }
        writer.flush()?;
    }

    tmp.persist(path)
        .map_err(|e| Error::output(format!("{}: {}", path.display(), e.error)))?;
    Ok(count)
}
