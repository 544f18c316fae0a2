//! Core data types for the price snapshot jobs.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::flags::Flags;

/// Timestamp in milliseconds since Unix epoch (UTC).
pub type TimestampMs = i64;

/// One hour in milliseconds.
pub const HOUR_MS: TimestampMs = 60 * 60 * 1000;

/// Output timestamp layout.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Convert a whole number of hours to milliseconds.
#[inline]
pub fn hours_to_ms(hours: u32) -> TimestampMs {
    hours as TimestampMs * HOUR_MS
}

/// Convert a naive (UTC) datetime to epoch milliseconds.
#[inline]
pub fn naive_to_ts(dt: NaiveDateTime) -> TimestampMs {
    dt.and_utc().timestamp_millis()
}

/// Render a timestamp as `YYYY-MM-DDTHH:MM:SS`.
pub fn format_ts(ts_ms: TimestampMs) -> String {
    match DateTime::from_timestamp_millis(ts_ms) {
        Some(dt) => dt.format(TIMESTAMP_FORMAT).to_string(),
        None => ts_ms.to_string(),
    }
}

/// Parse `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`.
pub fn parse_datetime(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    for layout in [TIMESTAMP_FORMAT, "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, layout) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| Error::config(format!("unrecognised timestamp '{value}'")))
}

/// Parse a timestamp string straight to epoch milliseconds.
pub fn parse_ts(value: &str) -> Result<TimestampMs> {
    parse_datetime(value).map(naive_to_ts)
}

/// Which price column a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceField {
    Bid,
    Mid,
    Ask,
}

impl PriceField {
    pub const ALL: [PriceField; 3] = [PriceField::Bid, PriceField::Mid, PriceField::Ask];
}

/// Bid/mid/ask triple where any leg may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceTriple {
    /// Bid price.
    pub bid: Option<f64>,
    /// Mid price.
    pub mid: Option<f64>,
    /// Ask price.
    pub ask: Option<f64>,
}

impl PriceTriple {
    pub fn new(bid: Option<f64>, mid: Option<f64>, ask: Option<f64>) -> Self {
        Self { bid, mid, ask }
    }

    /// A triple with every leg missing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, field: PriceField) -> Option<f64> {
        match field {
            PriceField::Bid => self.bid,
            PriceField::Mid => self.mid,
            PriceField::Ask => self.ask,
        }
    }

    /// Apply `f` to each present leg; missing legs stay missing.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            bid: self.bid.map(&f),
            mid: self.mid.map(&f),
            ask: self.ask.map(&f),
        }
    }

    /// Whether any leg is missing.
    pub fn has_missing(&self) -> bool {
        self.bid.is_none() || self.mid.is_none() || self.ask.is_none()
    }
}

/// A raw hourly price row for the conversion job.
///
/// Identity is `(security_id, ts_ms)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// Security identifier.
    pub security_id: String,
    /// Currency pair the prices are quoted in.
    pub ccy_pair: String,
    /// Source currency, when the input carries one.
    pub source_ccy: Option<String>,
    /// Timestamp in milliseconds.
    pub ts_ms: TimestampMs,
    /// Raw prices.
    pub prices: PriceTriple,
}

/// A raw hourly price row for the rolling statistics job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    /// Security identifier.
    pub security_id: String,
    /// Snapshot time in milliseconds.
    pub ts_ms: TimestampMs,
    /// Raw prices.
    pub prices: PriceTriple,
}

/// A spot rate observation for a currency pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotRateRecord {
    /// Currency pair.
    pub ccy_pair: String,
    /// Observation time in milliseconds.
    pub ts_ms: TimestampMs,
    /// Missing or NaN rates are never used for conversion.
    pub rate: Option<f64>,
}

/// Static conversion metadata for one lookup key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CcyMetadata {
    /// Currency pair or security id, depending on the configured key.
    pub key: String,
    /// Multiplier applied with the spot rate.
    pub conversion_factor: Option<f64>,
    /// Whether rows under this key are converted at all.
    pub convert: bool,
}

/// A price row after conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedPriceRecord {
    /// The input row, unchanged.
    pub record: PriceRecord,
    /// Converted prices; missing where conversion was not possible.
    pub converted: PriceTriple,
    /// Spot rate applied; absent when no conversion happened.
    pub spot_rate_used: Option<f64>,
    /// Data-quality flags.
    pub flags: Flags,
}

/// Rolling standard deviation for one window (or one error row).
#[derive(Debug, Clone, PartialEq)]
pub struct StdevResult {
    /// Security identifier.
    pub security_id: String,
    /// Timestamp of the last row in the window, in milliseconds.
    pub window_end_ts: TimestampMs,
    /// Standard deviation per price field.
    pub stdev: PriceTriple,
    /// Data-quality flags.
    pub flags: Flags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hours_to_ms() {
        assert_eq!(hours_to_ms(19), 19 * HOUR_MS);
        assert_eq!(hours_to_ms(0), 0);
    }

    #[test]
    fn test_format_and_parse_round_trip() {
        let ts = parse_ts("2024-01-01T10:00:00").unwrap();
        assert_eq!(ts, 1704103200000);
        assert_eq!(format_ts(ts), "2024-01-01T10:00:00");
        assert_eq!(parse_ts("2024-01-01 10:00:00").unwrap(), ts);
        assert_eq!(parse_ts("2024-01-01").unwrap(), 1704067200000);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_ts("yesterday").is_err());
    }

    #[test]
    fn test_triple_map_keeps_missing() {
        let triple = PriceTriple::new(Some(1.0), None, Some(3.0));
        let doubled = triple.map(|v| v * 2.0);
        assert_eq!(doubled, PriceTriple::new(Some(2.0), None, Some(6.0)));
        assert!(doubled.has_missing());
        assert_eq!(doubled.get(PriceField::Ask), Some(6.0));
    }
}
