//! Spot rate lookup.
//!
//! Finds the latest spot rate at or before a price timestamp and reports how
//! old it is. Rates are never interpolated or extrapolated.

use parameta_core::{hours_to_ms, LookupError, SpotRateRecord, TimestampMs};
use std::collections::HashMap;

/// A spot rate chosen for a price row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedRate {
    /// The rate value.
    pub rate: f64,
    /// When the rate was observed.
    pub observed_ts: TimestampMs,
    /// Price time minus observation time (ms).
    pub age_ms: i64,
    /// Whether the age exceeds the configured maximum.
    pub is_stale: bool,
}

/// Per-pair spot rate series, sorted once at construction.
#[derive(Debug, Clone)]
pub struct SpotRateResolver {
    /// (timestamp, rate) sorted ascending by timestamp.
    series: HashMap<String, Vec<(TimestampMs, f64)>>,
    /// Maximum age before a rate is flagged stale (ms).
    max_age_ms: i64,
}

impl SpotRateResolver {
    /// Build the resolver from raw spot records.
    ///
    /// Records with a missing or NaN rate are discarded.
    pub fn new(records: &[SpotRateRecord], max_spot_age_hours: u32) -> Self {
        let mut series: HashMap<String, Vec<(TimestampMs, f64)>> = HashMap::new();
        let mut discarded = 0usize;

        for record in records {
            match record.rate.filter(|r| !r.is_nan()) {
                Some(rate) => series
                    .entry(record.ccy_pair.clone())
                    .or_default()
                    .push((record.ts_ms, rate)),
                None => discarded += 1,
            }
        }

        // Stable sort: for equal timestamps the later input record ends up last
        // and is the one a right-biased search lands on.
        for points in series.values_mut() {
            points.sort_by_key(|(ts, _)| *ts);
        }

        tracing::debug!(
            pairs = series.len(),
            discarded,
            "spot rate series built"
        );

        Self {
            series,
            max_age_ms: hours_to_ms(max_spot_age_hours),
        }
    }

    /// Find the latest rate for `ccy_pair` at or before `as_of`.
    pub fn resolve(&self, ccy_pair: &str, as_of: TimestampMs) -> Result<ResolvedRate, LookupError> {
        let missing = || LookupError::MissingSpotRate {
            ccy_pair: ccy_pair.to_string(),
            as_of,
        };

        let points = self.series.get(ccy_pair).ok_or_else(missing)?;

        // Number of points with ts <= as_of; the last of them is the answer.
        let idx = points.partition_point(|(ts, _)| *ts <= as_of);
        if idx == 0 {
            return Err(missing());
        }

        let (observed_ts, rate) = points[idx - 1];
        let age_ms = as_of - observed_ts;

        Ok(ResolvedRate {
            rate,
            observed_ts,
            age_ms,
            is_stale: age_ms > self.max_age_ms,
        })
    }

    /// Maximum age before a rate is stale (ms).
    pub fn max_age_ms(&self) -> i64 {
        self.max_age_ms
    }

    /// Number of currency pairs with at least one usable rate.
    pub fn pair_count(&self) -> usize {
        self.series.len()
    }
}
