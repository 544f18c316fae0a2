//! Rolling standard deviation of bid/mid/ask over contiguous hourly windows.

use parameta_core::{
    FlagReason, Flags, PriceField, PriceSnapshot, PriceTriple, RollingStdevConfig, StdevMode,
    StdevResult, TimestampMs,
};
use rayon::prelude::*;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

use crate::contiguity::ContiguityValidator;

/// Standard deviation of `values`, or `None` if any value is missing.
///
/// Values are shifted by the first one before the statistic is taken; the
/// variance is unchanged and identical inputs give exactly zero.
pub fn window_stdev(values: &[Option<f64>], mode: StdevMode) -> Option<f64> {
    let first = (*values.first()?)?;
    let mut shifted = Vec::with_capacity(values.len());
    for value in values {
        shifted.push((*value)? - first);
    }

    let sigma = match mode {
        StdevMode::Sample => shifted.std_dev(),
        StdevMode::Population => shifted.population_std_dev(),
    };
    Some(sigma)
}

/// Computes windowed standard deviations per security.
pub struct RollingStdevCalculator {
    validator: ContiguityValidator,
    mode: StdevMode,
    emit_invalid_windows: bool,
    start: Option<TimestampMs>,
    end: Option<TimestampMs>,
    parallel: bool,
}

impl RollingStdevCalculator {
    /// Create a calculator from configuration.
    pub fn new(config: &RollingStdevConfig) -> Self {
        Self {
            validator: ContiguityValidator::new(config.window_size, config.window_step_hours),
            mode: config.stdev_mode,
            emit_invalid_windows: config.emit_invalid_windows,
            start: config.start_ts(),
            end: config.end_ts(),
            parallel: false,
        }
    }

    /// Process securities on the rayon pool.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Compute results for every security in `rows`.
    ///
    /// Output is ordered by security id, then window end.
    pub fn compute_all(&self, rows: &[PriceSnapshot]) -> Vec<StdevResult> {
        let mut groups: BTreeMap<&str, Vec<&PriceSnapshot>> = BTreeMap::new();
        for row in rows {
            groups.entry(row.security_id.as_str()).or_default().push(row);
        }
        let groups: Vec<(&str, Vec<&PriceSnapshot>)> = groups.into_iter().collect();

        let per_group: Vec<Vec<StdevResult>> = if self.parallel {
            groups
                .par_iter()
                .map(|(id, group)| self.compute_group(id, group))
                .collect()
        } else {
            groups
                .iter()
                .map(|(id, group)| self.compute_group(id, group))
                .collect()
        };

        let results: Vec<StdevResult> = per_group.into_iter().flatten().collect();
        tracing::debug!(
            securities = groups.len(),
            rows = results.len(),
            "rolling stdev finished"
        );
        results
    }

    /// Compute results for the rows of one security.
    pub fn compute(&self, rows: &[PriceSnapshot]) -> Vec<StdevResult> {
        let Some(first) = rows.first() else {
            return Vec::new();
        };
        let refs: Vec<&PriceSnapshot> = rows.iter().collect();
        self.compute_group(&first.security_id, &refs)
    }

    fn compute_group(&self, security_id: &str, rows: &[&PriceSnapshot]) -> Vec<StdevResult> {
        let (series, dropped) = dedup_sorted(rows);
        let timestamps: Vec<TimestampMs> = series.iter().map(|r| r.ts_ms).collect();

        let mut results = Vec::new();

        for dup in dropped {
            if self.in_range(dup.ts_ms) {
                results.push(StdevResult {
                    security_id: security_id.to_string(),
                    window_end_ts: dup.ts_ms,
                    stdev: PriceTriple::empty(),
                    flags: FlagReason::DuplicateTimestamp.into(),
                });
            }
        }

        let mut column: Vec<Option<f64>> = Vec::with_capacity(self.validator.size());
        for window in self.validator.windows(&timestamps) {
            if !self.in_range(window.end_ts) {
                continue;
            }

            if !window.valid {
                if self.emit_invalid_windows {
                    results.push(StdevResult {
                        security_id: security_id.to_string(),
                        window_end_ts: window.end_ts,
                        stdev: PriceTriple::empty(),
                        flags: window.flags,
                    });
                }
                continue;
            }

            let members = &series[window.start..=window.end];
            let mut stdev = PriceTriple::empty();
            let mut flags = Flags::empty();

            for field in PriceField::ALL {
                column.clear();
                column.extend(members.iter().map(|r| r.prices.get(field)));
                let sigma = window_stdev(&column, self.mode);
                if sigma.is_none() {
                    flags.add(FlagReason::MissingPriceInWindow);
                }
                match field {
                    PriceField::Bid => stdev.bid = sigma,
                    PriceField::Mid => stdev.mid = sigma,
                    PriceField::Ask => stdev.ask = sigma,
                }
            }

            results.push(StdevResult {
                security_id: security_id.to_string(),
                window_end_ts: window.end_ts,
                stdev,
                flags,
            });
        }

        // Duplicate error rows sit ahead of the window ending at the same time.
        results.sort_by_key(|r| r.window_end_ts);
        results
    }

    fn in_range(&self, ts: TimestampMs) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts <= e)
    }
}

/// Sort one security's rows by time and drop duplicate timestamps.
///
/// For equal timestamps the later-arriving row is kept; earlier ones are
/// returned separately.
fn dedup_sorted<'a>(rows: &[&'a PriceSnapshot]) -> (Vec<&'a PriceSnapshot>, Vec<&'a PriceSnapshot>) {
    let mut sorted: Vec<&PriceSnapshot> = rows.to_vec();
    sorted.sort_by_key(|r| r.ts_ms);

    let mut kept: Vec<&PriceSnapshot> = Vec::with_capacity(sorted.len());
    let mut dropped = Vec::new();
    for row in sorted {
        let duplicate = kept.last().is_some_and(|last| last.ts_ms == row.ts_ms);
        match kept.last_mut() {
            Some(last) if duplicate => dropped.push(std::mem::replace(last, row)),
            _ => kept.push(row),
        }
    }
    (kept, dropped)
}
