//! Contiguous window detection.
//!
//! A window is `size` consecutive rows whose timestamps are spaced exactly
//! `step` apart. Validity is tracked with a running contiguous-run counter so
//! a full pass is O(n) regardless of window size.

use parameta_core::{hours_to_ms, FlagReason, Flags, TimestampMs};

/// Outcome for the window ending at one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowResult {
    /// Index of the first row in the window.
    pub start: usize,
    /// Index of the last row in the window.
    pub end: usize,
    /// Timestamp of the last row.
    pub end_ts: TimestampMs,
    /// Whether every gap inside the window equals the step.
    pub valid: bool,
    /// Empty for valid windows.
    pub flags: Flags,
}

/// Decides which fixed-size windows are strictly contiguous.
#[derive(Debug, Clone, Copy)]
pub struct ContiguityValidator {
    size: usize,
    step_ms: i64,
}

impl ContiguityValidator {
    /// Create a validator for windows of `size` rows spaced `step_hours` apart.
    ///
    /// `size` must be at least 1; `RollingStdevConfig::validate` requires 2.
    /// A zero size yields no windows.
    pub fn new(size: usize, step_hours: u32) -> Self {
        Self {
            size,
            step_ms: hours_to_ms(step_hours),
        }
    }

    /// Rows per window.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Evaluate every window over `timestamps` (sorted ascending).
    ///
    /// Positions before the first full window produce nothing.
    pub fn windows<'a>(&self, timestamps: &'a [TimestampMs]) -> Windows<'a> {
        Windows {
            timestamps,
            size: self.size,
            step_ms: self.step_ms,
            pos: 0,
            run: 0,
            last_duplicate: None,
        }
    }

    /// Count valid windows over `timestamps`.
    pub fn count_valid(&self, timestamps: &[TimestampMs]) -> usize {
        self.windows(timestamps).filter(|w| w.valid).count()
    }
}

/// Lazy sequence of [`WindowResult`]s.
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    timestamps: &'a [TimestampMs],
    size: usize,
    step_ms: i64,
    /// Next position to consume.
    pos: usize,
    /// Length of the contiguous run ending at `pos - 1`.
    run: usize,
    /// Position `i` of the most recent zero gap between `i - 1` and `i`.
    last_duplicate: Option<usize>,
}

impl<'a> Iterator for Windows<'a> {
    type Item = WindowResult;

    fn next(&mut self) -> Option<WindowResult> {
        if self.size == 0 {
            return None;
        }
        while self.pos < self.timestamps.len() {
            let i = self.pos;
            self.pos += 1;

            if i == 0 {
                self.run = 1;
            } else {
                let gap = self.timestamps[i] - self.timestamps[i - 1];
                if gap == self.step_ms {
                    self.run += 1;
                } else {
                    if gap == 0 {
                        self.last_duplicate = Some(i);
                    }
                    self.run = 1;
                }
            }

            if i + 1 < self.size {
                continue;
            }

            let start = i + 1 - self.size;
            let valid = self.run >= self.size;
            let mut flags = Flags::empty();
            if !valid {
                flags.add(FlagReason::NonContiguousWindow);
                if self.last_duplicate.is_some_and(|d| d > start) {
                    flags.add(FlagReason::DuplicateTimestamp);
                }
            }

            return Some(WindowResult {
                start,
                end: i,
                end_ts: self.timestamps[i],
                valid,
                flags,
            });
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.size == 0 {
            return (0, Some(0));
        }
        let first_end = self.pos.max(self.size - 1);
        let remaining = self.timestamps.len().saturating_sub(first_end);
        (remaining, Some(remaining))
    }
}
