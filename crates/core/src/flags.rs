//! Data-quality flags attached to output rows.
//!
//! A row carries a set of [`FlagReason`]s. The set is stored as bitflags and
//! always serialises in declaration order so output stays byte-stable.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Separator used when a flag set is written as text.
pub const FLAG_DELIMITER: &str = "|";

/// Why a row or window was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagReason {
    /// A bid/mid/ask value is null in the input row.
    MissingPrice,
    /// No metadata exists for the row's lookup key.
    InvalidCcyPair,
    /// No spot rate at or before the row's timestamp.
    MissingSpotRate,
    /// The spot rate used is older than the configured maximum age.
    StaleSpotRate,
    /// The window contains a gap.
    NonContiguousWindow,
    /// Two rows share a security id and timestamp.
    DuplicateTimestamp,
    /// A window column contains a null value.
    MissingPriceInWindow,
    /// Conversion is required but the metadata has no factor.
    MissingConversionFactor,
}

impl FlagReason {
    /// Every reason, in declaration order.
    pub const ALL: [FlagReason; 8] = [
        FlagReason::MissingPrice,
        FlagReason::InvalidCcyPair,
        FlagReason::MissingSpotRate,
        FlagReason::StaleSpotRate,
        FlagReason::NonContiguousWindow,
        FlagReason::DuplicateTimestamp,
        FlagReason::MissingPriceInWindow,
        FlagReason::MissingConversionFactor,
    ];

    /// Canonical output name.
    pub fn as_str(self) -> &'static str {
        match self {
            FlagReason::MissingPrice => "MISSING_PRICE",
            FlagReason::InvalidCcyPair => "INVALID_CCY_PAIR",
            FlagReason::MissingSpotRate => "MISSING_SPOT_RATE",
            FlagReason::StaleSpotRate => "STALE_SPOT_RATE",
            FlagReason::NonContiguousWindow => "NON_CONTIGUOUS_WINDOW",
            FlagReason::DuplicateTimestamp => "DUPLICATE_TIMESTAMP",
            FlagReason::MissingPriceInWindow => "MISSING_PRICE_IN_WINDOW",
            FlagReason::MissingConversionFactor => "MISSING_CONVERSION_FACTOR",
        }
    }

    /// Look a reason up by its canonical name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == name)
    }

    /// The single-bit set for this reason.
    pub fn flag(self) -> Flags {
        match self {
            FlagReason::MissingPrice => Flags::MISSING_PRICE,
            FlagReason::InvalidCcyPair => Flags::INVALID_CCY_PAIR,
            FlagReason::MissingSpotRate => Flags::MISSING_SPOT_RATE,
            FlagReason::StaleSpotRate => Flags::STALE_SPOT_RATE,
            FlagReason::NonContiguousWindow => Flags::NON_CONTIGUOUS_WINDOW,
            FlagReason::DuplicateTimestamp => Flags::DUPLICATE_TIMESTAMP,
            FlagReason::MissingPriceInWindow => Flags::MISSING_PRICE_IN_WINDOW,
            FlagReason::MissingConversionFactor => Flags::MISSING_CONVERSION_FACTOR,
        }
    }
}

impl fmt::Display for FlagReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Set of [`FlagReason`]s on one output row.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u16 {
        const MISSING_PRICE = 1 << 0;
        const INVALID_CCY_PAIR = 1 << 1;
        const MISSING_SPOT_RATE = 1 << 2;
        const STALE_SPOT_RATE = 1 << 3;
        const NON_CONTIGUOUS_WINDOW = 1 << 4;
        const DUPLICATE_TIMESTAMP = 1 << 5;
        const MISSING_PRICE_IN_WINDOW = 1 << 6;
        const MISSING_CONVERSION_FACTOR = 1 << 7;
    }
}

impl Flags {
    /// Add a reason to the set.
    #[inline]
    pub fn add(&mut self, reason: FlagReason) {
        self.insert(reason.flag());
    }

    /// Whether the set holds `reason`.
    #[inline]
    pub fn has(&self, reason: FlagReason) -> bool {
        self.contains(reason.flag())
    }

    /// Reasons in the set, in declaration order.
    pub fn reasons(self) -> impl Iterator<Item = FlagReason> {
        FlagReason::ALL.into_iter().filter(move |r| self.has(*r))
    }

    /// `|`-joined reason names; empty string for an empty set.
    pub fn to_delimited(self) -> String {
        self.reasons()
            .map(FlagReason::as_str)
            .collect::<Vec<_>>()
            .join(FLAG_DELIMITER)
    }

    /// Parse a `|`-joined list. Unknown names yield `None`.
    pub fn from_delimited(value: &str) -> Option<Self> {
        let mut flags = Flags::empty();
        for name in value.split(FLAG_DELIMITER).filter(|s| !s.is_empty()) {
            flags.add(FlagReason::from_name(name.trim())?);
        }
        Some(flags)
    }
}

impl From<FlagReason> for Flags {
    fn from(reason: FlagReason) -> Self {
        reason.flag()
    }
}

impl FromIterator<FlagReason> for Flags {
    fn from_iter<I: IntoIterator<Item = FlagReason>>(iter: I) -> Self {
        let mut flags = Flags::empty();
        for reason in iter {
            flags.add(reason);
        }
        flags
    }
}

/// Per-reason row counts for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlagCounts {
    /// Rows carrying at least one flag.
    pub flagged_rows: u64,
    /// Count per reason.
    pub by_reason: BTreeMap<FlagReason, u64>,
}

impl FlagCounts {
    /// Record one row's flags.
    pub fn record(&mut self, flags: Flags) {
        if flags.is_empty() {
            return;
        }
        self.flagged_rows += 1;
        for reason in flags.reasons() {
            *self.by_reason.entry(reason).or_insert(0) += 1;
        }
    }

    /// Count for a single reason.
    pub fn get(&self, reason: FlagReason) -> u64 {
        self.by_reason.get(&reason).copied().unwrap_or(0)
    }
}
