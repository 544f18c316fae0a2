//! Error types for the price snapshot jobs.

use crate::flags::FlagReason;
use crate::types::TimestampMs;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors. Any of these aborts the run before output is written.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input does not have the expected shape (missing columns, bad types).
    #[error("Malformed input schema: {0}")]
    Schema(String),

    /// Data error that cannot be recovered row by row.
    #[error("Data error: {0}")]
    Data(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Output could not be produced.
    #[error("Output error: {0}")]
    Output(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a malformed-schema error.
    pub fn schema(msg: impl Into<String>) -> Self {
        Error::Schema(msg.into())
    }

    /// Create a data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Error::Database(msg.into())
    }

    /// Create an output error.
    pub fn output(msg: impl Into<String>) -> Self {
        Error::Output(msg.into())
    }
}

/// Recoverable per-row lookup failures.
///
/// These never abort a run; they become flags on the affected row.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// No metadata for the row's key.
    #[error("unknown currency pair or key '{0}'")]
    UnknownCcyPair(String),

    /// No spot rate at or before the requested time.
    #[error("no spot rate for '{ccy_pair}' at or before {as_of}")]
    MissingSpotRate {
        ccy_pair: String,
        as_of: TimestampMs,
    },
}

impl LookupError {
    /// The flag this failure is reported as.
    pub fn flag(&self) -> FlagReason {
        match self {
            LookupError::UnknownCcyPair(_) => FlagReason::InvalidCcyPair,
            LookupError::MissingSpotRate { .. } => FlagReason::MissingSpotRate,
        }
    }
}
