//! Core types and configuration for the price snapshot jobs.
//!
//! This crate provides shared types used across all other crates:
//! - Price, spot rate and metadata records
//! - The data-quality flag set
//! - Configuration structures
//! - Common error types
//! - The progress reporter seam

pub mod config;
pub mod error;
pub mod flags;
pub mod observer;
pub mod types;

pub use config::{Config, ConversionConfig, MetadataKey, RollingStdevConfig, RunConfig, StdevMode};
pub use error::{Error, LookupError, Result};
pub use flags::{FlagCounts, FlagReason, Flags};
pub use observer::{Checkpoint, JobKind, NoopReporter, ProgressReporter};
pub use types::*;
