//! Data ingestion and output for the price snapshot jobs.
//!
//! This crate handles:
//! - Loading prices, snapshots, metadata and spot rates from CSV or parquet
//! - Required-column validation before any row is read
//! - Atomic CSV output

pub mod reader;
pub mod writer;

pub use reader::DataLoader;
pub use writer::{write_converted, write_stdev};
