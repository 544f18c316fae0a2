//! Input loading through an in-memory DuckDB connection.
//!
//! CSV and parquet files are queried in place. Required columns are checked
//! with `DESCRIBE` before any row is read, and values are cast in SQL so a
//! malformed file fails the whole load instead of producing partial data.

use duckdb::Connection;
use parameta_core::{
    CcyMetadata, Error, MetadataKey, PriceRecord, PriceSnapshot, PriceTriple, Result,
    SpotRateRecord, TimestampMs,
};
use std::path::Path;
use tracing::info;

/// Accepted names for the observation time column.
const TIMESTAMP_COLUMNS: &[&str] = &["timestamp", "snap_time"];
/// Accepted names for the metadata convert flag.
const CONVERT_FLAG_COLUMNS: &[&str] = &["convert_flag", "convert_price"];
/// Accepted names for the spot rate value.
const RATE_COLUMNS: &[&str] = &["rate", "spot_mid_rate"];

/// Reads the job inputs from CSV or parquet files.
pub struct DataLoader {
    connection: Connection,
}

impl DataLoader {
    /// Open an in-memory DuckDB connection.
    pub fn new() -> Result<Self> {
        let connection = Connection::open_in_memory()
            .map_err(|e| Error::database(format!("failed to open DuckDB: {e}")))?;
        Ok(Self { connection })
    }

    /// Load raw price rows for the conversion job.
    pub fn load_prices(&self, path: &Path) -> Result<Vec<PriceRecord>> {
        let table = TableRef::open(&self.connection, path)?;
        let security_id = table.require(&["security_id"])?;
        let ccy_pair = table.require(&["ccy_pair"])?;
        let ts = table.require(TIMESTAMP_COLUMNS)?;
        let (bid, mid, ask) = table.require_prices()?;
        let source_ccy = table
            .optional(&["source_ccy"])
            .map(|c| format!("CAST({c} AS VARCHAR)"))
            .unwrap_or_else(|| "CAST(NULL AS VARCHAR)".to_string());

        let sql = format!(
            "SELECT CAST({security_id} AS VARCHAR), CAST({ccy_pair} AS VARCHAR), {source_ccy}, \
             epoch_ms(CAST({ts} AS TIMESTAMP)), \
             CAST({bid} AS DOUBLE), CAST({mid} AS DOUBLE), CAST({ask} AS DOUBLE) \
             FROM {source}",
            source = table.source,
        );

        let raw = table.query(&sql, |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<i64>>(3)?,
                PriceTriple::new(row.get(4)?, row.get(5)?, row.get(6)?),
            ))
        })?;

        let mut records = Vec::with_capacity(raw.len());
        for (line, (security_id, ccy_pair, source_ccy, ts_ms, prices)) in raw.into_iter().enumerate() {
            records.push(PriceRecord {
                security_id: table.identity(security_id, "security_id", line)?,
                ccy_pair: ccy_pair.unwrap_or_default(),
                source_ccy,
                ts_ms: table.timestamp(ts_ms, line)?,
                prices: normalise(prices),
            });
        }

        info!(path = %path.display(), rows = records.len(), "loaded prices");
        Ok(records)
    }

    /// Load raw snapshots for the rolling statistics job.
    pub fn load_snapshots(&self, path: &Path) -> Result<Vec<PriceSnapshot>> {
        let table = TableRef::open(&self.connection, path)?;
        let security_id = table.require(&["security_id"])?;
        let ts = table.require(TIMESTAMP_COLUMNS)?;
        let (bid, mid, ask) = table.require_prices()?;

        let sql = format!(
            "SELECT CAST({security_id} AS VARCHAR), epoch_ms(CAST({ts} AS TIMESTAMP)), \
             CAST({bid} AS DOUBLE), CAST({mid} AS DOUBLE), CAST({ask} AS DOUBLE) \
             FROM {source}",
            source = table.source,
        );

        let raw = table.query(&sql, |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<i64>>(1)?,
                PriceTriple::new(row.get(2)?, row.get(3)?, row.get(4)?),
            ))
        })?;

        let mut snapshots = Vec::with_capacity(raw.len());
        for (line, (security_id, ts_ms, prices)) in raw.into_iter().enumerate() {
            snapshots.push(PriceSnapshot {
                security_id: table.identity(security_id, "security_id", line)?,
                ts_ms: table.timestamp(ts_ms, line)?,
                prices: normalise(prices),
            });
        }

        info!(path = %path.display(), rows = snapshots.len(), "loaded snapshots");
        Ok(snapshots)
    }

    /// Load the conversion metadata table keyed by `key`.
    pub fn load_metadata(&self, path: &Path, key: MetadataKey) -> Result<Vec<CcyMetadata>> {
        let table = TableRef::open(&self.connection, path)?;
        let key_col = table.require(&[key.column()])?;
        let factor = table.require(&["conversion_factor"])?;
        let convert = table.require(CONVERT_FLAG_COLUMNS)?;

        let sql = format!(
            "SELECT CAST({key_col} AS VARCHAR), CAST({factor} AS DOUBLE), CAST({convert} AS BOOLEAN) \
             FROM {source}",
            source = table.source,
        );

        let metadata = table.query(&sql, |row| {
            Ok(CcyMetadata {
                key: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                conversion_factor: row.get::<_, Option<f64>>(1)?.filter(|f| !f.is_nan()),
                convert: row.get::<_, Option<bool>>(2)?.unwrap_or(false),
            })
        })?;

        info!(path = %path.display(), rows = metadata.len(), key = key.column(), "loaded metadata");
        Ok(metadata)
    }

    /// Load spot rate observations.
    pub fn load_spot_rates(&self, path: &Path) -> Result<Vec<SpotRateRecord>> {
        let table = TableRef::open(&self.connection, path)?;
        let ccy_pair = table.require(&["ccy_pair"])?;
        let ts = table.require(TIMESTAMP_COLUMNS)?;
        let rate = table.require(RATE_COLUMNS)?;

        let sql = format!(
            "SELECT CAST({ccy_pair} AS VARCHAR), epoch_ms(CAST({ts} AS TIMESTAMP)), CAST({rate} AS DOUBLE) \
             FROM {source}",
            source = table.source,
        );

        let raw = table.query(&sql, |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<i64>>(1)?,
                row.get::<_, Option<f64>>(2)?,
            ))
        })?;

        let mut rates = Vec::with_capacity(raw.len());
        for (line, (ccy_pair, ts_ms, rate)) in raw.into_iter().enumerate() {
            rates.push(SpotRateRecord {
                ccy_pair: ccy_pair.unwrap_or_default(),
                ts_ms: table.timestamp(ts_ms, line)?,
                rate,
            });
        }

        info!(path = %path.display(), rows = rates.len(), "loaded spot rates");
        Ok(rates)
    }
}

/// A file exposed as a DuckDB table function plus its column names.
struct TableRef<'c> {
    connection: &'c Connection,
    display: String,
    source: String,
    columns: Vec<String>,
}

impl<'c> TableRef<'c> {
    fn open(connection: &'c Connection, path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("input file '{}' does not exist", path.display()),
            )));
        }

        let display = path.display().to_string();
        let source = table_function(path);
        let describe = format!("DESCRIBE SELECT * FROM {source}");
        let mut stmt = connection
            .prepare(&describe)
            .map_err(|e| Error::schema(format!("{display}: unreadable input: {e}")))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<duckdb::Result<Vec<String>>>())
            .map_err(|e| Error::schema(format!("{display}: unreadable input: {e}")))?;

        Ok(Self {
            connection,
            display,
            source,
            columns,
        })
    }

    /// First of `candidates` present in the file (case-insensitive), quoted.
    fn optional(&self, candidates: &[&str]) -> Option<String> {
        candidates.iter().find_map(|candidate| {
            self.columns
                .iter()
                .find(|c| c.eq_ignore_ascii_case(candidate))
                .map(|c| quote_ident(c))
        })
    }

    fn require(&self, candidates: &[&str]) -> Result<String> {
        self.optional(candidates).ok_or_else(|| {
            Error::schema(format!(
                "{}: missing required column {} (found: {})",
                self.display,
                candidates.join(" or "),
                self.columns.join(", ")
            ))
        })
    }

    fn require_prices(&self) -> Result<(String, String, String)> {
        Ok((
            self.require(&["bid"])?,
            self.require(&["mid"])?,
            self.require(&["ask"])?,
        ))
    }

    fn query<T, F>(&self, sql: &str, f: F) -> Result<Vec<T>>
    where
        F: FnMut(&duckdb::Row<'_>) -> duckdb::Result<T>,
    {
        let mut stmt = self
            .connection
            .prepare(sql)
            .map_err(|e| Error::schema(format!("{}: {e}", self.display)))?;
        let rows = stmt
            .query_map([], f)
            .and_then(|rows| rows.collect::<duckdb::Result<Vec<T>>>())
            .map_err(|e| Error::schema(format!("{}: {e}", self.display)))?;
        Ok(rows)
    }

    /// Rows without a security id have no identity and fail the load.
    fn identity(&self, value: Option<String>, column: &str, line: usize) -> Result<String> {
        value.filter(|v| !v.is_empty()).ok_or_else(|| {
            Error::schema(format!(
                "{}: row {} has no {column}",
                self.display,
                line + 1
            ))
        })
    }

    /// Rows without a timestamp have no identity and fail the load.
    fn timestamp(&self, ts_ms: Option<TimestampMs>, line: usize) -> Result<TimestampMs> {
        ts_ms.ok_or_else(|| {
            Error::schema(format!(
                "{}: row {} has no timestamp",
                self.display,
                line + 1
            ))
        })
    }
}

/// NaN prices count as missing.
fn normalise(prices: PriceTriple) -> PriceTriple {
    PriceTriple::new(
        prices.bid.filter(|v| !v.is_nan()),
        prices.mid.filter(|v| !v.is_nan()),
        prices.ask.filter(|v| !v.is_nan()),
    )
}

fn table_function(path: &Path) -> String {
    let literal = escape_sql_string(&path_to_sql(path));
    let is_parquet = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("parquet") || e.eq_ignore_ascii_case("pq"));

    if is_parquet {
        format!("read_parquet('{literal}')")
    } else {
        format!("read_csv_auto('{literal}', header = true)")
    }
}

fn path_to_sql(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
