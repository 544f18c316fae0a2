//! Price conversion into the common currency.
//!
//! Joins each price row with its metadata and spot rate:
//! `converted = raw * conversion_factor * spot_rate`.
//! Problems never drop a row; they become flags on it.

use parameta_core::{
    CcyMetadata, ConversionConfig, ConvertedPriceRecord, FlagReason, Flags, LookupError,
    MetadataKey, PriceField, PriceRecord, PriceTriple, SpotRateRecord,
};
use rayon::prelude::*;
use std::collections::HashMap;

use crate::spot_rate::SpotRateResolver;

/// Converts raw price rows using metadata and spot rates.
pub struct PriceConverter {
    metadata: HashMap<String, CcyMetadata>,
    resolver: SpotRateResolver,
    metadata_key: MetadataKey,
    parallel: bool,
}

impl PriceConverter {
    /// Build the lookup tables once for a run.
    pub fn new(
        metadata: &[CcyMetadata],
        spot_rates: &[SpotRateRecord],
        config: &ConversionConfig,
    ) -> Self {
        let mut table = HashMap::with_capacity(metadata.len());
        for entry in metadata {
            if table.insert(entry.key.clone(), entry.clone()).is_some() {
                tracing::warn!(key = %entry.key, "duplicate metadata key, keeping the last record");
            }
        }

        Self {
            metadata: table,
            resolver: SpotRateResolver::new(spot_rates, config.max_spot_age_hours),
            metadata_key: config.metadata_key,
            parallel: false,
        }
    }

    /// Convert independent rows on the rayon pool.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// The spot rate resolver used by this converter.
    pub fn resolver(&self) -> &SpotRateResolver {
        &self.resolver
    }

    /// Convert all rows.
    ///
    /// Output is ordered by security id, then timestamp; ties keep input order.
    pub fn convert(&self, rows: &[PriceRecord]) -> Vec<ConvertedPriceRecord> {
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|&a, &b| {
            rows[a]
                .security_id
                .cmp(&rows[b].security_id)
                .then(rows[a].ts_ms.cmp(&rows[b].ts_ms))
        });

        let converted: Vec<ConvertedPriceRecord> = if self.parallel {
            order.par_iter().map(|&i| self.convert_row(&rows[i])).collect()
        } else {
            order.iter().map(|&i| self.convert_row(&rows[i])).collect()
        };

        tracing::debug!(
            rows = converted.len(),
            flagged = converted.iter().filter(|r| !r.flags.is_empty()).count(),
            "price conversion finished"
        );

        converted
    }

    /// Convert a single row.
    pub fn convert_row(&self, row: &PriceRecord) -> ConvertedPriceRecord {
        let mut flags = Flags::empty();

        for field in PriceField::ALL {
            if row.prices.get(field).is_none() {
                flags.add(FlagReason::MissingPrice);
            }
        }

        let (converted, spot_rate_used) = match self.lookup_metadata(row) {
            Err(err) => {
                flags.add(err.flag());
                (PriceTriple::empty(), None)
            }
            Ok(meta) if !meta.convert => (row.prices, None),
            Ok(meta) => match meta.conversion_factor {
                None => {
                    flags.add(FlagReason::MissingConversionFactor);
                    (PriceTriple::empty(), None)
                }
                Some(factor) => match self.resolver.resolve(&row.ccy_pair, row.ts_ms) {
                    Err(err) => {
                        flags.add(err.flag());
                        (PriceTriple::empty(), None)
                    }
                    Ok(resolved) => {
                        if resolved.is_stale {
                            flags.add(FlagReason::StaleSpotRate);
                        }
                        let rate = resolved.rate;
                        (row.prices.map(|raw| raw * factor * rate), Some(rate))
                    }
                },
            },
        };

        ConvertedPriceRecord {
            record: row.clone(),
            converted,
            spot_rate_used,
            flags,
        }
    }

    fn lookup_metadata(&self, row: &PriceRecord) -> Result<&CcyMetadata, LookupError> {
        let key = match self.metadata_key {
            MetadataKey::CcyPair => &row.ccy_pair,
            MetadataKey::SecurityId => &row.security_id,
        };
        self.metadata
            .get(key)
            .ok_or_else(|| LookupError::UnknownCcyPair(key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use parameta_core::{parse_ts, TimestampMs};

    fn ts(value: &str) -> TimestampMs {
        parse_ts(value).unwrap()
    }

    fn price(security_id: &str, pair: &str, at: &str, mid: Option<f64>) -> PriceRecord {
        PriceRecord {
            security_id: security_id.to_string(),
            ccy_pair: pair.to_string(),
            source_ccy: None,
            ts_ms: ts(at),
            prices: PriceTriple::new(mid.map(|m| m - 0.5), mid, mid.map(|m| m + 0.5)),
        }
    }

    fn meta(key: &str, factor: Option<f64>, convert: bool) -> CcyMetadata {
        CcyMetadata {
            key: key.to_string(),
            conversion_factor: factor,
            convert,
        }
    }

    fn spot(pair: &str, at: &str, rate: f64) -> SpotRateRecord {
        SpotRateRecord {
            ccy_pair: pair.to_string(),
            ts_ms: ts(at),
            rate: Some(rate),
        }
    }

    fn converter(max_age_hours: u32) -> PriceConverter {
        PriceConverter::new(
            &[
                meta("EURUSD", Some(100.0), true),
                meta("USDUSD", Some(1.0), false),
                meta("GBPUSD", None, true),
            ],
            &[
                spot("EURUSD", "2024-01-01T00:00:00", 1.10),
                spot("EURUSD", "2024-01-01T05:00:00", 1.12),
            ],
            &ConversionConfig {
                max_spot_age_hours: max_age_hours,
                ..ConversionConfig::default()
            },
        )
    }

    #[test]
    fn test_duplicate_metadata_keeps_last() {
        let conv = PriceConverter::new(
            &[
                meta("EURUSD", Some(100.0), true),
                meta("EURUSD", Some(10.0), true),
            ],
            &[spot("EURUSD", "2024-01-01T05:00:00", 1.12)],
            &ConversionConfig::default(),
        );
        let out = conv.convert_row(&price("S1", "EURUSD", "2024-01-01T06:00:00", Some(2.0)));

        assert!(out.flags.is_empty());
        assert_relative_eq!(out.converted.mid.unwrap(), 2.0 * 10.0 * 1.12, epsilon = 1e-9);
    }

    #[test]
    fn test_no_conversion_passes_raw_values() {
        let conv = converter(4);
        let row = price("S1", "USDUSD", "2024-01-01T06:00:00", Some(101.25));
        let out = conv.convert_row(&row);

        assert_eq!(out.converted, row.prices);
        assert_eq!(out.spot_rate_used, None);
        assert!(out.flags.is_empty());
    }

    #[test]
    fn test_fresh_rate_conversion() {
        let conv = converter(4);
        let out = conv.convert_row(&price("S1", "EURUSD", "2024-01-01T06:00:00", Some(2.0)));

        assert_eq!(out.spot_rate_used, Some(1.12));
        assert_relative_eq!(out.converted.mid.unwrap(), 2.0 * 100.0 * 1.12, epsilon = 1e-9);
        assert_relative_eq!(out.converted.bid.unwrap(), 1.5 * 100.0 * 1.12, epsilon = 1e-9);
        assert!(out.flags.is_empty());
    }

    #[test]
    fn test_stale_rate_still_converts() {
        let conv = converter(4);
        let out = conv.convert_row(&price("S1", "EURUSD", "2024-01-01T10:00:00", Some(2.0)));

        assert_eq!(out.flags, Flags::STALE_SPOT_RATE);
        assert_eq!(out.spot_rate_used, Some(1.12));
        assert_relative_eq!(out.converted.mid.unwrap(), 224.0, epsilon = 1e-9);
    }

    #[test]
    fn test_missing_spot_rate() {
        let conv = converter(4);
        let out = conv.convert_row(&price("S1", "EURUSD", "2023-12-31T23:00:00", Some(2.0)));

        assert_eq!(out.flags, Flags::MISSING_SPOT_RATE);
        assert_eq!(out.converted, PriceTriple::empty());
        assert_eq!(out.spot_rate_used, None);
    }

    #[test]
    fn test_unknown_pair() {
        let conv = converter(4);
        let row = price("S1", "JPYUSD", "2024-01-01T06:00:00", Some(2.0));
        let out = conv.convert_row(&row);

        assert_eq!(out.flags, Flags::INVALID_CCY_PAIR);
        assert_eq!(out.converted, PriceTriple::empty());
        assert_eq!(out.record.prices, row.prices);
    }

    #[test]
    fn test_missing_conversion_factor() {
        let conv = converter(4);
        let out = conv.convert_row(&price("S1", "GBPUSD", "2024-01-01T06:00:00", Some(2.0)));
        assert_eq!(out.flags, Flags::MISSING_CONVERSION_FACTOR);
        assert_eq!(out.converted, PriceTriple::empty());
    }

    #[test]
    fn test_missing_field_converts_others() {
        let conv = converter(4);
        let mut row = price("S1", "EURUSD", "2024-01-01T10:00:00", Some(2.0));
        row.prices.bid = None;
        let out = conv.convert_row(&row);

        assert_eq!(out.flags, Flags::MISSING_PRICE | Flags::STALE_SPOT_RATE);
        assert_eq!(out.flags.to_delimited(), "MISSING_PRICE|STALE_SPOT_RATE");
        assert_eq!(out.converted.bid, None);
        assert!(out.converted.mid.is_some());
        assert!(out.converted.ask.is_some());
    }

    #[test]
    fn test_flags_accumulate_with_unknown_pair() {
        let conv = converter(4);
        let out = conv.convert_row(&price("S1", "JPYUSD", "2024-01-01T06:00:00", None));
        assert_eq!(out.flags, Flags::MISSING_PRICE | Flags::INVALID_CCY_PAIR);
    }

    #[test]
    fn test_security_id_key() {
        let conv = PriceConverter::new(
            &[meta("S9", Some(2.0), false)],
            &[],
            &ConversionConfig {
                metadata_key: MetadataKey::SecurityId,
                ..ConversionConfig::default()
            },
        );
        let out = conv.convert_row(&price("S9", "ANY", "2024-01-01T06:00:00", Some(3.0)));
        assert!(out.flags.is_empty());
        assert_eq!(out.converted.mid, Some(3.0));
    }

    #[test]
    fn test_output_order_and_parallel_equivalence() {
        let rows = vec![
            price("S2", "EURUSD", "2024-01-01T06:00:00", Some(1.0)),
            price("S1", "USDUSD", "2024-01-01T07:00:00", Some(2.0)),
            price("S1", "EURUSD", "2024-01-01T06:00:00", Some(3.0)),
            price("S2", "JPYUSD", "2024-01-01T01:00:00", Some(4.0)),
        ];

        let serial = converter(4).convert(&rows);
        let keys: Vec<(String, TimestampMs)> = serial
            .iter()
            .map(|r| (r.record.security_id.clone(), r.record.ts_ms))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("S1".to_string(), ts("2024-01-01T06:00:00")),
                ("S1".to_string(), ts("2024-01-01T07:00:00")),
                ("S2".to_string(), ts("2024-01-01T01:00:00")),
                ("S2".to_string(), ts("2024-01-01T06:00:00")),
            ]
        );

        let parallel = converter(4).with_parallel(true).convert(&rows);
        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_non_converted_rows_always_match_raw() {
        let conv = converter(0);
        let rows: Vec<PriceRecord> = (0..48)
            .map(|h| {
                let mut row = price("S1", "USDUSD", "2024-01-01T00:00:00", Some(h as f64 * 0.37));
                row.ts_ms += h * parameta_core::HOUR_MS;
                if h % 7 == 0 {
                    row.prices.ask = None;
                }
                row
            })
            .collect();

        for out in conv.convert(&rows) {
            assert_eq!(out.converted, out.record.prices);
            assert_eq!(out.spot_rate_used, None);
        }
    }
}
