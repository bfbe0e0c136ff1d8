//! Raw response types for the exchange klines endpoint.

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use serde::Deserialize;

use crate::models::Candle;

/// One kline row as the exchange sends it: a positional array with
/// millisecond timestamps and stringified decimals.
///
/// `[open_time, open, high, low, close, volume, close_time, quote_volume,
/// trade_count, taker_buy_base, taker_buy_quote, ignore]`
#[derive(Debug, Clone, Deserialize)]
pub struct RawKline(
    pub i64,    // open time (ms)
    pub String, // open
    pub String, // high
    pub String, // low
    pub String, // close
    pub String, // volume
    pub i64,    // close time (ms)
    pub String, // quote asset volume
    pub i64,    // number of trades
    pub String, // taker buy base volume
    pub String, // taker buy quote volume
    pub String, // unused by the API
);

impl RawKline {
    /// Parse into a [`Candle`], rejecting malformed rows.
    pub fn into_candle(self) -> Result<Candle> {
        let open_time = Utc
            .timestamp_millis_opt(self.0)
            .single()
            .context("Invalid kline open time")?;
        let close_time = Utc
            .timestamp_millis_opt(self.6)
            .single()
            .context("Invalid kline close time")?;

        Ok(Candle {
            open: self.1.parse().context("Invalid kline open")?,
            high: self.2.parse().context("Invalid kline high")?,
            low: self.3.parse().context("Invalid kline low")?,
            close: self.4.parse().context("Invalid kline close")?,
            volume: self.5.parse().context("Invalid kline volume")?,
            open_time,
            close_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_row() -> RawKline {
        RawKline(
            1_700_000_000_000,
            "2000.50".to_string(),
            "2010.00".to_string(),
            "1995.25".to_string(),
            "2005.75".to_string(),
            "1234.5".to_string(),
            1_700_003_599_999,
            "2470000.0".to_string(),
            4321,
            "600.0".to_string(),
            "1200000.0".to_string(),
            "0".to_string(),
        )
    }

    #[test]
    fn test_parses_valid_row() {
        let candle = raw_row().into_candle().unwrap();
        assert_eq!(candle.open, 2000.50);
        assert_eq!(candle.close, 2005.75);
        assert!(candle.close_time > candle.open_time);
    }

    #[test]
    fn test_rejects_garbage_price() {
        let mut row = raw_row();
        row.4 = "not-a-price".to_string();
        assert!(row.into_candle().is_err());
    }

    #[test]
    fn test_deserializes_from_positional_json() {
        let json = r#"[[1700000000000,"1.0","2.0","0.5","1.5","10.0",1700003599999,"15.0",3,"5.0","7.5","0"]]"#;
        let rows: Vec<RawKline> = serde_json::from_str(json).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].8, 3);
    }
}
