//! Candle model and ordered candle series for a single (pair, interval).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Single OHLCV candle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
}

impl Candle {
    /// True range against the previous close (Wilder).
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        let hl = self.high - self.low;
        match prev_close {
            Some(pc) => {
                let hc = (self.high - pc).abs();
                let lc = (self.low - pc).abs();
                hl.max(hc).max(lc)
            }
            None => hl,
        }
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Candle range as a fraction of the close.
    pub fn range_pct(&self) -> f64 {
        if self.close == 0.0 {
            return 0.0;
        }
        (self.high - self.low) / self.close
    }
}

/// Ordered candles for one trading pair at one interval.
///
/// Candles are kept sorted by `open_time`; appending a candle with a known
/// open time replaces the existing one (exchanges re-send the live candle).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleSeries {
    pub trading_pair: String,
    pub interval: String,
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(trading_pair: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            trading_pair: trading_pair.into(),
            interval: interval.into(),
            candles: Vec::new(),
        }
    }

    pub fn from_candles(
        trading_pair: impl Into<String>,
        interval: impl Into<String>,
        mut candles: Vec<Candle>,
    ) -> Self {
        candles.sort_by_key(|c| c.open_time);
        candles.dedup_by_key(|c| c.open_time);
        Self {
            trading_pair: trading_pair.into(),
            interval: interval.into(),
            candles,
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn push(&mut self, candle: Candle) {
        match self
            .candles
            .binary_search_by_key(&candle.open_time, |c| c.open_time)
        {
            Ok(idx) => self.candles[idx] = candle,
            Err(idx) => self.candles.insert(idx, candle),
        }
    }

    pub fn extend(&mut self, candles: impl IntoIterator<Item = Candle>) {
        for c in candles {
            self.push(c);
        }
    }

    /// Sub-series covering `[start, end)` by open time.
    pub fn slice_time(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> CandleSeries {
        let candles = self
            .candles
            .iter()
            .filter(|c| c.open_time >= start && c.open_time < end)
            .copied()
            .collect();
        Self {
            trading_pair: self.trading_pair.clone(),
            interval: self.interval.clone(),
            candles,
        }
    }

    /// Time covered by the series, open of first candle to close of last.
    pub fn span(&self) -> Option<Duration> {
        match (self.candles.first(), self.candles.last()) {
            (Some(first), Some(last)) => Some(last.close_time - first.open_time),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_candle(open_offset_hours: i64, close: f64) -> Candle {
        let open_time = Utc::now() + Duration::hours(open_offset_hours);
        Candle {
            open: close - 1.0,
            high: close + 2.0,
            low: close - 2.0,
            close,
            volume: 100.0,
            open_time,
            close_time: open_time + Duration::hours(1),
        }
    }

    #[test]
    fn test_true_range_uses_prev_close() {
        let candle = make_candle(0, 100.0);
        // No previous close: plain high-low range
        assert_eq!(candle.true_range(None), 4.0);
        // Gap down from 110: high-to-prev-close dominates
        assert_eq!(candle.true_range(Some(110.0)), 110.0 - 98.0);
    }

    #[test]
    fn test_series_push_replaces_same_open_time() {
        let mut series = CandleSeries::new("ETH-USDT", "1h");
        let c1 = make_candle(0, 100.0);
        let mut c2 = c1;
        c2.close = 105.0;

        series.push(c1);
        series.push(c2);

        assert_eq!(series.len(), 1);
        assert_eq!(series.last().unwrap().close, 105.0);
    }

    #[test]
    fn test_series_stays_sorted() {
        let mut series = CandleSeries::new("ETH-USDT", "1h");
        series.push(make_candle(2, 102.0));
        series.push(make_candle(0, 100.0));
        series.push(make_candle(1, 101.0));

        let closes = series.closes();
        assert_eq!(closes, vec![100.0, 101.0, 102.0]);
    }
}
