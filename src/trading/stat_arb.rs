//! Statistical-arbitrage mean-reversion strategy.
//!
//! Computes a z-score of the close against its rolling mean and fades
//! deviations beyond a threshold: short when price is stretched above the
//! mean, long when stretched below.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::indicators;
use crate::models::{CandleSeries, PositionSide};

/// Strategy parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatArbConfig {
    pub trading_pair: String,

    /// Rolling window for mean and std
    pub periods: usize,

    /// Z-score magnitude required to open a position
    pub deviation_threshold: f64,
}

impl Default for StatArbConfig {
    fn default() -> Self {
        Self {
            trading_pair: "ETH-USDT".to_string(),
            periods: 24,
            deviation_threshold: 1.5,
        }
    }
}

/// Per-candle strategy output.
#[derive(Debug, Clone, Copy)]
pub struct Signal {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub zscore: f64,

    /// Direction to open, `None` while inside the deviation band
    pub side: Option<PositionSide>,
}

/// Z-score mean-reversion signal generator.
pub struct StatArb {
    config: StatArbConfig,
}

impl StatArb {
    pub fn new(config: StatArbConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StatArbConfig {
        &self.config
    }

    /// Signals index-aligned with the series; `None` until the window
    /// fills or where the rolling std collapses.
    pub fn generate_signals(&self, series: &CandleSeries) -> Vec<Option<Signal>> {
        let closes = series.closes();
        let zscores = indicators::zscore(&closes, self.config.periods);

        series
            .candles()
            .iter()
            .enumerate()
            .map(|(i, candle)| {
                let z = zscores[i]?;

                let side = if z > self.config.deviation_threshold {
                    Some(PositionSide::Sell)
                } else if z < -self.config.deviation_threshold {
                    Some(PositionSide::Buy)
                } else {
                    None
                };

                Some(Signal {
                    timestamp: candle.close_time,
                    close: candle.close,
                    zscore: z,
                    side,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candle;
    use chrono::Duration;

    fn make_series(closes: &[f64]) -> CandleSeries {
        let start = Utc::now() - Duration::hours(closes.len() as i64);
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open_time = start + Duration::hours(i as i64);
                Candle {
                    open: close,
                    high: close + 0.5,
                    low: close - 0.5,
                    close,
                    volume: 100.0,
                    open_time,
                    close_time: open_time + Duration::hours(1),
                }
            })
            .collect();
        CandleSeries::from_candles("ETH-USDT", "1h", candles)
    }

    fn noisy_base(len: usize) -> Vec<f64> {
        // Deterministic wiggle around 2000 so the rolling std never
        // collapses to zero
        (0..len)
            .map(|i| 2000.0 + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect()
    }

    #[test]
    fn test_no_signals_before_window_fills() {
        let strategy = StatArb::new(StatArbConfig::default());
        let series = make_series(&noisy_base(10));

        let signals = strategy.generate_signals(&series);
        assert!(signals.iter().all(|s| s.is_none()));
    }

    #[test]
    fn test_spike_up_signals_short() {
        let strategy = StatArb::new(StatArbConfig::default());
        let mut closes = noisy_base(30);
        closes.push(2050.0); // far above the 2000 base
        let series = make_series(&closes);

        let last = strategy.generate_signals(&series).pop().flatten().unwrap();
        assert!(last.zscore > 1.5, "zscore was {}", last.zscore);
        assert_eq!(last.side, Some(PositionSide::Sell));
    }

    #[test]
    fn test_spike_down_signals_long() {
        let strategy = StatArb::new(StatArbConfig::default());
        let mut closes = noisy_base(30);
        closes.push(1950.0);
        let series = make_series(&closes);

        let last = strategy.generate_signals(&series).pop().flatten().unwrap();
        assert_eq!(last.side, Some(PositionSide::Buy));
    }

    #[test]
    fn test_inside_band_is_flat() {
        let strategy = StatArb::new(StatArbConfig::default());
        let series = make_series(&noisy_base(30));

        let last = strategy.generate_signals(&series).pop().flatten().unwrap();
        assert!(last.zscore.abs() < 1.5);
        assert_eq!(last.side, None);
    }
}
