//! Rolling-window indicators over candle data.
//!
//! Every function returns a vector index-aligned with its input: position
//! `i` holds the indicator value for the window ending at `i`, and `None`
//! until the window has filled.

use crate::models::Candle;

/// Simple moving average over `length` values.
pub fn sma(values: &[f64], length: usize) -> Vec<Option<f64>> {
    rolling(values, length, |window| {
        window.iter().sum::<f64>() / window.len() as f64
    })
}

/// Population standard deviation over `length` values.
pub fn rolling_std(values: &[f64], length: usize) -> Vec<Option<f64>> {
    rolling(values, length, |window| {
        let mean = window.iter().sum::<f64>() / window.len() as f64;
        let variance =
            window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / window.len() as f64;
        variance.sqrt()
    })
}

/// Bollinger %B: position of the close inside the bands,
/// `(close - lower) / (upper - lower)`.
///
/// 0.0 sits on the lower band, 1.0 on the upper; values escape the
/// [0, 1] range when price breaks out of the bands. `None` where the band
/// width collapses to zero.
pub fn bollinger_pct_b(closes: &[f64], length: usize, std_mult: f64) -> Vec<Option<f64>> {
    let mean = sma(closes, length);
    let std = rolling_std(closes, length);

    closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            let (m, s) = match (mean[i], std[i]) {
                (Some(m), Some(s)) => (m, s),
                _ => return None,
            };
            let upper = m + std_mult * s;
            let lower = m - std_mult * s;
            let width = upper - lower;
            if width == 0.0 {
                return None;
            }
            Some((close - lower) / width)
        })
        .collect()
}

/// Normalized ATR: SMA of true range over `length` candles, divided by the
/// close. Expressed as a fraction (0.015 = 1.5% of price).
pub fn natr(candles: &[Candle], length: usize) -> Vec<Option<f64>> {
    let true_ranges: Vec<f64> = candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let prev_close = if i > 0 { Some(candles[i - 1].close) } else { None };
            c.true_range(prev_close)
        })
        .collect();

    let atr = sma(&true_ranges, length);

    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let a = atr[i]?;
            if c.close == 0.0 {
                return None;
            }
            Some(a / c.close)
        })
        .collect()
}

/// Z-score of each value against its rolling mean and std over `length`.
/// `None` where the std is zero.
pub fn zscore(values: &[f64], length: usize) -> Vec<Option<f64>> {
    let mean = sma(values, length);
    let std = rolling_std(values, length);

    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let (m, s) = match (mean[i], std[i]) {
                (Some(m), Some(s)) => (m, s),
                _ => return None,
            };
            if s == 0.0 {
                return None;
            }
            Some((v - m) / s)
        })
        .collect()
}

/// Bar-to-bar fractional returns; index 0 is `None`.
pub fn returns(closes: &[f64]) -> Vec<Option<f64>> {
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            if i == 0 {
                return None;
            }
            let prev = closes[i - 1];
            if prev == 0.0 {
                return None;
            }
            Some((close - prev) / prev)
        })
        .collect()
}

fn rolling<F>(values: &[f64], length: usize, f: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    if length == 0 {
        return vec![None; values.len()];
    }
    values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            if i + 1 < length {
                return None;
            }
            Some(f(&values[i + 1 - length..=i]))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn make_candles(closes: &[f64]) -> Vec<Candle> {
        let start = Utc::now();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 10.0,
                open_time: start + Duration::hours(i as i64),
                close_time: start + Duration::hours(i as i64 + 1),
            })
            .collect()
    }

    #[test]
    fn test_sma_alignment() {
        let values = [1.0, 2.0, 3.0, 4.0];
        let out = sma(&values, 3);

        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_eq!(out[2], Some(2.0));
        assert_eq!(out[3], Some(3.0));
    }

    #[test]
    fn test_rolling_std_constant_series() {
        let values = [5.0; 6];
        let out = rolling_std(&values, 3);
        assert_eq!(out[5], Some(0.0));
    }

    #[test]
    fn test_pct_b_midpoint() {
        // Symmetric window: the last value equals the mean, so %B = 0.5
        let values = [9.0, 11.0, 10.0];
        let out = bollinger_pct_b(&values, 3, 2.0);
        let pct_b = out[2].unwrap();
        assert!((pct_b - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_pct_b_none_on_flat_band() {
        let values = [10.0, 10.0, 10.0];
        let out = bollinger_pct_b(&values, 3, 2.0);
        assert_eq!(out[2], None);
    }

    #[test]
    fn test_natr_fraction_of_close() {
        // Flat closes at 100 with 2-wide candles: TR = 2, NATR = 0.02
        let candles = make_candles(&[100.0, 100.0, 100.0, 100.0]);
        let out = natr(&candles, 3);

        assert_eq!(out[1], None);
        let v = out[3].unwrap();
        assert!((v - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_zscore_flags_outlier() {
        let mut values = vec![10.0; 10];
        values.push(15.0);
        let out = zscore(&values, 8);

        let z = out.last().unwrap().unwrap();
        assert!(z > 2.0, "outlier should have a large positive z, got {z}");
    }

    #[test]
    fn test_returns_first_is_none() {
        let out = returns(&[100.0, 110.0]);
        assert_eq!(out[0], None);
        assert!((out[1].unwrap() - 0.10).abs() < 1e-9);
    }
}
