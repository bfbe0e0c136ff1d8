//! Exchange REST client for historical perpetual-futures candles.

use anyhow::{Context, Result};
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::{Candle, CandleSeries};

use super::types::RawKline;

const FUTURES_API_BASE: &str = "https://fapi.binance.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_KLINES_PER_REQUEST: u32 = 1500;

/// Client for the USD-M futures klines endpoint (read-only).
pub struct CandleClient {
    client: Client,
    base_url: String,
}

impl CandleClient {
    /// Create a new client. `CANDLE_API_URL` overrides the default host.
    pub fn new() -> Result<Self> {
        let base_url =
            std::env::var("CANDLE_API_URL").unwrap_or_else(|_| FUTURES_API_BASE.to_string());
        Self::with_base_url(base_url)
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    /// Exchange symbol for a dash-separated pair: "ETH-USDT" -> "ETHUSDT".
    pub fn symbol_for_pair(trading_pair: &str) -> String {
        trading_pair.replace('-', "").to_uppercase()
    }

    /// Milliseconds per candle for an interval label.
    pub fn interval_millis(interval: &str) -> Option<i64> {
        let millis = match interval {
            "1m" => 60_000,
            "5m" => 5 * 60_000,
            "15m" => 15 * 60_000,
            "1h" => 60 * 60_000,
            "4h" => 4 * 60 * 60_000,
            "1d" => 24 * 60 * 60_000,
            _ => return None,
        };
        Some(millis)
    }

    /// Fetch one page of klines, retrying transient failures with
    /// exponential backoff. Server-side errors and network hiccups retry;
    /// client errors fail immediately.
    pub async fn get_klines(
        &self,
        trading_pair: &str,
        interval: &str,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let symbol = Self::symbol_for_pair(trading_pair);
        let mut url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol,
            interval,
            limit.min(MAX_KLINES_PER_REQUEST)
        );
        if let Some(start) = start_time {
            url = format!("{}&startTime={}", url, start.timestamp_millis());
        }
        if let Some(end) = end_time {
            url = format!("{}&endTime={}", url, end.timestamp_millis());
        }

        debug!(url = %url, "Fetching klines");

        let rows = backoff::future::retry(ExponentialBackoff::default(), || async {
            self.fetch_page(&url).await
        })
        .await?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_candle() {
                Ok(candle) => candles.push(candle),
                Err(e) => warn!(error = %e, "Skipping malformed kline"),
            }
        }

        Ok(candles)
    }

    async fn fetch_page(&self, url: &str) -> Result<Vec<RawKline>, backoff::Error<anyhow::Error>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| backoff::Error::transient(anyhow::Error::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = anyhow::anyhow!("Klines request failed: {} - {}", status, body);
            return if status.is_client_error() {
                Err(backoff::Error::permanent(err))
            } else {
                warn!(status = %status, "Klines request failed, retrying");
                Err(backoff::Error::transient(err))
            };
        }

        response
            .json::<Vec<RawKline>>()
            .await
            .map_err(|e| backoff::Error::permanent(anyhow::Error::new(e)))
    }

    /// Fetch a full `[start, end)` range as a series, paging through the
    /// endpoint's per-request limit.
    pub async fn get_candles(
        &self,
        trading_pair: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CandleSeries> {
        let step = Self::interval_millis(interval)
            .with_context(|| format!("Unsupported interval: {}", interval))?;

        let mut series = CandleSeries::new(trading_pair, interval);
        let mut cursor = start;

        loop {
            let page = self
                .get_klines(
                    trading_pair,
                    interval,
                    Some(cursor),
                    Some(end),
                    MAX_KLINES_PER_REQUEST,
                )
                .await?;

            if page.is_empty() {
                break;
            }

            let page_len = page.len();
            let last_open = page.last().map(|c| c.open_time);
            series.extend(page);

            debug!(
                pair = %trading_pair,
                fetched = page_len,
                total = series.len(),
                "Kline page stored"
            );

            // Advance past the last candle; a short page means the range
            // is exhausted
            match last_open {
                Some(last) if page_len as u32 == MAX_KLINES_PER_REQUEST => {
                    cursor = last + chrono::Duration::milliseconds(step);
                    if cursor >= end {
                        break;
                    }
                }
                _ => break,
            }

            // Rate limiting
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_for_pair() {
        assert_eq!(CandleClient::symbol_for_pair("ETH-USDT"), "ETHUSDT");
        assert_eq!(CandleClient::symbol_for_pair("btc-usdt"), "BTCUSDT");
    }

    #[test]
    fn test_interval_millis() {
        assert_eq!(CandleClient::interval_millis("1h"), Some(3_600_000));
        assert_eq!(CandleClient::interval_millis("1d"), Some(86_400_000));
        assert_eq!(CandleClient::interval_millis("7w"), None);
    }
}
