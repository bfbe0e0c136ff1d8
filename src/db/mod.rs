//! SQLite persistence: the candle cache and saved backtest summaries.
//!
//! Candles are keyed by (pair, interval, open_time) and upserted, so
//! re-fetching a range is idempotent. Backtest runs are appended.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::backtest::BacktestReport;
use crate::models::{Candle, CandleSeries};

/// Database connection pool.
pub struct Database {
    pool: SqlitePool,
}

/// Candle row as stored (millisecond timestamps).
#[derive(Debug, Clone, sqlx::FromRow)]
struct CandleRow {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl CandleRow {
    fn into_candle(self) -> Option<Candle> {
        Some(Candle {
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            open_time: Utc.timestamp_millis_opt(self.open_time).single()?,
            close_time: Utc.timestamp_millis_opt(self.close_time).single()?,
        })
    }
}

/// Persisted backtest summary.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredBacktestRun {
    pub id: i64,
    pub trading_pair: String,
    pub interval: String,
    pub created_at: String,
    pub net_pnl: f64,
    pub return_pct: f64,
    pub total_positions: i64,
    pub win_rate: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown_pct: f64,
}

impl Database {
    /// Connect and initialize the schema.
    pub async fn new(database_url: &str) -> Result<Self> {
        // Single connection: SQLite serializes writers, and an in-memory
        // database only exists on the connection that created it
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candles (
                trading_pair TEXT NOT NULL,
                interval TEXT NOT NULL,
                open_time INTEGER NOT NULL,
                close_time INTEGER NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (trading_pair, interval, open_time)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS backtest_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                trading_pair TEXT NOT NULL,
                interval TEXT NOT NULL,
                created_at TEXT NOT NULL,
                net_pnl REAL NOT NULL,
                return_pct REAL NOT NULL,
                total_positions INTEGER NOT NULL,
                win_rate REAL NOT NULL,
                sharpe_ratio REAL NOT NULL,
                max_drawdown_pct REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== Candles ====================

    /// Upsert all candles of a series. Returns the number written.
    pub async fn save_candles(&self, series: &CandleSeries) -> Result<usize> {
        let mut written = 0usize;

        for candle in series.candles() {
            sqlx::query(
                r#"
                INSERT INTO candles
                    (trading_pair, interval, open_time, close_time, open, high, low, close, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (trading_pair, interval, open_time) DO UPDATE SET
                    close_time = excluded.close_time,
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume
                "#,
            )
            .bind(&series.trading_pair)
            .bind(&series.interval)
            .bind(candle.open_time.timestamp_millis())
            .bind(candle.close_time.timestamp_millis())
            .bind(candle.open)
            .bind(candle.high)
            .bind(candle.low)
            .bind(candle.close)
            .bind(candle.volume)
            .execute(&self.pool)
            .await
            .context("Failed to save candle")?;

            written += 1;
        }

        Ok(written)
    }

    /// Load cached candles for a pair/interval, optionally bounded by
    /// `[start, end)` open time.
    pub async fn get_candles(
        &self,
        trading_pair: &str,
        interval: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<CandleSeries> {
        let start_ms = start.map(|t| t.timestamp_millis()).unwrap_or(i64::MIN);
        let end_ms = end.map(|t| t.timestamp_millis()).unwrap_or(i64::MAX);

        let rows: Vec<CandleRow> = sqlx::query_as(
            r#"
            SELECT open_time, close_time, open, high, low, close, volume
            FROM candles
            WHERE trading_pair = ? AND interval = ?
              AND open_time >= ? AND open_time < ?
            ORDER BY open_time ASC
            "#,
        )
        .bind(trading_pair)
        .bind(interval)
        .bind(start_ms)
        .bind(end_ms)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load candles")?;

        let candles = rows.into_iter().filter_map(CandleRow::into_candle).collect();
        Ok(CandleSeries::from_candles(trading_pair, interval, candles))
    }

    /// Number of cached candles for a pair/interval.
    pub async fn candle_count(&self, trading_pair: &str, interval: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM candles WHERE trading_pair = ? AND interval = ?",
        )
        .bind(trading_pair)
        .bind(interval)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    // ==================== Backtest Runs ====================

    /// Persist a run summary; returns its row id.
    pub async fn save_backtest_run(&self, report: &BacktestReport) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO backtest_runs
                (trading_pair, interval, created_at, net_pnl, return_pct,
                 total_positions, win_rate, sharpe_ratio, max_drawdown_pct)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report.trading_pair)
        .bind(&report.interval)
        .bind(Utc::now().to_rfc3339())
        .bind(report.metrics.net_pnl_quote.to_f64().unwrap_or(0.0))
        .bind(report.metrics.net_return_pct.to_f64().unwrap_or(0.0))
        .bind(report.metrics.total_positions as i64)
        .bind(report.metrics.win_rate)
        .bind(report.metrics.sharpe_ratio)
        .bind(report.metrics.max_drawdown_pct)
        .execute(&self.pool)
        .await
        .context("Failed to save backtest run")?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent run summaries, newest first.
    pub async fn get_backtest_runs(&self, limit: u32) -> Result<Vec<StoredBacktestRun>> {
        let runs = sqlx::query_as(
            r#"
            SELECT id, trading_pair, interval, created_at, net_pnl, return_pct,
                   total_positions, win_rate, sharpe_ratio, max_drawdown_pct
            FROM backtest_runs
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load backtest runs")?;

        Ok(runs)
    }
}
