//! Backtesting engine for the stat-arb strategy over historical candles.
//!
//! Replays a candle series through the signal generator, opens simulated
//! triple-barrier positions, and produces a report with performance
//! statistics, an equity curve and a per-close-reason breakdown.

use std::collections::HashMap;

use anyhow::{ensure, Result};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::indicators;
use crate::metrics::{MetricsCalculator, PerformanceMetrics};
use crate::models::{
    CandleSeries, ClosedPosition, CloseReason, OrderType, PositionConfig, PositionSide,
};
use crate::trading::{GridController, PositionExecutor, StatArb};

/// Backtesting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Quote-currency notional per position
    pub order_amount: Decimal,

    pub leverage: u32,

    /// Starting portfolio value in quote currency
    pub initial_portfolio: Decimal,

    /// Take-profit distance as a multiple of the rolling returns-std
    pub take_profit_multiplier: f64,

    /// Stop-loss distance as a multiple of the rolling returns-std
    pub stop_loss_multiplier: f64,

    /// Maximum holding time in seconds
    pub time_limit: i64,

    /// Window for the returns-std scaling the barriers;
    /// `None` falls back to the strategy's `periods`
    pub std_span: Option<usize>,

    /// Taker fee rate applied on entry and exit
    pub fee_rate: Decimal,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            order_amount: dec!(50),
            leverage: 20,
            initial_portfolio: dec!(100),
            take_profit_multiplier: 3.0,
            stop_loss_multiplier: 1.5,
            time_limit: 60 * 60 * 24,
            std_span: None,
            fee_rate: dec!(0.0004),
        }
    }
}

/// Backtest output: positions, equity curve and summary statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub trading_pair: String,
    pub interval: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,

    pub config: BacktestConfig,

    pub initial_portfolio: Decimal,
    pub final_portfolio: Decimal,

    pub metrics: PerformanceMetrics,
    pub positions: Vec<ClosedPosition>,
    pub equity_curve: Vec<(DateTime<Utc>, Decimal)>,

    /// Candles that produced a directional signal
    pub signals_total: usize,

    /// Signals that became positions
    pub entries_taken: usize,

    /// Signals skipped because a position was already open
    pub skipped_position_open: usize,

    /// Signals skipped for lack of free margin
    pub skipped_no_funds: usize,

    /// Signals skipped because the returns-std was missing or zero
    pub skipped_no_std: usize,
}

impl BacktestReport {
    /// Count and net pnl per close reason, most frequent first.
    pub fn close_reason_breakdown(&self) -> Vec<(CloseReason, usize, Decimal)> {
        let mut breakdown: Vec<(CloseReason, usize, Decimal)> = Vec::new();
        for position in &self.positions {
            match breakdown
                .iter_mut()
                .find(|(reason, _, _)| *reason == position.close_reason)
            {
                Some((_, count, pnl)) => {
                    *count += 1;
                    *pnl += position.pnl_quote;
                }
                None => breakdown.push((position.close_reason, 1, position.pnl_quote)),
            }
        }
        breakdown.sort_by(|a, b| b.1.cmp(&a.1));
        breakdown
    }

    /// Serialize the full report (positions + equity curve included) for
    /// external tooling to chart.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl std::fmt::Display for BacktestReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let m = &self.metrics;
        writeln!(f, "\n{:=^60}", " BACKTEST RESULTS ")?;
        writeln!(f)?;
        writeln!(
            f,
            "Pair: {} ({})  Period: {} to {}",
            self.trading_pair,
            self.interval,
            self.start_time.format("%Y-%m-%d"),
            self.end_time.format("%Y-%m-%d")
        )?;
        writeln!(f)?;
        writeln!(f, "--- Portfolio ---")?;
        writeln!(f, "Initial:       ${:.2}", self.initial_portfolio)?;
        writeln!(f, "Final:         ${:.2}", self.final_portfolio)?;
        writeln!(f, "Net P&L:       ${:.2} ({:.2}%)", m.net_pnl_quote, m.net_return_pct * dec!(100))?;
        writeln!(f, "Fees Paid:     ${:.4}", m.total_fees)?;
        writeln!(f)?;
        writeln!(f, "--- Positions ---")?;
        writeln!(
            f,
            "Total:         {} ({} signals, {} skipped)",
            m.total_positions,
            self.signals_total,
            self.skipped_position_open + self.skipped_no_funds + self.skipped_no_std
        )?;
        writeln!(f, "Winners:       {} ({:.1}%)", m.winning_positions, m.win_rate * 100.0)?;
        writeln!(f, "Losers:        {}", m.losing_positions)?;
        writeln!(f, "Long Accuracy: {:.1}%", m.accuracy_long * 100.0)?;
        writeln!(f, "Short Accuracy:{:.1}%", m.accuracy_short * 100.0)?;
        writeln!(f, "Avg Win:       ${:.2}", m.avg_win)?;
        writeln!(f, "Avg Loss:      ${:.2}", m.avg_loss)?;
        writeln!(f, "Profit Factor: {:.2}", m.profit_factor)?;
        writeln!(f, "Expectancy:    ${:.4}", m.expectancy)?;
        writeln!(f)?;
        writeln!(f, "--- Risk ---")?;
        writeln!(f, "Max Drawdown:  {:.2}% (${:.2})", m.max_drawdown_pct * 100.0, m.max_drawdown_quote)?;
        writeln!(f, "Sharpe Ratio:  {:.2}", m.sharpe_ratio)?;
        writeln!(f, "Sortino Ratio: {:.2}", m.sortino_ratio)?;
        writeln!(f)?;
        writeln!(f, "--- Timing ---")?;
        writeln!(f, "Avg Hold:      {:.1} min", m.avg_holding_minutes)?;
        writeln!(f, "{:=^60}", "")?;
        Ok(())
    }
}

/// Candle-replay backtester for a stat-arb strategy.
pub struct Backtester {
    config: BacktestConfig,
    strategy: StatArb,
}

impl Backtester {
    pub fn new(config: BacktestConfig, strategy: StatArb) -> Self {
        Self { config, strategy }
    }

    /// Run the backtest over a candle series.
    pub fn run(&self, series: &CandleSeries) -> Result<BacktestReport> {
        ensure!(!series.is_empty(), "Candle series is empty");
        ensure!(self.config.leverage > 0, "Leverage must be positive");

        let candles = series.candles();
        info!(
            pair = %series.trading_pair,
            interval = %series.interval,
            candles = candles.len(),
            "Starting backtest"
        );

        let signals = self.strategy.generate_signals(series);

        // Rolling std of bar returns scales the barriers
        let std_span = self
            .config
            .std_span
            .unwrap_or(self.strategy.config().periods);
        let closes = series.closes();
        let bar_returns: Vec<f64> = indicators::returns(&closes)
            .into_iter()
            .map(|r| r.unwrap_or(0.0))
            .collect();
        let returns_std = indicators::rolling_std(&bar_returns, std_span);

        let margin_per_position = self.config.order_amount / Decimal::from(self.config.leverage);

        let mut cash = self.config.initial_portfolio;
        let mut open: Option<PositionExecutor> = None;
        let mut positions: Vec<ClosedPosition> = Vec::new();
        let mut equity_curve: Vec<(DateTime<Utc>, Decimal)> = Vec::new();

        let mut signals_total = 0usize;
        let mut entries_taken = 0usize;
        let mut skipped_position_open = 0usize;
        let mut skipped_no_funds = 0usize;
        let mut skipped_no_std = 0usize;

        let start_time = candles.first().map(|c| c.open_time).unwrap_or_else(Utc::now);
        let end_time = candles.last().map(|c| c.close_time).unwrap_or_else(Utc::now);
        equity_curve.push((start_time, cash));

        for (i, candle) in candles.iter().enumerate() {
            // Barriers first, entries after: a position never closes on
            // the candle that opened it
            if let Some(mut executor) = open.take() {
                if executor.update(candle).is_some() {
                    let closed = executor
                        .closed_position()
                        .expect("closed executor has a position");
                    cash += margin_per_position + closed.pnl_quote;
                    positions.push(closed);
                } else {
                    open = Some(executor);
                }
            }

            if open.is_none() {
                if let Some(signal) = signals[i] {
                    if let Some(side) = signal.side {
                        signals_total += 1;

                        let std = returns_std[i].filter(|s| *s > 0.0);
                        match std {
                            None => skipped_no_std += 1,
                            Some(std) => {
                                if margin_per_position > cash {
                                    debug!(
                                        margin = %margin_per_position,
                                        cash = %cash,
                                        "Insufficient funds for signal"
                                    );
                                    skipped_no_funds += 1;
                                } else if let Some(config) =
                                    self.position_config(series, signal.close, side, std, candle.close_time)
                                {
                                    debug!(
                                        side = %side.as_str(),
                                        price = signal.close,
                                        zscore = signal.zscore,
                                        "Opening position"
                                    );
                                    cash -= margin_per_position;
                                    open = Some(PositionExecutor::new(config, self.config.fee_rate));
                                    entries_taken += 1;
                                }
                            }
                        }
                    }
                }
            } else if signals[i].and_then(|s| s.side).is_some() {
                signals_total += 1;
                skipped_position_open += 1;
            }

            // Mark equity at bar close
            let close_price = Decimal::from_f64(candle.close).unwrap_or(Decimal::ZERO);
            let unrealized = open
                .as_ref()
                .map(|e| margin_per_position + e.pnl_quote(close_price))
                .unwrap_or(Decimal::ZERO);
            equity_curve.push((candle.close_time, cash + unrealized));
        }

        // Close any leftover position at the last close
        if let Some(mut executor) = open.take() {
            let last = candles.last().expect("series is non-empty");
            let last_close = Decimal::from_f64(last.close).unwrap_or(executor.config.entry_price);
            executor.close_at_market(last_close, last.close_time);
            let closed = executor
                .closed_position()
                .expect("closed executor has a position");
            cash += margin_per_position + closed.pnl_quote;
            positions.push(closed);
            equity_curve.push((last.close_time, cash));
        }

        let metrics = MetricsCalculator::calculate(
            &positions,
            &equity_curve,
            self.config.initial_portfolio,
            &series.interval,
        );

        info!(
            positions = positions.len(),
            net_pnl = %metrics.net_pnl_quote,
            "Backtest finished"
        );

        Ok(BacktestReport {
            trading_pair: series.trading_pair.clone(),
            interval: series.interval.clone(),
            start_time,
            end_time,
            config: self.config.clone(),
            initial_portfolio: self.config.initial_portfolio,
            final_portfolio: cash,
            metrics,
            positions,
            equity_curve,
            signals_total,
            entries_taken,
            skipped_position_open,
            skipped_no_funds,
            skipped_no_std,
        })
    }

    /// Entry at the signal candle's close; barriers scaled by the rolling
    /// returns-std.
    fn position_config(
        &self,
        series: &CandleSeries,
        close: f64,
        side: PositionSide,
        returns_std: f64,
        timestamp: DateTime<Utc>,
    ) -> Option<PositionConfig> {
        let entry_price = Decimal::from_f64(close)?;
        if entry_price.is_zero() {
            return None;
        }

        let take_profit = Decimal::from_f64(self.config.take_profit_multiplier * returns_std)?;
        let stop_loss = Decimal::from_f64(self.config.stop_loss_multiplier * returns_std)?;

        Some(PositionConfig {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            trading_pair: series.trading_pair.clone(),
            exchange: "binance_perpetual".to_string(),
            side,
            amount: self.config.order_amount / entry_price,
            entry_price,
            take_profit,
            stop_loss,
            time_limit: self.config.time_limit,
            trailing_stop: None,
            open_order_type: OrderType::Market,
            take_profit_order_type: OrderType::Limit,
            leverage: self.config.leverage,
        })
    }
}

// ============== Grid Controller Replay ==============

/// One grid level's in-flight state: a quoted order waiting for a fill, or
/// a filled position running its barriers. Closed executors stick around
/// so the cooldown condition can see the close timestamp.
struct LevelSlot {
    executor: PositionExecutor,
    filled: bool,
}

/// Replay summary for the grid controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridReplayReport {
    pub trading_pair: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,

    /// Orders quoted by the controller
    pub orders_quoted: usize,

    /// Quoted orders that traded
    pub orders_filled: usize,

    /// Stale quotes re-priced after their refresh window
    pub orders_refreshed: usize,

    /// Quote attempts suppressed by a level cooldown
    pub cooldown_skips: usize,

    pub metrics: PerformanceMetrics,
    pub positions: Vec<ClosedPosition>,
}

impl std::fmt::Display for GridReplayReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let m = &self.metrics;
        writeln!(f, "\n{:=^60}", " GRID REPLAY ")?;
        writeln!(f)?;
        writeln!(
            f,
            "Pair: {}  Period: {} to {}",
            self.trading_pair,
            self.start_time.format("%Y-%m-%d"),
            self.end_time.format("%Y-%m-%d")
        )?;
        writeln!(f)?;
        writeln!(f, "--- Quoting ---")?;
        writeln!(f, "Quoted:        {}", self.orders_quoted)?;
        writeln!(f, "Filled:        {}", self.orders_filled)?;
        writeln!(f, "Refreshed:     {}", self.orders_refreshed)?;
        writeln!(f, "Cooldown Skips:{}", self.cooldown_skips)?;
        writeln!(f)?;
        writeln!(f, "--- Positions ---")?;
        writeln!(f, "Closed:        {}", m.total_positions)?;
        writeln!(f, "Net P&L:       ${:.4}", m.net_pnl_quote)?;
        writeln!(f, "Win Rate:      {:.1}%", m.win_rate * 100.0)?;
        writeln!(f, "Profit Factor: {:.2}", m.profit_factor)?;
        writeln!(f, "Avg Hold:      {:.1} min", m.avg_holding_minutes)?;
        writeln!(f, "{:=^60}", "")?;
        Ok(())
    }
}

/// Replays the grid controller over historical candles with simulated
/// executors, honoring the refresh and cooldown conditions.
pub struct GridReplay {
    controller: GridController,
    fee_rate: Decimal,
}

impl GridReplay {
    pub fn new(controller: GridController, fee_rate: Decimal) -> Self {
        Self {
            controller,
            fee_rate,
        }
    }

    pub fn run(&self, series: &CandleSeries) -> Result<GridReplayReport> {
        ensure!(!series.is_empty(), "Candle series is empty");

        let candles = series.candles();
        let ticks = self.controller.process(series);
        let levels = self.controller.config().order_levels.clone();

        info!(
            pair = %series.trading_pair,
            candles = candles.len(),
            levels = levels.len(),
            "Starting grid replay"
        );

        let mut slots: HashMap<String, LevelSlot> = HashMap::new();
        let mut positions: Vec<ClosedPosition> = Vec::new();
        let mut orders_quoted = 0usize;
        let mut orders_filled = 0usize;
        let mut orders_refreshed = 0usize;
        let mut cooldown_skips = 0usize;

        for (i, candle) in candles.iter().enumerate() {
            let now = candle.close_time;

            // Run barriers on filled positions
            for slot in slots.values_mut() {
                if slot.filled && slot.executor.is_active() && slot.executor.update(candle).is_some()
                {
                    let closed = slot
                        .executor
                        .closed_position()
                        .expect("closed executor has a position");
                    positions.push(closed);
                }
            }

            // Fill pending quotes the candle range touched
            for slot in slots.values_mut() {
                if !slot.filled {
                    let entry = slot.executor.config.entry_price;
                    let low = Decimal::from_f64(candle.low).unwrap_or(entry);
                    let high = Decimal::from_f64(candle.high).unwrap_or(entry);
                    if entry >= low && entry <= high {
                        slot.filled = true;
                        orders_filled += 1;
                        debug!(id = %slot.executor.config.id, price = %entry, "Grid order filled");
                    }
                }
            }

            // Per-level quoting decisions
            for level in &levels {
                let tag = level.tag();

                let requote = match slots.get(&tag) {
                    // Position open and running its barriers
                    Some(slot) if slot.filled && slot.executor.is_active() => false,
                    // Position closed: level quiet until the cooldown
                    // elapses
                    Some(slot) if slot.filled => {
                        if self
                            .controller
                            .cooldown_condition(&slot.executor, level, now)
                        {
                            cooldown_skips += 1;
                            false
                        } else {
                            true
                        }
                    }
                    // Pending quote: re-price once stale
                    Some(slot) => {
                        if self
                            .controller
                            .refresh_order_condition(&slot.executor, level, now)
                        {
                            orders_refreshed += 1;
                            true
                        } else {
                            false
                        }
                    }
                    None => true,
                };

                if !requote {
                    continue;
                }
                slots.remove(&tag);

                let Some(tick) = ticks[i] else { continue };
                if let Some(config) = self.controller.position_config(level, &tick, now) {
                    orders_quoted += 1;
                    slots.insert(
                        tag,
                        LevelSlot {
                            executor: PositionExecutor::new(config, self.fee_rate),
                            filled: false,
                        },
                    );
                }
            }
        }

        // Close filled leftovers at the last close
        let last = candles.last().expect("series is non-empty");
        let last_close = Decimal::from_f64(last.close).unwrap_or(Decimal::ONE);
        for slot in slots.values_mut() {
            if slot.filled && slot.executor.is_active() {
                slot.executor.close_at_market(last_close, last.close_time);
                let closed = slot
                    .executor
                    .closed_position()
                    .expect("closed executor has a position");
                positions.push(closed);
            }
        }

        positions.sort_by_key(|p| p.exit_time);

        // Equity curve from realized pnl only (quotes are margin-free in
        // the replay)
        let mut equity = Decimal::ZERO;
        let equity_curve: Vec<(DateTime<Utc>, Decimal)> = positions
            .iter()
            .map(|p| {
                equity += p.pnl_quote;
                (p.exit_time, equity)
            })
            .collect();

        let metrics =
            MetricsCalculator::calculate(&positions, &equity_curve, Decimal::ONE, &series.interval);

        info!(
            quoted = orders_quoted,
            filled = orders_filled,
            closed = positions.len(),
            "Grid replay finished"
        );

        Ok(GridReplayReport {
            trading_pair: series.trading_pair.clone(),
            start_time: candles.first().map(|c| c.open_time).unwrap_or_else(Utc::now),
            end_time: last.close_time,
            orders_quoted,
            orders_filled,
            orders_refreshed,
            cooldown_skips,
            metrics,
            positions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candle;
    use crate::trading::StatArbConfig;
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
        (0..len)
            .map(|i| 2000.0 + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect()
    }

    fn no_fee_config() -> BacktestConfig {
        BacktestConfig {
            fee_rate: Decimal::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn test_mean_reversion_round_trip() {
        // Spike down produces a long entry; the bounce back takes profit
        let mut closes = noisy_base(30);
        closes.extend([1950.0, 2000.0, 2001.0]);
        let series = make_series(&closes);

        let backtester = Backtester::new(no_fee_config(), StatArb::new(StatArbConfig::default()));
        let report = backtester.run(&series).unwrap();

        assert_eq!(report.entries_taken, 1);
        assert_eq!(report.positions.len(), 1);

        let position = &report.positions[0];
        assert_eq!(position.side, crate::models::PositionSide::Buy);
        assert_eq!(position.close_reason, CloseReason::TakeProfit);
        assert!(position.pnl_quote > Decimal::ZERO);

        // Cash returned to portfolio with the profit on top
        assert_eq!(
            report.final_portfolio,
            report.initial_portfolio + position.pnl_quote
        );
    }

    #[test]
    fn test_no_funds_skips_signal() {
        let mut closes = noisy_base(30);
        closes.extend([1950.0, 2000.0]);
        let series = make_series(&closes);

        // Margin per position is 50/20 = 2.5 > 1.0 portfolio
        let config = BacktestConfig {
            initial_portfolio: dec!(1),
            fee_rate: Decimal::ZERO,
            ..Default::default()
        };
        let backtester = Backtester::new(config, StatArb::new(StatArbConfig::default()));
        let report = backtester.run(&series).unwrap();

        assert_eq!(report.entries_taken, 0);
        assert!(report.skipped_no_funds >= 1);
        assert!(report.positions.is_empty());
        assert_eq!(report.final_portfolio, dec!(1));
    }

    #[test]
    fn test_leftover_position_closed_at_end() {
        // Spike with no reversion: position still open at end of data
        let mut closes = noisy_base(30);
        closes.push(1950.0);
        let series = make_series(&closes);

        let config = BacktestConfig {
            time_limit: 60 * 60 * 24 * 30,
            fee_rate: Decimal::ZERO,
            ..Default::default()
        };
        let backtester = Backtester::new(config, StatArb::new(StatArbConfig::default()));
        let report = backtester.run(&series).unwrap();

        assert_eq!(report.positions.len(), 1);
        assert_eq!(report.positions[0].close_reason, CloseReason::EndOfData);
    }

    #[test]
    fn test_empty_series_is_error() {
        let series = CandleSeries::new("ETH-USDT", "1h");
        let backtester = Backtester::new(no_fee_config(), StatArb::new(StatArbConfig::default()));
        assert!(backtester.run(&series).is_err());
    }

    #[test]
    fn test_breakdown_groups_by_reason() {
        let mut closes = noisy_base(30);
        closes.extend([1950.0, 2000.0, 2001.0]);
        let series = make_series(&closes);

        let backtester = Backtester::new(no_fee_config(), StatArb::new(StatArbConfig::default()));
        let report = backtester.run(&series).unwrap();

        let breakdown = report.close_reason_breakdown();
        assert_eq!(breakdown.len(), 1);
        assert_eq!(breakdown[0].0, CloseReason::TakeProfit);
        assert_eq!(breakdown[0].1, 1);
    }

    // ---- Grid replay ----

    fn falling_series(len: usize) -> CandleSeries {
        // Steady fall keeps Bollinger %B low: buy levels stay active
        let closes: Vec<f64> = (0..len).map(|i| 2000.0 - i as f64 * 5.0).collect();
        let start = Utc::now() - Duration::hours(len as i64);
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open_time = start + Duration::hours(i as i64);
                Candle {
                    open: close + 2.5,
                    high: close * 1.005,
                    low: close * 0.995,
                    close,
                    volume: 100.0,
                    open_time,
                    close_time: open_time + Duration::hours(1),
                }
            })
            .collect();
        CandleSeries::from_candles("ETH-USDT", "1h", candles)
    }

    fn grid_config(levels: Vec<crate::models::OrderLevel>) -> crate::trading::GridControllerConfig {
        crate::trading::GridControllerConfig {
            order_levels: levels,
            ..Default::default()
        }
    }

    #[test]
    fn test_grid_replay_fills_at_mid_quote() {
        use crate::models::{OrderLevel, PositionSide};

        // Spread factor 0 quotes exactly at the close: the next candle's
        // range always contains it, so the order must fill
        let mut level = OrderLevel::new(1, PositionSide::Buy, dec!(50));
        level.spread_factor = Decimal::ZERO;
        level.order_refresh_time = i64::MAX / 2;
        level.triple_barrier.stop_loss = dec!(0.5);
        level.triple_barrier.time_limit = 60 * 60 * 24 * 365;

        let controller = GridController::new(grid_config(vec![level]));
        let replay = GridReplay::new(controller, Decimal::ZERO);
        let report = replay.run(&falling_series(60)).unwrap();

        assert!(report.orders_quoted >= 1);
        assert!(report.orders_filled >= 1);
        assert!(!report.positions.is_empty());
        // Long inventory in a falling market loses
        assert!(report.metrics.net_pnl_quote < Decimal::ZERO);
    }

    #[test]
    fn test_grid_replay_refreshes_stale_quotes() {
        use crate::models::{OrderLevel, PositionSide};

        // Quote far below the market so it never fills, with a refresh
        // window of one candle
        let mut level = OrderLevel::new(1, PositionSide::Buy, dec!(50));
        level.spread_factor = dec!(50);
        level.order_refresh_time = 3600;

        let controller = GridController::new(grid_config(vec![level]));
        let replay = GridReplay::new(controller, Decimal::ZERO);
        let report = replay.run(&falling_series(60)).unwrap();

        assert!(report.orders_quoted >= 2);
        assert_eq!(report.orders_filled, 0);
        assert!(report.orders_refreshed >= 1);
        assert!(report.positions.is_empty());
    }

    #[test]
    fn test_report_serializes() {
        let mut closes = noisy_base(30);
        closes.extend([1950.0, 2000.0]);
        let series = make_series(&closes);

        let backtester = Backtester::new(no_fee_config(), StatArb::new(StatArbConfig::default()));
        let report = backtester.run(&series).unwrap();

        let json = report.to_json().unwrap();
        assert!(json.contains("equity_curve"));
        assert!(json.contains("ETH-USDT"));
    }
}
