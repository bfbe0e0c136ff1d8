//! Performance metrics for backtest results: MDD, Sharpe ratio, win rate, etc.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::models::{ClosedPosition, PositionSide};

/// Summary statistics for a set of closed positions and an equity curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    // === Basic Statistics ===
    /// Number of closed positions
    pub total_positions: u32,

    /// Net realized pnl in quote currency (fees included)
    pub net_pnl_quote: Decimal,

    /// Net return on initial portfolio
    pub net_return_pct: Decimal,

    /// Total fees paid
    pub total_fees: Decimal,

    // === Win/Loss Metrics ===
    pub winning_positions: u32,
    pub losing_positions: u32,

    /// Win rate (0.0 to 1.0)
    pub win_rate: f64,

    /// Win rate on long positions only
    pub accuracy_long: f64,

    /// Win rate on short positions only
    pub accuracy_short: f64,

    /// Average profit on winners
    pub avg_win: Decimal,

    /// Average loss on losers (absolute value)
    pub avg_loss: Decimal,

    /// Gross profit / gross loss
    pub profit_factor: f64,

    /// Expected pnl per position
    pub expectancy: Decimal,

    // === Risk Metrics ===
    /// Maximum drawdown as a fraction of peak equity
    pub max_drawdown_pct: f64,

    /// Maximum drawdown in quote currency
    pub max_drawdown_quote: Decimal,

    /// Annualized Sharpe ratio over equity-curve returns
    pub sharpe_ratio: f64,

    /// Sortino ratio (downside deviation)
    pub sortino_ratio: f64,

    // === Time-Based Metrics ===
    /// Average holding time in minutes
    pub avg_holding_minutes: f64,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            total_positions: 0,
            net_pnl_quote: Decimal::ZERO,
            net_return_pct: Decimal::ZERO,
            total_fees: Decimal::ZERO,
            winning_positions: 0,
            losing_positions: 0,
            win_rate: 0.0,
            accuracy_long: 0.0,
            accuracy_short: 0.0,
            avg_win: Decimal::ZERO,
            avg_loss: Decimal::ZERO,
            profit_factor: 0.0,
            expectancy: Decimal::ZERO,
            max_drawdown_pct: 0.0,
            max_drawdown_quote: Decimal::ZERO,
            sharpe_ratio: 0.0,
            sortino_ratio: 0.0,
            avg_holding_minutes: 0.0,
        }
    }
}

/// Bars per year used to annualize equity-curve returns, by interval label.
fn periods_per_year(interval: &str) -> f64 {
    match interval {
        "1m" => 365.0 * 24.0 * 60.0,
        "5m" => 365.0 * 24.0 * 12.0,
        "15m" => 365.0 * 24.0 * 4.0,
        "1h" => 365.0 * 24.0,
        "4h" => 365.0 * 6.0,
        "1d" => 365.0,
        _ => 365.0 * 24.0,
    }
}

/// Calculator for backtest performance metrics.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Compute metrics from closed positions and the equity curve.
    ///
    /// `interval` is the candle interval label, used to annualize Sharpe
    /// and Sortino from per-bar equity returns.
    pub fn calculate(
        positions: &[ClosedPosition],
        equity_curve: &[(DateTime<Utc>, Decimal)],
        initial_portfolio: Decimal,
        interval: &str,
    ) -> PerformanceMetrics {
        let mut metrics = PerformanceMetrics::default();

        if positions.is_empty() {
            return metrics;
        }

        metrics.total_positions = positions.len() as u32;
        metrics.net_pnl_quote = positions.iter().map(|p| p.pnl_quote).sum();
        metrics.total_fees = positions.iter().map(|p| p.fee_quote).sum();

        if initial_portfolio > Decimal::ZERO {
            metrics.net_return_pct = metrics.net_pnl_quote / initial_portfolio;
        }

        Self::calculate_win_loss(&mut metrics, positions);
        Self::calculate_drawdown(&mut metrics, equity_curve);
        Self::calculate_sharpe_sortino(&mut metrics, equity_curve, interval);

        metrics.avg_holding_minutes = positions
            .iter()
            .map(|p| p.holding_time().num_seconds() as f64 / 60.0)
            .sum::<f64>()
            / positions.len() as f64;

        metrics
    }

    fn calculate_win_loss(metrics: &mut PerformanceMetrics, positions: &[ClosedPosition]) {
        let (wins, losses): (Vec<_>, Vec<_>) = positions.iter().partition(|p| p.is_win());

        metrics.winning_positions = wins.len() as u32;
        metrics.losing_positions = losses.len() as u32;
        metrics.win_rate = wins.len() as f64 / positions.len() as f64;

        metrics.accuracy_long = Self::side_accuracy(positions, PositionSide::Buy);
        metrics.accuracy_short = Self::side_accuracy(positions, PositionSide::Sell);

        if !wins.is_empty() {
            metrics.avg_win =
                wins.iter().map(|p| p.pnl_quote).sum::<Decimal>() / Decimal::from(wins.len());
        }
        if !losses.is_empty() {
            metrics.avg_loss = losses.iter().map(|p| p.pnl_quote.abs()).sum::<Decimal>()
                / Decimal::from(losses.len());
        }

        let gross_profit: Decimal = wins.iter().map(|p| p.pnl_quote).sum();
        let gross_loss: Decimal = losses.iter().map(|p| p.pnl_quote.abs()).sum();
        metrics.profit_factor = if gross_loss > Decimal::ZERO {
            gross_profit.to_f64().unwrap_or(0.0) / gross_loss.to_f64().unwrap_or(1.0)
        } else if gross_profit > Decimal::ZERO {
            f64::INFINITY
        } else {
            0.0
        };

        metrics.expectancy = metrics.net_pnl_quote / Decimal::from(positions.len());
    }

    fn side_accuracy(positions: &[ClosedPosition], side: PositionSide) -> f64 {
        let on_side: Vec<_> = positions.iter().filter(|p| p.side == side).collect();
        if on_side.is_empty() {
            return 0.0;
        }
        on_side.iter().filter(|p| p.is_win()).count() as f64 / on_side.len() as f64
    }

    /// Walk the equity curve tracking peak and deepest trough.
    fn calculate_drawdown(
        metrics: &mut PerformanceMetrics,
        equity_curve: &[(DateTime<Utc>, Decimal)],
    ) {
        let mut peak = Decimal::ZERO;
        let mut max_dd = Decimal::ZERO;
        let mut max_dd_pct = 0.0f64;

        for (_, equity) in equity_curve {
            if *equity > peak {
                peak = *equity;
            }
            if peak > Decimal::ZERO {
                let dd = peak - *equity;
                if dd > max_dd {
                    max_dd = dd;
                }
                let dd_pct = dd.to_f64().unwrap_or(0.0) / peak.to_f64().unwrap_or(1.0);
                if dd_pct > max_dd_pct {
                    max_dd_pct = dd_pct;
                }
            }
        }

        metrics.max_drawdown_quote = max_dd;
        metrics.max_drawdown_pct = max_dd_pct;
    }

    fn calculate_sharpe_sortino(
        metrics: &mut PerformanceMetrics,
        equity_curve: &[(DateTime<Utc>, Decimal)],
        interval: &str,
    ) {
        if equity_curve.len() < 3 {
            return;
        }

        let returns: Vec<f64> = equity_curve
            .windows(2)
            .filter_map(|w| {
                let prev = w[0].1.to_f64()?;
                let curr = w[1].1.to_f64()?;
                if prev > 0.0 {
                    Some((curr - prev) / prev)
                } else {
                    None
                }
            })
            .collect();

        if returns.len() < 2 {
            return;
        }

        let annualize = periods_per_year(interval).sqrt();
        let mean = returns.clone().mean();
        let std_dev = returns.clone().std_dev();

        if std_dev > 0.0 {
            metrics.sharpe_ratio = (mean / std_dev) * annualize;
        }

        let negative: Vec<f64> = returns.iter().filter(|&&r| r < 0.0).copied().collect();
        if negative.len() >= 2 {
            let downside_dev = negative.std_dev();
            if downside_dev > 0.0 {
                metrics.sortino_ratio = (mean / downside_dev) * annualize;
            }
        }
    }
}
