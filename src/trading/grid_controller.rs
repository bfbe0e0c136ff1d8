//! Directional grid market-making controller.
//!
//! Uses NATR to make spreads dynamic and Bollinger %B to shift the active
//! side: grid levels only quote when the indicator filter agrees with
//! their direction. Per level, the controller decides when a resting order
//! must be re-priced, whether an open position should be force-closed, and
//! whether the level is still cooling down from its last fill.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators;
use crate::models::{CandleSeries, OrderLevel, PositionConfig, PositionSide};
use crate::trading::executor::PositionExecutor;

/// Controller configuration with indicator parameters and the quoting grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridControllerConfig {
    pub strategy_name: String,
    pub exchange: String,
    pub trading_pair: String,
    pub leverage: u32,

    /// Bollinger band window
    pub bb_length: usize,

    /// Bollinger band width in standard deviations
    pub bb_std: f64,

    /// Levels go long while %B is below this
    pub bb_long_threshold: f64,

    /// Levels go short while %B is above this
    pub bb_short_threshold: f64,

    /// NATR window for the spread multiplier
    pub natr_length: usize,

    pub order_levels: Vec<OrderLevel>,
}

impl Default for GridControllerConfig {
    fn default() -> Self {
        Self {
            strategy_name: "bollinger_grid".to_string(),
            exchange: "binance_perpetual".to_string(),
            trading_pair: "ETH-USDT".to_string(),
            leverage: 20,
            bb_length: 12,
            bb_std: 2.0,
            bb_long_threshold: 0.7,
            bb_short_threshold: 0.3,
            natr_length: 14,
            order_levels: crate::models::symmetric_grid(3, rust_decimal_macros::dec!(50)),
        }
    }
}

/// Indicator snapshot for one candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessedTick {
    pub close_time: DateTime<Utc>,
    pub close: f64,

    /// NATR, as a fraction of price
    pub spread_multiplier: f64,

    /// Bollinger %B
    pub price_multiplier: f64,

    /// +1 long, -1 short, 0 flat
    pub active_side: i8,
}

/// The market-making strategy controller.
pub struct GridController {
    config: GridControllerConfig,
}

impl GridController {
    pub fn new(config: GridControllerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GridControllerConfig {
        &self.config
    }

    // ==================== Processed Data ====================

    /// Compute the indicator snapshot per candle, index-aligned with the
    /// series. `None` until both indicator windows have filled.
    ///
    /// The side filters are applied sequentially: start flat, set long
    /// where `%B < bb_long_threshold`, then set short where
    /// `%B > bb_short_threshold`. With overlapping thresholds the short
    /// filter wins.
    pub fn process(&self, series: &CandleSeries) -> Vec<Option<ProcessedTick>> {
        let candles = series.candles();
        let closes = series.closes();

        let natr = indicators::natr(candles, self.config.natr_length);
        let pct_b = indicators::bollinger_pct_b(&closes, self.config.bb_length, self.config.bb_std);

        candles
            .iter()
            .enumerate()
            .map(|(i, candle)| {
                let spread_multiplier = natr[i]?;
                let price_multiplier = pct_b[i]?;

                let mut active_side = 0i8;
                if price_multiplier < self.config.bb_long_threshold {
                    active_side = 1;
                }
                if price_multiplier > self.config.bb_short_threshold {
                    active_side = -1;
                }

                Some(ProcessedTick {
                    close_time: candle.close_time,
                    close: candle.close,
                    spread_multiplier,
                    price_multiplier,
                    active_side,
                })
            })
            .collect()
    }

    /// Latest indicator snapshot, if the series is long enough.
    pub fn latest_tick(&self, series: &CandleSeries) -> Option<ProcessedTick> {
        self.process(series).into_iter().next_back().flatten()
    }

    // ==================== Level Conditions ====================

    /// Whether a resting order for this level should be re-priced.
    pub fn refresh_order_condition(
        &self,
        executor: &PositionExecutor,
        level: &OrderLevel,
        now: DateTime<Utc>,
    ) -> bool {
        executor.config.timestamp + Duration::seconds(level.order_refresh_time) <= now
    }

    /// Whether an active position should be closed early. The grid holds
    /// positions to their barriers, so this never triggers.
    pub fn early_stop_condition(
        &self,
        _executor: &PositionExecutor,
        _level: &OrderLevel,
        _now: DateTime<Utc>,
    ) -> bool {
        false
    }

    /// Whether the level is still cooling down after its last close.
    /// Keeps one side from firing repeatedly into the same move.
    pub fn cooldown_condition(
        &self,
        executor: &PositionExecutor,
        level: &OrderLevel,
        now: DateTime<Utc>,
    ) -> bool {
        match executor.close_timestamp() {
            Some(closed_at) => closed_at + Duration::seconds(level.cooldown_time) > now,
            None => false,
        }
    }

    // ==================== Position Sizing ====================

    /// Build the position config for a level from the current close price
    /// and indicator snapshot. Returns `None` when the active side does not
    /// match the level side, or the priced order would be degenerate.
    pub fn position_config(
        &self,
        level: &OrderLevel,
        tick: &ProcessedTick,
        now: DateTime<Utc>,
    ) -> Option<PositionConfig> {
        let current_side = level.side.sign();
        if tick.active_side != current_side {
            return None;
        }

        // Sells quote above mid, buys below
        let signed_multiplier = match level.side {
            PositionSide::Sell => tick.spread_multiplier,
            PositionSide::Buy => -tick.spread_multiplier,
        };

        let spread_factor: f64 = level
            .spread_factor
            .try_into()
            .ok()
            .unwrap_or(level.level_id as f64);
        let order_price = tick.close * (1.0 + spread_factor * signed_multiplier);
        if order_price <= 0.0 {
            return None;
        }

        let order_price = Decimal::from_f64(order_price)?;
        let amount = level.order_amount_quote / order_price;

        let barrier = &level.triple_barrier;
        let take_profit =
            barrier.take_profit * Decimal::from_f64(signed_multiplier.abs())?;

        debug!(
            level = %level.tag(),
            price = %order_price,
            amount = %amount,
            spread_multiplier = tick.spread_multiplier,
            pct_b = tick.price_multiplier,
            "Level position config"
        );

        Some(PositionConfig {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: now,
            trading_pair: self.config.trading_pair.clone(),
            exchange: self.config.exchange.clone(),
            side: level.side,
            amount,
            entry_price: order_price,
            take_profit,
            stop_loss: barrier.stop_loss,
            time_limit: barrier.time_limit,
            trailing_stop: barrier.trailing_stop,
            open_order_type: barrier.open_order_type,
            take_profit_order_type: barrier.take_profit_order_type,
            leverage: self.config.leverage,
        })
    }
}
