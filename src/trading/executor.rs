//! Simulated position executor: applies triple-barrier exits to an open
//! position as candles replay.
//!
//! Evaluation order inside a bar is conservative: the stop loss is checked
//! before the trailing stop and the take profit, so a candle that spans
//! several barriers resolves to the worst outcome.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{Candle, ClosedPosition, CloseReason, PositionConfig, PositionSide};

/// Lifecycle state of an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorStatus {
    Active,
    Closed,
}

/// Tracks one position from entry to barrier exit.
pub struct PositionExecutor {
    pub config: PositionConfig,
    status: ExecutorStatus,
    close_timestamp: Option<DateTime<Utc>>,
    close_price: Option<Decimal>,
    close_reason: Option<CloseReason>,

    /// Taker fee rate applied on entry and exit notional
    fee_rate: Decimal,

    /// Best price seen in the position's favor (trailing watermark)
    best_price: Decimal,
    trailing_armed: bool,
}

impl PositionExecutor {
    pub fn new(config: PositionConfig, fee_rate: Decimal) -> Self {
        let best_price = config.entry_price;
        Self {
            config,
            status: ExecutorStatus::Active,
            close_timestamp: None,
            close_price: None,
            close_reason: None,
            fee_rate,
            best_price,
            trailing_armed: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ExecutorStatus::Active
    }

    pub fn close_timestamp(&self) -> Option<DateTime<Utc>> {
        self.close_timestamp
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// Evaluate the barriers against one candle. Returns the close reason
    /// if the position was closed by this candle.
    pub fn update(&mut self, candle: &Candle) -> Option<CloseReason> {
        if !self.is_active() {
            return None;
        }

        let high = Decimal::from_f64(candle.high).unwrap_or(self.config.entry_price);
        let low = Decimal::from_f64(candle.low).unwrap_or(self.config.entry_price);
        let close = Decimal::from_f64(candle.close).unwrap_or(self.config.entry_price);

        // Stop loss first
        let sl_price = self.config.stop_loss_price();
        let sl_hit = match self.config.side {
            PositionSide::Buy => low <= sl_price,
            PositionSide::Sell => high >= sl_price,
        };
        if sl_hit {
            self.close_at(sl_price, candle.close_time, CloseReason::StopLoss);
            return Some(CloseReason::StopLoss);
        }

        // Trailing stop: arm once the activation delta is crossed, then
        // trail the watermark
        if let Some(ts) = self.config.trailing_stop {
            let activation_price = match self.config.side {
                PositionSide::Buy => {
                    self.config.entry_price * (Decimal::ONE + ts.activation_price_delta)
                }
                PositionSide::Sell => {
                    self.config.entry_price * (Decimal::ONE - ts.activation_price_delta)
                }
            };

            match self.config.side {
                PositionSide::Buy => {
                    if high > self.best_price {
                        self.best_price = high;
                    }
                    if !self.trailing_armed && self.best_price >= activation_price {
                        self.trailing_armed = true;
                        debug!(id = %self.config.id, watermark = %self.best_price, "Trailing stop armed");
                    }
                    if self.trailing_armed {
                        let trail = self.best_price * (Decimal::ONE - ts.trailing_delta);
                        if low <= trail {
                            self.close_at(trail, candle.close_time, CloseReason::TrailingStop);
                            return Some(CloseReason::TrailingStop);
                        }
                    }
                }
                PositionSide::Sell => {
                    if low < self.best_price {
                        self.best_price = low;
                    }
                    if !self.trailing_armed && self.best_price <= activation_price {
                        self.trailing_armed = true;
                        debug!(id = %self.config.id, watermark = %self.best_price, "Trailing stop armed");
                    }
                    if self.trailing_armed {
                        let trail = self.best_price * (Decimal::ONE + ts.trailing_delta);
                        if high >= trail {
                            self.close_at(trail, candle.close_time, CloseReason::TrailingStop);
                            return Some(CloseReason::TrailingStop);
                        }
                    }
                }
            }
        }

        // Take profit
        let tp_price = self.config.take_profit_price();
        let tp_hit = match self.config.side {
            PositionSide::Buy => high >= tp_price,
            PositionSide::Sell => low <= tp_price,
        };
        if tp_hit {
            self.close_at(tp_price, candle.close_time, CloseReason::TakeProfit);
            return Some(CloseReason::TakeProfit);
        }

        // Time limit, evaluated at bar close
        let age = candle.close_time - self.config.timestamp;
        if age >= Duration::seconds(self.config.time_limit) {
            self.close_at(close, candle.close_time, CloseReason::TimeLimit);
            return Some(CloseReason::TimeLimit);
        }

        None
    }

    /// Force-close at the given price (end of data, manual stop).
    pub fn close_at_market(&mut self, price: Decimal, time: DateTime<Utc>) {
        if self.is_active() {
            self.close_at(price, time, CloseReason::EndOfData);
        }
    }

    fn close_at(&mut self, price: Decimal, time: DateTime<Utc>, reason: CloseReason) {
        self.status = ExecutorStatus::Closed;
        self.close_price = Some(price);
        self.close_timestamp = Some(time);
        self.close_reason = Some(reason);

        debug!(
            id = %self.config.id,
            side = %self.config.side.as_str(),
            entry = %self.config.entry_price,
            exit = %price,
            reason = %reason.as_str(),
            "Position closed"
        );
    }

    /// Unrealized pnl in quote currency at a given price, net of fees.
    pub fn pnl_quote(&self, price: Decimal) -> Decimal {
        let diff = match self.config.side {
            PositionSide::Buy => price - self.config.entry_price,
            PositionSide::Sell => self.config.entry_price - price,
        };
        diff * self.config.amount - self.fees_at(price)
    }

    /// Return on margin (leveraged), as a fraction.
    pub fn pnl_pct(&self, price: Decimal) -> Decimal {
        let margin = self.config.margin();
        if margin.is_zero() {
            return Decimal::ZERO;
        }
        self.pnl_quote(price) / margin
    }

    fn fees_at(&self, exit_price: Decimal) -> Decimal {
        let entry_fee = self.config.notional() * self.fee_rate;
        let exit_fee = self.config.amount * exit_price * self.fee_rate;
        entry_fee + exit_fee
    }

    /// The realized outcome, once closed.
    pub fn closed_position(&self) -> Option<ClosedPosition> {
        let exit_price = self.close_price?;
        let exit_time = self.close_timestamp?;
        let close_reason = self.close_reason?;

        Some(ClosedPosition {
            id: self.config.id.clone(),
            trading_pair: self.config.trading_pair.clone(),
            side: self.config.side,
            amount: self.config.amount,
            entry_price: self.config.entry_price,
            exit_price,
            entry_time: self.config.timestamp,
            exit_time,
            close_reason,
            leverage: self.config.leverage,
            pnl_quote: self.pnl_quote(exit_price),
            pnl_pct: self.pnl_pct(exit_price),
            fee_quote: self.fees_at(exit_price),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderType, TrailingStop};
    use rust_decimal_macros::dec;

    fn make_config(side: PositionSide, entry: Decimal) -> PositionConfig {
        PositionConfig {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            trading_pair: "ETH-USDT".to_string(),
            exchange: "binance_perpetual".to_string(),
            side,
            amount: dec!(1),
            entry_price: entry,
            take_profit: dec!(0.02),
            stop_loss: dec!(0.01),
            time_limit: 3600 * 4,
            trailing_stop: None,
            open_order_type: OrderType::Limit,
            take_profit_order_type: OrderType::Limit,
            leverage: 10,
        }
    }

    fn make_candle(config: &PositionConfig, low: f64, high: f64, close: f64, hours: i64) -> Candle {
        let open_time = config.timestamp + Duration::hours(hours);
        Candle {
            open: close,
            high,
            low,
            close,
            volume: 10.0,
            open_time,
            close_time: open_time + Duration::hours(1),
        }
    }

    #[test]
    fn test_take_profit_long() {
        let config = make_config(PositionSide::Buy, dec!(2000));
        let mut executor = PositionExecutor::new(config, Decimal::ZERO);

        // TP at 2040: candle reaches 2050
        let candle = make_candle(&executor.config, 2010.0, 2050.0, 2030.0, 0);
        let reason = executor.update(&candle);

        assert_eq!(reason, Some(CloseReason::TakeProfit));
        let closed = executor.closed_position().unwrap();
        assert_eq!(closed.exit_price, dec!(2040));
        assert_eq!(closed.pnl_quote, dec!(40));
        // 40 on 200 margin = 20%
        assert_eq!(closed.pnl_pct, dec!(0.2));
    }

    #[test]
    fn test_stop_loss_wins_ambiguous_bar() {
        let config = make_config(PositionSide::Buy, dec!(2000));
        let mut executor = PositionExecutor::new(config, Decimal::ZERO);

        // Bar spans both SL (1980) and TP (2040): stop loss must win
        let candle = make_candle(&executor.config, 1970.0, 2050.0, 2000.0, 0);
        let reason = executor.update(&candle);

        assert_eq!(reason, Some(CloseReason::StopLoss));
        assert_eq!(executor.closed_position().unwrap().exit_price, dec!(1980));
    }

    #[test]
    fn test_stop_loss_short() {
        let config = make_config(PositionSide::Sell, dec!(2000));
        let mut executor = PositionExecutor::new(config, Decimal::ZERO);

        // Short SL at 2020
        let candle = make_candle(&executor.config, 2000.0, 2030.0, 2010.0, 0);
        let reason = executor.update(&candle);

        assert_eq!(reason, Some(CloseReason::StopLoss));
        let closed = executor.closed_position().unwrap();
        assert!(closed.pnl_quote < Decimal::ZERO);
    }

    #[test]
    fn test_time_limit_exit() {
        let config = make_config(PositionSide::Buy, dec!(2000));
        let mut executor = PositionExecutor::new(config, Decimal::ZERO);

        // Quiet candle 5 hours in: past the 4h time limit
        let candle = make_candle(&executor.config, 1995.0, 2005.0, 2001.0, 5);
        let reason = executor.update(&candle);

        assert_eq!(reason, Some(CloseReason::TimeLimit));
        assert_eq!(executor.closed_position().unwrap().exit_price, dec!(2001));
    }

    #[test]
    fn test_trailing_stop_arms_then_fires() {
        let mut config = make_config(PositionSide::Buy, dec!(2000));
        config.take_profit = dec!(0.10); // keep fixed TP out of the way
        config.trailing_stop = Some(TrailingStop {
            activation_price_delta: dec!(0.01),
            trailing_delta: dec!(0.005),
        });
        let mut executor = PositionExecutor::new(config, Decimal::ZERO);

        // Runs to 2060: arms trailing (activation 2020), watermark 2060.
        // Low stays above the 2049.7 trail so the bar does not fire it.
        let candle = make_candle(&executor.config, 2050.0, 2060.0, 2055.0, 0);
        assert_eq!(executor.update(&candle), None);

        // Retraces below 2060 * 0.995 = 2049.7
        let candle = make_candle(&executor.config, 2040.0, 2056.0, 2045.0, 1);
        let reason = executor.update(&candle);

        assert_eq!(reason, Some(CloseReason::TrailingStop));
        let closed = executor.closed_position().unwrap();
        assert_eq!(closed.exit_price, dec!(2060) * dec!(0.995));
        assert!(closed.pnl_quote > Decimal::ZERO);
    }

    #[test]
    fn test_fees_reduce_pnl() {
        let config = make_config(PositionSide::Buy, dec!(2000));
        let mut executor = PositionExecutor::new(config, dec!(0.0004));

        let candle = make_candle(&executor.config, 2010.0, 2050.0, 2030.0, 0);
        executor.update(&candle);

        let closed = executor.closed_position().unwrap();
        // 40 gross minus fees on 2000 entry + 2040 exit notionals
        let expected_fees = (dec!(2000) + dec!(2040)) * dec!(0.0004);
        assert_eq!(closed.fee_quote, expected_fees);
        assert_eq!(closed.pnl_quote, dec!(40) - expected_fees);
    }

    #[test]
    fn test_no_update_after_close() {
        let config = make_config(PositionSide::Buy, dec!(2000));
        let mut executor = PositionExecutor::new(config, Decimal::ZERO);

        let candle = make_candle(&executor.config, 2010.0, 2050.0, 2030.0, 0);
        assert!(executor.update(&candle).is_some());
        assert!(executor.update(&candle).is_none());
    }
}
