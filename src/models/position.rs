//! Position models: what the grid controller emits and what a finished
//! backtest position looks like.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::level::{OrderType, TrailingStop};

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Buy,
    Sell,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Buy => "BUY",
            PositionSide::Sell => "SELL",
        }
    }

    /// +1 for buys, -1 for sells.
    pub fn sign(&self) -> i8 {
        match self {
            PositionSide::Buy => 1,
            PositionSide::Sell => -1,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            PositionSide::Buy => PositionSide::Sell,
            PositionSide::Sell => PositionSide::Buy,
        }
    }
}

/// Fully-specified position proposal: entry, size and exit barriers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionConfig {
    /// Unique id (uuid v4)
    pub id: String,

    /// When the config was produced
    pub timestamp: DateTime<Utc>,

    pub trading_pair: String,
    pub exchange: String,
    pub side: PositionSide,

    /// Base-currency amount
    pub amount: Decimal,

    pub entry_price: Decimal,

    /// Take-profit distance as a fraction of entry price
    pub take_profit: Decimal,

    /// Stop-loss distance as a fraction of entry price
    pub stop_loss: Decimal,

    /// Maximum holding time in seconds
    pub time_limit: i64,

    pub trailing_stop: Option<TrailingStop>,

    pub open_order_type: OrderType,
    pub take_profit_order_type: OrderType,

    pub leverage: u32,
}

impl PositionConfig {
    /// Quote-currency notional at entry.
    pub fn notional(&self) -> Decimal {
        self.amount * self.entry_price
    }

    /// Margin locked for the position.
    pub fn margin(&self) -> Decimal {
        if self.leverage == 0 {
            return self.notional();
        }
        self.notional() / Decimal::from(self.leverage)
    }

    /// Price at which the take-profit barrier sits.
    pub fn take_profit_price(&self) -> Decimal {
        match self.side {
            PositionSide::Buy => self.entry_price * (Decimal::ONE + self.take_profit),
            PositionSide::Sell => self.entry_price * (Decimal::ONE - self.take_profit),
        }
    }

    /// Price at which the stop-loss barrier sits.
    pub fn stop_loss_price(&self) -> Decimal {
        match self.side {
            PositionSide::Buy => self.entry_price * (Decimal::ONE - self.stop_loss),
            PositionSide::Sell => self.entry_price * (Decimal::ONE + self.stop_loss),
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    TimeLimit,
    EndOfData,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::TakeProfit => "Take Profit",
            CloseReason::StopLoss => "Stop Loss",
            CloseReason::TrailingStop => "Trailing Stop",
            CloseReason::TimeLimit => "Time Limit",
            CloseReason::EndOfData => "End of Data",
        }
    }
}

/// A completed position with realized outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub id: String,
    pub trading_pair: String,
    pub side: PositionSide,
    pub amount: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub close_reason: CloseReason,
    pub leverage: u32,

    /// Realized pnl in quote currency, net of fees
    pub pnl_quote: Decimal,

    /// Realized return on margin (leveraged), as a fraction
    pub pnl_pct: Decimal,

    /// Total fees paid for entry and exit
    pub fee_quote: Decimal,
}

impl ClosedPosition {
    pub fn is_win(&self) -> bool {
        self.pnl_quote > Decimal::ZERO
    }

    pub fn holding_time(&self) -> chrono::Duration {
        self.exit_time - self.entry_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_config(side: PositionSide) -> PositionConfig {
        PositionConfig {
            id: "test".to_string(),
            timestamp: Utc::now(),
            trading_pair: "ETH-USDT".to_string(),
            exchange: "binance_perpetual".to_string(),
            side,
            amount: dec!(0.5),
            entry_price: dec!(2000),
            take_profit: dec!(0.02),
            stop_loss: dec!(0.01),
            time_limit: 3600,
            trailing_stop: None,
            open_order_type: OrderType::Limit,
            take_profit_order_type: OrderType::Limit,
            leverage: 20,
        }
    }

    #[test]
    fn test_barrier_prices_long() {
        let config = make_config(PositionSide::Buy);
        assert_eq!(config.take_profit_price(), dec!(2040));
        assert_eq!(config.stop_loss_price(), dec!(1980));
    }

    #[test]
    fn test_barrier_prices_short() {
        let config = make_config(PositionSide::Sell);
        assert_eq!(config.take_profit_price(), dec!(1960));
        assert_eq!(config.stop_loss_price(), dec!(2020));
    }

    #[test]
    fn test_margin_uses_leverage() {
        let config = make_config(PositionSide::Buy);
        // Notional 1000, leverage 20 -> margin 50
        assert_eq!(config.notional(), dec!(1000));
        assert_eq!(config.margin(), dec!(50));
    }
}
