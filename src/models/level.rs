//! Grid order levels and triple-barrier parameters.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::position::PositionSide;

/// Order type used when opening or closing a barrier leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
        }
    }
}

/// Trailing stop parameters: armed once price moves `activation_price_delta`
/// in favor, then trails at `trailing_delta`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrailingStop {
    pub activation_price_delta: Decimal,
    pub trailing_delta: Decimal,
}

/// Exit barriers attached to a grid level: price barriers, a time barrier
/// and an optional trailing stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripleBarrier {
    /// Stop-loss distance as a fraction of entry price
    pub stop_loss: Decimal,

    /// Take-profit distance as a multiple of the controller's spread
    /// multiplier at entry (volatility-scaled)
    pub take_profit: Decimal,

    /// Maximum holding time in seconds
    pub time_limit: i64,

    /// Order type for the entry order
    pub open_order_type: OrderType,

    /// Order type for the take-profit leg
    pub take_profit_order_type: OrderType,

    pub trailing_stop: Option<TrailingStop>,
}

impl Default for TripleBarrier {
    fn default() -> Self {
        Self {
            stop_loss: dec!(0.03),
            take_profit: dec!(2),
            time_limit: 60 * 60 * 6,
            open_order_type: OrderType::Limit,
            take_profit_order_type: OrderType::Limit,
            trailing_stop: None,
        }
    }
}

/// One level of the quoting grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLevel {
    /// Level number within its side (1 = closest to mid)
    pub level_id: u32,

    pub side: PositionSide,

    /// Quote-currency amount committed to this level
    pub order_amount_quote: Decimal,

    /// Spread step multiplied by the controller's spread multiplier
    pub spread_factor: Decimal,

    /// Seconds an unfilled order lives before it is re-priced
    pub order_refresh_time: i64,

    /// Seconds the level stays quiet after its position closes
    pub cooldown_time: i64,

    pub triple_barrier: TripleBarrier,
}

impl OrderLevel {
    pub fn new(level_id: u32, side: PositionSide, order_amount_quote: Decimal) -> Self {
        Self {
            level_id,
            side,
            order_amount_quote,
            spread_factor: Decimal::from(level_id),
            order_refresh_time: 60 * 5,
            cooldown_time: 60 * 5,
            triple_barrier: TripleBarrier::default(),
        }
    }

    /// Display tag, e.g. "BUY_1".
    pub fn tag(&self) -> String {
        format!("{}_{}", self.side.as_str(), self.level_id)
    }
}

/// Symmetric grid: `levels_per_side` buy levels and sell levels with equal
/// amounts and spread factors 1..=n.
pub fn symmetric_grid(levels_per_side: u32, order_amount_quote: Decimal) -> Vec<OrderLevel> {
    let mut levels = Vec::with_capacity(levels_per_side as usize * 2);
    for id in 1..=levels_per_side {
        levels.push(OrderLevel::new(id, PositionSide::Buy, order_amount_quote));
        levels.push(OrderLevel::new(id, PositionSide::Sell, order_amount_quote));
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_grid_shape() {
        let levels = symmetric_grid(3, dec!(50));

        assert_eq!(levels.len(), 6);
        let buys = levels
            .iter()
            .filter(|l| l.side == PositionSide::Buy)
            .count();
        assert_eq!(buys, 3);

        // Spread factor steps with the level id
        let far_buy = levels
            .iter()
            .find(|l| l.side == PositionSide::Buy && l.level_id == 3)
            .unwrap();
        assert_eq!(far_buy.spread_factor, dec!(3));
        assert_eq!(far_buy.tag(), "BUY_3");
    }
}
