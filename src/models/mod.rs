//! Data models for candles, grid levels and positions.

mod candle;
mod level;
mod position;

pub use candle::{Candle, CandleSeries};
pub use level::{symmetric_grid, OrderLevel, OrderType, TrailingStop, TripleBarrier};
pub use position::{ClosedPosition, CloseReason, PositionConfig, PositionSide};
