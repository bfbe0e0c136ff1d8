//! Exchange API client for historical candle data.

mod candle_client;
mod types;

pub use candle_client::CandleClient;
pub use types::RawKline;
