pub mod binance;

pub use binance::BinanceClient;

use crate::models::{Candle, Timeframe};
use crate::Result;

/// Source of OHLCV bars
///
/// Failures are reported as `Error::DataUnavailable` so the caller can
/// skip the symbol for the current cycle.
#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Most recent `lookback` bars, oldest first
    async fn fetch(&self, symbol: &str, interval: Timeframe, lookback: usize) -> Result<Vec<Candle>>;
}
