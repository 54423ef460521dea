// Signal generation: per-timeframe votes and their aggregation
pub mod aggregator;
pub mod signals;

use crate::models::{Candle, Timeframe, Vote};
use crate::Result;

pub use aggregator::SignalAggregator;
pub use signals::{IndicatorConfig, IndicatorVoteProvider};

/// Turns a bar series into a directional vote for one timeframe
///
/// Implementations must be deterministic for the same series and must
/// resolve a neutral reading to BUY or SELL before returning.
pub trait SignalProvider: Send + Sync {
    fn vote(&self, symbol: &str, candles: &[Candle], timeframe: Timeframe) -> Result<Vote>;

    /// Minimum bars required for a vote
    fn min_candles_required(&self) -> usize;

    fn name(&self) -> &str;
}
