use crate::backtest::resample::bucket_start;
use crate::models::{Candle, Timeframe};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Steady uptrend with noise (+2% daily average)
    Uptrend,
    /// Steady downtrend with noise (-2% daily average)
    Downtrend,
    /// Mean-reverting chop around the start price
    Sideways,
    /// Large swings in both directions
    Volatile,
    /// Uptrend for the first half, downtrend for the second
    Reversal,
}

impl FromStr for MarketScenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uptrend" => Ok(MarketScenario::Uptrend),
            "downtrend" => Ok(MarketScenario::Downtrend),
            "sideways" => Ok(MarketScenario::Sideways),
            "volatile" => Ok(MarketScenario::Volatile),
            "reversal" => Ok(MarketScenario::Reversal),
            other => Err(format!("unknown scenario '{}'", other)),
        }
    }
}

/// Generates synthetic OHLC data for offline simulation
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 150.0,
            base_volume: 1_000.0,
        }
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    /// Generate candles for a market scenario
    ///
    /// # Arguments
    /// * `start` - First open time; aligned down to the interval boundary
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        symbol: &str,
        num_candles: usize,
        interval: Timeframe,
        start: DateTime<Utc>,
    ) -> Vec<Candle> {
        let start = bucket_start(start, interval);
        let bars_per_day = 24.0 * 60.0 / interval.minutes() as f64;
        let trend = 0.02 / bars_per_day;

        let mut candles = Vec::with_capacity(num_candles);
        let mut price = self.base_price;

        for i in 0..num_candles {
            let open = price;

            let change = match scenario {
                MarketScenario::Uptrend => trend + self.rng.gen_range(-0.002..0.002),
                MarketScenario::Downtrend => -trend + self.rng.gen_range(-0.002..0.002),
                MarketScenario::Sideways => {
                    let reversion = (self.base_price - price) / price * 0.05;
                    reversion + self.rng.gen_range(-0.004..0.004)
                }
                MarketScenario::Volatile => self.rng.gen_range(-0.015..0.015),
                MarketScenario::Reversal => {
                    let drift = if i < num_candles / 2 { trend } else { -trend };
                    drift * 3.0 + self.rng.gen_range(-0.003..0.003)
                }
            };

            // Keep prices strictly positive
            price = (price * (1.0 + change)).max(self.base_price * 0.05);

            let timestamp = start + interval.duration() * i as i32;
            candles.push(self.create_candle(symbol, open, price, timestamp));
        }

        candles
    }

    /// Build an OHLC bar whose wicks extend past open and close
    fn create_candle(
        &mut self,
        symbol: &str,
        open: f64,
        close: f64,
        timestamp: DateTime<Utc>,
    ) -> Candle {
        let wick_pct = 0.002;
        let high = open.max(close) * (1.0 + self.rng.gen_range(0.0..wick_pct));
        let low = open.min(close) * (1.0 - self.rng.gen_range(0.0..wick_pct));
        let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

        Candle {
            symbol: symbol.to_string(),
            timestamp,
            open: to_price(open),
            high: to_price(high),
            low: to_price(low),
            close: to_price(close),
            volume: to_price(volume),
        }
    }
}

fn to_price(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default().round_dp(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 7, 0).unwrap()
    }

    fn generate(scenario: MarketScenario, n: usize) -> Vec<Candle> {
        SyntheticDataGenerator::new(42).generate(scenario, "SYNTH", n, Timeframe::M15, start())
    }

    #[test]
    fn test_generate_uptrend() {
        let candles = generate(MarketScenario::Uptrend, 2000);
        assert_eq!(candles.len(), 2000);

        let first = candles.first().unwrap().close;
        let last = candles.last().unwrap().close;
        assert!(last > first, "Uptrend should end higher: {} -> {}", first, last);
    }

    #[test]
    fn test_generate_downtrend() {
        let candles = generate(MarketScenario::Downtrend, 2000);

        let first = candles.first().unwrap().close;
        let last = candles.last().unwrap().close;
        assert!(last < first, "Downtrend should end lower: {} -> {}", first, last);
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        assert_eq!(generate(MarketScenario::Volatile, 200), generate(MarketScenario::Volatile, 200));
    }

    #[test]
    fn test_timestamps_aligned_and_sequential() {
        let candles = generate(MarketScenario::Sideways, 100);

        assert_eq!(
            candles[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        for pair in candles.windows(2) {
            assert_eq!(pair[1].timestamp - pair[0].timestamp, Timeframe::M15.duration());
        }
    }

    #[test]
    fn test_ohlc_consistency() {
        for candle in generate(MarketScenario::Reversal, 500) {
            assert!(candle.high >= candle.close, "High should be >= close");
            assert!(candle.high >= candle.open, "High should be >= open");
            assert!(candle.low <= candle.close, "Low should be <= close");
            assert!(candle.low <= candle.open, "Low should be <= open");
            assert!(candle.low > Decimal::ZERO);
        }
    }

    #[test]
    fn test_custom_base_price() {
        let candles = SyntheticDataGenerator::new(1)
            .with_base_price(2500.0)
            .generate(MarketScenario::Sideways, "ETHUSDT", 50, Timeframe::M15, start());

        assert_eq!(candles[0].open, Decimal::from(2500));
        assert!(candles.iter().all(|c| c.close > Decimal::from(2000)));
    }

    #[test]
    fn test_parse_scenario() {
        assert_eq!("Reversal".parse::<MarketScenario>(), Ok(MarketScenario::Reversal));
        assert!("crash".parse::<MarketScenario>().is_err());
    }
}
