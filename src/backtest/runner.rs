use crate::backtest::metrics::{EquitySample, PerformanceSummary};
use crate::backtest::resample::{closed_bars, resample};
use crate::config::BotConfig;
use crate::execution::{ClosedTrade, EngineEvent, TradingEngine};
use crate::models::{Candle, PriceTick, SignalSnapshot, Timeframe};
use crate::strategy::SignalProvider;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Outcome of one simulated configuration
#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub recheck_interval_minutes: u64,
    pub summary: PerformanceSummary,
    pub trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquitySample>,
    pub suppressed_decisions: usize,
    pub deferred_entries: usize,
}

/// All candidates of a sweep, in the order they were run
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub candidates: Vec<BacktestResult>,
    pub best_index: usize,
}

impl SweepReport {
    pub fn best(&self) -> Option<&BacktestResult> {
        self.candidates.get(self.best_index)
    }

    /// Print a comparison table of every candidate
    pub fn print_comparison(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════════════╗");
        println!("║                      RE-CHECK INTERVAL SWEEP                         ║");
        println!("╚══════════════════════════════════════════════════════════════════════╝\n");

        println!(
            "{:<10} {:>8} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "Interval", "Trades", "Win Rate", "Return", "Max DD", "Sharpe", "PF"
        );
        println!("{}", "─".repeat(74));

        for (i, result) in self.candidates.iter().enumerate() {
            let s = &result.summary;
            let marker = if i == self.best_index { " ⭐" } else { "" };
            println!(
                "{:<10} {:>8} {:>9.1}% {:>9.2}% {:>9.2}% {:>10.2} {:>10.2}{}",
                format!("{}m", result.recheck_interval_minutes),
                s.total_trades,
                s.win_rate,
                s.total_return_pct,
                s.max_drawdown_pct,
                s.sharpe_ratio,
                s.profit_factor,
                marker
            );
        }

        if let Some(best) = self.best() {
            println!(
                "\n🏆 Best interval: {}m ({:+.2}%)",
                best.recheck_interval_minutes, best.summary.total_return_pct
            );
        }
    }
}

/// Replays one symbol's base-interval candles through the trading engine
pub struct BacktestRunner<P: SignalProvider> {
    config: BotConfig,
    provider: P,
}

impl<P: SignalProvider> BacktestRunner<P> {
    pub fn new(config: BotConfig, provider: P) -> Self {
        Self { config, provider }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Run the full pipeline once
    ///
    /// # Arguments
    /// * `candles` - Base-interval candles, oldest first
    /// * `recheck_minutes` - Signals are re-evaluated on bars whose open time is a multiple of this
    pub fn run(&self, symbol: &str, candles: &[Candle], recheck_minutes: u64) -> Result<BacktestResult> {
        let base = self.config.backtest.base_interval;
        let min_bars = self.provider.min_candles_required();

        if candles.is_empty() {
            return Err(Error::data_unavailable(symbol, "no candles to replay"));
        }
        if recheck_minutes == 0 {
            return Err(Error::Config("re-check interval must be positive".to_string()));
        }
        if candles.windows(2).any(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(Error::data_unavailable(symbol, "candles are not in time order"));
        }

        let timeframes = self.config.timeframes;
        let series: Vec<(Timeframe, Vec<Candle>)> = timeframes
            .all()
            .into_iter()
            .map(|tf| (tf, resample(candles, base, tf)))
            .collect();

        tracing::info!(
            "Starting backtest for {}: {} {} candles, re-check every {}m",
            symbol,
            candles.len(),
            base,
            recheck_minutes
        );

        let mut engine = TradingEngine::new(&self.config);
        let mut suppressed = 0;
        let mut deferred = 0;
        let mut last_time = candles[0].timestamp;

        for candle in candles {
            // Decisions are taken at the close of the bar
            let now = candle.timestamp + base.duration();
            last_time = now;

            let snapshot = if Self::is_recheck_bar(candle.timestamp, recheck_minutes) {
                self.snapshot_at(symbol, &series, now, min_bars)
            } else {
                None
            };

            let tick = PriceTick::Bar(candle.clone());
            for event in engine.process(symbol, snapshot, &tick, now) {
                match event {
                    EngineEvent::DecisionSuppressed { .. } => suppressed += 1,
                    EngineEvent::EntryDeferred(_) => deferred += 1,
                    _ => {}
                }
            }

            engine.record_equity(now);
        }

        let final_prices = HashMap::from([(
            symbol.to_string(),
            candles[candles.len() - 1].close,
        )]);
        let forced = engine.force_close_all(&final_prices, last_time);
        if !forced.is_empty() {
            tracing::debug!("Force closed {} positions at end of replay", forced.len());
        }
        engine.record_equity(last_time);

        let summary = engine.summary();

        tracing::info!(
            "Backtest {} @ {}m: {} trades, {:+.2}% return",
            symbol,
            recheck_minutes,
            summary.total_trades,
            summary.total_return_pct
        );

        Ok(BacktestResult {
            symbol: symbol.to_string(),
            recheck_interval_minutes: recheck_minutes,
            summary,
            trades: engine.stats().trades().to_vec(),
            equity_curve: engine.stats().equity_curve().to_vec(),
            suppressed_decisions: suppressed,
            deferred_entries: deferred,
        })
    }

    /// Run once per candidate interval and pick the highest total return
    ///
    /// Ties keep the earliest candidate.
    pub fn sweep(&self, symbol: &str, candles: &[Candle], intervals: &[u64]) -> Result<SweepReport> {
        if intervals.is_empty() {
            return Err(Error::Config("no re-check intervals to sweep".to_string()));
        }

        let mut candidates = Vec::with_capacity(intervals.len());
        for &interval in intervals {
            candidates.push(self.run(symbol, candles, interval)?);
        }

        let mut best_index = 0;
        for (i, candidate) in candidates.iter().enumerate().skip(1) {
            if candidate.summary.total_return_pct > candidates[best_index].summary.total_return_pct {
                best_index = i;
            }
        }

        Ok(SweepReport {
            candidates,
            best_index,
        })
    }

    fn is_recheck_bar(open_time: DateTime<Utc>, recheck_minutes: u64) -> bool {
        let minutes = open_time.timestamp().div_euclid(60);
        minutes.rem_euclid(recheck_minutes as i64) == 0
    }

    /// Votes from the bars closed by `now`, or None while any timeframe is still warming up
    fn snapshot_at(
        &self,
        symbol: &str,
        series: &[(Timeframe, Vec<Candle>)],
        now: DateTime<Utc>,
        min_bars: usize,
    ) -> Option<SignalSnapshot> {
        let mut votes = Vec::with_capacity(series.len());

        for (timeframe, bars) in series {
            let visible = closed_bars(bars, *timeframe, now);
            if visible.len() < min_bars {
                return None;
            }

            let window = &visible[visible.len().saturating_sub(self.config.lookback_bars)..];
            match self.provider.vote(symbol, window, *timeframe) {
                Ok(vote) => votes.push(vote),
                Err(e) => {
                    tracing::debug!("Skipping {} {} at {}: {}", symbol, timeframe, now, e);
                    return None;
                }
            }
        }

        match votes.as_slice() {
            [short, mid, long] => Some(SignalSnapshot::new(&self.config.timeframes, *short, *mid, *long)),
            _ => None,
        }
    }
}
