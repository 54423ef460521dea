use crate::api::MarketDataProvider;
use crate::backtest::PerformanceSummary;
use crate::config::BotConfig;
use crate::execution::{EngineEvent, TradingEngine};
use crate::models::{PriceTick, SignalSnapshot, Timeframes};
use crate::notify::{format_event, Notifier};
use crate::persistence::{StateSnapshot, StateStore};
use crate::strategy::SignalProvider;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio::time::Duration;

/// Votes and last price gathered for one symbol
#[derive(Debug, Clone)]
pub struct SymbolObservation {
    pub symbol: String,
    pub snapshot: SignalSnapshot,
    pub price: Decimal,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub observed: usize,
    pub skipped: usize,
    pub events: usize,
    pub equity: Decimal,
}

// ============================================================================
// Per-symbol work
// ============================================================================

/// Fetch the three timeframes concurrently and vote on each
pub async fn observe_symbol(
    market: Arc<dyn MarketDataProvider>,
    provider: Arc<dyn SignalProvider>,
    symbol: String,
    timeframes: Timeframes,
    lookback: usize,
) -> Result<SymbolObservation> {
    let (short, mid, long) = tokio::try_join!(
        market.fetch(&symbol, timeframes.short, lookback),
        market.fetch(&symbol, timeframes.mid, lookback),
        market.fetch(&symbol, timeframes.long, lookback),
    )?;

    let price = short
        .last()
        .map(|c| c.close)
        .ok_or_else(|| Error::data_unavailable(&symbol, "no short timeframe bars"))?;

    let snapshot = SignalSnapshot::new(
        &timeframes,
        provider.vote(&symbol, &short, timeframes.short)?,
        provider.vote(&symbol, &mid, timeframes.mid)?,
        provider.vote(&symbol, &long, timeframes.long)?,
    );

    tracing::debug!("{} @ {}: {}", symbol, price, snapshot);

    Ok(SymbolObservation {
        symbol,
        snapshot,
        price,
    })
}

// ============================================================================
// Shutdown signal
// ============================================================================

/// Listen for a shutdown signal on a background task
///
/// The listener is registered immediately, so a signal that arrives before
/// the monitor loop first polls the receiver is still delivered. A failed
/// listener drops the sender.
pub fn spawn_shutdown_listener<F>(signal: F) -> oneshot::Receiver<()>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                let _ = tx.send(());
            }
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    rx
}

/// Resolves once the listener fired; never resolves if it failed
pub async fn wait_for_shutdown(rx: oneshot::Receiver<()>) {
    if rx.await.is_err() {
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Live monitor
// ============================================================================

/// Polls the market on a fixed interval and drives the trading engine
pub struct LiveMonitor {
    config: BotConfig,
    engine: TradingEngine,
    market: Arc<dyn MarketDataProvider>,
    provider: Arc<dyn SignalProvider>,
    notifier: Arc<dyn Notifier>,
    store: Box<dyn StateStore>,
    cycle: u64,
    last_prices: HashMap<String, Decimal>,
}

impl LiveMonitor {
    pub fn new(
        config: BotConfig,
        market: Arc<dyn MarketDataProvider>,
        provider: Arc<dyn SignalProvider>,
        notifier: Arc<dyn Notifier>,
        store: Box<dyn StateStore>,
    ) -> Self {
        let engine = TradingEngine::new(&config);
        Self {
            config,
            engine,
            market,
            provider,
            notifier,
            store,
            cycle: 0,
            last_prices: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &TradingEngine {
        &self.engine
    }

    /// Restore open positions, waiting entries and history from the store
    ///
    /// A missing snapshot starts fresh; an unreadable one is logged and ignored.
    pub async fn restore(&mut self) -> Result<()> {
        let snapshot = match self.store.load().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                tracing::info!("No previous state found, starting fresh");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("⚠️  Could not read previous state: {}", e);
                return Ok(());
            }
        };

        let trades = snapshot
            .successful_signals
            .trades
            .into_iter()
            .chain(snapshot.failed_signals.trades)
            .collect();

        self.engine
            .restore(
                snapshot.balance,
                snapshot.active_signals.positions,
                snapshot.waiting_entries.entries,
                trades,
            )
            .map_err(|e| Error::Config(format!("inconsistent saved state: {}", e)))?;

        tracing::info!(
            "♻️  Restored state from {}: {} open, {} waiting",
            snapshot.generated_at,
            self.engine.positions().open_count(),
            self.engine.waiting().len()
        );

        Ok(())
    }

    /// Run one evaluation cycle at `now`
    ///
    /// Symbols are observed concurrently; engine updates are applied one
    /// symbol at a time after every task has finished.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport> {
        self.cycle += 1;

        let mut tasks = JoinSet::new();
        for symbol in &self.config.symbols {
            let market = self.market.clone();
            let provider = self.provider.clone();
            let symbol = symbol.clone();
            let timeframes = self.config.timeframes;
            let lookback = self.config.lookback_bars;

            tasks.spawn(async move {
                let result =
                    observe_symbol(market, provider, symbol.clone(), timeframes, lookback).await;
                (symbol, result)
            });
        }

        let mut observations = Vec::with_capacity(self.config.symbols.len());
        let mut skipped = 0;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(observation))) => observations.push(observation),
                Ok((symbol, Err(e))) => {
                    if e.is_symbol_local() {
                        tracing::warn!("Skipping {} this cycle: {}", symbol, e);
                    } else {
                        tracing::error!("Unexpected failure for {}: {}", symbol, e);
                    }
                    skipped += 1;
                }
                Err(e) => {
                    tracing::error!("Symbol task failed: {}", e);
                    skipped += 1;
                }
            }
        }

        if observations.is_empty() {
            return Err(Error::TransientIo(format!(
                "none of {} symbols could be observed",
                self.config.symbols.len()
            )));
        }

        observations.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        let mut event_count = 0;
        for observation in observations.iter() {
            self.last_prices
                .insert(observation.symbol.clone(), observation.price);

            let events = self.engine.process(
                &observation.symbol,
                Some(observation.snapshot.clone()),
                &PriceTick::Last(observation.price),
                now,
            );
            event_count += events.len();
            self.notify(&events).await;
        }

        let sample = self.engine.record_equity(now);

        if self.cycle % self.config.snapshot_every_cycles == 0 {
            self.persist(now).await;
        }

        Ok(CycleReport {
            cycle: self.cycle,
            observed: observations.len(),
            skipped,
            events: event_count,
            equity: sample.equity,
        })
    }

    /// Loop until `shutdown` resolves, then flush state
    ///
    /// Shutdown is only observed between cycles, so a cycle in progress
    /// always completes.
    pub async fn run<F>(mut self, shutdown: F) -> PerformanceSummary
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let interval = Duration::from_secs(self.config.evaluation_interval_secs);
        let backoff = Duration::from_secs(self.config.error_backoff_secs);

        tracing::info!(
            "🚀 Monitoring {} symbols every {}s ({}/{}/{})",
            self.config.symbols.len(),
            interval.as_secs(),
            self.config.timeframes.short,
            self.config.timeframes.mid,
            self.config.timeframes.long
        );

        loop {
            let wait = match self.run_cycle(Utc::now()).await {
                Ok(report) => {
                    tracing::info!(
                        "Cycle {}: {} observed, {} skipped, {} events, equity {}",
                        report.cycle,
                        report.observed,
                        report.skipped,
                        report.events,
                        report.equity.round_dp(2)
                    );
                    interval
                }
                Err(e) => {
                    tracing::error!("❌ Cycle {} failed: {}. Retrying in {}s", self.cycle, e, backoff.as_secs());
                    backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = &mut shutdown => {
                    tracing::info!("⚠️  Shutdown requested");
                    break;
                }
            }
        }

        self.shutdown(Utc::now()).await
    }

    /// Force-close if configured, record final equity and write the last snapshot
    pub async fn shutdown(&mut self, now: DateTime<Utc>) -> PerformanceSummary {
        if self.config.close_positions_on_shutdown {
            let events = self.engine.force_close_all(&self.last_prices, now);
            if !events.is_empty() {
                tracing::info!("Force closed {} positions", events.len());
            }
            self.notify(&events).await;
        }

        self.engine.record_equity(now);
        self.persist(now).await;

        let summary = self.engine.summary();
        tracing::info!(
            "👋 Stopped after {} cycles: {} trades, win rate {:.1}%, return {:+.2}%, max drawdown {:.2}%",
            self.cycle,
            summary.total_trades,
            summary.win_rate,
            summary.total_return_pct,
            summary.max_drawdown_pct
        );

        summary
    }

    async fn notify(&self, events: &[EngineEvent]) {
        for event in events {
            let Some(message) = format_event(event, self.config.price_precision) else {
                continue;
            };
            if let Err(e) = self.notifier.send(&message).await {
                tracing::warn!("Failed to send {} notification for {}: {}", self.notifier.name(), event.symbol(), e);
            }
        }
    }

    async fn persist(&self, now: DateTime<Utc>) {
        let snapshot = StateSnapshot::capture(&self.engine, now);
        if let Err(e) = self.store.save(&snapshot).await {
            tracing::warn!("Failed to save state snapshot: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Candle, Timeframe, Vote};
    use crate::persistence::JsonStateStore;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    /// Serves a fixed closing price per symbol; unknown symbols fail
    struct StaticMarket {
        prices: Mutex<HashMap<String, Decimal>>,
    }

    impl StaticMarket {
        fn set(&self, symbol: &str, price: Decimal) {
            if let Ok(mut prices) = self.prices.lock() {
                prices.insert(symbol.to_string(), price);
            }
        }
    }

    #[async_trait::async_trait]
    impl MarketDataProvider for StaticMarket {
        async fn fetch(&self, symbol: &str, _interval: Timeframe, lookback: usize) -> Result<Vec<Candle>> {
            let price = self
                .prices
                .lock()
                .ok()
                .and_then(|p| p.get(symbol).copied())
                .ok_or_else(|| Error::data_unavailable(symbol, "exchange unreachable"))?;

            Ok((0..lookback.min(3))
                .map(|i| Candle {
                    symbol: symbol.to_string(),
                    timestamp: Utc::now() - chrono::Duration::minutes(i as i64),
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    volume: dec!(1),
                })
                .collect())
        }
    }

    /// Votes from a shared switch, the same on every timeframe
    struct SwitchProvider {
        vote: Mutex<Vote>,
    }

    impl SignalProvider for SwitchProvider {
        fn vote(&self, _symbol: &str, _candles: &[Candle], _timeframe: Timeframe) -> Result<Vote> {
            Ok(self.vote.lock().map(|v| *v).unwrap_or(Vote::Buy))
        }

        fn min_candles_required(&self) -> usize {
            1
        }

        fn name(&self) -> &str {
            "switch"
        }
    }

    struct FailingNotifier;

    #[async_trait::async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _message: &str) -> Result<()> {
            Err(Error::TransientIo("chat unavailable".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn setup(symbols: &[&str]) -> (LiveMonitor, Arc<StaticMarket>, Arc<SwitchProvider>, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("signalbot-monitor-{}.json", uuid::Uuid::new_v4()));
        let config = BotConfig {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            commission_rate: Decimal::ZERO,
            ..BotConfig::default()
        };
        let market = Arc::new(StaticMarket {
            prices: Mutex::new(HashMap::new()),
        });
        let provider = Arc::new(SwitchProvider {
            vote: Mutex::new(Vote::Sell),
        });

        let monitor = LiveMonitor::new(
            config,
            market.clone(),
            provider.clone(),
            Arc::new(FailingNotifier),
            Box::new(JsonStateStore::new(&path)),
        );
        (monitor, market, provider, path)
    }

    #[tokio::test]
    async fn test_cycle_skips_unavailable_symbol() {
        let (mut monitor, market, provider, path) = setup(&["BTCUSDT", "ETHUSDT"]);
        market.set("BTCUSDT", dec!(100));
        let t0 = Utc::now();

        let report = monitor.run_cycle(t0).await.unwrap();
        assert_eq!(report.observed, 1);
        assert_eq!(report.skipped, 1);

        // Flip to full BUY agreement; notifier failures must not block the open
        if let Ok(mut v) = provider.vote.lock() {
            *v = Vote::Buy;
        }
        let report = monitor
            .run_cycle(t0 + chrono::Duration::minutes(1))
            .await
            .unwrap();

        assert_eq!(report.events, 1);
        assert!(monitor.engine().positions().has_open_position("BTCUSDT"));
        assert!(path.exists());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_cycle_fails_when_no_symbol_observed() {
        let (mut monitor, _market, _provider, _path) = setup(&["BTCUSDT"]);

        let err = monitor.run_cycle(Utc::now()).await.unwrap_err();
        assert!(matches!(err, Error::TransientIo(_)));
    }

    #[tokio::test]
    async fn test_shutdown_force_closes_and_persists() {
        let (mut monitor, market, provider, path) = setup(&["BTCUSDT"]);
        market.set("BTCUSDT", dec!(100));
        let t0 = Utc::now();

        monitor.run_cycle(t0).await.unwrap();
        if let Ok(mut v) = provider.vote.lock() {
            *v = Vote::Buy;
        }
        monitor.run_cycle(t0 + chrono::Duration::minutes(1)).await.unwrap();
        market.set("BTCUSDT", dec!(101));
        monitor.run_cycle(t0 + chrono::Duration::minutes(2)).await.unwrap();

        let summary = monitor.shutdown(t0 + chrono::Duration::minutes(3)).await;

        assert_eq!(summary.total_trades, 1);
        assert_eq!(summary.forced_exits, 1);
        assert_eq!(monitor.engine().positions().open_count(), 0);

        let saved = JsonStateStore::new(&path).load().await.unwrap().unwrap();
        assert_eq!(saved.active_signals.count, 0);
        assert_eq!(saved.successful_signals.count, 1);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_early_shutdown_signal_is_not_lost() {
        let rx = spawn_shutdown_listener(async { Ok(()) });

        // Signal fires while startup work is still running
        tokio::time::sleep(Duration::from_millis(20)).await;

        let waited = tokio::time::timeout(Duration::from_secs(1), wait_for_shutdown(rx)).await;
        assert!(waited.is_ok());
    }

    #[tokio::test]
    async fn test_failed_listener_never_requests_shutdown() {
        let rx = spawn_shutdown_listener(async {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no signal handler"))
        });

        let waited = tokio::time::timeout(Duration::from_millis(50), wait_for_shutdown(rx)).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_run_stops_after_first_cycle_on_early_signal() {
        let (monitor, market, _provider, path) = setup(&["BTCUSDT"]);
        market.set("BTCUSDT", dec!(100));
        let rx = spawn_shutdown_listener(async { Ok(()) });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let summary = tokio::time::timeout(Duration::from_secs(5), monitor.run(wait_for_shutdown(rx)))
            .await
            .unwrap();

        assert_eq!(summary.total_trades, 0);
        // Shutdown flushed the snapshot
        assert!(path.exists());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_restore_from_saved_state() {
        let (mut monitor, market, provider, path) = setup(&["BTCUSDT"]);
        market.set("BTCUSDT", dec!(100));
        let t0 = Utc::now();
        monitor.run_cycle(t0).await.unwrap();
        if let Ok(mut v) = provider.vote.lock() {
            *v = Vote::Buy;
        }
        monitor.run_cycle(t0 + chrono::Duration::minutes(1)).await.unwrap();

        let config = BotConfig {
            symbols: vec!["BTCUSDT".to_string()],
            ..BotConfig::default()
        };
        let mut restarted = LiveMonitor::new(
            config,
            market.clone(),
            provider.clone(),
            Arc::new(FailingNotifier),
            Box::new(JsonStateStore::new(&path)),
        );
        restarted.restore().await.unwrap();

        assert!(restarted.engine().positions().has_open_position("BTCUSDT"));
        assert_eq!(restarted.engine().positions().balance(), dec!(10000));

        let _ = std::fs::remove_file(&path);
    }
}
