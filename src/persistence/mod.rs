use crate::execution::{ClosedTrade, Position, TradingEngine, WaitingEntry};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSignals {
    pub count: usize,
    pub total_notional: Decimal,
    pub positions: Vec<Position>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitingEntries {
    pub count: usize,
    pub entries: Vec<WaitingEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeGroup {
    pub count: usize,
    pub total_pnl: Decimal,
    pub trades: Vec<ClosedTrade>,
}

impl TradeGroup {
    fn from_trades(trades: Vec<ClosedTrade>) -> Self {
        Self {
            count: trades.len(),
            total_pnl: trades.iter().map(|t| t.pnl).sum(),
            trades,
        }
    }
}

/// Point-in-time view of the engine for external inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub generated_at: DateTime<Utc>,
    pub balance: Decimal,
    pub active_signals: ActiveSignals,
    pub waiting_entries: WaitingEntries,
    pub successful_signals: TradeGroup,
    pub failed_signals: TradeGroup,
}

impl StateSnapshot {
    pub fn capture(engine: &TradingEngine, now: DateTime<Utc>) -> Self {
        let positions: Vec<Position> = engine
            .positions()
            .open_positions()
            .into_iter()
            .cloned()
            .collect();
        let entries: Vec<WaitingEntry> = engine.waiting().entries().into_iter().cloned().collect();

        let (wins, losses): (Vec<ClosedTrade>, Vec<ClosedTrade>) = engine
            .stats()
            .trades()
            .iter()
            .cloned()
            .partition(|t| t.is_win());

        Self {
            generated_at: now,
            balance: engine.positions().balance(),
            active_signals: ActiveSignals {
                count: positions.len(),
                total_notional: positions.iter().map(|p| p.notional).sum(),
                positions,
            },
            waiting_entries: WaitingEntries {
                count: entries.len(),
                entries,
            },
            successful_signals: TradeGroup::from_trades(wins),
            failed_signals: TradeGroup::from_trades(losses),
        }
    }
}

/// Destination for periodic state snapshots
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    async fn save(&self, snapshot: &StateSnapshot) -> Result<()>;

    async fn load(&self) -> Result<Option<StateSnapshot>>;
}

/// Pretty-printed JSON file, replaced atomically on each save
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait::async_trait]
impl StateStore for JsonStateStore {
    async fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.temp_path();

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| Error::TransientIo(format!("writing {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::TransientIo(format!("replacing {}: {}", self.path.display(), e)))?;

        tracing::debug!(
            "Saved state snapshot to {} ({} active, {} waiting)",
            self.path.display(),
            snapshot.active_signals.count,
            snapshot.waiting_entries.count
        );

        Ok(())
    }

    async fn load(&self) -> Result<Option<StateSnapshot>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BotConfig;
    use crate::models::{PriceTick, SignalSnapshot, Timeframes, Vote};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("signalbot-{}-{}.json", name, uuid::Uuid::new_v4()))
    }

    fn engine_with_history() -> TradingEngine {
        let config = BotConfig {
            commission_rate: Decimal::ZERO,
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            ..BotConfig::default()
        };
        let mut engine = TradingEngine::new(&config);
        let t0 = Utc::now();
        let tf = Timeframes::default();
        let snap = |s, m, l| Some(SignalSnapshot::new(&tf, s, m, l));

        // BTCUSDT: open then hit target
        engine.process("BTCUSDT", snap(Vote::Sell, Vote::Sell, Vote::Sell), &PriceTick::Last(dec!(100)), t0);
        engine.process("BTCUSDT", snap(Vote::Buy, Vote::Buy, Vote::Buy), &PriceTick::Last(dec!(100)), t0 + Duration::minutes(1));
        engine.process("BTCUSDT", None, &PriceTick::Last(dec!(104)), t0 + Duration::minutes(2));

        // ETHUSDT: deferred entry still waiting
        engine.process("ETHUSDT", snap(Vote::Buy, Vote::Buy, Vote::Buy), &PriceTick::Last(dec!(50)), t0);
        engine.process("ETHUSDT", snap(Vote::Sell, Vote::Buy, Vote::Buy), &PriceTick::Last(dec!(50)), t0 + Duration::minutes(1));

        engine
    }

    #[test]
    fn test_capture_groups_trades() {
        let engine = engine_with_history();
        let snapshot = StateSnapshot::capture(&engine, Utc::now());

        assert_eq!(snapshot.active_signals.count, 0);
        assert_eq!(snapshot.waiting_entries.count, 1);
        assert_eq!(snapshot.waiting_entries.entries[0].symbol, "ETHUSDT");
        assert_eq!(snapshot.successful_signals.count, 1);
        assert_eq!(snapshot.successful_signals.total_pnl, dec!(400));
        assert_eq!(snapshot.failed_signals.count, 0);
    }

    #[tokio::test]
    async fn test_json_store_roundtrip() {
        let path = temp_file("roundtrip");
        let store = JsonStateStore::new(&path);

        assert!(store.load().await.unwrap().is_none());

        let snapshot = StateSnapshot::capture(&engine_with_history(), Utc::now());
        store.save(&snapshot).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.waiting_entries.count, 1);
        assert_eq!(loaded.successful_signals.trades[0].pnl, dec!(400));
        assert!(!store.temp_path().exists());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_save_failure_is_transient() {
        let dir = std::env::temp_dir().join(format!("signalbot-missing-{}", uuid::Uuid::new_v4()));
        let store = JsonStateStore::new(dir.join("state.json"));
        let snapshot = StateSnapshot::capture(&engine_with_history(), Utc::now());

        let err = store.save(&snapshot).await.unwrap_err();
        assert!(matches!(err, Error::TransientIo(_)));
    }
}
