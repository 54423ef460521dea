use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{Direction, SignalSnapshot, Vote};

/// A deferred decision waiting for a better price or a confirming flip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitingEntry {
    pub symbol: String,
    pub direction: Direction,
    pub reference_price: Decimal,
    pub snapshot: SignalSnapshot,
    pub leverage: u32,
    pub strategy_note: String,
    pub created_at: DateTime<Utc>,
}

impl WaitingEntry {
    /// Price at which the retrace condition is met
    pub fn trigger_price(&self, retrace_pct: Decimal) -> Decimal {
        match self.direction {
            Direction::Long => self.reference_price * (Decimal::ONE - retrace_pct),
            Direction::Short => self.reference_price * (Decimal::ONE + retrace_pct),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionTrigger {
    /// Price pulled back by the retrace percentage
    Retrace,
    /// Short timeframe flipped to confirm the direction
    ShortFlip,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaitingOutcome {
    Pending,
    Convert(WaitingEntry, ConversionTrigger),
    Expired(WaitingEntry),
}

pub struct WaitingEntryManager {
    entries: HashMap<String, WaitingEntry>,
    retrace_pct: Decimal,
    max_wait: Option<Duration>,
}

impl WaitingEntryManager {
    /// # Arguments
    /// * `retrace_pct` - Pullback from the reference price that converts an entry
    /// * `max_wait` - Optional lifetime; `None` waits indefinitely
    pub fn new(retrace_pct: Decimal, max_wait: Option<Duration>) -> Self {
        Self {
            entries: HashMap::new(),
            retrace_pct,
            max_wait,
        }
    }

    pub fn insert(&mut self, entry: WaitingEntry) -> anyhow::Result<()> {
        if self.entries.contains_key(&entry.symbol) {
            anyhow::bail!("Already waiting on an entry for {}", entry.symbol);
        }

        tracing::info!(
            "⏳ {} {} deferred @ {} ({})",
            entry.symbol,
            entry.direction,
            entry.reference_price,
            entry.strategy_note
        );

        self.entries.insert(entry.symbol.clone(), entry);
        Ok(())
    }

    /// Re-check the symbol's waiting entry
    ///
    /// Expired entries are removed. A converting entry stays in place until
    /// the caller has opened its position and calls `remove`. `short_vote`
    /// is only available on ticks where signals were re-evaluated.
    pub fn evaluate(
        &mut self,
        symbol: &str,
        price: Decimal,
        short_vote: Option<Vote>,
        now: DateTime<Utc>,
    ) -> WaitingOutcome {
        let Some(entry) = self.entries.get(symbol) else {
            return WaitingOutcome::Pending;
        };

        let trigger_price = entry.trigger_price(self.retrace_pct);
        let retraced = match entry.direction {
            Direction::Long => price <= trigger_price,
            Direction::Short => price >= trigger_price,
        };
        let flipped = short_vote == Some(entry.direction.vote());

        let trigger = if retraced {
            Some(ConversionTrigger::Retrace)
        } else if flipped {
            Some(ConversionTrigger::ShortFlip)
        } else {
            None
        };

        if let Some(trigger) = trigger {
            return WaitingOutcome::Convert(entry.clone(), trigger);
        }

        if let Some(max_wait) = self.max_wait {
            if now - entry.created_at >= max_wait {
                tracing::info!("⌛ {} waiting entry expired after {}m", symbol, max_wait.num_minutes());
                return match self.entries.remove(symbol) {
                    Some(entry) => WaitingOutcome::Expired(entry),
                    None => WaitingOutcome::Pending,
                };
            }
        }

        WaitingOutcome::Pending
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.entries.contains_key(symbol)
    }

    pub fn get(&self, symbol: &str) -> Option<&WaitingEntry> {
        self.entries.get(symbol)
    }

    pub fn remove(&mut self, symbol: &str) -> Option<WaitingEntry> {
        self.entries.remove(symbol)
    }

    /// All waiting entries, ordered by symbol
    pub fn entries(&self) -> Vec<&WaitingEntry> {
        let mut entries: Vec<&WaitingEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timeframes;
    use rust_decimal_macros::dec;

    fn entry(direction: Direction, created_at: DateTime<Utc>) -> WaitingEntry {
        WaitingEntry {
            symbol: "BTCUSDT".to_string(),
            direction,
            reference_price: dec!(100),
            snapshot: SignalSnapshot::new(&Timeframes::default(), Vote::Sell, Vote::Buy, Vote::Buy),
            leverage: 5,
            strategy_note: "wait".to_string(),
            created_at,
        }
    }

    #[test]
    fn test_buy_converts_on_one_percent_drop_only() {
        let now = Utc::now();
        let mut mgr = WaitingEntryManager::new(dec!(0.01), None);
        mgr.insert(entry(Direction::Long, now)).unwrap();

        assert_eq!(mgr.evaluate("BTCUSDT", dec!(99.5), None, now), WaitingOutcome::Pending);
        assert!(mgr.contains("BTCUSDT"));

        match mgr.evaluate("BTCUSDT", dec!(99), None, now) {
            WaitingOutcome::Convert(e, trigger) => {
                assert_eq!(e.direction, Direction::Long);
                assert_eq!(trigger, ConversionTrigger::Retrace);
            }
            other => panic!("expected conversion, got {:?}", other),
        }

        // Kept until the position is confirmed open
        assert!(mgr.contains("BTCUSDT"));
        assert_eq!(mgr.remove("BTCUSDT").unwrap().direction, Direction::Long);
        assert!(mgr.is_empty());
    }

    #[test]
    fn test_sell_converts_on_one_percent_rise() {
        let now = Utc::now();
        let mut mgr = WaitingEntryManager::new(dec!(0.01), None);
        mgr.insert(entry(Direction::Short, now)).unwrap();

        assert_eq!(mgr.evaluate("BTCUSDT", dec!(100.9), None, now), WaitingOutcome::Pending);
        assert!(matches!(
            mgr.evaluate("BTCUSDT", dec!(101), None, now),
            WaitingOutcome::Convert(_, ConversionTrigger::Retrace)
        ));
    }

    #[test]
    fn test_short_flip_converts() {
        let now = Utc::now();
        let mut mgr = WaitingEntryManager::new(dec!(0.01), None);
        mgr.insert(entry(Direction::Long, now)).unwrap();

        // Opposite short vote keeps waiting
        assert_eq!(
            mgr.evaluate("BTCUSDT", dec!(100), Some(Vote::Sell), now),
            WaitingOutcome::Pending
        );
        assert!(matches!(
            mgr.evaluate("BTCUSDT", dec!(100), Some(Vote::Buy), now),
            WaitingOutcome::Convert(_, ConversionTrigger::ShortFlip)
        ));
    }

    #[test]
    fn test_unbounded_wait_persists() {
        let t0 = Utc::now();
        let mut mgr = WaitingEntryManager::new(dec!(0.01), None);
        mgr.insert(entry(Direction::Long, t0)).unwrap();

        let much_later = t0 + Duration::days(30);
        assert_eq!(mgr.evaluate("BTCUSDT", dec!(100), None, much_later), WaitingOutcome::Pending);
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn test_bounded_wait_expires() {
        let t0 = Utc::now();
        let mut mgr = WaitingEntryManager::new(dec!(0.01), Some(Duration::hours(2)));
        mgr.insert(entry(Direction::Long, t0)).unwrap();

        assert_eq!(
            mgr.evaluate("BTCUSDT", dec!(100), None, t0 + Duration::minutes(119)),
            WaitingOutcome::Pending
        );
        assert!(matches!(
            mgr.evaluate("BTCUSDT", dec!(100), None, t0 + Duration::hours(2)),
            WaitingOutcome::Expired(_)
        ));
        assert!(mgr.is_empty());
    }

    #[test]
    fn test_one_entry_per_symbol() {
        let now = Utc::now();
        let mut mgr = WaitingEntryManager::new(dec!(0.01), None);
        mgr.insert(entry(Direction::Long, now)).unwrap();

        assert!(mgr.insert(entry(Direction::Short, now)).is_err());
        assert_eq!(mgr.get("BTCUSDT").unwrap().direction, Direction::Long);
    }
}
