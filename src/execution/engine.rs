use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::backtest::metrics::{EquitySample, PerformanceSummary, StatisticsEngine};
use crate::config::{BotConfig, EquityMode};
use crate::execution::position_manager::{
    ClosedTrade, ExitReason, Position, PositionManager, PositionParams,
};
use crate::execution::waiting::{ConversionTrigger, WaitingEntry, WaitingEntryManager, WaitingOutcome};
use crate::models::{Decision, PriceTick, SignalSnapshot, Vote};
use crate::risk::{CooldownBlock, CooldownTracker};
use crate::strategy::SignalAggregator;

/// State transitions produced while processing a tick
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    PositionOpened(Position),
    EntryDeferred(WaitingEntry),
    WaitingConverted {
        entry: WaitingEntry,
        trigger: ConversionTrigger,
        position: Position,
    },
    WaitingExpired(WaitingEntry),
    PositionClosed(ClosedTrade),
    DecisionSuppressed {
        symbol: String,
        decision: Decision,
        block: CooldownBlock,
    },
}

impl EngineEvent {
    pub fn symbol(&self) -> &str {
        match self {
            EngineEvent::PositionOpened(p) => &p.symbol,
            EngineEvent::EntryDeferred(e) | EngineEvent::WaitingExpired(e) => &e.symbol,
            EngineEvent::WaitingConverted { entry, .. } => &entry.symbol,
            EngineEvent::PositionClosed(t) => &t.symbol,
            EngineEvent::DecisionSuppressed { symbol, .. } => symbol,
        }
    }
}

/// Decision core shared by the live monitor and the simulator
///
/// Owns every per-symbol state map. Callers feed one tick per symbol and
/// record one equity sample per cycle; time always comes from the caller.
pub struct TradingEngine {
    aggregator: SignalAggregator,
    cooldowns: CooldownTracker,
    waiting: WaitingEntryManager,
    positions: PositionManager,
    stats: StatisticsEngine,
    equity_mode: EquityMode,
}

impl TradingEngine {
    pub fn new(config: &BotConfig) -> Self {
        Self {
            aggregator: SignalAggregator::new(config.retrace_pct),
            cooldowns: CooldownTracker::new(config.signal_cooldown(), config.post_stop_cooldown()),
            waiting: WaitingEntryManager::new(config.retrace_pct, config.max_wait()),
            positions: PositionManager::new(config.initial_balance, PositionParams::from(config)),
            stats: StatisticsEngine::new(config.initial_balance),
            equity_mode: config.equity_mode,
        }
    }

    /// Process one tick for a symbol
    ///
    /// # Arguments
    /// * `snapshot` - Fresh votes, or `None` when signals were not re-evaluated this tick
    /// * `tick` - Latest bar (simulation) or last price (live)
    /// * `now` - Tick time; positions opened at `now` are not exit-checked until a later tick
    pub fn process(
        &mut self,
        symbol: &str,
        snapshot: Option<SignalSnapshot>,
        tick: &PriceTick,
        now: DateTime<Utc>,
    ) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let price = tick.price();
        let short_vote = snapshot.as_ref().map(|s| s.short());

        let decision = match snapshot {
            Some(snapshot) => self.aggregator.evaluate(symbol, snapshot, price),
            None => Decision::None,
        };

        if self.waiting.contains(symbol) {
            if decision.is_actionable() {
                tracing::debug!("{} decision discarded, entry already waiting", symbol);
            }
            self.recheck_waiting(symbol, price, short_vote, now, &mut events);
        } else if self.positions.has_open_position(symbol) {
            if decision.is_actionable() {
                tracing::debug!("{} decision discarded, position already open", symbol);
            }
        } else if decision.is_actionable() {
            self.dispatch(symbol, decision, price, now, &mut events);
        }

        self.check_exit(symbol, tick, now, &mut events);

        events
    }

    fn recheck_waiting(
        &mut self,
        symbol: &str,
        price: Decimal,
        short_vote: Option<Vote>,
        now: DateTime<Utc>,
        events: &mut Vec<EngineEvent>,
    ) {
        match self.waiting.evaluate(symbol, price, short_vote, now) {
            WaitingOutcome::Pending => {}
            WaitingOutcome::Expired(entry) => events.push(EngineEvent::WaitingExpired(entry)),
            WaitingOutcome::Convert(entry, trigger) => {
                match self.positions.open_position(
                    symbol,
                    entry.direction,
                    price,
                    entry.leverage,
                    entry.snapshot.clone(),
                    now,
                ) {
                    Ok(position) => {
                        self.waiting.remove(symbol);
                        tracing::info!("✅ {} waiting entry converted ({:?})", symbol, trigger);
                        self.cooldowns
                            .start_signal_cooldown(symbol, entry.direction, now);
                        events.push(EngineEvent::WaitingConverted {
                            entry,
                            trigger,
                            position,
                        });
                    }
                    Err(e) => tracing::error!(
                        "Failed to convert waiting entry for {}, still waiting: {}",
                        symbol,
                        e
                    ),
                }
            }
        }
    }

    fn dispatch(
        &mut self,
        symbol: &str,
        decision: Decision,
        price: Decimal,
        now: DateTime<Utc>,
        events: &mut Vec<EngineEvent>,
    ) {
        let Some(direction) = decision.direction() else {
            return;
        };
        let Some(snapshot) = self.aggregator.previous(symbol).cloned() else {
            return;
        };
        let votes = snapshot.vote_vector();

        if let Err(block) = self.cooldowns.check(symbol, direction, &votes, now) {
            tracing::info!("🧊 {} {} suppressed: {:?}", symbol, direction, block);
            events.push(EngineEvent::DecisionSuppressed {
                symbol: symbol.to_string(),
                decision,
                block,
            });
            return;
        }

        match decision {
            Decision::Immediate { direction, leverage } => {
                match self
                    .positions
                    .open_position(symbol, direction, price, leverage, snapshot, now)
                {
                    Ok(position) => {
                        self.cooldowns.record_dispatch(symbol, direction, votes, now);
                        self.cooldowns.start_signal_cooldown(symbol, direction, now);
                        events.push(EngineEvent::PositionOpened(position));
                    }
                    Err(e) => tracing::error!("Failed to open {} {}: {}", direction, symbol, e),
                }
            }
            Decision::Deferred {
                direction,
                leverage,
                reference_price,
                strategy_note,
            } => {
                let entry = WaitingEntry {
                    symbol: symbol.to_string(),
                    direction,
                    reference_price,
                    snapshot,
                    leverage,
                    strategy_note,
                    created_at: now,
                };
                match self.waiting.insert(entry.clone()) {
                    Ok(()) => {
                        self.cooldowns.record_dispatch(symbol, direction, votes, now);
                        events.push(EngineEvent::EntryDeferred(entry));
                    }
                    Err(e) => tracing::error!("Failed to defer {} {}: {}", direction, symbol, e),
                }
            }
            Decision::None => {}
        }
    }

    fn check_exit(
        &mut self,
        symbol: &str,
        tick: &PriceTick,
        now: DateTime<Utc>,
        events: &mut Vec<EngineEvent>,
    ) {
        let opened_this_tick = match self.positions.get_open_position(symbol) {
            Some(position) => position.entry_time >= now,
            None => return,
        };

        if opened_this_tick {
            self.positions.mark(symbol, tick.price());
            return;
        }

        match self.positions.check_exit(symbol, tick, now) {
            Ok(Some(trade)) => {
                self.cooldowns
                    .start_signal_cooldown(symbol, trade.direction, now);
                if trade.exit_reason == ExitReason::Stop {
                    self.cooldowns.start_post_stop_cooldown(symbol, now);
                }
                self.stats.record_trade(trade.clone());
                events.push(EngineEvent::PositionClosed(trade));
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Exit check failed for {}: {}", symbol, e),
        }
    }

    /// Close every open position with reason FORCED
    ///
    /// # Arguments
    /// * `prices` - Latest known prices; symbols missing here close at their last mark
    pub fn force_close_all(
        &mut self,
        prices: &HashMap<String, Decimal>,
        now: DateTime<Utc>,
    ) -> Vec<EngineEvent> {
        for (symbol, price) in prices {
            self.positions.mark(symbol, *price);
        }

        self.positions
            .force_close_all(now)
            .into_iter()
            .map(|trade| {
                self.stats.record_trade(trade.clone());
                EngineEvent::PositionClosed(trade)
            })
            .collect()
    }

    /// Reload state saved by a previous run
    ///
    /// Must be called before the first tick.
    pub fn restore(
        &mut self,
        balance: Decimal,
        positions: Vec<Position>,
        entries: Vec<WaitingEntry>,
        mut trades: Vec<ClosedTrade>,
    ) -> anyhow::Result<()> {
        if let Some(entry) = entries
            .iter()
            .find(|e| positions.iter().any(|p| p.symbol == e.symbol))
        {
            anyhow::bail!("{} has both a position and a waiting entry", entry.symbol);
        }

        let params = self.positions.params().clone();
        self.positions = PositionManager::with_positions(balance, params, positions)?;

        for entry in entries {
            self.waiting.insert(entry)?;
        }

        trades.sort_by_key(|t| t.exit_time);
        for trade in trades {
            self.stats.record_trade(trade);
        }

        Ok(())
    }

    /// Append one equity sample for the current state
    pub fn record_equity(&mut self, now: DateTime<Utc>) -> EquitySample {
        let sample = EquitySample {
            timestamp: now,
            balance: self.positions.balance(),
            equity: self.positions.equity(self.equity_mode),
            open_positions: self.positions.open_count(),
        };
        self.stats.record_equity(sample.clone());
        sample
    }

    pub fn summary(&self) -> PerformanceSummary {
        self.stats.summary(self.positions.balance())
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    pub fn waiting(&self) -> &WaitingEntryManager {
        &self.waiting
    }

    pub fn stats(&self) -> &StatisticsEngine {
        &self.stats
    }

    pub fn aggregator(&self) -> &SignalAggregator {
        &self.aggregator
    }
}
