use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::{BotConfig, EquityMode};
use crate::models::{Direction, PriceTick, SignalSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExitReason {
    Target,
    Stop,
    Forced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub target_price: Decimal,
    pub stop_price: Decimal,
    pub notional: Decimal, // Margin committed at entry
    pub quantity: Decimal, // notional / entry_price
    pub leverage: u32,
    pub entry_time: DateTime<Utc>,
    pub entry_commission: Decimal,
    pub last_price: Decimal, // Most recent observed price, used for forced exits
    pub snapshot: SignalSnapshot,
}

impl Position {
    /// Leveraged PnL before commissions if closed at `exit_price`
    pub fn gross_pnl(&self, exit_price: Decimal) -> Decimal {
        let raw = (exit_price - self.entry_price) * self.quantity * Decimal::from(self.leverage);
        match self.direction {
            Direction::Long => raw,
            Direction::Short => -raw,
        }
    }

    /// Exit triggered by the tick, if any
    ///
    /// Target is checked before stop, so a bar that spans both closes at
    /// the target. Bars exit at the threshold level, live prices at the
    /// observed price.
    pub fn exit_signal(&self, tick: &PriceTick) -> Option<(ExitReason, Decimal)> {
        match (tick, self.direction) {
            (PriceTick::Bar(bar), Direction::Long) => {
                if bar.high >= self.target_price {
                    Some((ExitReason::Target, self.target_price))
                } else if bar.low <= self.stop_price {
                    Some((ExitReason::Stop, self.stop_price))
                } else {
                    None
                }
            }
            (PriceTick::Bar(bar), Direction::Short) => {
                if bar.low <= self.target_price {
                    Some((ExitReason::Target, self.target_price))
                } else if bar.high >= self.stop_price {
                    Some((ExitReason::Stop, self.stop_price))
                } else {
                    None
                }
            }
            (PriceTick::Last(price), Direction::Long) => {
                if *price >= self.target_price {
                    Some((ExitReason::Target, *price))
                } else if *price <= self.stop_price {
                    Some((ExitReason::Stop, *price))
                } else {
                    None
                }
            }
            (PriceTick::Last(price), Direction::Short) => {
                if *price <= self.target_price {
                    Some((ExitReason::Target, *price))
                } else if *price >= self.stop_price {
                    Some((ExitReason::Stop, *price))
                } else {
                    None
                }
            }
        }
    }
}

/// Immutable record of a terminated position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub notional: Decimal,
    pub quantity: Decimal,
    pub leverage: u32,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub exit_reason: ExitReason,
    pub gross_pnl: Decimal,
    pub commission: Decimal, // Entry + exit
    pub pnl: Decimal,        // Net of both commissions
    pub pnl_pct: Decimal,    // pnl relative to notional, in percent
    pub snapshot: SignalSnapshot,
}

impl ClosedTrade {
    pub fn duration(&self) -> Duration {
        self.exit_time - self.entry_time
    }

    pub fn is_win(&self) -> bool {
        self.pnl > Decimal::ZERO
    }
}

/// Sizing and exit parameters applied to every entry
#[derive(Debug, Clone)]
pub struct PositionParams {
    pub target_pct: Decimal,
    pub stop_pct: Decimal,
    pub commission_rate: Decimal,
    pub position_size_pct: Decimal,
    pub leverage_cap: u32,
}

impl From<&BotConfig> for PositionParams {
    fn from(config: &BotConfig) -> Self {
        Self {
            target_pct: config.target_pct,
            stop_pct: config.stop_pct,
            commission_rate: config.commission_rate,
            position_size_pct: config.position_size_pct,
            leverage_cap: config.leverage_cap,
        }
    }
}

/// Owns open positions (at most one per symbol) and the cash balance
pub struct PositionManager {
    positions: HashMap<String, Position>,
    params: PositionParams,
    balance: Decimal,
}

impl PositionManager {
    pub fn new(initial_balance: Decimal, params: PositionParams) -> Self {
        Self {
            positions: HashMap::new(),
            params,
            balance: initial_balance,
        }
    }

    /// Restore open positions from a previous run
    ///
    /// Cash balance is taken as given; commissions of restored positions
    /// are not charged again.
    pub fn with_positions(
        balance: Decimal,
        params: PositionParams,
        positions: Vec<Position>,
    ) -> anyhow::Result<Self> {
        let mut pm = Self::new(balance, params);
        for position in positions {
            if pm.positions.contains_key(&position.symbol) {
                anyhow::bail!("Duplicate restored position for {}", position.symbol);
            }
            pm.positions.insert(position.symbol.clone(), position);
        }

        tracing::info!("Restored {} open positions", pm.positions.len());
        Ok(pm)
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn params(&self) -> &PositionParams {
        &self.params
    }

    /// Target and stop levels for an entry at `price`
    pub fn exit_levels(&self, direction: Direction, price: Decimal) -> (Decimal, Decimal) {
        let up_target = price * (Decimal::ONE + self.params.target_pct);
        let down_target = price * (Decimal::ONE - self.params.target_pct);
        let up_stop = price * (Decimal::ONE + self.params.stop_pct);
        let down_stop = price * (Decimal::ONE - self.params.stop_pct);

        match direction {
            Direction::Long => (up_target, down_stop),
            Direction::Short => (down_target, up_stop),
        }
    }

    /// Open a position at `price`
    ///
    /// Notional is `position_size_pct` of the current balance; the entry
    /// commission is deducted from the balance immediately.
    pub fn open_position(
        &mut self,
        symbol: &str,
        direction: Direction,
        price: Decimal,
        leverage: u32,
        snapshot: SignalSnapshot,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Position> {
        if self.positions.contains_key(symbol) {
            anyhow::bail!("Already have open position for {}", symbol);
        }
        if price <= Decimal::ZERO {
            anyhow::bail!("Invalid entry price {} for {}", price, symbol);
        }

        let notional = self.balance * self.params.position_size_pct;
        if notional <= Decimal::ZERO {
            anyhow::bail!("No capital available to open {}", symbol);
        }

        let leverage = leverage.clamp(1, self.params.leverage_cap);
        let (target_price, stop_price) = self.exit_levels(direction, price);
        let entry_commission = notional * self.params.commission_rate;

        let position = Position {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            direction,
            entry_price: price,
            target_price,
            stop_price,
            notional,
            quantity: notional / price,
            leverage,
            entry_time: now,
            entry_commission,
            last_price: price,
            snapshot,
        };

        self.balance -= entry_commission;
        self.positions.insert(symbol.to_string(), position.clone());

        tracing::info!(
            "Opened {} {} @ {} (notional {}, {}x, target {}, stop {})",
            direction,
            symbol,
            price,
            notional.round_dp(2),
            leverage,
            target_price,
            stop_price
        );

        Ok(position)
    }

    pub fn has_open_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn get_open_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn open_positions(&self) -> Vec<&Position> {
        let mut positions: Vec<&Position> = self.positions.values().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        positions
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    /// Close the symbol's position and settle it against the balance
    pub fn close_position(
        &mut self,
        symbol: &str,
        exit_price: Decimal,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ClosedTrade> {
        let position = self
            .positions
            .remove(symbol)
            .ok_or_else(|| anyhow::anyhow!("No open position for {}", symbol))?;

        let gross_pnl = position.gross_pnl(exit_price);
        let exit_commission = position.notional * self.params.commission_rate;
        let pnl = gross_pnl - position.entry_commission - exit_commission;
        let pnl_pct = pnl / position.notional * Decimal::ONE_HUNDRED;

        self.balance += gross_pnl - exit_commission;

        tracing::info!(
            "Closed {} {} @ {} ({:?}): PnL {} ({}%)",
            position.direction,
            symbol,
            exit_price,
            reason,
            pnl.round_dp(2),
            pnl_pct.round_dp(2)
        );

        Ok(ClosedTrade {
            id: position.id,
            symbol: position.symbol,
            direction: position.direction,
            entry_price: position.entry_price,
            exit_price,
            notional: position.notional,
            quantity: position.quantity,
            leverage: position.leverage,
            entry_time: position.entry_time,
            exit_time: now,
            exit_reason: reason,
            gross_pnl,
            commission: position.entry_commission + exit_commission,
            pnl,
            pnl_pct,
            snapshot: position.snapshot,
        })
    }

    /// Mark the symbol's position and close it if target or stop was hit
    pub fn check_exit(
        &mut self,
        symbol: &str,
        tick: &PriceTick,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<ClosedTrade>> {
        let Some(position) = self.positions.get_mut(symbol) else {
            return Ok(None);
        };

        position.last_price = tick.price();

        match position.exit_signal(tick) {
            Some((reason, exit_price)) => {
                Ok(Some(self.close_position(symbol, exit_price, reason, now)?))
            }
            None => Ok(None),
        }
    }

    /// Record the latest price without checking exits
    pub fn mark(&mut self, symbol: &str, price: Decimal) {
        if let Some(position) = self.positions.get_mut(symbol) {
            position.last_price = price;
        }
    }

    /// Close every open position at its last known price
    pub fn force_close_all(&mut self, now: DateTime<Utc>) -> Vec<ClosedTrade> {
        let mut symbols: Vec<String> = self.positions.keys().cloned().collect();
        symbols.sort();

        symbols
            .into_iter()
            .filter_map(|symbol| {
                let price = self.positions.get(&symbol)?.last_price;
                match self.close_position(&symbol, price, ExitReason::Forced, now) {
                    Ok(trade) => Some(trade),
                    Err(e) => {
                        tracing::error!("Failed to force close {}: {}", symbol, e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Balance plus the value of open positions
    pub fn equity(&self, mode: EquityMode) -> Decimal {
        let open_value: Decimal = self
            .positions
            .values()
            .map(|p| match mode {
                EquityMode::MarkToEntry => p.quantity * p.entry_price,
                EquityMode::MarkToMarket => p.notional + p.gross_pnl(p.last_price),
            })
            .sum();

        self.balance + open_value
    }
}
