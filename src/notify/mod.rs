pub mod telegram;

pub use telegram::TelegramNotifier;

use crate::execution::{ConversionTrigger, EngineEvent, ExitReason};
use crate::format::{format_pnl, format_price};
use crate::models::Direction;
use crate::Result;

/// Outbound message channel
///
/// Send failures are logged by the caller and never block trading.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;

    fn name(&self) -> &str;
}

/// Writes messages to the log only
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        tracing::info!("📣 {}", message.replace('\n', " | "));
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

fn direction_icon(direction: Direction) -> &'static str {
    match direction {
        Direction::Long => "🟢",
        Direction::Short => "🔴",
    }
}

/// Human-readable message for an engine event
///
/// Returns None for events that are not worth notifying.
pub fn format_event(event: &EngineEvent, precision: u32) -> Option<String> {
    let price = |p| format_price(p, precision);

    match event {
        EngineEvent::PositionOpened(p) => Some(format!(
            "{} {} {} {}x\nEntry: {}\nTarget: {}\nStop: {}\nSignals: {}",
            direction_icon(p.direction),
            p.direction,
            p.symbol,
            p.leverage,
            price(p.entry_price),
            price(p.target_price),
            price(p.stop_price),
            p.snapshot
        )),
        EngineEvent::EntryDeferred(e) => Some(format!(
            "⏳ {} {} {}x deferred\nReference: {}\nSignals: {}\n{}",
            e.symbol,
            e.direction,
            e.leverage,
            price(e.reference_price),
            e.snapshot,
            e.strategy_note
        )),
        EngineEvent::WaitingConverted {
            entry,
            trigger,
            position,
        } => {
            let why = match trigger {
                ConversionTrigger::Retrace => "price retraced",
                ConversionTrigger::ShortFlip => "short timeframe confirmed",
            };
            Some(format!(
                "{} {} {} {}x entered ({})\nEntry: {} (ref {})\nTarget: {}\nStop: {}",
                direction_icon(position.direction),
                position.direction,
                entry.symbol,
                position.leverage,
                why,
                price(position.entry_price),
                price(entry.reference_price),
                price(position.target_price),
                price(position.stop_price)
            ))
        }
        EngineEvent::WaitingExpired(e) => Some(format!(
            "⌛ {} {} deferred entry expired (ref {})",
            e.symbol,
            e.direction,
            price(e.reference_price)
        )),
        EngineEvent::PositionClosed(t) => {
            let (icon, label) = match t.exit_reason {
                ExitReason::Target => ("🎯", "target hit"),
                ExitReason::Stop => ("🛑", "stopped out"),
                ExitReason::Forced => ("⏹️", "force closed"),
            };
            Some(format!(
                "{} {} {} {}\nEntry: {} Exit: {}\nPnL: {} ({}%)\nHeld: {}m",
                icon,
                t.symbol,
                t.direction,
                label,
                price(t.entry_price),
                price(t.exit_price),
                format_pnl(t.pnl),
                format_pnl(t.pnl_pct),
                t.duration().num_minutes()
            ))
        }
        EngineEvent::DecisionSuppressed { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ClosedTrade;
    use crate::models::{SignalSnapshot, Timeframes, Vote};
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    #[test]
    fn test_format_closed_trade() {
        let entry_time = Utc::now();
        let trade = ClosedTrade {
            id: uuid::Uuid::new_v4(),
            symbol: "ETHUSDT".to_string(),
            direction: Direction::Short,
            entry_price: dec!(2500),
            exit_price: dec!(2425),
            notional: dec!(1000),
            quantity: dec!(0.4),
            leverage: 5,
            entry_time,
            exit_time: entry_time + Duration::minutes(90),
            exit_reason: ExitReason::Target,
            gross_pnl: dec!(150),
            commission: dec!(0.8),
            pnl: dec!(149.2),
            pnl_pct: dec!(14.92),
            snapshot: SignalSnapshot::new(&Timeframes::default(), Vote::Sell, Vote::Sell, Vote::Sell),
        };

        let message = format_event(&EngineEvent::PositionClosed(trade), 2).unwrap();

        assert!(message.contains("ETHUSDT SHORT target hit"));
        assert!(message.contains("Entry: 2500.00 Exit: 2425.00"));
        assert!(message.contains("PnL: +149.20 (+14.92%)"));
        assert!(message.contains("Held: 90m"));
    }

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        assert!(LogNotifier.send("hello\nworld").await.is_ok());
        assert_eq!(LogNotifier.name(), "log");
    }
}
