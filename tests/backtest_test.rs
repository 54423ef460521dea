use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use signalbot::backtest::{BacktestRunner, MarketScenario, SyntheticDataGenerator};
use signalbot::execution::ExitReason;
use signalbot::strategy::{IndicatorConfig, IndicatorVoteProvider};
use signalbot::*;

const CANDLES: usize = 3000;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter("signalbot=info")
        .with_test_writer()
        .try_init()
        .ok();
}

fn history(scenario: MarketScenario, seed: u64) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    SyntheticDataGenerator::new(seed).generate(scenario, "BTCUSDT", CANDLES, Timeframe::M15, start)
}

fn runner() -> BacktestRunner<IndicatorVoteProvider> {
    let config = BotConfig {
        symbols: vec!["BTCUSDT".to_string()],
        ..BotConfig::default()
    };
    BacktestRunner::new(config, IndicatorVoteProvider::new(IndicatorConfig::default()))
}

#[test]
fn test_sweep_over_volatile_history() {
    init_logging();
    let candles = history(MarketScenario::Volatile, 7);
    let intervals = [15, 30, 60, 120];

    println!("\n📊 Sweeping {} intervals over {} candles", intervals.len(), candles.len());
    let report = runner().sweep("BTCUSDT", &candles, &intervals).unwrap();

    assert_eq!(report.candidates.len(), intervals.len());
    for (candidate, interval) in report.candidates.iter().zip(intervals) {
        assert_eq!(candidate.recheck_interval_minutes, interval);
    }

    let best = report.best().unwrap();
    for candidate in &report.candidates {
        assert!(candidate.summary.total_return_pct <= best.summary.total_return_pct);
    }
    println!(
        "✓ Best interval {}m with {:+.2}%",
        best.recheck_interval_minutes, best.summary.total_return_pct
    );

    assert!(
        report.candidates.iter().any(|c| c.summary.total_trades > 0),
        "volatile history should trade at least once"
    );
}

#[test]
fn test_replay_leaves_consistent_books() {
    init_logging();
    let candles = history(MarketScenario::Reversal, 11);
    let result = runner().run("BTCUSDT", &candles, 60).unwrap();

    // One sample per bar plus the final one after forced closes
    assert_eq!(result.equity_curve.len(), candles.len() + 1);
    assert!(result
        .equity_curve
        .windows(2)
        .all(|w| w[0].timestamp <= w[1].timestamp));

    let last = result.equity_curve.last().unwrap();
    assert_eq!(last.open_positions, 0);
    assert_eq!(last.equity, last.balance);

    // Nothing outlives the replay, and no trade ends before it starts
    let end = candles.last().unwrap().timestamp + Timeframe::M15.duration();
    for trade in &result.trades {
        assert!(trade.exit_time >= trade.entry_time);
        assert!(trade.exit_time <= end);
        if trade.exit_reason == ExitReason::Forced {
            assert_eq!(trade.exit_time, end);
        }
    }

    let realized: Decimal = result.trades.iter().map(|t| t.pnl).sum();
    let drift = (result.summary.final_balance - (dec!(10000) + realized)).abs();
    assert!(drift < dec!(0.000001), "balance drifted by {}", drift);

    assert_eq!(
        result.summary.target_exits + result.summary.stop_exits + result.summary.forced_exits,
        result.summary.total_trades
    );
}

#[test]
fn test_replay_is_deterministic() {
    init_logging();
    let candles = history(MarketScenario::Sideways, 3);

    let first = runner().run("BTCUSDT", &candles, 30).unwrap();
    let second = runner().run("BTCUSDT", &candles, 30).unwrap();

    assert_eq!(first.summary.total_trades, second.summary.total_trades);
    assert_eq!(first.summary.final_balance, second.summary.final_balance);
    assert_eq!(first.equity_curve.len(), second.equity_curve.len());
}
