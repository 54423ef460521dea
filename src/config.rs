use crate::models::{Timeframe, Timeframes};
use crate::{Error, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "SIGNALBOT";
const DEFAULT_BINANCE_URL: &str = "https://api.binance.com";
/// Upper bound for every minute-valued window (one year)
const MAX_WINDOW_MINUTES: u64 = 365 * 24 * 60;

/// How open positions contribute to the equity curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EquityMode {
    /// Open positions count at their entry notional
    #[default]
    MarkToEntry,
    /// Open positions count at notional plus unrealized PnL
    MarkToMarket,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

/// Historical simulation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// Interval of the candles that are replayed
    pub base_interval: Timeframe,
    /// Candidate signal re-check intervals, in minutes
    pub search_intervals_minutes: Vec<u64>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            base_interval: Timeframe::M15,
            search_intervals_minutes: vec![15, 30, 60, 120],
        }
    }
}

/// Bot configuration
///
/// Loaded from defaults, an optional TOML file and `SIGNALBOT__*`
/// environment variables, in that order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub symbols: Vec<String>,
    pub timeframes: Timeframes,
    pub initial_balance: Decimal,
    pub leverage_cap: u32,
    pub commission_rate: Decimal,
    pub target_pct: Decimal,
    pub stop_pct: Decimal,
    pub position_size_pct: Decimal,
    pub retrace_pct: Decimal,
    pub signal_cooldown_minutes: u64,
    pub post_stop_cooldown_minutes: u64,
    pub evaluation_interval_secs: u64,
    pub error_backoff_secs: u64,
    pub lookback_bars: usize,
    /// None keeps deferred entries until they convert
    pub max_wait_minutes: Option<u64>,
    pub equity_mode: EquityMode,
    pub price_precision: u32,
    pub state_path: String,
    pub snapshot_every_cycles: u64,
    pub close_positions_on_shutdown: bool,
    pub binance_base_url: String,
    pub telegram: TelegramConfig,
    pub backtest: BacktestConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            timeframes: Timeframes::default(),
            initial_balance: dec!(10000),
            leverage_cap: 10,
            commission_rate: dec!(0.0004),
            target_pct: dec!(0.03),
            stop_pct: dec!(0.025),
            position_size_pct: dec!(0.1),
            retrace_pct: dec!(0.01),
            signal_cooldown_minutes: 120,
            post_stop_cooldown_minutes: 240,
            evaluation_interval_secs: 60,
            error_backoff_secs: 30,
            lookback_bars: 200,
            max_wait_minutes: None,
            equity_mode: EquityMode::MarkToEntry,
            price_precision: 4,
            state_path: "signalbot_state.json".to_string(),
            snapshot_every_cycles: 1,
            close_positions_on_shutdown: true,
            binance_base_url: DEFAULT_BINANCE_URL.to_string(),
            telegram: TelegramConfig::default(),
            backtest: BacktestConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load configuration and validate it
    ///
    /// # Arguments
    /// * `path` - Optional TOML file; a missing file is not an error
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("symbols")
                .with_list_parse_key("backtest.search_intervals_minutes")
                .try_parsing(true),
        );

        let config: BotConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        tracing::debug!("Loaded configuration: {:?}", config);

        Ok(config)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(Error::Config("at least one symbol is required".to_string()));
        }

        let tfs = &self.timeframes;
        if !(tfs.short < tfs.mid && tfs.mid < tfs.long) {
            return Err(Error::Config(format!(
                "timeframes must be strictly ascending, got {}/{}/{}",
                tfs.short, tfs.mid, tfs.long
            )));
        }

        if self.initial_balance <= Decimal::ZERO {
            return Err(Error::Config("initial_balance must be positive".to_string()));
        }

        if self.leverage_cap < 1 {
            return Err(Error::Config("leverage_cap must be at least 1".to_string()));
        }

        for (name, value) in [
            ("target_pct", self.target_pct),
            ("stop_pct", self.stop_pct),
            ("position_size_pct", self.position_size_pct),
            ("retrace_pct", self.retrace_pct),
        ] {
            if value <= Decimal::ZERO || value >= Decimal::ONE {
                return Err(Error::Config(format!(
                    "{} must be between 0 and 1 (exclusive), got {}",
                    name, value
                )));
            }
        }

        if self.commission_rate < Decimal::ZERO || self.commission_rate >= Decimal::ONE {
            return Err(Error::Config(format!(
                "commission_rate must be in [0, 1), got {}",
                self.commission_rate
            )));
        }

        if self.evaluation_interval_secs == 0 || self.snapshot_every_cycles == 0 {
            return Err(Error::Config(
                "evaluation_interval_secs and snapshot_every_cycles must be non-zero".to_string(),
            ));
        }

        if self.lookback_bars < 2 {
            return Err(Error::Config("lookback_bars must be at least 2".to_string()));
        }

        for (name, value) in [
            ("signal_cooldown_minutes", Some(self.signal_cooldown_minutes)),
            ("post_stop_cooldown_minutes", Some(self.post_stop_cooldown_minutes)),
            ("max_wait_minutes", self.max_wait_minutes),
        ] {
            if let Some(minutes) = value {
                if minutes > MAX_WINDOW_MINUTES {
                    return Err(Error::Config(format!(
                        "{} must be at most {}, got {}",
                        name, MAX_WINDOW_MINUTES, minutes
                    )));
                }
            }
        }

        self.validate_backtest()
    }

    fn validate_backtest(&self) -> Result<()> {
        let bt = &self.backtest;

        if let (Some(start), Some(end)) = (bt.start, bt.end) {
            if end <= start {
                return Err(Error::Config(format!(
                    "backtest end {} must be after start {}",
                    end, start
                )));
            }
        }

        if bt.search_intervals_minutes.is_empty() {
            return Err(Error::Config(
                "backtest.search_intervals_minutes must not be empty".to_string(),
            ));
        }

        let base = bt.base_interval.minutes() as u64;
        if base > self.timeframes.short.minutes() as u64 {
            return Err(Error::Config(format!(
                "backtest base interval {} is coarser than the short timeframe {}",
                bt.base_interval, self.timeframes.short
            )));
        }

        for &interval in &bt.search_intervals_minutes {
            if interval == 0 || interval > MAX_WINDOW_MINUTES || interval % base != 0 {
                return Err(Error::Config(format!(
                    "search interval {}m is not a positive multiple of the base interval {}",
                    interval, bt.base_interval
                )));
            }
        }

        Ok(())
    }

    pub fn signal_cooldown(&self) -> chrono::Duration {
        window(self.signal_cooldown_minutes)
    }

    pub fn post_stop_cooldown(&self) -> chrono::Duration {
        window(self.post_stop_cooldown_minutes)
    }

    pub fn max_wait(&self) -> Option<chrono::Duration> {
        self.max_wait_minutes.map(window)
    }
}

/// Minutes as a duration, clamped for configs that skipped `validate`
fn window(minutes: u64) -> chrono::Duration {
    chrono::Duration::minutes(minutes.min(MAX_WINDOW_MINUTES) as i64)
}
