use anyhow::Context;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use clap::Parser;
use signalbot::api::BinanceClient;
use signalbot::backtest::{BacktestRunner, MarketScenario, SyntheticDataGenerator};
use signalbot::strategy::{IndicatorConfig, IndicatorVoteProvider};
use signalbot::{BotConfig, Candle, Timeframe};

#[derive(Parser, Debug)]
#[command(name = "backtest", about = "Replay history and sweep the signal re-check interval")]
struct Args {
    /// Configuration file (TOML); missing file falls back to defaults
    #[arg(short, long, default_value = "signalbot.toml")]
    config: String,

    /// Symbol to replay (defaults to the first configured symbol)
    #[arg(short, long)]
    symbol: Option<String>,

    /// First day to replay (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Day after the last replayed day (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Interval of the replayed candles (e.g. 15m)
    #[arg(long)]
    base_interval: Option<Timeframe>,

    /// Candidate re-check intervals in minutes, comma separated
    #[arg(long, value_delimiter = ',')]
    intervals: Vec<u64>,

    /// Use generated data instead of Binance (uptrend, downtrend, sideways, volatile, reversal)
    #[arg(long)]
    synthetic: Option<MarketScenario>,

    /// Number of synthetic candles
    #[arg(long, default_value_t = 4000)]
    candles: usize,

    /// Seed for synthetic data
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Opening price of synthetic data
    #[arg(long, default_value_t = 150.0)]
    base_price: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("signalbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = apply_overrides(
        BotConfig::load(Some(&args.config)).context("Invalid configuration")?,
        &args,
    )?;

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║            SIGNALBOT BACKTESTING SUITE                ║");
    println!("╚═══════════════════════════════════════════════════════╝");

    let symbol = args
        .symbol
        .clone()
        .or_else(|| config.symbols.first().cloned())
        .context("No symbol to replay")?;

    let candles = load_candles(&config, &args, &symbol).await?;
    println!(
        "\n📥 {} {} candles for {} ({} → {})",
        candles.len(),
        config.backtest.base_interval,
        symbol,
        candles.first().map(|c| c.timestamp.to_string()).unwrap_or_default(),
        candles.last().map(|c| c.timestamp.to_string()).unwrap_or_default()
    );

    let runner = BacktestRunner::new(config, IndicatorVoteProvider::new(IndicatorConfig::default()));
    let report = runner
        .sweep(&symbol, &candles, &runner.config().backtest.search_intervals_minutes)
        .context("Backtest failed")?;

    if let Some(best) = report.best() {
        best.summary.print_report(&format!(
            "BEST: {} @ {}m RE-CHECK",
            symbol, best.recheck_interval_minutes
        ));
    }
    report.print_comparison();

    Ok(())
}

/// Command-line flags take precedence over the config file
fn apply_overrides(mut config: BotConfig, args: &Args) -> anyhow::Result<BotConfig> {
    if let Some(start) = args.start {
        config.backtest.start = Some(start);
    }
    if let Some(end) = args.end {
        config.backtest.end = Some(end);
    }
    if let Some(base) = args.base_interval {
        config.backtest.base_interval = base;
    }
    if !args.intervals.is_empty() {
        config.backtest.search_intervals_minutes = args.intervals.clone();
    }

    config.validate().context("Invalid backtest options")?;
    Ok(config)
}

async fn load_candles(config: &BotConfig, args: &Args, symbol: &str) -> anyhow::Result<Vec<Candle>> {
    let base = config.backtest.base_interval;

    if let Some(scenario) = args.synthetic {
        let start = config
            .backtest
            .start
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Utc.from_utc_datetime(&dt))
            .unwrap_or_else(|| Utc::now() - base.duration() * args.candles as i32);

        println!("\n🧪 Synthetic {:?} data (seed {})", scenario, args.seed);
        return Ok(SyntheticDataGenerator::new(args.seed)
            .with_base_price(args.base_price)
            .generate(
            scenario,
            symbol,
            args.candles,
            base,
            start,
        ));
    }

    let end = config
        .backtest
        .end
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .unwrap_or_else(Utc::now);
    let start = config
        .backtest
        .start
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .unwrap_or_else(|| end - Duration::days(30));

    let client = BinanceClient::new(&config.binance_base_url)?;
    let candles = client
        .fetch_range(symbol, base, start, end)
        .await
        .with_context(|| format!("Failed to load {} history", symbol))?;

    Ok(candles)
}
