use anyhow::Context;
use clap::Parser;
use signalbot::api::BinanceClient;
use signalbot::monitor::{spawn_shutdown_listener, wait_for_shutdown, LiveMonitor};
use signalbot::notify::{LogNotifier, Notifier, TelegramNotifier};
use signalbot::persistence::JsonStateStore;
use signalbot::strategy::{IndicatorConfig, IndicatorVoteProvider};
use signalbot::BotConfig;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "signalbot", about = "Multi-timeframe signal monitor")]
struct Args {
    /// Configuration file (TOML); missing file falls back to defaults
    #[arg(short, long, default_value = "signalbot.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let config = BotConfig::load(Some(&args.config)).context("Invalid configuration")?;

    tracing::info!("🚀 SignalBot starting");
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Symbols: {}", config.symbols.join(", "));
    tracing::info!(
        "  Timeframes: {}/{}/{}",
        config.timeframes.short,
        config.timeframes.mid,
        config.timeframes.long
    );
    tracing::info!("  Balance: ${}", config.initial_balance);
    tracing::info!(
        "  Target/Stop: {}% / {}%",
        config.target_pct * rust_decimal::Decimal::ONE_HUNDRED,
        config.stop_pct * rust_decimal::Decimal::ONE_HUNDRED
    );
    tracing::info!("  Leverage cap: {}x", config.leverage_cap);

    let market = Arc::new(
        BinanceClient::new(&config.binance_base_url).context("Failed to build Binance client")?,
    );
    let provider = Arc::new(IndicatorVoteProvider::new(IndicatorConfig::default()));
    let notifier = create_notifier(&config)?;
    let store = Box::new(JsonStateStore::new(&config.state_path));
    tracing::info!("  State file: {}", store.path().display());

    let shutdown = spawn_shutdown_listener(tokio::signal::ctrl_c());

    let mut monitor = LiveMonitor::new(config, market, provider, notifier, store);
    monitor.restore().await.context("Failed to restore saved state")?;

    tracing::info!("\nPress Ctrl+C to stop...\n");

    let summary = monitor.run(wait_for_shutdown(shutdown)).await;

    summary.print_report("SESSION SUMMARY");
    tracing::info!("👋 SignalBot stopped");
    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("signalbot=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn create_notifier(config: &BotConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    match (&config.telegram.bot_token, &config.telegram.chat_id) {
        (Some(token), Some(chat_id)) => {
            tracing::info!("  Notifications: Telegram");
            let notifier = TelegramNotifier::new(token.clone(), chat_id.clone())
                .context("Failed to build Telegram client")?;
            Ok(Arc::new(notifier))
        }
        _ => {
            tracing::info!("  Notifications: log only (telegram not configured)");
            Ok(Arc::new(LogNotifier))
        }
    }
}
