// Core modules
pub mod api;
pub mod backtest;
pub mod config;
pub mod error;
pub mod execution;
pub mod format;
pub mod indicators;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod persistence;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use config::BotConfig;
pub use error::Error;
pub use execution::{EngineEvent, TradingEngine};
pub use models::*;
pub use strategy::SignalProvider;

// Error handling
pub type Result<T> = std::result::Result<T, Error>;
