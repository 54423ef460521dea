// Technical indicators used by the vote provider
// Implements EMA, RSI, MACD, MFI and Supertrend on f64 series

pub mod macd;
pub mod mfi;
pub mod moving_average;
pub mod rsi;
pub mod supertrend;

pub use macd::{calculate_macd, Macd};
pub use mfi::calculate_mfi;
pub use moving_average::{calculate_ema, calculate_ema_series, calculate_sma};
pub use rsi::calculate_rsi;
pub use supertrend::{calculate_supertrend, TrendDirection};
