use super::SignalProvider;
use crate::indicators::{
    calculate_ema, calculate_macd, calculate_mfi, calculate_rsi, calculate_supertrend,
    TrendDirection,
};
use crate::models::{Candle, Timeframe, Vote};
use crate::{Error, Result};

/// Indicator periods for vote generation
#[derive(Debug, Clone)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub supertrend_period: usize,
    pub supertrend_multiplier: f64,
    pub mfi_period: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            supertrend_period: 10,
            supertrend_multiplier: 3.0,
            mfi_period: 14,
            ema_fast: 9,
            ema_slow: 21,
        }
    }
}

/// Confluence of RSI, MACD, Supertrend, MFI and EMA crossover
///
/// Each indicator casts +1 (buy), -1 (sell) or 0 on the final bar. A zero
/// total falls back to the MACD line vs signal line comparison, so the
/// provider never hands a neutral vote to the aggregator.
#[derive(Debug, Clone, Default)]
pub struct IndicatorVoteProvider {
    config: IndicatorConfig,
}

impl IndicatorVoteProvider {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    fn score_above_midline(value: f64) -> i32 {
        if value > 50.0 {
            1
        } else if value < 50.0 {
            -1
        } else {
            0
        }
    }

    fn score_sign(value: f64) -> i32 {
        if value > 0.0 {
            1
        } else if value < 0.0 {
            -1
        } else {
            0
        }
    }
}

impl SignalProvider for IndicatorVoteProvider {
    fn vote(&self, symbol: &str, candles: &[Candle], timeframe: Timeframe) -> Result<Vote> {
        if candles.len() < self.min_candles_required() {
            return Err(Error::data_unavailable(
                symbol,
                format!(
                    "{} has {} candles, need {}",
                    timeframe,
                    candles.len(),
                    self.min_candles_required()
                ),
            ));
        }

        let cfg = &self.config;
        let closes: Vec<f64> = candles.iter().map(|c| c.close_f64()).collect();
        if closes.iter().any(|c| !c.is_finite()) {
            return Err(Error::computation(symbol, "non-finite close price"));
        }

        let missing = |name: &str| Error::computation(symbol, format!("{} unavailable", name));

        let rsi = calculate_rsi(&closes, cfg.rsi_period).ok_or_else(|| missing("RSI"))?;
        let macd = calculate_macd(&closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal)
            .ok_or_else(|| missing("MACD"))?;
        let trend = calculate_supertrend(candles, cfg.supertrend_period, cfg.supertrend_multiplier)
            .ok_or_else(|| missing("Supertrend"))?;
        let mfi = calculate_mfi(candles, cfg.mfi_period).ok_or_else(|| missing("MFI"))?;
        let ema_fast = calculate_ema(&closes, cfg.ema_fast).ok_or_else(|| missing("EMA"))?;
        let ema_slow = calculate_ema(&closes, cfg.ema_slow).ok_or_else(|| missing("EMA"))?;

        if ![rsi, macd.line, macd.signal, mfi, ema_fast, ema_slow]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(Error::computation(symbol, "indicator produced a non-finite value"));
        }

        let score = Self::score_above_midline(rsi)
            + Self::score_sign(macd.histogram())
            + match trend {
                TrendDirection::Up => 1,
                TrendDirection::Down => -1,
            }
            + Self::score_above_midline(mfi)
            + Self::score_sign(ema_fast - ema_slow);

        let vote = match score.signum() {
            1 => Vote::Buy,
            -1 => Vote::Sell,
            // Neutral on the final bar: fall back to MACD line vs signal line
            _ => {
                if macd.line - macd.signal > 0.0 {
                    Vote::Buy
                } else {
                    Vote::Sell
                }
            }
        };

        tracing::debug!(
            symbol,
            %timeframe,
            rsi,
            macd_hist = macd.histogram(),
            ?trend,
            mfi,
            score,
            %vote,
            "Computed timeframe vote"
        );

        Ok(vote)
    }

    fn min_candles_required(&self) -> usize {
        let cfg = &self.config;
        (cfg.macd_slow + cfg.macd_signal)
            .max(cfg.rsi_period + 1)
            .max(cfg.mfi_period + 1)
            .max(cfg.supertrend_period + 2)
            .max(cfg.ema_slow)
    }

    fn name(&self) -> &str {
        "IndicatorVoteProvider"
    }
}
