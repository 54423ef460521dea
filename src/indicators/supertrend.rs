// Supertrend indicator
//
// ATR bands around the bar midpoint (Wilder smoothing, same as RSI). The
// trend flips up when the close breaks above the upper band and down
// when it breaks below the lower band.

use crate::models::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Up,
    Down,
}

/// True ranges aligned with `candles[1..]`
fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|w| {
            let high = w[1].high_f64();
            let low = w[1].low_f64();
            let prev_close = w[0].close_f64();

            (high - low)
                .max((high - prev_close).abs())
                .max((low - prev_close).abs())
        })
        .collect()
}

/// Direction of the Supertrend on the final bar
pub fn calculate_supertrend(
    candles: &[Candle],
    period: usize,
    multiplier: f64,
) -> Option<TrendDirection> {
    if period == 0 || candles.len() < period + 2 {
        return None;
    }

    let trs = true_ranges(candles);
    let mut atr = trs[..period].iter().sum::<f64>() / period as f64;

    // First band uses the bar that completes the ATR seed
    let first = &candles[period];
    let mid = (first.high_f64() + first.low_f64()) / 2.0;
    let mut upper = mid + multiplier * atr;
    let mut lower = mid - multiplier * atr;
    let mut trend = if first.close_f64() >= mid {
        TrendDirection::Up
    } else {
        TrendDirection::Down
    };

    for i in (period + 1)..candles.len() {
        atr = (atr * (period as f64 - 1.0) + trs[i - 1]) / period as f64;

        let candle = &candles[i];
        let prev_close = candles[i - 1].close_f64();
        let close = candle.close_f64();
        let mid = (candle.high_f64() + candle.low_f64()) / 2.0;
        let basic_upper = mid + multiplier * atr;
        let basic_lower = mid - multiplier * atr;

        upper = if basic_upper < upper || prev_close > upper {
            basic_upper
        } else {
            upper
        };
        lower = if basic_lower > lower || prev_close < lower {
            basic_lower
        } else {
            lower
        };

        trend = match trend {
            TrendDirection::Up if close < lower => TrendDirection::Down,
            TrendDirection::Down if close > upper => TrendDirection::Up,
            unchanged => unchanged,
        };
    }

    Some(trend)
}
