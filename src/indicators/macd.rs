use super::moving_average::calculate_ema_series;

/// Latest MACD values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
}

impl Macd {
    pub fn histogram(&self) -> f64 {
        self.line - self.signal
    }
}

/// Calculate MACD line and signal line for the final bar
///
/// Line = EMA(fast) - EMA(slow), signal = EMA(signal_period) of the line.
pub fn calculate_macd(
    prices: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Option<Macd> {
    if fast == 0 || fast >= slow || prices.len() < slow + signal_period - 1 {
        return None;
    }

    let fast_ema = calculate_ema_series(prices, fast);
    let slow_ema = calculate_ema_series(prices, slow);

    // fast_ema starts at prices[fast - 1], slow_ema at prices[slow - 1]
    let offset = slow - fast;
    let line: Vec<f64> = slow_ema
        .iter()
        .zip(fast_ema.iter().skip(offset))
        .map(|(slow, fast)| fast - slow)
        .collect();

    let signal = calculate_ema_series(&line, signal_period);

    Some(Macd {
        line: *line.last()?,
        signal: *signal.last()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macd_positive_in_uptrend() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * (1.0 + i as f64 * 0.05)).collect();
        let macd = calculate_macd(&prices, 12, 26, 9).unwrap();

        assert!(macd.line > 0.0);
        assert!(macd.histogram() > 0.0);
    }

    #[test]
    fn test_macd_negative_in_downtrend() {
        let prices: Vec<f64> = (0..60).map(|i| 500.0 - i as f64 * (1.0 + i as f64 * 0.05)).collect();
        let macd = calculate_macd(&prices, 12, 26, 9).unwrap();

        assert!(macd.line < 0.0);
        assert!(macd.histogram() < 0.0);
    }

    #[test]
    fn test_macd_insufficient_data() {
        let prices = vec![100.0; 30];
        assert!(calculate_macd(&prices, 12, 26, 9).is_none());
    }
}
