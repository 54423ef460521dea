/// Calculate Simple Moving Average (SMA) of the most recent `period` values
pub fn calculate_sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let sum: f64 = values.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Calculate the full Exponential Moving Average (EMA) series
///
/// Seeded with the SMA of the first `period` values. The returned series is
/// aligned with `values[period - 1..]`.
pub fn calculate_ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let Some(seed) = calculate_sma(&values[..period], period) else {
        return Vec::new();
    };
    let multiplier = 2.0 / (period as f64 + 1.0);

    let mut series = Vec::with_capacity(values.len() - period + 1);
    series.push(seed);

    let mut ema = seed;
    for value in &values[period..] {
        ema = (value - ema) * multiplier + ema;
        series.push(ema);
    }

    series
}

/// Calculate the latest Exponential Moving Average (EMA) value
pub fn calculate_ema(values: &[f64], period: usize) -> Option<f64> {
    calculate_ema_series(values, period).last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        assert_eq!(calculate_sma(&prices, 5), Some(104.0));
        assert_eq!(calculate_sma(&prices, 2), Some(107.0));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![100.0, 102.0];
        assert!(calculate_sma(&prices, 5).is_none());
    }

    #[test]
    fn test_ema_series_alignment() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        let series = calculate_ema_series(&prices, 5);

        // One seed value plus one per remaining price
        assert_eq!(series.len(), 2);
        assert_eq!(series[0], 104.0);
        assert!(series[1] > 104.0);
    }

    #[test]
    fn test_ema_tracks_constant_series() {
        let prices = vec![50.0; 30];
        assert_eq!(calculate_ema(&prices, 9), Some(50.0));
    }
}
