use crate::models::Candle;

/// Calculate Money Flow Index (MFI) for the final bar
///
/// Volume-weighted RSI over typical prices. Returns 50 when there was no
/// money flow in either direction.
pub fn calculate_mfi(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let typical: Vec<f64> = candles
        .iter()
        .map(|c| (c.high_f64() + c.low_f64() + c.close_f64()) / 3.0)
        .collect();

    let start = typical.len() - period;
    let mut positive_flow = 0.0;
    let mut negative_flow = 0.0;

    for i in start..typical.len() {
        let raw_flow = typical[i] * candles[i].volume_f64();
        if typical[i] > typical[i - 1] {
            positive_flow += raw_flow;
        } else if typical[i] < typical[i - 1] {
            negative_flow += raw_flow;
        }
    }

    if negative_flow == 0.0 {
        if positive_flow == 0.0 {
            return Some(50.0);
        }
        return Some(100.0);
    }

    let ratio = positive_flow / negative_flow;
    Some(100.0 - 100.0 / (1.0 + ratio))
}
