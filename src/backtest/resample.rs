use crate::models::{Candle, Timeframe};
use chrono::{DateTime, TimeZone, Utc};

/// Open time of the `timeframe` bucket containing `timestamp`
pub fn bucket_start(timestamp: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
    let width = timeframe.minutes() * 60;
    let secs = timestamp.timestamp();
    let start = secs - secs.rem_euclid(width);
    Utc.timestamp_opt(start, 0).single().unwrap_or(timestamp)
}

/// Aggregate base-interval candles into `target` candles
///
/// A leading bucket that is missing bars (series starting mid-bucket) is
/// dropped; later gaps are kept as shorter bars, as the exchange reports them.
pub fn resample(candles: &[Candle], base: Timeframe, target: Timeframe) -> Vec<Candle> {
    if target <= base {
        return candles.to_vec();
    }

    let expected = (target.minutes() / base.minutes()) as usize;
    let mut out: Vec<Candle> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();

    for candle in candles {
        let start = bucket_start(candle.timestamp, target);

        match out.last_mut() {
            Some(bar) if bar.timestamp == start => {
                bar.high = bar.high.max(candle.high);
                bar.low = bar.low.min(candle.low);
                bar.close = candle.close;
                bar.volume += candle.volume;
                if let Some(count) = counts.last_mut() {
                    *count += 1;
                }
            }
            _ => {
                out.push(Candle {
                    timestamp: start,
                    ..candle.clone()
                });
                counts.push(1);
            }
        }
    }

    if counts.first().is_some_and(|&c| c < expected) {
        out.remove(0);
    }

    out
}

/// Prefix of `series` whose bars have fully closed by `now`
pub fn closed_bars(series: &[Candle], timeframe: Timeframe, now: DateTime<Utc>) -> &[Candle] {
    let end = series.partition_point(|c| c.timestamp + timeframe.duration() <= now);
    &series[..end]
}
