//! Deterministic candle series for tests and demos.
//!
//! All series start at 2024-01-01T00:00:00Z so repeated runs produce
//! identical timestamps (and therefore identical signal fingerprints).

use crate::candle::{Candle, CandleSeries, Timeframe};
use crate::error::EngineResult;
use chrono::{DateTime, Duration, Utc};

pub fn base_time() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(1_704_067_200)
}

/// Build a series from (open, high, low, close, volume) tuples, one timeframe apart.
pub fn series_from(
    symbol: &str,
    timeframe: Timeframe,
    bars: &[(f64, f64, f64, f64, f64)],
) -> EngineResult<CandleSeries> {
    let step = timeframe.duration();
    let candles = bars
        .iter()
        .enumerate()
        .map(|(i, &(open, high, low, close, volume))| Candle {
            timestamp: base_time() + step * i as i32,
            open,
            high,
            low,
            close,
            volume,
        })
        .collect();
    CandleSeries::new(symbol, timeframe, candles)
}

/// Gently rising closes with a small oscillation.
pub fn trending_series(symbol: &str, timeframe: Timeframe, len: usize) -> EngineResult<CandleSeries> {
    let bars: Vec<_> = (0..len)
        .map(|i| {
            let base = 100.0 + i as f64 * 0.5 + ((i % 5) as f64 - 2.0) * 0.3;
            (
                base - 0.2,
                base + 0.8,
                base - 0.8,
                base + 0.2,
                1000.0 + (i % 7) as f64 * 50.0,
            )
        })
        .collect();
    series_from(symbol, timeframe, &bars)
}

/// Oscillation wide enough to leave fractal pivots behind a drift of 0.25 per bar
fn swing(i: usize) -> f64 {
    (i as f64 * 0.7).sin() * 1.5
}

/// A pullback ending in a high-volume bullish engulfing bar.
pub fn bullish_engulfing_series(symbol: &str, timeframe: Timeframe, len: usize) -> EngineResult<CandleSeries> {
    let len = len.max(4);
    let mut bars: Vec<_> = (0..len - 2)
        .map(|i| {
            let base = 120.0 - i as f64 * 0.25 + swing(i);
            (base + 0.1, base + 0.6, base - 0.6, base - 0.1, 1000.0)
        })
        .collect();
    let last_close = bars.last().map(|b| b.3).unwrap_or(120.0);

    // small bearish bar, then a bullish bar whose body swallows it
    let o1 = last_close;
    let c1 = o1 - 0.5;
    bars.push((o1, o1 + 0.1, c1 - 0.1, c1, 900.0));
    let o2 = c1 - 0.1;
    let c2 = o1 + 0.6;
    bars.push((o2, c2 + 0.05, o2 - 0.05, c2, 2600.0));

    series_from(symbol, timeframe, &bars)
}

/// A rally ending in a high-volume bearish engulfing bar.
pub fn bearish_engulfing_series(symbol: &str, timeframe: Timeframe, len: usize) -> EngineResult<CandleSeries> {
    let len = len.max(4);
    let mut bars: Vec<_> = (0..len - 2)
        .map(|i| {
            let base = 80.0 + i as f64 * 0.25 - swing(i);
            (base - 0.1, base + 0.6, base - 0.6, base + 0.1, 1000.0)
        })
        .collect();
    let last_close = bars.last().map(|b| b.3).unwrap_or(80.0);

    let o1 = last_close;
    let c1 = o1 + 0.5;
    bars.push((o1, c1 + 0.1, o1 - 0.1, c1, 900.0));
    let o2 = c1 + 0.1;
    let c2 = o1 - 0.6;
    bars.push((o2, o2 + 0.05, c2 - 0.05, c2, 2600.0));

    series_from(symbol, timeframe, &bars)
}
