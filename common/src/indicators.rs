//! Technical indicators aligned to a candle series
//!
//! `IndicatorLibrary` is the capability the fusion pipeline consumes;
//! `StandardIndicators` is the reference implementation (EMA, Wilder RSI,
//! MACD histogram, Wilder ATR, Fibonacci retracements and fractal
//! support/resistance levels).

use crate::candle::{Candle, CandleSeries};
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

const FIB_RATIOS: [f64; 7] = [0.0, 0.236, 0.382, 0.5, 0.618, 0.786, 1.0];

/// Indicator values for one series.
///
/// Every per-bar vector has the same length as the series it was computed
/// from; `None` marks bars inside an indicator's warm-up period.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorBundle {
    pub ema_fast: Vec<Option<f64>>,
    pub ema_mid: Vec<Option<f64>>,
    pub ema_slow: Vec<Option<f64>>,
    pub rsi: Vec<Option<f64>>,
    pub macd_histogram: Vec<Option<f64>>,
    pub atr: Vec<Option<f64>>,
    /// Retracement prices, ascending
    pub fib_levels: Vec<f64>,
    /// Support/resistance prices, ascending
    pub sr_levels: Vec<f64>,
}

impl IndicatorBundle {
    /// A bundle with no values at all, for `len` bars.
    pub fn empty(len: usize) -> Self {
        Self {
            ema_fast: vec![None; len],
            ema_mid: vec![None; len],
            ema_slow: vec![None; len],
            rsi: vec![None; len],
            macd_histogram: vec![None; len],
            atr: vec![None; len],
            fib_levels: Vec::new(),
            sr_levels: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.atr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atr.is_empty()
    }

    pub fn ema_fast_at(&self, i: usize) -> Option<f64> {
        value_at(&self.ema_fast, i)
    }

    pub fn ema_mid_at(&self, i: usize) -> Option<f64> {
        value_at(&self.ema_mid, i)
    }

    pub fn ema_slow_at(&self, i: usize) -> Option<f64> {
        value_at(&self.ema_slow, i)
    }

    pub fn rsi_at(&self, i: usize) -> Option<f64> {
        value_at(&self.rsi, i)
    }

    pub fn macd_histogram_at(&self, i: usize) -> Option<f64> {
        value_at(&self.macd_histogram, i)
    }

    pub fn atr_at(&self, i: usize) -> Option<f64> {
        value_at(&self.atr, i)
    }
}

fn value_at(values: &[Option<f64>], i: usize) -> Option<f64> {
    values.get(i).copied().flatten().filter(|v| v.is_finite())
}

/// Anything able to turn a series into an [`IndicatorBundle`].
pub trait IndicatorLibrary: Send + Sync {
    fn compute(&self, series: &CandleSeries) -> EngineResult<IndicatorBundle>;
}

/// Periods and level-detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    #[serde(default = "default_ema_fast")]
    pub ema_fast: usize,
    #[serde(default = "default_ema_mid")]
    pub ema_mid: usize,
    #[serde(default = "default_ema_slow")]
    pub ema_slow: usize,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    /// Bars scanned for the swing high/low anchoring the retracements
    #[serde(default = "default_fib_lookback")]
    pub fib_lookback: usize,
    /// Bars on each side a fractal pivot must dominate
    #[serde(default = "default_pivot_strength")]
    pub pivot_strength: usize,
    /// Pivots closer than this fraction of price collapse into one level
    #[serde(default = "default_level_merge_pct")]
    pub level_merge_pct: f64,
}

fn default_ema_fast() -> usize {
    9
}
fn default_ema_mid() -> usize {
    21
}
fn default_ema_slow() -> usize {
    50
}
fn default_rsi_period() -> usize {
    14
}
fn default_macd_fast() -> usize {
    12
}
fn default_macd_slow() -> usize {
    26
}
fn default_macd_signal() -> usize {
    9
}
fn default_atr_period() -> usize {
    14
}
fn default_fib_lookback() -> usize {
    100
}
fn default_pivot_strength() -> usize {
    2
}
fn default_level_merge_pct() -> f64 {
    0.003
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ema_fast: default_ema_fast(),
            ema_mid: default_ema_mid(),
            ema_slow: default_ema_slow(),
            rsi_period: default_rsi_period(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
            atr_period: default_atr_period(),
            fib_lookback: default_fib_lookback(),
            pivot_strength: default_pivot_strength(),
            level_merge_pct: default_level_merge_pct(),
        }
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> EngineResult<()> {
        let periods = [
            ("ema_fast", self.ema_fast),
            ("ema_mid", self.ema_mid),
            ("ema_slow", self.ema_slow),
            ("rsi_period", self.rsi_period),
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("macd_signal", self.macd_signal),
            ("atr_period", self.atr_period),
            ("fib_lookback", self.fib_lookback),
            ("pivot_strength", self.pivot_strength),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, p)| *p == 0) {
            return Err(EngineError::config(format!("indicator period {} must be positive", name)));
        }
        if self.macd_fast >= self.macd_slow {
            return Err(EngineError::config(format!(
                "macd_fast ({}) must be shorter than macd_slow ({})",
                self.macd_fast, self.macd_slow
            )));
        }
        if !(0.0..1.0).contains(&self.level_merge_pct) {
            return Err(EngineError::config(format!(
                "level_merge_pct must be in [0, 1), got {}",
                self.level_merge_pct
            )));
        }
        Ok(())
    }
}

/// Reference indicator computation
#[derive(Debug, Clone)]
pub struct StandardIndicators {
    config: IndicatorConfig,
}

impl StandardIndicators {
    pub fn new(config: IndicatorConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }
}

impl Default for StandardIndicators {
    fn default() -> Self {
        Self {
            config: IndicatorConfig::default(),
        }
    }
}

impl IndicatorLibrary for StandardIndicators {
    fn compute(&self, series: &CandleSeries) -> EngineResult<IndicatorBundle> {
        if series.is_empty() {
            return Err(EngineError::InvalidSeries(format!(
                "{} {}: cannot compute indicators on an empty series",
                series.symbol(),
                series.timeframe()
            )));
        }

        let cfg = &self.config;
        let closes = series.closes();
        let candles = series.candles();

        let macd_fast = ema(&closes, cfg.macd_fast);
        let macd_slow = ema(&closes, cfg.macd_slow);
        let macd_line: Vec<Option<f64>> = macd_fast
            .iter()
            .zip(&macd_slow)
            .map(|(f, s)| Some((*f)? - (*s)?))
            .collect();
        let signal = ema_of_optional(&macd_line, cfg.macd_signal);
        let macd_histogram = macd_line
            .iter()
            .zip(&signal)
            .map(|(m, s)| Some((*m)? - (*s)?))
            .collect();

        let bundle = IndicatorBundle {
            ema_fast: ema(&closes, cfg.ema_fast),
            ema_mid: ema(&closes, cfg.ema_mid),
            ema_slow: ema(&closes, cfg.ema_slow),
            rsi: rsi(&closes, cfg.rsi_period),
            macd_histogram,
            atr: atr(candles, cfg.atr_period),
            fib_levels: fibonacci_levels(candles, cfg.fib_lookback),
            sr_levels: support_resistance(candles, cfg.pivot_strength, cfg.level_merge_pct),
        };

        tracing::debug!(
            symbol = %series.symbol(),
            timeframe = %series.timeframe(),
            bars = series.len(),
            sr_levels = bundle.sr_levels.len(),
            "Computed indicators"
        );

        Ok(bundle)
    }
}

/// EMA with α = 2/(n+1), seeded with the simple mean of the first n values.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut current = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(current);

    for (i, v) in values.iter().enumerate().skip(period) {
        current = alpha * v + (1.0 - alpha) * current;
        out[i] = Some(current);
    }
    out
}

/// EMA over a series whose leading values may be missing (e.g. the MACD line).
fn ema_of_optional(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let start = match values.iter().position(Option::is_some) {
        Some(start) => start,
        None => return vec![None; values.len()],
    };
    let dense: Vec<f64> = values[start..].iter().map(|v| v.unwrap_or(0.0)).collect();

    let mut out = vec![None; start];
    out.extend(ema(&dense, period));
    out
}

/// RSI with Wilder smoothing of average gain and loss.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let mut avg_gain = changes[..period].iter().map(|c| c.max(0.0)).sum::<f64>() / period as f64;
    let mut avg_loss = changes[..period].iter().map(|c| (-c).max(0.0)).sum::<f64>() / period as f64;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    let w = period as f64;
    for (offset, change) in changes.iter().enumerate().skip(period) {
        avg_gain = (avg_gain * (w - 1.0) + change.max(0.0)) / w;
        avg_loss = (avg_loss * (w - 1.0) + (-change).max(0.0)) / w;
        out[offset + 1] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// ATR with Wilder smoothing; the first true range is the bar's own range.
pub fn atr(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; candles.len()];
    if period == 0 || candles.len() < period {
        return out;
    }

    let true_ranges: Vec<f64> = candles
        .iter()
        .enumerate()
        .map(|(i, c)| match i.checked_sub(1).map(|p| candles[p].close) {
            Some(prev_close) => c
                .range()
                .max((c.high - prev_close).abs())
                .max((c.low - prev_close).abs()),
            None => c.range(),
        })
        .collect();

    let w = period as f64;
    let mut current = true_ranges[..period].iter().sum::<f64>() / w;
    out[period - 1] = Some(current);
    for (i, tr) in true_ranges.iter().enumerate().skip(period) {
        current = (current * (w - 1.0) + tr) / w;
        out[i] = Some(current);
    }
    out
}

/// Retracement levels between the swing high and low of the last `lookback` bars.
///
/// Measured down from the high when the high came last, up from the low otherwise.
pub fn fibonacci_levels(candles: &[Candle], lookback: usize) -> Vec<f64> {
    let start = candles.len().saturating_sub(lookback);
    let window = &candles[start..];

    let high = window
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.high.total_cmp(&b.1.high));
    let low = window
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.low.total_cmp(&b.1.low));

    let ((hi_idx, hi), (lo_idx, lo)) = match (high, low) {
        (Some(h), Some(l)) => ((h.0, h.1.high), (l.0, l.1.low)),
        _ => return Vec::new(),
    };
    let span = hi - lo;
    if span <= 0.0 {
        return Vec::new();
    }

    let mut levels: Vec<f64> = FIB_RATIOS
        .iter()
        .map(|r| if hi_idx >= lo_idx { hi - span * r } else { lo + span * r })
        .collect();
    levels.sort_by(f64::total_cmp);
    levels
}

/// Fractal pivot highs and lows, merged when within `merge_pct` of each other.
pub fn support_resistance(candles: &[Candle], strength: usize, merge_pct: f64) -> Vec<f64> {
    if strength == 0 || candles.len() < 2 * strength + 1 {
        return Vec::new();
    }

    let mut pivots = Vec::new();
    for i in strength..candles.len() - strength {
        let neighbours = candles[i - strength..=i + strength]
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != strength);

        let (mut is_high, mut is_low) = (true, true);
        for (_, other) in neighbours {
            is_high &= candles[i].high > other.high;
            is_low &= candles[i].low < other.low;
        }
        if is_high {
            pivots.push(candles[i].high);
        }
        if is_low {
            pivots.push(candles[i].low);
        }
    }
    pivots.sort_by(f64::total_cmp);

    let mut levels: Vec<f64> = Vec::new();
    let mut cluster: Vec<f64> = Vec::new();
    for price in pivots {
        if let Some(&anchor) = cluster.first() {
            if (price - anchor).abs() > anchor.abs() * merge_pct {
                levels.push(cluster.iter().sum::<f64>() / cluster.len() as f64);
                cluster.clear();
            }
        }
        cluster.push(price);
    }
    if !cluster.is_empty() {
        levels.push(cluster.iter().sum::<f64>() / cluster.len() as f64);
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle::Timeframe;
    use crate::fixtures;

    #[test]
    fn test_ema_of_constant_is_constant() {
        let values = vec![5.0; 20];
        let out = ema(&values, 9);
        assert!(out[7].is_none());
        assert!(out[8..].iter().all(|v| (v.unwrap() - 5.0).abs() < 1e-12));
    }

    #[test]
    fn test_ema_tracks_rising_prices() {
        let values: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let fast = ema(&values, 5);
        let slow = ema(&values, 20);
        assert!(fast[29].unwrap() > slow[29].unwrap());
        assert!(fast[29].unwrap() < 29.0);
    }

    #[test]
    fn test_rsi_bounds() {
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&rising, 14);
        assert!(out[13].is_none());
        assert_eq!(out[14], Some(100.0));

        let falling: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let out = rsi(&falling, 14);
        assert_eq!(out[29], Some(0.0));

        let flat = vec![100.0; 30];
        assert_eq!(rsi(&flat, 14)[20], Some(50.0));
    }

    #[test]
    fn test_atr_of_constant_range() {
        let series = fixtures::series_from(
            "BTCUSDT",
            Timeframe::H1,
            &vec![(100.0, 101.0, 99.0, 100.0, 10.0); 20],
        )
        .unwrap();
        let out = atr(series.candles(), 14);
        assert!(out[12].is_none());
        assert!((out[13].unwrap() - 2.0).abs() < 1e-12);
        assert!((out[19].unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_bundle_is_aligned_with_series() {
        let series = fixtures::trending_series("BTCUSDT", Timeframe::H1, 80).unwrap();
        let bundle = StandardIndicators::default().compute(&series).unwrap();

        assert_eq!(bundle.len(), 80);
        assert_eq!(bundle.ema_slow.len(), 80);
        assert!(bundle.ema_slow_at(48).is_none());
        assert!(bundle.ema_slow_at(49).is_some());
        // MACD line starts at 25, signal needs 9 more values
        assert!(bundle.macd_histogram_at(32).is_none());
        assert!(bundle.macd_histogram_at(33).is_some());
        assert!(bundle.atr_at(79).unwrap() > 0.0);
        assert!(bundle.rsi_at(79).unwrap() > 50.0);
    }

    #[test]
    fn test_fibonacci_levels_span_swing() {
        let series = fixtures::trending_series("BTCUSDT", Timeframe::H1, 40).unwrap();
        let levels = fibonacci_levels(series.candles(), 100);
        let high = series.candles().iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let low = series.candles().iter().map(|c| c.low).fold(f64::MAX, f64::min);

        assert_eq!(levels.len(), FIB_RATIOS.len());
        assert!((levels[0] - low).abs() < 1e-9);
        assert!((levels[6] - high).abs() < 1e-9);
        assert!(levels.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_support_resistance_merges_nearby_pivots() {
        let bars = [
            (10.0, 10.5, 9.5, 10.0, 1.0),
            (10.0, 11.0, 9.6, 10.5, 1.0),
            (10.5, 12.0, 10.0, 11.5, 1.0),
            (11.5, 11.2, 10.4, 10.8, 1.0),
            (10.8, 11.0, 10.6, 10.9, 1.0),
            (10.9, 12.01, 10.7, 11.8, 1.0),
            (11.8, 11.5, 10.9, 11.0, 1.0),
            (11.0, 11.3, 10.8, 11.1, 1.0),
        ];
        let bars: Vec<_> = bars
            .iter()
            .map(|&(o, h, l, c, v): &(f64, f64, f64, f64, f64)| (o, h.max(o.max(c)), l.min(o.min(c)), c, v))
            .collect();
        let series = fixtures::series_from("BTCUSDT", Timeframe::H1, &bars).unwrap();

        let levels = support_resistance(series.candles(), 2, 0.003);
        let near_twelve: Vec<_> = levels.iter().filter(|l| (**l - 12.0).abs() < 0.1).collect();
        assert_eq!(near_twelve.len(), 1);
        assert!((near_twelve[0] - 12.005).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = IndicatorConfig {
            macd_fast: 30,
            ..Default::default()
        };
        assert!(StandardIndicators::new(config).unwrap_err().is_configuration());
    }
}
