// Pattern Detection
// Rule-based candlestick detector producing raw candidates for the fusion pipeline

use common::{Candle, CandleSeries, EngineError, EngineResult, PatternCandidate, Polarity, StrategyKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Anything that turns a series into pattern candidates
pub trait PatternDetector: Send + Sync {
    fn name(&self) -> &str;

    /// Candidates completing on the most recent bar of `series`
    fn detect(&self, series: &CandleSeries) -> Vec<PatternCandidate>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandlestickConfig {
    /// Bars whose range a breakout close must exceed
    #[serde(default = "default_breakout_lookback")]
    pub breakout_lookback: usize,
    /// Bars used to judge the trend preceding a reversal
    #[serde(default = "default_trend_lookback")]
    pub trend_lookback: usize,
    /// Long shadow to body multiple for hammers and shooting stars
    #[serde(default = "default_shadow_multiple")]
    pub shadow_multiple: f64,
    /// Bodies smaller than this share of the range are dojis and ignored
    #[serde(default = "default_min_body_ratio")]
    pub min_body_ratio: f64,
}

fn default_breakout_lookback() -> usize {
    20
}
fn default_trend_lookback() -> usize {
    5
}
fn default_shadow_multiple() -> f64 {
    2.0
}
fn default_min_body_ratio() -> f64 {
    0.05
}

impl Default for CandlestickConfig {
    fn default() -> Self {
        Self {
            breakout_lookback: default_breakout_lookback(),
            trend_lookback: default_trend_lookback(),
            shadow_multiple: default_shadow_multiple(),
            min_body_ratio: default_min_body_ratio(),
        }
    }
}

impl CandlestickConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.breakout_lookback == 0 || self.trend_lookback == 0 {
            return Err(EngineError::config("pattern lookbacks must be positive"));
        }
        if !(self.shadow_multiple > 0.0) || !(0.0..1.0).contains(&self.min_body_ratio) {
            return Err(EngineError::config(format!(
                "invalid shadow_multiple {} or min_body_ratio {}",
                self.shadow_multiple, self.min_body_ratio
            )));
        }
        Ok(())
    }
}

/// Engulfing, hammer, shooting star and range breakout on the last bar
pub struct CandlestickDetector {
    config: CandlestickConfig,
}

impl CandlestickDetector {
    pub fn new(config: CandlestickConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    fn engulfing(&self, prev: &Candle, cur: &Candle) -> Option<(&'static str, Polarity, f64)> {
        let opposite = prev.is_bullish() != cur.is_bullish() && prev.body() > 0.0 && cur.body() > 0.0;
        let wraps = cur.open.max(cur.close) > prev.open.max(prev.close)
            && cur.open.min(cur.close) < prev.open.min(prev.close);
        if !(opposite && wraps) {
            return None;
        }
        // bigger engulfing body, more conviction
        let dominance = ((cur.body() / prev.body() - 1.0) / 2.0).clamp(0.0, 1.0);
        let confidence = 0.6 + 0.2 * dominance;
        if cur.is_bullish() {
            Some(("bullish_engulfing", Polarity::Bullish, confidence))
        } else {
            Some(("bearish_engulfing", Polarity::Bearish, confidence))
        }
    }

    fn shadow_reversal(&self, bars: &[Candle]) -> Option<(&'static str, Polarity, f64)> {
        let cur = bars.last()?;
        let range = cur.range();
        let body = cur.body();
        if range <= 0.0 || body / range < self.config.min_body_ratio {
            return None;
        }

        let anchor = bars.len().checked_sub(self.config.trend_lookback + 1).map(|i| bars[i].close)?;
        let falling = cur.open.max(cur.close) < anchor;
        let rising = cur.open.min(cur.close) > anchor;
        let long = self.config.shadow_multiple * body;

        if falling && cur.lower_wick() >= long && cur.upper_wick() <= body {
            let strength = (cur.lower_wick() / range).clamp(0.0, 1.0);
            return Some(("hammer", Polarity::Bullish, 0.5 + 0.2 * strength));
        }
        if rising && cur.upper_wick() >= long && cur.lower_wick() <= body {
            let strength = (cur.upper_wick() / range).clamp(0.0, 1.0);
            return Some(("shooting_star", Polarity::Bearish, 0.5 + 0.2 * strength));
        }
        None
    }

    fn range_breakout(&self, bars: &[Candle]) -> Option<(&'static str, Polarity, f64, usize)> {
        let lookback = self.config.breakout_lookback;
        let end = bars.len().checked_sub(1)?;
        if end < lookback {
            return None;
        }
        let prior = &bars[end - lookback..end];
        let cur = &bars[end];

        let high = prior.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let low = prior.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let avg_volume = prior.iter().map(|c| c.volume).sum::<f64>() / lookback as f64;
        let volume_boost = if avg_volume > 0.0 {
            (cur.volume / avg_volume - 1.0).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let confidence = 0.55 + 0.25 * volume_boost;

        if cur.close > high {
            Some(("range_breakout_up", Polarity::Bullish, confidence, end - lookback))
        } else if cur.close < low {
            Some(("range_breakout_down", Polarity::Bearish, confidence, end - lookback))
        } else {
            None
        }
    }
}

impl Default for CandlestickDetector {
    fn default() -> Self {
        Self {
            config: CandlestickConfig::default(),
        }
    }
}

impl PatternDetector for CandlestickDetector {
    fn name(&self) -> &str {
        "candlestick"
    }

    fn detect(&self, series: &CandleSeries) -> Vec<PatternCandidate> {
        let bars = series.candles();
        let end = match series.last_index() {
            Some(end) => end,
            None => return Vec::new(),
        };

        let mut found: Vec<(&'static str, Polarity, StrategyKind, f64, usize)> = Vec::new();
        if end >= 1 {
            if let Some((name, polarity, conf)) = self.engulfing(&bars[end - 1], &bars[end]) {
                found.push((name, polarity, StrategyKind::Reversal, conf, end - 1));
            }
        }
        if let Some((name, polarity, conf)) = self.shadow_reversal(bars) {
            found.push((name, polarity, StrategyKind::Reversal, conf, end));
        }
        if let Some((name, polarity, conf, start)) = self.range_breakout(bars) {
            found.push((name, polarity, StrategyKind::Breakout, conf, start));
        }

        found
            .into_iter()
            .filter_map(|(name, polarity, strategy, conf, start)| {
                match PatternCandidate::from_series(series, name, polarity, strategy, conf, start, end) {
                    Ok(candidate) => {
                        debug!(
                            symbol = %series.symbol(),
                            timeframe = %series.timeframe(),
                            pattern = name,
                            confidence = conf,
                            "Pattern detected"
                        );
                        Some(candidate)
                    }
                    Err(e) => {
                        warn!(pattern = name, error = %e, "Discarding malformed candidate");
                        None
                    }
                }
            })
            .collect()
    }
}
