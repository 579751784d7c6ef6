//! Pattern candidates produced by the upstream rule-based detector

use crate::candle::{CandleSeries, Timeframe};
use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Directional bias implied by a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Bullish,
    Bearish,
    Neutral,
}

impl Polarity {
    /// +1 for bullish, -1 for bearish, 0 for neutral
    pub fn sign(self) -> f64 {
        match self {
            Polarity::Bullish => 1.0,
            Polarity::Bearish => -1.0,
            Polarity::Neutral => 0.0,
        }
    }

    pub fn is_directional(self) -> bool {
        self != Polarity::Neutral
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::Bullish => write!(f, "bullish"),
            Polarity::Bearish => write!(f, "bearish"),
            Polarity::Neutral => write!(f, "neutral"),
        }
    }
}

/// The trading strategy a pattern is meant to feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Breakout,
    TrendFollowing,
    MeanReversion,
    Reversal,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Breakout => "breakout",
            StrategyKind::TrendFollowing => "trend_following",
            StrategyKind::MeanReversion => "mean_reversion",
            StrategyKind::Reversal => "reversal",
        };
        f.write_str(name)
    }
}

/// A raw rule-based match before quality enhancement.
///
/// Read-only for the core: fields are private and validated at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternCandidate {
    symbol: String,
    timeframe: Timeframe,
    pattern: String,
    polarity: Polarity,
    strategy: StrategyKind,
    base_confidence: f64,
    start_index: usize,
    end_index: usize,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

impl PatternCandidate {
    /// Build a candidate for bars `start_index..=end_index` of `series`.
    pub fn from_series(
        series: &CandleSeries,
        pattern: impl Into<String>,
        polarity: Polarity,
        strategy: StrategyKind,
        base_confidence: f64,
        start_index: usize,
        end_index: usize,
    ) -> EngineResult<Self> {
        let pattern = pattern.into();

        if !(0.0..=1.0).contains(&base_confidence) {
            return Err(EngineError::InvalidInput(format!(
                "base confidence {} for '{}' is outside [0, 1]",
                base_confidence, pattern
            )));
        }
        if start_index > end_index {
            return Err(EngineError::InvalidInput(format!(
                "pattern '{}' starts at bar {} after it ends at bar {}",
                pattern, start_index, end_index
            )));
        }

        let (start, end) = match (series.get(start_index), series.get(end_index)) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                return Err(EngineError::InvalidInput(format!(
                    "pattern '{}' range {}..={} exceeds series of {} bars",
                    pattern,
                    start_index,
                    end_index,
                    series.len()
                )))
            }
        };

        Ok(Self {
            symbol: series.symbol().to_string(),
            timeframe: series.timeframe(),
            start_time: start.timestamp,
            end_time: end.timestamp,
            pattern,
            polarity,
            strategy,
            base_confidence,
            start_index,
            end_index,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    pub fn base_confidence(&self) -> f64 {
        self.base_confidence
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn end_index(&self) -> usize {
        self.end_index
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Timestamp of the completion bar
    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    /// Identity used for alert deduplication: symbol + pattern + timeframe + completion bar.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.symbol,
            self.pattern,
            self.timeframe,
            self.end_time.timestamp()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_candidate_from_series() {
        let series = fixtures::trending_series("SOLUSDT", Timeframe::M15, 30).unwrap();
        let candidate = PatternCandidate::from_series(
            &series,
            "bullish_engulfing",
            Polarity::Bullish,
            StrategyKind::Reversal,
            0.7,
            28,
            29,
        )
        .unwrap();

        assert_eq!(candidate.symbol(), "SOLUSDT");
        assert_eq!(candidate.timeframe(), Timeframe::M15);
        assert_eq!(candidate.end_time(), series.candles()[29].timestamp);
    }

    #[test]
    fn test_candidate_rejects_bad_confidence_and_range() {
        let series = fixtures::trending_series("SOLUSDT", Timeframe::M15, 10).unwrap();
        let make = |conf: f64, start: usize, end: usize| {
            PatternCandidate::from_series(&series, "p", Polarity::Bullish, StrategyKind::Breakout, conf, start, end)
        };

        assert!(make(1.2, 0, 1).is_err());
        assert!(make(0.5, 5, 3).is_err());
        assert!(make(0.5, 8, 10).is_err());
        assert!(make(0.5, 8, 9).is_ok());
    }

    #[test]
    fn test_fingerprint_identifies_completion_bar() {
        let series = fixtures::trending_series("SOLUSDT", Timeframe::H1, 10).unwrap();
        let a = PatternCandidate::from_series(&series, "hammer", Polarity::Bullish, StrategyKind::Reversal, 0.6, 9, 9).unwrap();
        let b = PatternCandidate::from_series(&series, "hammer", Polarity::Bullish, StrategyKind::Reversal, 0.8, 9, 9).unwrap();
        let c = PatternCandidate::from_series(&series, "hammer", Polarity::Bullish, StrategyKind::Reversal, 0.6, 8, 8).unwrap();

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert!(a.fingerprint().starts_with("SOLUSDT|hammer|1h|"));
    }
}
