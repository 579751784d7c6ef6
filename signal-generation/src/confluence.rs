// Multi-Timeframe Confluence
// Aggregates one symbol's fused signals across timeframes into an alignment score and action

use crate::fusion::FusedSignal;
use common::{EngineError, EngineResult, Polarity, Timeframe};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::StrongBuy => "STRONG_BUY",
            Action::Buy => "BUY",
            Action::Hold => "HOLD",
            Action::Sell => "SELL",
            Action::StrongSell => "STRONG_SELL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceConfig {
    /// Alignment (0-100) needed for a strong action
    #[serde(default = "default_strong_alignment")]
    pub strong_alignment: f64,
    /// Alignment (0-100) needed for any action other than hold
    #[serde(default = "default_min_alignment")]
    pub min_alignment: f64,
    /// Mean majority confidence needed for a strong action
    #[serde(default = "default_strong_confidence")]
    pub strong_confidence: f64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_strong_alignment() -> f64 {
    80.0
}
fn default_min_alignment() -> f64 {
    60.0
}
fn default_strong_confidence() -> f64 {
    0.75
}
fn default_min_confidence() -> f64 {
    0.6
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            strong_alignment: default_strong_alignment(),
            min_alignment: default_min_alignment(),
            strong_confidence: default_strong_confidence(),
            min_confidence: default_min_confidence(),
        }
    }
}

impl ConfluenceConfig {
    pub fn validate(&self) -> EngineResult<()> {
        for (name, value) in [("strong_alignment", self.strong_alignment), ("min_alignment", self.min_alignment)] {
            if !(0.0..=100.0).contains(&value) {
                return Err(EngineError::config(format!("{} must be in [0, 100], got {}", name, value)));
            }
        }
        for (name, value) in [("strong_confidence", self.strong_confidence), ("min_confidence", self.min_confidence)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::config(format!("{} must be in [0, 1], got {}", name, value)));
            }
        }
        if self.min_alignment > self.strong_alignment || self.min_confidence > self.strong_confidence {
            return Err(EngineError::config("minimum thresholds must not exceed strong thresholds"));
        }
        Ok(())
    }
}

/// Cross-timeframe view of one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceResult {
    symbol: String,
    signals: BTreeMap<Timeframe, FusedSignal>,
    alignment_score: f64,
    agreement: f64,
    direction: Polarity,
    action: Action,
}

impl ConfluenceResult {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn signals(&self) -> &BTreeMap<Timeframe, FusedSignal> {
        &self.signals
    }

    /// Share of directional timeframes agreeing with the majority, 0-100
    pub fn alignment_score(&self) -> f64 {
        self.alignment_score
    }

    /// |Σ confidence × direction| / Σ confidence over directional signals, 0-1
    pub fn agreement(&self) -> f64 {
        self.agreement
    }

    /// Majority direction; neutral on ties or when nothing is directional
    pub fn direction(&self) -> Polarity {
        self.direction
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// Built from a single timeframe. Alignment is then trivially 100.
    pub fn is_single_timeframe(&self) -> bool {
        self.signals.len() == 1
    }

    /// The majority-direction signal with the highest confidence
    pub fn strongest_signal(&self) -> Option<&FusedSignal> {
        self.signals
            .values()
            .filter(|s| self.direction.is_directional() && s.polarity() == self.direction)
            .max_by(|a, b| a.enhanced_confidence().total_cmp(&b.enhanced_confidence()))
    }
}

pub struct MultiTimeframeAggregator {
    config: ConfluenceConfig,
}

impl MultiTimeframeAggregator {
    pub fn new(config: ConfluenceConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn aggregate(
        &self,
        symbol: &str,
        signals: BTreeMap<Timeframe, FusedSignal>,
    ) -> EngineResult<ConfluenceResult> {
        for (timeframe, signal) in &signals {
            if signal.symbol() != symbol {
                return Err(EngineError::InvalidInput(format!(
                    "{} signal on {} passed to confluence for {}",
                    signal.symbol(),
                    timeframe,
                    symbol
                )));
            }
            if signal.timeframe() != *timeframe {
                return Err(EngineError::InvalidInput(format!(
                    "{} signal filed under {}",
                    signal.timeframe(),
                    timeframe
                )));
            }
            if !signal.is_accepted() {
                return Err(EngineError::InvalidInput(format!(
                    "rejected {} signal on {} cannot contribute to confluence",
                    symbol, timeframe
                )));
            }
        }

        let directional = || signals.values().filter(|s| s.polarity().is_directional());
        let bullish = directional().filter(|s| s.polarity() == Polarity::Bullish).count();
        let bearish = directional().filter(|s| s.polarity() == Polarity::Bearish).count();
        let total = bullish + bearish;

        let direction = match bullish.cmp(&bearish) {
            std::cmp::Ordering::Greater => Polarity::Bullish,
            std::cmp::Ordering::Less => Polarity::Bearish,
            std::cmp::Ordering::Equal => Polarity::Neutral,
        };

        let alignment_score = if total == 0 {
            0.0
        } else {
            bullish.max(bearish) as f64 / total as f64 * 100.0
        };

        let weight_sum: f64 = directional().map(|s| s.enhanced_confidence()).sum();
        let agreement = if weight_sum > 0.0 {
            (directional()
                .map(|s| s.enhanced_confidence() * s.polarity().sign())
                .sum::<f64>()
                / weight_sum)
                .abs()
        } else {
            0.0
        };

        let majority: Vec<f64> = directional()
            .filter(|s| s.polarity() == direction)
            .map(|s| s.enhanced_confidence())
            .collect();
        let mean_confidence = if majority.is_empty() {
            0.0
        } else {
            majority.iter().sum::<f64>() / majority.len() as f64
        };

        let action = self.recommend(direction, alignment_score, mean_confidence);

        debug!(
            symbol = %symbol,
            timeframes = signals.len(),
            bullish,
            bearish,
            alignment = alignment_score,
            action = %action,
            "Aggregated confluence"
        );

        Ok(ConfluenceResult {
            symbol: symbol.to_string(),
            signals,
            alignment_score,
            agreement,
            direction,
            action,
        })
    }

    fn recommend(&self, direction: Polarity, alignment: f64, mean_confidence: f64) -> Action {
        let cfg = &self.config;
        let strong = alignment >= cfg.strong_alignment && mean_confidence >= cfg.strong_confidence;
        let actionable = alignment >= cfg.min_alignment && mean_confidence >= cfg.min_confidence;

        match (direction, strong, actionable) {
            (Polarity::Bullish, true, _) => Action::StrongBuy,
            (Polarity::Bullish, false, true) => Action::Buy,
            (Polarity::Bearish, true, _) => Action::StrongSell,
            (Polarity::Bearish, false, true) => Action::Sell,
            _ => Action::Hold,
        }
    }
}

impl Default for MultiTimeframeAggregator {
    fn default() -> Self {
        Self {
            config: ConfluenceConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{Feature, FeatureVector};
    use crate::fusion::{AuxiliaryInputs, ConfidenceFusion, FusionOutcome};
    use common::{fixtures, PatternCandidate, StrategyKind};

    fn signal(symbol: &str, timeframe: Timeframe, polarity: Polarity, base: f64) -> FusedSignal {
        let series = fixtures::trending_series(symbol, timeframe, 10).unwrap();
        let candidate =
            PatternCandidate::from_series(&series, "test_pattern", polarity, StrategyKind::TrendFollowing, base, 9, 9)
                .unwrap();
        let features = FeatureVector::from_values(Feature::ALL.iter().map(|f| (*f, 0.8))).unwrap();
        match ConfidenceFusion::default().fuse(&candidate, features, 0.8, &AuxiliaryInputs::none(), 100.0, None) {
            FusionOutcome::Accepted(s) => s,
            FusionOutcome::Rejected(_) => panic!("fixture signal should be accepted"),
        }
    }

    fn map(signals: Vec<FusedSignal>) -> BTreeMap<Timeframe, FusedSignal> {
        signals.into_iter().map(|s| (s.timeframe(), s)).collect()
    }

    #[test]
    fn test_full_agreement_is_100() {
        let signals = map(vec![
            signal("BTCUSDT", Timeframe::M15, Polarity::Bullish, 0.9),
            signal("BTCUSDT", Timeframe::H1, Polarity::Bullish, 0.9),
            signal("BTCUSDT", Timeframe::H4, Polarity::Bullish, 0.9),
        ]);
        let result = MultiTimeframeAggregator::default().aggregate("BTCUSDT", signals).unwrap();

        assert_eq!(result.alignment_score(), 100.0);
        assert!((result.agreement() - 1.0).abs() < 1e-9);
        assert_eq!(result.action(), Action::StrongBuy);
        assert!(!result.is_single_timeframe());
    }

    #[test]
    fn test_partial_alignment() {
        let signals = map(vec![
            signal("BTCUSDT", Timeframe::M5, Polarity::Bearish, 0.9),
            signal("BTCUSDT", Timeframe::M15, Polarity::Bearish, 0.9),
            signal("BTCUSDT", Timeframe::H1, Polarity::Bearish, 0.9),
            signal("BTCUSDT", Timeframe::H4, Polarity::Bullish, 0.9),
        ]);
        let result = MultiTimeframeAggregator::default().aggregate("BTCUSDT", signals).unwrap();

        assert_eq!(result.alignment_score(), 75.0);
        assert_eq!(result.direction(), Polarity::Bearish);
        assert_eq!(result.action(), Action::Sell);
        assert!((result.agreement() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_tie_holds() {
        let signals = map(vec![
            signal("BTCUSDT", Timeframe::H1, Polarity::Bearish, 0.9),
            signal("BTCUSDT", Timeframe::H4, Polarity::Bullish, 0.9),
        ]);
        let result = MultiTimeframeAggregator::default().aggregate("BTCUSDT", signals).unwrap();
        assert_eq!(result.action(), Action::Hold);
        assert_eq!(result.direction(), Polarity::Neutral);
        assert!(result.strongest_signal().is_none());
    }

    #[test]
    fn test_neutral_signals_excluded() {
        let signals = map(vec![
            signal("BTCUSDT", Timeframe::H1, Polarity::Bullish, 0.9),
            signal("BTCUSDT", Timeframe::H4, Polarity::Neutral, 0.9),
        ]);
        let result = MultiTimeframeAggregator::default().aggregate("BTCUSDT", signals).unwrap();
        assert_eq!(result.alignment_score(), 100.0);
        assert_eq!(result.direction(), Polarity::Bullish);

        let only_neutral = map(vec![signal("BTCUSDT", Timeframe::H1, Polarity::Neutral, 0.9)]);
        let result = MultiTimeframeAggregator::default().aggregate("BTCUSDT", only_neutral).unwrap();
        assert_eq!(result.alignment_score(), 0.0);
        assert_eq!(result.action(), Action::Hold);
    }

    #[test]
    fn test_single_timeframe_is_flagged_not_discounted() {
        let signals = map(vec![signal("BTCUSDT", Timeframe::H1, Polarity::Bullish, 0.9)]);
        let result = MultiTimeframeAggregator::default().aggregate("BTCUSDT", signals).unwrap();
        assert!(result.is_single_timeframe());
        assert_eq!(result.alignment_score(), 100.0);
        assert_eq!(result.action(), Action::StrongBuy);
    }

    #[test]
    fn test_empty_input_holds() {
        let result = MultiTimeframeAggregator::default()
            .aggregate("BTCUSDT", BTreeMap::new())
            .unwrap();
        assert_eq!(result.alignment_score(), 0.0);
        assert_eq!(result.action(), Action::Hold);
    }

    #[test]
    fn test_symbol_mismatch_rejected() {
        let signals = map(vec![signal("ETHUSDT", Timeframe::H1, Polarity::Bullish, 0.9)]);
        let err = MultiTimeframeAggregator::default().aggregate("BTCUSDT", signals).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }
}
