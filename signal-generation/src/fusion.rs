// Confidence Fusion
// Blends the rule-based confidence with the quality score, then optional sentiment and model inputs

use crate::features::FeatureVector;
use common::{EngineError, EngineResult, PatternCandidate, Polarity, Timeframe};
use sentiment_overlay::SentimentReading;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Share of the rule-based confidence in the enhanced confidence
    #[serde(default = "default_base_weight")]
    pub base_weight: f64,
    /// Share of the quality score; `base_weight + quality_weight` must be 1
    #[serde(default = "default_quality_weight")]
    pub quality_weight: f64,
    /// Minimum enhanced confidence for a signal to be emitted
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f64,
    /// Blend weight of directional sentiment, when any source answered
    #[serde(default = "default_aux_weight")]
    pub sentiment_weight: f64,
    /// Blend weight of an external model score, when supplied
    #[serde(default = "default_aux_weight")]
    pub model_weight: f64,
}

fn default_base_weight() -> f64 {
    0.6
}
fn default_quality_weight() -> f64 {
    0.4
}
fn default_acceptance_threshold() -> f64 {
    0.6
}
fn default_aux_weight() -> f64 {
    0.1
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            base_weight: default_base_weight(),
            quality_weight: default_quality_weight(),
            acceptance_threshold: default_acceptance_threshold(),
            sentiment_weight: default_aux_weight(),
            model_weight: default_aux_weight(),
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> EngineResult<()> {
        let unit = [
            ("base_weight", self.base_weight),
            ("quality_weight", self.quality_weight),
            ("acceptance_threshold", self.acceptance_threshold),
            ("sentiment_weight", self.sentiment_weight),
            ("model_weight", self.model_weight),
        ];
        for (name, value) in unit {
            if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
                return Err(EngineError::config(format!("{} must be in [0, 1], got {}", name, value)));
            }
        }
        if (self.base_weight + self.quality_weight - 1.0).abs() > 1e-9 {
            return Err(EngineError::config(format!(
                "base_weight + quality_weight must equal 1, got {} + {}",
                self.base_weight, self.quality_weight
            )));
        }
        Ok(())
    }
}

/// Optional inputs beyond the candle data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuxiliaryInputs {
    pub sentiment: SentimentReading,
    /// Output of an external model, in [0, 1]
    pub model_score: Option<f64>,
}

impl AuxiliaryInputs {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_sentiment(sentiment: SentimentReading) -> Self {
        Self {
            sentiment,
            model_score: None,
        }
    }
}

/// Ordered key/value account of how a confidence was reached
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalBreakdown {
    entries: Vec<(String, f64)>,
    degraded: Vec<String>,
}

impl SignalBreakdown {
    fn push(&mut self, key: impl Into<String>, value: f64) {
        self.entries.push((key.into(), value));
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.entries
    }

    /// Features that fell back to neutral
    pub fn degraded(&self) -> &[String] {
        &self.degraded
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            let _ = writeln!(out, "{:<24} {:.4}", key, value);
        }
        if !self.degraded.is_empty() {
            let _ = writeln!(out, "{:<24} {}", "degraded", self.degraded.join(", "));
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (key, value) in &self.entries {
            map.insert(key.clone(), serde_json::json!(value));
        }
        map.insert("degraded".to_string(), serde_json::json!(self.degraded));
        serde_json::Value::Object(map)
    }
}

/// A candidate after quality scoring and confidence fusion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedSignal {
    candidate: PatternCandidate,
    features: FeatureVector,
    quality_score: f64,
    enhanced_confidence: f64,
    accepted: bool,
    breakdown: SignalBreakdown,
    reference_price: f64,
    atr: Option<f64>,
}

impl FusedSignal {
    pub fn candidate(&self) -> &PatternCandidate {
        &self.candidate
    }

    pub fn symbol(&self) -> &str {
        self.candidate.symbol()
    }

    pub fn timeframe(&self) -> Timeframe {
        self.candidate.timeframe()
    }

    pub fn polarity(&self) -> Polarity {
        self.candidate.polarity()
    }

    pub fn features(&self) -> &FeatureVector {
        &self.features
    }

    pub fn quality_score(&self) -> f64 {
        self.quality_score
    }

    pub fn base_confidence(&self) -> f64 {
        self.candidate.base_confidence()
    }

    pub fn enhanced_confidence(&self) -> f64 {
        self.enhanced_confidence
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub fn breakdown(&self) -> &SignalBreakdown {
        &self.breakdown
    }

    /// Close of the completion bar
    pub fn reference_price(&self) -> f64 {
        self.reference_price
    }

    /// ATR at the completion bar, if it was available
    pub fn atr(&self) -> Option<f64> {
        self.atr
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FusionOutcome {
    Accepted(FusedSignal),
    /// Below the acceptance threshold; never emitted downstream
    Rejected(FusedSignal),
}

impl FusionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FusionOutcome::Accepted(_))
    }

    pub fn signal(&self) -> &FusedSignal {
        match self {
            FusionOutcome::Accepted(s) | FusionOutcome::Rejected(s) => s,
        }
    }

    pub fn accepted(self) -> Option<FusedSignal> {
        match self {
            FusionOutcome::Accepted(s) => Some(s),
            FusionOutcome::Rejected(_) => None,
        }
    }
}

/// base × w_base + quality × w_quality, clamped to [0, 1]
pub fn enhanced_confidence(base: f64, quality: f64, config: &FusionConfig) -> f64 {
    (base * config.base_weight + quality * config.quality_weight).clamp(0.0, 1.0)
}

pub struct ConfidenceFusion {
    config: FusionConfig,
}

impl ConfidenceFusion {
    pub fn new(config: FusionConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Combine a scored candidate with any auxiliary inputs and apply the
    /// acceptance threshold.
    pub fn fuse(
        &self,
        candidate: &PatternCandidate,
        features: FeatureVector,
        quality_score: f64,
        aux: &AuxiliaryInputs,
        reference_price: f64,
        atr: Option<f64>,
    ) -> FusionOutcome {
        let base = candidate.base_confidence();
        let mut confidence = enhanced_confidence(base, quality_score, &self.config);

        let mut breakdown = SignalBreakdown::default();
        for (feature, value) in features.iter() {
            breakdown.push(feature.name(), value);
        }
        breakdown.degraded = features.degraded().iter().map(|f| f.name().to_string()).collect();
        breakdown.push("quality_score", quality_score);
        breakdown.push("base_confidence", base);

        if let Some(mean) = aux.sentiment.mean_score() {
            breakdown.push("sentiment", mean);
            for (source, score) in aux.sentiment.iter() {
                breakdown.push(format!("sentiment.{}", source), score.score);
            }
            let direction = candidate.polarity().sign();
            if direction != 0.0 {
                let aligned = (1.0 + mean * direction) / 2.0;
                let w = self.config.sentiment_weight;
                confidence = ((1.0 - w) * confidence + w * aligned).clamp(0.0, 1.0);
            }
        }

        match aux.model_score {
            Some(score) if score.is_finite() && (0.0..=1.0).contains(&score) => {
                breakdown.push("model_score", score);
                let w = self.config.model_weight;
                confidence = ((1.0 - w) * confidence + w * score).clamp(0.0, 1.0);
            }
            Some(score) => {
                warn!(symbol = %candidate.symbol(), score, "Ignoring model score outside [0, 1]");
            }
            None => {}
        }

        breakdown.push("enhanced_confidence", confidence);

        let accepted = confidence >= self.config.acceptance_threshold;
        debug!(
            symbol = %candidate.symbol(),
            timeframe = %candidate.timeframe(),
            pattern = candidate.pattern(),
            base,
            quality = quality_score,
            confidence,
            accepted,
            "Fused candidate"
        );

        let signal = FusedSignal {
            candidate: candidate.clone(),
            features,
            quality_score,
            enhanced_confidence: confidence,
            accepted,
            breakdown,
            reference_price,
            atr,
        };

        if accepted {
            FusionOutcome::Accepted(signal)
        } else {
            FusionOutcome::Rejected(signal)
        }
    }
}

impl Default for ConfidenceFusion {
    fn default() -> Self {
        Self {
            config: FusionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Feature;
    use common::{fixtures, StrategyKind};
    use sentiment_overlay::SentimentScore;

    fn candidate(base: f64, polarity: Polarity) -> PatternCandidate {
        let series = fixtures::trending_series("BTCUSDT", Timeframe::H1, 10).unwrap();
        PatternCandidate::from_series(&series, "test_pattern", polarity, StrategyKind::Breakout, base, 8, 9).unwrap()
    }

    fn features() -> FeatureVector {
        FeatureVector::from_values(Feature::ALL.iter().map(|f| (*f, 0.5))).unwrap()
    }

    #[test]
    fn test_documented_blend() {
        let config = FusionConfig::default();
        assert!((enhanced_confidence(0.70, 0.85, &config) - 0.76).abs() < 1e-9);

        let outcome = ConfidenceFusion::default().fuse(
            &candidate(0.70, Polarity::Bullish),
            features(),
            0.85,
            &AuxiliaryInputs::none(),
            100.0,
            Some(1.0),
        );
        assert!(outcome.is_accepted());
        assert!((outcome.signal().enhanced_confidence() - 0.76).abs() < 1e-9);
    }

    #[test]
    fn test_monotonic_in_quality_and_base() {
        let config = FusionConfig::default();
        let steps: Vec<f64> = (0..=20).map(|i| i as f64 / 20.0).collect();
        for &fixed in &steps {
            for pair in steps.windows(2) {
                assert!(enhanced_confidence(fixed, pair[1], &config) >= enhanced_confidence(fixed, pair[0], &config));
                assert!(enhanced_confidence(pair[1], fixed, &config) >= enhanced_confidence(pair[0], fixed, &config));
            }
        }
    }

    #[test]
    fn test_below_threshold_is_rejected() {
        let outcome = ConfidenceFusion::default().fuse(
            &candidate(0.5, Polarity::Bullish),
            features(),
            0.5,
            &AuxiliaryInputs::none(),
            100.0,
            None,
        );
        assert!(!outcome.is_accepted());
        assert!(!outcome.signal().is_accepted());
        assert!(outcome.accepted().is_none());
    }

    #[test]
    fn test_no_sentiment_leaves_no_trace() {
        let outcome = ConfidenceFusion::default().fuse(
            &candidate(0.7, Polarity::Bullish),
            features(),
            0.85,
            &AuxiliaryInputs::none(),
            100.0,
            None,
        );
        let breakdown = outcome.signal().breakdown();
        assert!(!breakdown.contains_key("sentiment"));
        assert!(!breakdown.contains_key("model_score"));
        assert!(breakdown.entries().iter().all(|(k, _)| !k.starts_with("sentiment.")));
        assert_eq!(breakdown.get("body_ratio"), Some(0.5));
        assert_eq!(breakdown.get("enhanced_confidence"), Some(outcome.signal().enhanced_confidence()));
    }

    #[test]
    fn test_sentiment_blends_in_pattern_direction() {
        let reading = SentimentReading::from_scores(vec![
            ("news_tone".to_string(), SentimentScore::new(0.8, 0.9, 5)),
            ("desk".to_string(), SentimentScore::new(0.4, 0.5, 2)),
        ]);
        let aux = AuxiliaryInputs::with_sentiment(reading);
        let fusion = ConfidenceFusion::default();

        let bull = fusion.fuse(&candidate(0.7, Polarity::Bullish), features(), 0.85, &aux, 100.0, None);
        let bear = fusion.fuse(&candidate(0.7, Polarity::Bearish), features(), 0.85, &aux, 100.0, None);

        // mean 0.6 -> aligned 0.8 for longs, 0.2 for shorts
        assert!((bull.signal().enhanced_confidence() - (0.9 * 0.76 + 0.1 * 0.8)).abs() < 1e-9);
        assert!((bear.signal().enhanced_confidence() - (0.9 * 0.76 + 0.1 * 0.2)).abs() < 1e-9);

        let breakdown = bull.signal().breakdown();
        assert!((breakdown.get("sentiment").unwrap() - 0.6).abs() < 1e-9);
        assert_eq!(breakdown.get("sentiment.news_tone"), Some(0.8));
        assert_eq!(breakdown.get("sentiment.desk"), Some(0.4));
    }

    #[test]
    fn test_model_score_blend() {
        let aux = AuxiliaryInputs {
            model_score: Some(1.0),
            ..Default::default()
        };
        let outcome = ConfidenceFusion::default().fuse(&candidate(0.7, Polarity::Bullish), features(), 0.85, &aux, 100.0, None);
        assert!((outcome.signal().enhanced_confidence() - (0.9 * 0.76 + 0.1)).abs() < 1e-9);
        assert_eq!(outcome.signal().breakdown().get("model_score"), Some(1.0));

        let bogus = AuxiliaryInputs {
            model_score: Some(7.0),
            ..Default::default()
        };
        let outcome = ConfidenceFusion::default().fuse(&candidate(0.7, Polarity::Bullish), features(), 0.85, &bogus, 100.0, None);
        assert!((outcome.signal().enhanced_confidence() - 0.76).abs() < 1e-9);
        assert!(!outcome.signal().breakdown().contains_key("model_score"));
    }

    #[test]
    fn test_breakdown_renders() {
        let outcome = ConfidenceFusion::default().fuse(
            &candidate(0.7, Polarity::Bullish),
            features(),
            0.85,
            &AuxiliaryInputs::none(),
            100.0,
            None,
        );
        let breakdown = outcome.signal().breakdown();
        assert!(breakdown.to_text().contains("quality_score"));
        assert_eq!(breakdown.to_json()["base_confidence"], serde_json::json!(0.7));
    }

    #[test]
    fn test_config_validation() {
        let bad_blend = FusionConfig {
            base_weight: 0.7,
            ..Default::default()
        };
        assert!(ConfidenceFusion::new(bad_blend).is_err());

        let bad_threshold = FusionConfig {
            acceptance_threshold: 1.5,
            ..Default::default()
        };
        assert!(ConfidenceFusion::new(bad_threshold).is_err());
    }
}
