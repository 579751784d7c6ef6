// Signal Fusion Pipeline
// Orchestrates detection, feature extraction, quality scoring and confidence fusion

use crate::features::{FeatureConfig, FeatureExtractor};
use crate::fusion::{AuxiliaryInputs, ConfidenceFusion, FusedSignal, FusionConfig, FusionOutcome};
use crate::patterns::PatternDetector;
use crate::scoring::{QualityScorer, WeightTable};
use common::{CandleSeries, EngineError, EngineResult, IndicatorBundle, IndicatorLibrary, PatternCandidate, StandardIndicators};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration for the signal fusion pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Enable/disable signal generation
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Maximum number of accepted signals returned per series
    #[serde(default = "default_max_signals")]
    pub max_signals_per_cycle: usize,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub weights: WeightTable,
    #[serde(default)]
    pub fusion: FusionConfig,
}

fn default_enabled() -> bool {
    true
}
fn default_max_signals() -> usize {
    10
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_signals_per_cycle: default_max_signals(),
            features: FeatureConfig::default(),
            weights: WeightTable::default(),
            fusion: FusionConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.max_signals_per_cycle == 0 {
            return Err(EngineError::config("max_signals_per_cycle must be positive"));
        }
        self.features.validate()?;
        self.fusion.validate()
    }
}

/// Signal fusion pipeline
pub struct SignalPipeline {
    detectors: Vec<Box<dyn PatternDetector>>,
    extractor: FeatureExtractor,
    scorer: QualityScorer,
    fusion: ConfidenceFusion,
    /// Recomputes indicators for candidates completing before the last bar
    indicators: Arc<dyn IndicatorLibrary>,
    config: PipelineConfig,
}

impl fmt::Debug for SignalPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalPipeline")
            .field("detectors", &self.detectors.iter().map(|d| d.name()).collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

impl SignalPipeline {
    /// Create a new pipeline; fails on invalid weights or thresholds
    pub fn new(config: PipelineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            detectors: Vec::new(),
            extractor: FeatureExtractor::new(config.features.clone())?,
            scorer: QualityScorer::new(config.weights.clone()),
            fusion: ConfidenceFusion::new(config.fusion.clone())?,
            indicators: Arc::new(StandardIndicators::default()),
            config,
        })
    }

    /// Add a pattern detector
    pub fn add_detector(mut self, detector: Box<dyn PatternDetector>) -> Self {
        info!("Adding pattern detector: {}", detector.name());
        self.detectors.push(detector);
        self
    }

    /// Library used when a candidate's indicators must be recomputed up to
    /// its completion bar
    pub fn with_indicator_library(mut self, indicators: Arc<dyn IndicatorLibrary>) -> Self {
        self.indicators = indicators;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Score and fuse one candidate.
    ///
    /// Sub-threshold candidates come back as `FusionOutcome::Rejected`.
    /// `indicators` must cover `series`; when the candidate completes before
    /// the last bar, the series is cut at the completion bar and its
    /// indicators recomputed so no later bar is read.
    pub fn fuse(
        &self,
        candidate: &PatternCandidate,
        series: &CandleSeries,
        indicators: &IndicatorBundle,
        aux: &AuxiliaryInputs,
    ) -> EngineResult<FusionOutcome> {
        let end = candidate.end_index();
        if end + 1 < series.len() {
            let window = series.truncated(end);
            let windowed = self.indicators.compute(&window)?;
            return self.fuse_at_completion(candidate, &window, &windowed, aux);
        }
        self.fuse_at_completion(candidate, series, indicators, aux)
    }

    fn fuse_at_completion(
        &self,
        candidate: &PatternCandidate,
        series: &CandleSeries,
        indicators: &IndicatorBundle,
        aux: &AuxiliaryInputs,
    ) -> EngineResult<FusionOutcome> {
        let features = self.extractor.extract(candidate, series, indicators)?;
        let quality = self.scorer.score(&features);

        let end = candidate.end_index();
        let reference_price = series
            .get(end)
            .map(|c| c.close)
            .ok_or_else(|| EngineError::InvalidInput(format!("no completion bar at {}", end)))?;
        let atr = indicators.atr_at(end);

        Ok(self
            .fusion
            .fuse(candidate, features, quality, aux, reference_price, atr))
    }

    /// Run every detector over `series` and return the accepted signals,
    /// highest confidence first.
    pub fn process(
        &self,
        series: &CandleSeries,
        indicators: &IndicatorBundle,
        aux: &AuxiliaryInputs,
    ) -> EngineResult<Vec<FusedSignal>> {
        if !self.config.enabled {
            debug!("Pipeline is disabled, skipping signal generation");
            return Ok(Vec::new());
        }

        let mut accepted = Vec::new();
        for detector in &self.detectors {
            for candidate in detector.detect(series) {
                match self.fuse(&candidate, series, indicators, aux) {
                    Ok(FusionOutcome::Accepted(signal)) => accepted.push(signal),
                    Ok(FusionOutcome::Rejected(signal)) => {
                        debug!(
                            pattern = candidate.pattern(),
                            confidence = signal.enhanced_confidence(),
                            "Candidate below acceptance threshold"
                        );
                    }
                    Err(e) => {
                        warn!("Error fusing {} from {}: {}", candidate.pattern(), detector.name(), e);
                    }
                }
            }
        }

        accepted.sort_by(|a, b| b.enhanced_confidence().total_cmp(&a.enhanced_confidence()));
        accepted.truncate(self.config.max_signals_per_cycle);

        debug!(
            symbol = %series.symbol(),
            timeframe = %series.timeframe(),
            accepted = accepted.len(),
            "Processed series"
        );
        Ok(accepted)
    }

    /// Get the number of registered detectors
    pub fn detector_count(&self) -> usize {
        self.detectors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::CandlestickDetector;
    use common::{fixtures, IndicatorLibrary, Polarity, StandardIndicators, StrategyKind, Timeframe};

    fn pipeline() -> SignalPipeline {
        SignalPipeline::new(PipelineConfig::default())
            .unwrap()
            .add_detector(Box::new(CandlestickDetector::default()))
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_signals_per_cycle, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_weights_fail_construction() {
        let mut config = PipelineConfig::default();
        config.fusion.quality_weight = 0.9;
        assert!(SignalPipeline::new(config).unwrap_err().is_configuration());
    }

    #[test]
    fn test_later_bars_do_not_change_fusion() {
        let series = fixtures::bullish_engulfing_series("BTCUSDT", Timeframe::H1, 80).unwrap();
        let window = series.truncated(60);
        assert_eq!(window.len(), 61);

        let candidate = |s: &CandleSeries| {
            PatternCandidate::from_series(s, "test", Polarity::Bullish, StrategyKind::Reversal, 0.7, 59, 60).unwrap()
        };
        let indicators = StandardIndicators::default();
        let full_bundle = indicators.compute(&series).unwrap();
        let window_bundle = indicators.compute(&window).unwrap();

        let pipeline = pipeline();
        let full = pipeline
            .fuse(&candidate(&series), &series, &full_bundle, &AuxiliaryInputs::none())
            .unwrap();
        let cut = pipeline
            .fuse(&candidate(&window), &window, &window_bundle, &AuxiliaryInputs::none())
            .unwrap();

        assert_eq!(full.signal().features(), cut.signal().features());
        assert_eq!(full.signal().quality_score(), cut.signal().quality_score());
        assert_eq!(full.signal().enhanced_confidence(), cut.signal().enhanced_confidence());
        assert!(!full.signal().features().is_degraded(crate::features::Feature::SrProximity));
    }

    #[test]
    fn test_pipeline_debug_lists_detectors() {
        let rendered = format!("{:?}", pipeline());
        assert!(rendered.contains("SignalPipeline"));
        assert!(rendered.contains(CandlestickDetector::default().name()));
    }

    #[test]
    fn test_process_emits_only_accepted_signals() {
        let series = fixtures::bullish_engulfing_series("BTCUSDT", Timeframe::H1, 80).unwrap();
        let bundle = StandardIndicators::default().compute(&series).unwrap();
        let signals = pipeline().process(&series, &bundle, &AuxiliaryInputs::none()).unwrap();

        assert!(!signals.is_empty());
        for signal in &signals {
            assert!(signal.is_accepted());
            assert!(signal.enhanced_confidence() >= 0.6);
        }
        let top = &signals[0];
        assert_eq!(top.candidate().pattern(), "bullish_engulfing");
        assert_eq!(top.reference_price(), series.last().unwrap().close);
        assert!(top.atr().is_some());
    }

    #[test]
    fn test_low_base_confidence_is_rejected() {
        let series = fixtures::bullish_engulfing_series("BTCUSDT", Timeframe::H1, 80).unwrap();
        let bundle = StandardIndicators::default().compute(&series).unwrap();
        let weak = PatternCandidate::from_series(&series, "weak", Polarity::Bullish, StrategyKind::Reversal, 0.1, 79, 79)
            .unwrap();

        let outcome = pipeline().fuse(&weak, &series, &bundle, &AuxiliaryInputs::none()).unwrap();
        assert!(!outcome.is_accepted());
    }

    #[test]
    fn test_disabled_pipeline_is_silent() {
        let config = PipelineConfig {
            enabled: false,
            ..Default::default()
        };
        let pipeline = SignalPipeline::new(config)
            .unwrap()
            .add_detector(Box::new(CandlestickDetector::default()));
        let series = fixtures::bullish_engulfing_series("BTCUSDT", Timeframe::H1, 80).unwrap();
        let bundle = StandardIndicators::default().compute(&series).unwrap();

        assert!(pipeline.process(&series, &bundle, &AuxiliaryInputs::none()).unwrap().is_empty());
    }
}
