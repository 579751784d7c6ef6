// Signal Generation
// Fuses rule-based pattern candidates with quantitative quality features,
// optional sentiment and multi-timeframe confluence

pub mod confluence;
pub mod features;
pub mod fusion;
pub mod patterns;
pub mod pipeline;
pub mod scoring;

pub use confluence::{Action, ConfluenceConfig, ConfluenceResult, MultiTimeframeAggregator};
pub use features::{Feature, FeatureConfig, FeatureExtractor, FeatureVector, NEUTRAL_FEATURE_VALUE};
pub use fusion::{
    enhanced_confidence, AuxiliaryInputs, ConfidenceFusion, FusedSignal, FusionConfig, FusionOutcome, SignalBreakdown,
};
pub use patterns::{CandlestickConfig, CandlestickDetector, PatternDetector};
pub use pipeline::{PipelineConfig, SignalPipeline};
pub use scoring::{QualityScorer, WeightTable};
