//! Shared domain types for the confidence fusion engine
//!
//! Every crate in the workspace speaks in terms of these types:
//! - `CandleSeries` / `Candle` / `Timeframe` for raw OHLCV input
//! - `PatternCandidate` for upstream rule-based matches
//! - `IndicatorBundle` and the `IndicatorLibrary` capability
//! - `EngineError` for the failure kinds that cross crate boundaries

pub mod candle;
pub mod error;
pub mod fixtures;
pub mod indicators;
pub mod pattern;

pub use candle::{Candle, CandleSeries, SeriesGap, Timeframe};
pub use error::{EngineError, EngineResult};
pub use indicators::{IndicatorBundle, IndicatorConfig, IndicatorLibrary, StandardIndicators};
pub use pattern::{PatternCandidate, Polarity, StrategyKind};

// Re-export for downstream crates
pub use chrono::{DateTime, Duration, Utc};
