//! Error kinds shared across the engine

use crate::candle::Timeframe;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Failures that cross crate boundaries.
///
/// A rejected trade is not represented here: risk rejection is a valid
/// terminal decision carried by the risk gate's own decision type. Missing
/// sentiment is not an error either, it is simply an absent entry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A provider or indicator fetch failed. The caller skips this
    /// symbol/timeframe for the current cycle; candles are never fabricated.
    #[error("data unavailable for {symbol}{}: {reason}", fmt_timeframe(.timeframe))]
    DataUnavailable {
        symbol: String,
        timeframe: Option<Timeframe>,
        reason: String,
    },

    /// Not enough bars for one feature's lookback. Extraction converts this
    /// into the neutral default for that feature alone.
    #[error("insufficient history for {feature}: need {required} bars, have {available}")]
    InsufficientHistory {
        feature: String,
        required: usize,
        available: usize,
    },

    /// An indicator value a feature needs is absent at the completion bar.
    /// Handled like `InsufficientHistory`.
    #[error("{feature} needs {indicator}, which is missing")]
    MissingIndicator { feature: String, indicator: String },

    /// Invalid weights, thresholds or limits. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A candle series violating ordering or price sanity.
    #[error("invalid candle series: {0}")]
    InvalidSeries(String),

    /// Inconsistent arguments to a core operation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Shutdown was requested before the operation could finish. Not a
    /// provider failure.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl EngineError {
    pub fn data_unavailable(symbol: impl Into<String>, timeframe: Option<Timeframe>, reason: impl Into<String>) -> Self {
        EngineError::DataUnavailable {
            symbol: symbol.into(),
            timeframe,
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::Configuration(msg.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, EngineError::Configuration(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled(_))
    }

    /// Failures a single feature recovers from by falling back to neutral
    pub fn is_feature_degradation(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientHistory { .. } | EngineError::MissingIndicator { .. }
        )
    }
}

fn fmt_timeframe(timeframe: &Option<Timeframe>) -> String {
    timeframe.map(|tf| format!(" {}", tf)).unwrap_or_default()
}
