use async_trait::async_trait;
use common::{CandleSeries, Timeframe};
use thiserror::Error;

/// Why a provider could not return candles
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("rate limited (retry after {retry_after_ms:?} ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request timed out")]
    Timeout,

    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Rate limits and timeouts may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. } | ProviderError::Timeout)
    }
}

/// A source of OHLCV history.
#[async_trait]
pub trait CandleProvider: Send + Sync {
    /// Provider name used in logs and error accounting
    fn name(&self) -> &str;

    /// The most recent `lookback` bars for `symbol` on `timeframe`.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<CandleSeries, ProviderError>;
}
