//! Ordered failover across several providers

use crate::provider::{CandleProvider, ProviderError};
use async_trait::async_trait;
use common::{CandleSeries, Timeframe};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-provider success/failure counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderStats {
    pub provider: String,
    pub successes: u64,
    pub failures: u64,
    pub rate_limited: u64,
}

#[derive(Default)]
struct Counters {
    successes: AtomicU64,
    failures: AtomicU64,
    rate_limited: AtomicU64,
}

/// Tries each provider in registration order until one returns candles.
///
/// If every provider fails and at least one was rate limited, the chain
/// reports `RateLimited` (with the longest hint) so the caller can back off.
/// Otherwise the last provider's error is returned.
pub struct ProviderChain {
    providers: Vec<(Arc<dyn CandleProvider>, Counters)>,
}

impl ProviderChain {
    pub fn new() -> Self {
        Self { providers: Vec::new() }
    }

    pub fn add_provider(mut self, provider: Arc<dyn CandleProvider>) -> Self {
        self.providers.push((provider, Counters::default()));
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn stats(&self) -> Vec<ProviderStats> {
        self.providers
            .iter()
            .map(|(p, c)| ProviderStats {
                provider: p.name().to_string(),
                successes: c.successes.load(Ordering::Relaxed),
                failures: c.failures.load(Ordering::Relaxed),
                rate_limited: c.rate_limited.load(Ordering::Relaxed),
            })
            .collect()
    }
}

impl Default for ProviderChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CandleProvider for ProviderChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<CandleSeries, ProviderError> {
        let mut last_error = ProviderError::Other("no providers configured".to_string());
        let mut rate_limit: Option<Option<u64>> = None;

        for (provider, counters) in &self.providers {
            match provider.fetch_candles(symbol, timeframe, lookback).await {
                Ok(series) if series.symbol() == symbol && series.timeframe() == timeframe => {
                    counters.successes.fetch_add(1, Ordering::Relaxed);
                    debug!(provider = provider.name(), symbol = %symbol, timeframe = %timeframe, bars = series.len(), "Fetched candles");
                    return Ok(series);
                }
                Ok(series) => {
                    counters.failures.fetch_add(1, Ordering::Relaxed);
                    last_error = ProviderError::Other(format!(
                        "{} returned {} {} for {} {}",
                        provider.name(),
                        series.symbol(),
                        series.timeframe(),
                        symbol,
                        timeframe
                    ));
                    warn!(provider = provider.name(), symbol = %symbol, "Provider returned mismatched series");
                }
                Err(e) => {
                    if let ProviderError::RateLimited { retry_after_ms } = &e {
                        counters.rate_limited.fetch_add(1, Ordering::Relaxed);
                        let longest = match rate_limit.flatten() {
                            Some(prev) => Some(retry_after_ms.map_or(prev, |ms| ms.max(prev))),
                            None => *retry_after_ms,
                        };
                        rate_limit = Some(longest);
                    } else {
                        counters.failures.fetch_add(1, Ordering::Relaxed);
                    }
                    warn!(provider = provider.name(), symbol = %symbol, timeframe = %timeframe, error = %e, "Provider failed, trying next");
                    last_error = e;
                }
            }
        }

        match rate_limit {
            Some(retry_after_ms) => Err(ProviderError::RateLimited { retry_after_ms }),
            None => Err(last_error),
        }
    }
}
