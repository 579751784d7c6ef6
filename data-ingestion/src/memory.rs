//! In-memory provider for tests and demos

use crate::provider::{CandleProvider, ProviderError};
use async_trait::async_trait;
use common::{CandleSeries, Timeframe};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

type Key = (String, Timeframe);

/// Serves pre-loaded series, optionally failing first with scripted errors.
pub struct InMemoryProvider {
    name: String,
    series: RwLock<HashMap<Key, CandleSeries>>,
    failures: RwLock<HashMap<Key, VecDeque<ProviderError>>>,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl InMemoryProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            series: RwLock::new(HashMap::new()),
            failures: RwLock::new(HashMap::new()),
            latency: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Delay every response, to exercise request timeouts.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn insert(&self, series: CandleSeries) {
        let key = (series.symbol().to_string(), series.timeframe());
        self.series.write().await.insert(key, series);
    }

    /// Queue an error returned by the next fetch for this symbol/timeframe.
    pub async fn push_failure(&self, symbol: &str, timeframe: Timeframe, error: ProviderError) {
        self.failures
            .write()
            .await
            .entry((symbol.to_string(), timeframe))
            .or_default()
            .push_back(error);
    }

    /// Total fetches served so far, successful or not
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandleProvider for InMemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<CandleSeries, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let key = (symbol.to_string(), timeframe);
        if let Some(error) = self
            .failures
            .write()
            .await
            .get_mut(&key)
            .and_then(|queue| queue.pop_front())
        {
            return Err(error);
        }

        let series = self.series.read().await;
        let stored = series
            .get(&key)
            .ok_or_else(|| ProviderError::NotFound(format!("{} {}", symbol, timeframe)))?;

        let start = stored.len().saturating_sub(lookback);
        CandleSeries::new(symbol, timeframe, stored.candles()[start..].to_vec())
            .map_err(|e| ProviderError::Other(e.to_string()))
    }
}
