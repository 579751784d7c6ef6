//! Concurrent sentiment collection

use crate::source::{SentimentScore, SentimentSource};
use common::{EngineError, EngineResult};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// A source that takes longer than this is treated as unavailable
    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,
}

fn default_enabled() -> bool {
    true
}
fn default_source_timeout_ms() -> u64 {
    2_000
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            source_timeout_ms: default_source_timeout_ms(),
        }
    }
}

impl OverlayConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.source_timeout_ms == 0 {
            return Err(EngineError::config("source_timeout_ms must be positive"));
        }
        Ok(())
    }
}

/// Scores from the sources that answered, keyed by source name.
///
/// Empty means "no sentiment input". A source with nothing to say has no
/// entry at all, never a zero entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    scores: BTreeMap<String, SentimentScore>,
}

impl SentimentReading {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a reading, dropping invalid scores.
    pub fn from_scores<I>(scores: I) -> Self
    where
        I: IntoIterator<Item = (String, SentimentScore)>,
    {
        let mut reading = Self::default();
        for (source, score) in scores {
            reading.insert(source, score);
        }
        reading
    }

    fn insert(&mut self, source: String, score: SentimentScore) -> bool {
        if !score.is_valid() {
            warn!(source = %source, score = score.score, "Dropping out-of-range sentiment score");
            return false;
        }
        self.scores.insert(source, score);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn get(&self, source: &str) -> Option<&SentimentScore> {
        self.scores.get(source)
    }

    /// Entries in source-name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SentimentScore)> {
        self.scores.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Unweighted mean of the source scores, `None` when empty.
    pub fn mean_score(&self) -> Option<f64> {
        if self.scores.is_empty() {
            return None;
        }
        Some(self.scores.values().map(|s| s.score).sum::<f64>() / self.scores.len() as f64)
    }
}

/// Queries every registered source for a symbol.
pub struct SentimentOverlay {
    sources: Vec<Arc<dyn SentimentSource>>,
    config: OverlayConfig,
}

impl SentimentOverlay {
    pub fn new(config: OverlayConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            sources: Vec::new(),
            config,
        })
    }

    /// Register a source. A second source with an existing name is ignored.
    pub fn add_source(mut self, source: Arc<dyn SentimentSource>) -> Self {
        if self.sources.iter().any(|s| s.name() == source.name()) {
            warn!(source = source.name(), "Sentiment source already registered, ignoring");
            return self;
        }
        debug!(source = source.name(), "Adding sentiment source");
        self.sources.push(source);
        self
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub async fn read(&self, symbol: &str) -> SentimentReading {
        if !self.config.enabled || self.sources.is_empty() {
            return SentimentReading::empty();
        }

        let timeout = Duration::from_millis(self.config.source_timeout_ms);
        let calls = self.sources.iter().map(|source| async move {
            let result = tokio::time::timeout(timeout, source.fetch_sentiment(symbol)).await;
            match result {
                Ok(score) => score.map(|s| (source.name().to_string(), s)),
                Err(_) => {
                    warn!(source = source.name(), symbol = %symbol, "Sentiment source timed out");
                    None
                }
            }
        });

        let reading = SentimentReading::from_scores(join_all(calls).await.into_iter().flatten());
        debug!(symbol = %symbol, sources = reading.len(), "Collected sentiment");
        reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSentimentSource;
    use async_trait::async_trait;

    struct HangingSource;

    #[async_trait]
    impl SentimentSource for HangingSource {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn fetch_sentiment(&self, _symbol: &str) -> Option<SentimentScore> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Some(SentimentScore::new(0.9, 1.0, 1))
        }
    }

    fn overlay(timeout_ms: u64) -> SentimentOverlay {
        SentimentOverlay::new(OverlayConfig {
            enabled: true,
            source_timeout_ms: timeout_ms,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_no_sources_gives_empty_reading() {
        let reading = overlay(100).read("BTCUSDT").await;
        assert!(reading.is_empty());
        assert_eq!(reading.mean_score(), None);
    }

    #[tokio::test]
    async fn test_unconfigured_symbol_has_no_entry() {
        let source = StaticSentimentSource::new("desk").with_score("BTCUSDT", SentimentScore::new(0.5, 0.8, 3));
        let overlay = overlay(100).add_source(Arc::new(source));

        assert_eq!(overlay.read("BTCUSDT").await.len(), 1);
        let reading = overlay.read("ETHUSDT").await;
        assert!(reading.get("desk").is_none());
        assert!(reading.is_empty());
    }

    #[tokio::test]
    async fn test_hanging_source_is_absent() {
        let good = StaticSentimentSource::new("desk").with_score("BTCUSDT", SentimentScore::new(-0.2, 0.8, 3));
        let overlay = overlay(20)
            .add_source(Arc::new(good))
            .add_source(Arc::new(HangingSource));

        let reading = overlay.read("BTCUSDT").await;
        assert_eq!(reading.len(), 1);
        assert!(reading.get("hanging").is_none());
        assert_eq!(reading.mean_score(), Some(-0.2));
    }

    #[tokio::test]
    async fn test_out_of_range_scores_are_dropped_not_clamped() {
        let bad = StaticSentimentSource::new("broken").with_score("BTCUSDT", SentimentScore::new(3.0, 0.5, 3));
        let good = StaticSentimentSource::new("desk").with_score("BTCUSDT", SentimentScore::new(0.4, 0.5, 3));
        let overlay = overlay(100).add_source(Arc::new(bad)).add_source(Arc::new(good));

        let reading = overlay.read("BTCUSDT").await;
        assert!(reading.get("broken").is_none());
        assert_eq!(reading.mean_score(), Some(0.4));
    }

    #[test]
    fn test_duplicate_source_names_ignored() {
        let overlay = overlay(100)
            .add_source(Arc::new(StaticSentimentSource::new("desk")))
            .add_source(Arc::new(StaticSentimentSource::new("desk")));
        assert_eq!(overlay.source_count(), 1);
    }
}
