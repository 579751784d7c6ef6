use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// One source's view of a symbol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    /// -1.0 (very negative) to 1.0 (very positive)
    pub score: f64,
    /// 0.0 to 1.0
    pub confidence: f64,
    /// Observations behind the score (articles, posts, ...)
    pub sample_size: u32,
}

impl SentimentScore {
    pub fn new(score: f64, confidence: f64, sample_size: u32) -> Self {
        Self {
            score,
            confidence,
            sample_size,
        }
    }

    /// Finite score in [-1, 1] and finite confidence in [0, 1].
    pub fn is_valid(&self) -> bool {
        self.score.is_finite()
            && (-1.0..=1.0).contains(&self.score)
            && self.confidence.is_finite()
            && (0.0..=1.0).contains(&self.confidence)
    }
}

/// A sentiment feed.
///
/// `None` means the source genuinely has nothing for this symbol: it is not
/// configured, failed, or lacks enough data. It never means "neutral".
#[async_trait]
pub trait SentimentSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_sentiment(&self, symbol: &str) -> Option<SentimentScore>;
}

/// Fixed per-symbol scores
pub struct StaticSentimentSource {
    name: String,
    scores: RwLock<HashMap<String, SentimentScore>>,
}

impl StaticSentimentSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scores: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_score(mut self, symbol: impl Into<String>, score: SentimentScore) -> Self {
        self.scores.get_mut().insert(symbol.into(), score);
        self
    }

    pub async fn set_score(&self, symbol: impl Into<String>, score: SentimentScore) {
        self.scores.write().await.insert(symbol.into(), score);
    }
}

#[async_trait]
impl SentimentSource for StaticSentimentSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_sentiment(&self, symbol: &str) -> Option<SentimentScore> {
        self.scores.read().await.get(symbol).copied()
    }
}
