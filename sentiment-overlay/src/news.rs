//! News-tone sentiment source
//!
//! Scores buffered news articles for a symbol by blending the articles'
//! published tone (-100..100) with a small keyword lexicon. Articles are
//! matched to a symbol through configurable keywords.

use crate::source::{SentimentScore, SentimentSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

const NEGATIVE_WORDS: [&str; 20] = [
    "crisis", "crash", "drop", "fall", "decline", "loss", "fail", "negative", "worst", "downward",
    "bearish", "sell-off", "dump", "collapse", "hack", "exploit", "lawsuit", "ban", "liquidation", "outflow",
];

const POSITIVE_WORDS: [&str; 20] = [
    "growth", "rise", "increase", "gain", "profit", "success", "positive", "record", "upward", "bullish",
    "recovery", "boom", "breakthrough", "approval", "adoption", "partnership", "inflow", "upgrade", "rally",
    "surge",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: String,
    pub title: String,
    /// Semicolon separated theme tags
    pub themes: String,
    /// Published tone, -100 (hostile) to 100 (enthusiastic)
    pub tone: f64,
    pub timestamp: DateTime<Utc>,
}

impl NewsArticle {
    fn text(&self) -> String {
        format!("{} {}", self.title, self.themes).to_lowercase()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsToneConfig {
    /// Below this many relevant articles the source reports nothing
    #[serde(default = "default_min_articles")]
    pub min_articles_threshold: u32,
    #[serde(default = "default_tone_weight")]
    pub tone_weight: f64,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    /// Symbol -> words that make an article relevant to it
    #[serde(default = "default_symbol_keywords")]
    pub symbol_keywords: HashMap<String, Vec<String>>,
}

fn default_min_articles() -> u32 {
    3
}
fn default_tone_weight() -> f64 {
    0.4
}
fn default_keyword_weight() -> f64 {
    0.6
}
fn default_symbol_keywords() -> HashMap<String, Vec<String>> {
    let mut keywords = HashMap::new();
    keywords.insert(
        "BTCUSDT".to_string(),
        vec!["bitcoin".to_string(), "btc".to_string()],
    );
    keywords.insert(
        "ETHUSDT".to_string(),
        vec!["ethereum".to_string(), "eth".to_string(), "ether".to_string()],
    );
    keywords.insert(
        "SOLUSDT".to_string(),
        vec!["solana".to_string(), "sol".to_string()],
    );
    keywords
}

impl Default for NewsToneConfig {
    fn default() -> Self {
        Self {
            min_articles_threshold: default_min_articles(),
            tone_weight: default_tone_weight(),
            keyword_weight: default_keyword_weight(),
            symbol_keywords: default_symbol_keywords(),
        }
    }
}

impl NewsToneConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.min_articles_threshold == 0 {
            return Err(EngineError::config("min_articles_threshold must be at least 1"));
        }
        let sum = self.tone_weight + self.keyword_weight;
        if self.tone_weight < 0.0 || self.keyword_weight < 0.0 || (sum - 1.0).abs() > 1e-9 {
            return Err(EngineError::config(format!(
                "news tone weights must be non-negative and sum to 1, got {} + {}",
                self.tone_weight, self.keyword_weight
            )));
        }
        Ok(())
    }
}

pub struct NewsToneSource {
    config: NewsToneConfig,
    articles: RwLock<Vec<NewsArticle>>,
}

impl NewsToneSource {
    pub fn new(config: NewsToneConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            articles: RwLock::new(Vec::new()),
        })
    }

    pub async fn add_articles(&self, articles: Vec<NewsArticle>) {
        let count = articles.len();
        let mut store = self.articles.write().await;
        store.extend(articles);
        debug!("Added {} articles, total: {}", count, store.len());
    }

    /// Drop articles published before `cutoff`
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) {
        self.articles.write().await.retain(|a| a.timestamp >= cutoff);
    }

    pub async fn article_count(&self) -> usize {
        self.articles.read().await.len()
    }

    fn keywords_for(&self, symbol: &str) -> Vec<String> {
        match self.config.symbol_keywords.get(symbol) {
            Some(words) => words.iter().map(|w| w.to_lowercase()).collect(),
            None => vec![symbol.to_lowercase()],
        }
    }

    fn is_relevant(text: &str, keywords: &[String]) -> bool {
        text.split(|c: char| !c.is_alphanumeric() && c != '-')
            .any(|word| keywords.iter().any(|k| k == word))
    }

    fn score_articles(&self, articles: &[&NewsArticle]) -> SentimentScore {
        let count = articles.len() as u32;
        let avg_tone = articles.iter().map(|a| a.tone).sum::<f64>() / articles.len().max(1) as f64;
        let tone_sentiment = (avg_tone / 100.0).clamp(-1.0, 1.0);

        let (mut hits, mut total) = (0.0, 0.0);
        for article in articles {
            let text = article.text();
            for word in NEGATIVE_WORDS {
                if text.contains(word) {
                    hits -= 1.0;
                    total += 1.0;
                }
            }
            for word in POSITIVE_WORDS {
                if text.contains(word) {
                    hits += 1.0;
                    total += 1.0;
                }
            }
        }
        let keyword_sentiment: f64 = if total > 0.0 { hits / total } else { 0.0 };

        let score = tone_sentiment * self.config.tone_weight + keyword_sentiment * self.config.keyword_weight;

        // more articles and steadier tone -> more confidence
        let threshold = self.config.min_articles_threshold as f64;
        let count_factor = (count as f64 / threshold).min(2.0) / 2.0;
        let tones: Vec<f64> = articles.iter().map(|a| a.tone).collect();
        let drift = tones.windows(2).map(|w| (w[0] - w[1]).abs() / 200.0).sum::<f64>()
            / tones.len().saturating_sub(1).max(1) as f64;
        let confidence = (count_factor + (1.0 - drift)) / 2.0;

        SentimentScore::new(score.clamp(-1.0, 1.0), confidence.clamp(0.0, 1.0), count)
    }
}

#[async_trait]
impl SentimentSource for NewsToneSource {
    fn name(&self) -> &str {
        "news_tone"
    }

    async fn fetch_sentiment(&self, symbol: &str) -> Option<SentimentScore> {
        let keywords = self.keywords_for(symbol);
        let articles = self.articles.read().await;
        let relevant: Vec<&NewsArticle> = articles
            .iter()
            .filter(|a| Self::is_relevant(&a.text(), &keywords))
            .collect();

        if (relevant.len() as u32) < self.config.min_articles_threshold {
            debug!(
                symbol = %symbol,
                relevant = relevant.len(),
                required = self.config.min_articles_threshold,
                "Not enough news for sentiment"
            );
            return None;
        }

        Some(self.score_articles(&relevant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::fixtures;

    fn article(id: &str, title: &str, tone: f64) -> NewsArticle {
        NewsArticle {
            id: id.to_string(),
            title: title.to_string(),
            themes: "CRYPTO;MARKETS".to_string(),
            tone,
            timestamp: fixtures::base_time(),
        }
    }

    #[tokio::test]
    async fn test_below_threshold_is_absent() {
        let source = NewsToneSource::new(NewsToneConfig::default()).unwrap();
        source
            .add_articles(vec![article("1", "Bitcoin rally continues", 40.0)])
            .await;

        assert!(source.fetch_sentiment("BTCUSDT").await.is_none());
    }

    #[tokio::test]
    async fn test_positive_news_scores_positive() {
        let source = NewsToneSource::new(NewsToneConfig::default()).unwrap();
        source
            .add_articles(vec![
                article("1", "Bitcoin rally continues on ETF approval", 45.0),
                article("2", "BTC inflow hits record", 30.0),
                article("3", "Bitcoin adoption growth accelerates", 35.0),
                article("4", "Ethereum upgrade delayed after exploit", -40.0),
            ])
            .await;

        let score = source.fetch_sentiment("BTCUSDT").await.unwrap();
        assert_eq!(score.sample_size, 3);
        assert!(score.score > 0.0);
        assert!(score.is_valid());
    }

    #[tokio::test]
    async fn test_negative_news_scores_negative() {
        let source = NewsToneSource::new(NewsToneConfig::default()).unwrap();
        source
            .add_articles(vec![
                article("1", "Ethereum exploit drains bridge", -60.0),
                article("2", "ETH liquidation cascade", -45.0),
                article("3", "Ether sell-off deepens amid lawsuit", -50.0),
            ])
            .await;

        let score = source.fetch_sentiment("ETHUSDT").await.unwrap();
        assert!(score.score < 0.0);
    }

    #[tokio::test]
    async fn test_prune_drops_old_articles() {
        let source = NewsToneSource::new(NewsToneConfig::default()).unwrap();
        source.add_articles(vec![article("1", "Bitcoin", 0.0)]).await;
        source
            .prune_older_than(fixtures::base_time() + chrono::Duration::hours(1))
            .await;
        assert_eq!(source.article_count().await, 0);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let config = NewsToneConfig {
            tone_weight: 0.7,
            keyword_weight: 0.7,
            ..Default::default()
        };
        assert!(NewsToneSource::new(config).is_err());
    }
}
