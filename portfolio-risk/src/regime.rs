//! Market regime classification seam and strategy compatibility

use async_trait::async_trait;
use common::StrategyKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Market regime as classified by an external component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    TrendingUp,
    TrendingDown,
    Ranging,
    Volatile,
    Crisis,
}

impl MarketRegime {
    pub fn is_trending(self) -> bool {
        matches!(self, MarketRegime::TrendingUp | MarketRegime::TrendingDown)
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarketRegime::TrendingUp => "trending_up",
            MarketRegime::TrendingDown => "trending_down",
            MarketRegime::Ranging => "ranging",
            MarketRegime::Volatile => "volatile",
            MarketRegime::Crisis => "crisis",
        };
        f.write_str(name)
    }
}

/// Whether `strategy` may trade in `regime`.
///
/// Crisis blocks everything. Breakout and trend-following need a market that
/// moves; mean reversion needs one that does not trend.
pub fn is_compatible(strategy: StrategyKind, regime: MarketRegime) -> bool {
    match (strategy, regime) {
        (_, MarketRegime::Crisis) => false,
        (StrategyKind::Breakout | StrategyKind::TrendFollowing, MarketRegime::Ranging) => false,
        (StrategyKind::MeanReversion, r) if r.is_trending() => false,
        _ => true,
    }
}

/// External regime classifier
#[async_trait]
pub trait RegimeSource: Send + Sync {
    /// `None` when the classifier has no opinion for this symbol
    async fn current_regime(&self, symbol: &str) -> Option<MarketRegime>;
}

/// Fixed regimes, with an optional default for unlisted symbols
#[derive(Debug, Clone, Default)]
pub struct StaticRegimeSource {
    regimes: HashMap<String, MarketRegime>,
    fallback: Option<MarketRegime>,
}

impl StaticRegimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_regime(mut self, symbol: impl Into<String>, regime: MarketRegime) -> Self {
        self.regimes.insert(symbol.into(), regime);
        self
    }

    pub fn with_default(mut self, regime: MarketRegime) -> Self {
        self.fallback = Some(regime);
        self
    }
}

#[async_trait]
impl RegimeSource for StaticRegimeSource {
    async fn current_regime(&self, symbol: &str) -> Option<MarketRegime> {
        self.regimes.get(symbol).copied().or(self.fallback)
    }
}
