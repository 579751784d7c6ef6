//! Portfolio state capability and the immutable snapshot the risk gate reads

use crate::correlation::HistoricalCorrelation;
use crate::regime::{MarketRegime, RegimeSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use tokio::sync::RwLock;
use tracing::debug;

/// A value the portfolio backend either knows or explicitly does not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataPoint<T> {
    Known(T),
    NoData,
}

impl<T> DataPoint<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, DataPoint::Known(_))
    }

    pub fn as_known(&self) -> Option<&T> {
        match self {
            DataPoint::Known(v) => Some(v),
            DataPoint::NoData => None,
        }
    }

    pub fn known(self) -> Option<T> {
        match self {
            DataPoint::Known(v) => Some(v),
            DataPoint::NoData => None,
        }
    }
}

impl<T> From<Option<T>> for DataPoint<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => DataPoint::Known(v),
            None => DataPoint::NoData,
        }
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Long,
    Short,
}

impl TradeSide {
    /// A stop must sit below a long entry and above a short entry
    pub fn stop_is_valid(self, entry: f64, stop: f64) -> bool {
        if !entry.is_finite() || !stop.is_finite() {
            return false;
        }
        match self {
            TradeSide::Long => stop < entry,
            TradeSide::Short => stop > entry,
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Long => write!(f, "long"),
            TradeSide::Short => write!(f, "short"),
        }
    }
}

/// An open position as reported by the portfolio backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub symbol: String,
    pub side: TradeSide,
    pub size: f64,
    pub entry_price: f64,
    pub stop_price: f64,
}

impl OpenPosition {
    pub fn new(symbol: impl Into<String>, side: TradeSide, size: f64, entry_price: f64, stop_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size,
            entry_price,
            stop_price,
        }
    }

    /// Loss if the stop is hit; non-finite inputs count as zero
    pub fn risk_amount(&self) -> f64 {
        let risk = self.size.abs() * (self.entry_price - self.stop_price).abs();
        if risk.is_finite() {
            risk
        } else {
            0.0
        }
    }
}

/// Realized P&L window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PnlPeriod {
    Today,
    /// Rolling seven days
    Week,
}

/// Read access to the live portfolio
#[async_trait]
pub trait PortfolioState: Send + Sync {
    async fn account_equity(&self) -> DataPoint<f64>;

    async fn open_positions(&self) -> DataPoint<Vec<OpenPosition>>;

    /// Signed realized P&L; losses are negative
    async fn realized_pnl(&self, period: PnlPeriod) -> DataPoint<f64>;

    async fn correlation(&self, symbol: &str, other: &str) -> DataPoint<f64>;
}

/// Everything the risk gate needs, captured once per decision.
///
/// Immutable after capture so every check sees the same portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    captured_at: DateTime<Utc>,
    equity: DataPoint<f64>,
    positions: DataPoint<Vec<OpenPosition>>,
    pnl_today: DataPoint<f64>,
    pnl_week: DataPoint<f64>,
    correlations: BTreeMap<String, DataPoint<f64>>,
    regime: Option<MarketRegime>,
}

impl PortfolioSnapshot {
    /// Snapshot with only equity known; use the `with_*` builders for the rest
    pub fn new(captured_at: DateTime<Utc>, equity: DataPoint<f64>) -> Self {
        Self {
            captured_at,
            equity,
            positions: DataPoint::NoData,
            pnl_today: DataPoint::NoData,
            pnl_week: DataPoint::NoData,
            correlations: BTreeMap::new(),
            regime: None,
        }
    }

    /// Query the portfolio (and optional regime classifier) for `symbol`.
    ///
    /// Correlations are fetched between `symbol` and each other symbol held.
    pub async fn capture(
        state: &dyn PortfolioState,
        regimes: Option<&dyn RegimeSource>,
        symbol: &str,
    ) -> Self {
        let captured_at = Utc::now();
        let equity = state.account_equity().await;
        let positions = state.open_positions().await;
        let pnl_today = state.realized_pnl(PnlPeriod::Today).await;
        let pnl_week = state.realized_pnl(PnlPeriod::Week).await;

        let mut correlations = BTreeMap::new();
        if let DataPoint::Known(open) = &positions {
            let others: BTreeSet<&str> = open
                .iter()
                .map(|p| p.symbol.as_str())
                .filter(|s| *s != symbol)
                .collect();
            for other in others {
                let value = state.correlation(symbol, other).await;
                correlations.insert(other.to_string(), value);
            }
        }

        let regime = match regimes {
            Some(source) => source.current_regime(symbol).await,
            None => None,
        };

        debug!(
            symbol = %symbol,
            equity_known = equity.is_known(),
            positions_known = positions.is_known(),
            correlations = correlations.len(),
            regime = ?regime,
            "Captured portfolio snapshot"
        );

        Self {
            captured_at,
            equity,
            positions,
            pnl_today,
            pnl_week,
            correlations,
            regime,
        }
    }

    pub fn with_positions(mut self, positions: Vec<OpenPosition>) -> Self {
        self.positions = DataPoint::Known(positions);
        self
    }

    pub fn with_realized_pnl(mut self, period: PnlPeriod, pnl: f64) -> Self {
        match period {
            PnlPeriod::Today => self.pnl_today = DataPoint::Known(pnl),
            PnlPeriod::Week => self.pnl_week = DataPoint::Known(pnl),
        }
        self
    }

    pub fn with_correlation(mut self, other: impl Into<String>, correlation: f64) -> Self {
        self.correlations.insert(other.into(), DataPoint::Known(correlation));
        self
    }

    pub fn with_regime(mut self, regime: MarketRegime) -> Self {
        self.regime = Some(regime);
        self
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn equity(&self) -> &DataPoint<f64> {
        &self.equity
    }

    pub fn positions(&self) -> &DataPoint<Vec<OpenPosition>> {
        &self.positions
    }

    pub fn realized_pnl(&self, period: PnlPeriod) -> &DataPoint<f64> {
        match period {
            PnlPeriod::Today => &self.pnl_today,
            PnlPeriod::Week => &self.pnl_week,
        }
    }

    /// Correlation between the snapshot's symbol and `other`
    pub fn correlation_with(&self, other: &str) -> DataPoint<f64> {
        self.correlations.get(other).cloned().unwrap_or(DataPoint::NoData)
    }

    pub fn regime(&self) -> Option<MarketRegime> {
        self.regime
    }
}

#[derive(Debug, Default)]
struct PortfolioBook {
    equity: Option<f64>,
    positions: Option<Vec<OpenPosition>>,
    realized: HashMap<PnlPeriod, f64>,
    correlations: HashMap<(String, String), f64>,
}

/// In-process portfolio for demos and tests.
///
/// Anything never set reports `NoData`.
#[derive(Debug, Default)]
pub struct InMemoryPortfolio {
    book: RwLock<PortfolioBook>,
    history: Option<HistoricalCorrelation>,
}

impl InMemoryPortfolio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_equity(mut self, equity: f64) -> Self {
        self.book.get_mut().equity = Some(equity);
        self
    }

    /// Fall back to historical returns when no explicit correlation is set
    pub fn with_history(mut self, history: HistoricalCorrelation) -> Self {
        self.history = Some(history);
        self
    }

    pub async fn set_equity(&self, equity: f64) {
        self.book.write().await.equity = Some(equity);
    }

    pub async fn open_position(&self, position: OpenPosition) {
        self.book
            .write()
            .await
            .positions
            .get_or_insert_with(Vec::new)
            .push(position);
    }

    /// Mark positions as known and empty
    pub async fn clear_positions(&self) {
        self.book.write().await.positions = Some(Vec::new());
    }

    pub async fn record_realized_pnl(&self, period: PnlPeriod, pnl: f64) {
        *self.book.write().await.realized.entry(period).or_insert(0.0) += pnl;
    }

    pub async fn set_correlation(&self, symbol: &str, other: &str, correlation: f64) {
        self.book
            .write()
            .await
            .correlations
            .insert(correlation_key(symbol, other), correlation);
    }
}

fn correlation_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[async_trait]
impl PortfolioState for InMemoryPortfolio {
    async fn account_equity(&self) -> DataPoint<f64> {
        self.book.read().await.equity.into()
    }

    async fn open_positions(&self) -> DataPoint<Vec<OpenPosition>> {
        self.book.read().await.positions.clone().into()
    }

    async fn realized_pnl(&self, period: PnlPeriod) -> DataPoint<f64> {
        self.book.read().await.realized.get(&period).copied().into()
    }

    async fn correlation(&self, symbol: &str, other: &str) -> DataPoint<f64> {
        if symbol == other {
            return DataPoint::Known(1.0);
        }
        if let Some(c) = self.book.read().await.correlations.get(&correlation_key(symbol, other)) {
            return DataPoint::Known(*c);
        }
        match &self.history {
            Some(history) => history.correlation(symbol, other),
            None => DataPoint::NoData,
        }
    }
}
