//! Portfolio & Risk Gate
//!
//! Pre-trade approval for fused signals: seven independent checks evaluated
//! over one immutable portfolio snapshot, with safe fallbacks for missing
//! portfolio data.

mod config;
mod correlation;
mod portfolio;
mod regime;
mod risk;
mod sizing;

pub use config::{create_config_template, load_config, save_config, RegimePolicy, RiskConfig};
pub use correlation::{pearson, HistoricalCorrelation};
pub use portfolio::{
    DataPoint, InMemoryPortfolio, OpenPosition, PnlPeriod, PortfolioSnapshot, PortfolioState, TradeSide,
};
pub use regime::{is_compatible, MarketRegime, RegimeSource, StaticRegimeSource};
pub use risk::{
    CheckResult, DecisionStatus, FallbackMetadata, RiskDecision, RiskGate, TradeRequest, CHECK_CORRELATION,
    CHECK_DAILY_LOSS, CHECK_PORTFOLIO_HEAT, CHECK_POSITION_SIZE, CHECK_REGIME, CHECK_VOLATILITY_SIZING,
    CHECK_WEEKLY_LOSS,
};
pub use sizing::{risk_fraction, size_deviation, volatility_size};
