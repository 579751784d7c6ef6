//! Pre-trade risk gate: seven independent checks over one portfolio snapshot

use crate::config::RiskConfig;
use crate::portfolio::{DataPoint, PnlPeriod, PortfolioSnapshot, TradeSide};
use crate::regime::is_compatible;
use crate::sizing::{risk_fraction, size_deviation, volatility_size};
use chrono::{DateTime, Utc};
use common::{EngineResult, StrategyKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

pub const CHECK_POSITION_SIZE: &str = "position_size";
pub const CHECK_PORTFOLIO_HEAT: &str = "portfolio_heat";
pub const CHECK_DAILY_LOSS: &str = "daily_loss_limit";
pub const CHECK_WEEKLY_LOSS: &str = "weekly_loss_limit";
pub const CHECK_CORRELATION: &str = "correlation";
pub const CHECK_VOLATILITY_SIZING: &str = "volatility_sizing";
pub const CHECK_REGIME: &str = "regime";

/// Limits are inclusive; this absorbs float noise at the boundary
const LIMIT_EPSILON: f64 = 1e-9;

/// A proposed trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub symbol: String,
    pub side: TradeSide,
    pub size: f64,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    /// Strategy the originating pattern was meant for
    pub strategy: StrategyKind,
    /// ATR on the signal's timeframe, if known
    pub atr: Option<f64>,
    /// Trade despite a regime mismatch
    #[serde(default)]
    pub regime_override: bool,
}

impl TradeRequest {
    pub fn new(
        symbol: impl Into<String>,
        side: TradeSide,
        size: f64,
        entry_price: f64,
        stop_price: f64,
        target_price: f64,
        strategy: StrategyKind,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size,
            entry_price,
            stop_price,
            target_price,
            strategy,
            atr: None,
            regime_override: false,
        }
    }

    pub fn with_atr(mut self, atr: f64) -> Self {
        self.atr = Some(atr);
        self
    }

    pub fn with_regime_override(mut self) -> Self {
        self.regime_override = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    Approved,
    Rejected,
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionStatus::Approved => write!(f, "APPROVED"),
            DecisionStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub reason: String,
    /// A missing input was replaced by its safe default
    pub used_fallback: bool,
}

impl CheckResult {
    fn pass(name: &str, reason: String, used_fallback: bool) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            reason,
            used_fallback,
        }
    }

    fn fail(name: &str, reason: String, used_fallback: bool) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            reason,
            used_fallback,
        }
    }
}

/// Which checks rested on real data and which on fallbacks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FallbackMetadata {
    /// Checks that substituted a safe default for missing data
    pub assumed_safe: Vec<String>,
    /// Checks that passed on known data only
    pub verified_safe: Vec<String>,
}

impl FallbackMetadata {
    pub fn is_fully_verified(&self) -> bool {
        self.assumed_safe.is_empty()
    }
}

/// Final verdict on a trade request. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDecision {
    request: TradeRequest,
    status: DecisionStatus,
    checks: Vec<CheckResult>,
    rejection_reasons: Vec<String>,
    fallbacks: FallbackMetadata,
    decided_at: DateTime<Utc>,
}

impl RiskDecision {
    pub fn request(&self) -> &TradeRequest {
        &self.request
    }

    pub fn status(&self) -> DecisionStatus {
        self.status
    }

    pub fn is_approved(&self) -> bool {
        self.status == DecisionStatus::Approved
    }

    pub fn checks(&self) -> &[CheckResult] {
        &self.checks
    }

    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    /// Names of the failing checks, in evaluation order
    pub fn rejection_reasons(&self) -> &[String] {
        &self.rejection_reasons
    }

    pub fn fallbacks(&self) -> &FallbackMetadata {
        &self.fallbacks
    }

    /// The snapshot's capture time
    pub fn decided_at(&self) -> DateTime<Utc> {
        self.decided_at
    }
}

/// Inputs shared by the equity-relative checks
struct TradeExposure {
    equity: f64,
    trade_risk: f64,
}

/// Risk gate evaluating trade requests against a portfolio snapshot
#[derive(Debug, Clone)]
pub struct RiskGate {
    config: RiskConfig,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Run all seven checks.
    ///
    /// Pure in (request, snapshot, config): identical inputs give identical
    /// decisions, timestamp included.
    pub fn evaluate_risk(&self, request: &TradeRequest, snapshot: &PortfolioSnapshot) -> RiskDecision {
        let exposure = self.trade_exposure(request, snapshot);

        let checks = vec![
            self.check_position_size(&exposure),
            self.check_portfolio_heat(snapshot, &exposure),
            self.check_loss_limit(CHECK_DAILY_LOSS, PnlPeriod::Today, self.config.daily_loss_limit, snapshot, &exposure),
            self.check_loss_limit(CHECK_WEEKLY_LOSS, PnlPeriod::Week, self.config.weekly_loss_limit, snapshot, &exposure),
            self.check_correlation(request, snapshot, &exposure),
            self.check_volatility_sizing(request, &exposure),
            self.check_regime(request, snapshot),
        ];

        let mut rejection_reasons = Vec::new();
        let mut fallbacks = FallbackMetadata::default();
        for check in &checks {
            debug!(
                symbol = %request.symbol,
                check = %check.name,
                passed = check.passed,
                fallback = check.used_fallback,
                "{}",
                check.reason
            );
            if !check.passed {
                rejection_reasons.push(check.name.clone());
            }
            if check.used_fallback {
                fallbacks.assumed_safe.push(check.name.clone());
            } else if check.passed {
                fallbacks.verified_safe.push(check.name.clone());
            }
        }

        let status = if rejection_reasons.is_empty() {
            DecisionStatus::Approved
        } else {
            DecisionStatus::Rejected
        };

        if !fallbacks.assumed_safe.is_empty() {
            warn!(
                symbol = %request.symbol,
                checks = ?fallbacks.assumed_safe,
                "Risk checks fell back to safe defaults for missing data"
            );
        }
        info!(
            symbol = %request.symbol,
            side = %request.side,
            size = request.size,
            status = %status,
            reasons = ?rejection_reasons,
            "Risk decision"
        );

        RiskDecision {
            request: request.clone(),
            status,
            checks,
            rejection_reasons,
            fallbacks,
            decided_at: snapshot.captured_at(),
        }
    }

    /// Equity and this trade's risk fraction, or why they cannot be computed
    fn trade_exposure(&self, request: &TradeRequest, snapshot: &PortfolioSnapshot) -> Result<TradeExposure, String> {
        let equity = match snapshot.equity() {
            DataPoint::Known(e) if e.is_finite() && *e > 0.0 => *e,
            DataPoint::Known(e) => return Err(format!("non-positive account equity {}", e)),
            DataPoint::NoData => return Err("account equity unavailable".to_string()),
        };
        if !request.side.stop_is_valid(request.entry_price, request.stop_price) {
            return Err(format!(
                "invalid stop {} for {} entry {}",
                request.stop_price, request.side, request.entry_price
            ));
        }
        let trade_risk = risk_fraction(request.size, request.entry_price, request.stop_price, equity)
            .ok_or_else(|| format!("invalid position size {}", request.size))?;
        Ok(TradeExposure { equity, trade_risk })
    }

    fn check_position_size(&self, exposure: &Result<TradeExposure, String>) -> CheckResult {
        let exposure = match exposure {
            Ok(e) => e,
            Err(reason) => return CheckResult::fail(CHECK_POSITION_SIZE, reason.clone(), false),
        };
        let limit = self.config.max_risk_per_trade;
        let reason = format!("trade risk {} vs limit {}", pct(exposure.trade_risk), pct(limit));
        if within(exposure.trade_risk, limit) {
            CheckResult::pass(CHECK_POSITION_SIZE, reason, false)
        } else {
            CheckResult::fail(CHECK_POSITION_SIZE, reason, false)
        }
    }

    fn check_portfolio_heat(&self, snapshot: &PortfolioSnapshot, exposure: &Result<TradeExposure, String>) -> CheckResult {
        let exposure = match exposure {
            Ok(e) => e,
            Err(reason) => return CheckResult::fail(CHECK_PORTFOLIO_HEAT, reason.clone(), false),
        };
        let (open_risk, fallback) = match snapshot.positions() {
            DataPoint::Known(positions) => (positions.iter().map(|p| p.risk_amount()).sum::<f64>() / exposure.equity, false),
            DataPoint::NoData => (0.0, true),
        };
        let heat = open_risk + exposure.trade_risk;
        let limit = self.config.max_portfolio_heat;
        let reason = format!(
            "open heat {} + trade {} = {} vs limit {}",
            pct(open_risk),
            pct(exposure.trade_risk),
            pct(heat),
            pct(limit)
        );
        if within(heat, limit) {
            CheckResult::pass(CHECK_PORTFOLIO_HEAT, reason, fallback)
        } else {
            CheckResult::fail(CHECK_PORTFOLIO_HEAT, reason, fallback)
        }
    }

    fn check_loss_limit(
        &self,
        name: &str,
        period: PnlPeriod,
        limit: f64,
        snapshot: &PortfolioSnapshot,
        exposure: &Result<TradeExposure, String>,
    ) -> CheckResult {
        let exposure = match exposure {
            Ok(e) => e,
            Err(reason) => return CheckResult::fail(name, reason.clone(), false),
        };
        let (realized_loss, fallback) = match snapshot.realized_pnl(period) {
            DataPoint::Known(pnl) if pnl.is_finite() => ((-pnl).max(0.0) / exposure.equity, false),
            _ => (0.0, true),
        };
        let worst_case = realized_loss + exposure.trade_risk;
        let reason = format!(
            "realized loss {} + trade {} = {} vs limit {}",
            pct(realized_loss),
            pct(exposure.trade_risk),
            pct(worst_case),
            pct(limit)
        );
        if within(worst_case, limit) {
            CheckResult::pass(name, reason, fallback)
        } else {
            CheckResult::fail(name, reason, fallback)
        }
    }

    fn check_correlation(
        &self,
        request: &TradeRequest,
        snapshot: &PortfolioSnapshot,
        exposure: &Result<TradeExposure, String>,
    ) -> CheckResult {
        let exposure = match exposure {
            Ok(e) => e,
            Err(reason) => return CheckResult::fail(CHECK_CORRELATION, reason.clone(), false),
        };

        let mut fallback = false;
        let mut correlated_risk = 0.0;
        match snapshot.positions() {
            DataPoint::Known(positions) => {
                for position in positions {
                    let correlation = if position.symbol == request.symbol {
                        1.0
                    } else {
                        match snapshot.correlation_with(&position.symbol) {
                            DataPoint::Known(c) if c.is_finite() => c,
                            _ => {
                                fallback = true;
                                0.0
                            }
                        }
                    };
                    if correlation.abs() >= self.config.correlation_threshold {
                        correlated_risk += position.risk_amount() / exposure.equity;
                    }
                }
            }
            DataPoint::NoData => fallback = true,
        }

        let total = correlated_risk + exposure.trade_risk;
        let limit = self.config.max_correlated_exposure;
        let reason = format!(
            "correlated risk {} + trade {} = {} vs limit {}",
            pct(correlated_risk),
            pct(exposure.trade_risk),
            pct(total),
            pct(limit)
        );
        if within(total, limit) {
            CheckResult::pass(CHECK_CORRELATION, reason, fallback)
        } else {
            CheckResult::fail(CHECK_CORRELATION, reason, fallback)
        }
    }

    fn check_volatility_sizing(&self, request: &TradeRequest, exposure: &Result<TradeExposure, String>) -> CheckResult {
        let exposure = match exposure {
            Ok(e) => e,
            Err(reason) => return CheckResult::fail(CHECK_VOLATILITY_SIZING, reason.clone(), false),
        };
        let recomputed = request.atr.and_then(|atr| {
            volatility_size(
                exposure.equity,
                self.config.max_risk_per_trade,
                atr,
                self.config.atr_stop_multiple,
            )
        });
        let recomputed = match recomputed {
            Some(size) => size,
            None => {
                return CheckResult::pass(CHECK_VOLATILITY_SIZING, "ATR unavailable, sizing not verified".to_string(), true)
            }
        };

        let tolerance = self.config.sizing_tolerance;
        match size_deviation(request.size, recomputed) {
            Some(deviation) => {
                let reason = format!(
                    "proposed size {:.4} vs volatility size {:.4}, deviation {} vs tolerance {}",
                    request.size,
                    recomputed,
                    pct(deviation),
                    pct(tolerance)
                );
                if within(deviation, tolerance) {
                    CheckResult::pass(CHECK_VOLATILITY_SIZING, reason, false)
                } else {
                    CheckResult::fail(CHECK_VOLATILITY_SIZING, reason, false)
                }
            }
            None => CheckResult::fail(
                CHECK_VOLATILITY_SIZING,
                format!("invalid position size {}", request.size),
                false,
            ),
        }
    }

    fn check_regime(&self, request: &TradeRequest, snapshot: &PortfolioSnapshot) -> CheckResult {
        if !self.config.regime.enforce {
            return CheckResult::pass(CHECK_REGIME, "regime enforcement disabled".to_string(), false);
        }
        let regime = match snapshot.regime() {
            Some(r) => r,
            None => return CheckResult::pass(CHECK_REGIME, "regime unknown".to_string(), true),
        };
        if is_compatible(request.strategy, regime) {
            return CheckResult::pass(CHECK_REGIME, format!("{} suits {} regime", request.strategy, regime), false);
        }
        if request.regime_override && self.config.regime.allow_override {
            return CheckResult::pass(
                CHECK_REGIME,
                format!("{} in {} regime allowed by override", request.strategy, regime),
                false,
            );
        }
        CheckResult::fail(CHECK_REGIME, format!("{} not allowed in {} regime", request.strategy, regime), false)
    }
}

fn within(value: f64, limit: f64) -> bool {
    value <= limit + LIMIT_EPSILON
}

fn pct(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::OpenPosition;
    use crate::regime::MarketRegime;
    use chrono::TimeZone;

    fn gate() -> RiskGate {
        RiskGate::new(RiskConfig::default()).unwrap()
    }

    fn captured_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn snapshot() -> PortfolioSnapshot {
        PortfolioSnapshot::new(captured_at(), DataPoint::Known(100_000.0))
            .with_positions(Vec::new())
            .with_realized_pnl(PnlPeriod::Today, 0.0)
            .with_realized_pnl(PnlPeriod::Week, 0.0)
            .with_regime(MarketRegime::TrendingUp)
    }

    /// Long BTC at 100 with a 1-point stop; `size` of 1000 risks 1% of 100k
    fn long(size: f64) -> TradeRequest {
        TradeRequest::new("BTCUSDT", TradeSide::Long, size, 100.0, 99.0, 102.0, StrategyKind::Reversal)
    }

    #[test]
    fn test_clean_trade_is_verified() {
        let decision = gate().evaluate_risk(&long(500.0), &snapshot());
        assert!(decision.is_approved());
        assert!(decision.rejection_reasons().is_empty());
        assert_eq!(decision.checks().len(), 7);
        // only the ATR is missing
        assert_eq!(decision.fallbacks().assumed_safe, vec![CHECK_VOLATILITY_SIZING.to_string()]);
        assert_eq!(decision.fallbacks().verified_safe.len(), 6);
    }

    #[test]
    fn test_three_percent_stop_risk_rejected() {
        let request = TradeRequest::new("BTCUSDT", TradeSide::Long, 1000.0, 100.0, 97.0, 106.0, StrategyKind::Reversal);
        let decision = gate().evaluate_risk(&request, &snapshot());

        assert_eq!(decision.status(), DecisionStatus::Rejected);
        assert_eq!(decision.rejection_reasons(), &[CHECK_POSITION_SIZE.to_string()]);
        assert!(!decision.check(CHECK_POSITION_SIZE).unwrap().passed);
    }

    #[test]
    fn test_portfolio_heat_boundary() {
        // 5.5% already at risk
        let positions = vec![OpenPosition::new("ETHUSDT", TradeSide::Long, 55.0, 1000.0, 900.0)];
        let snap = snapshot().with_positions(positions).with_correlation("ETHUSDT", 0.2);

        let decision = gate().evaluate_risk(&long(1000.0), &snap);
        assert!(!decision.is_approved());
        assert_eq!(decision.rejection_reasons(), &[CHECK_PORTFOLIO_HEAT.to_string()]);

        let decision = gate().evaluate_risk(&long(300.0), &snap);
        assert!(decision.is_approved());
        assert!(decision.check(CHECK_PORTFOLIO_HEAT).unwrap().passed);
    }

    #[test]
    fn test_limit_is_inclusive() {
        let decision = gate().evaluate_risk(&long(1000.0), &snapshot());
        assert!(decision.check(CHECK_POSITION_SIZE).unwrap().passed);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let positions = vec![OpenPosition::new("ETHUSDT", TradeSide::Long, 10.0, 1000.0, 950.0)];
        let snap = snapshot().with_positions(positions);
        let request = long(800.0).with_atr(0.8);

        let first = gate().evaluate_risk(&request, &snap);
        let second = gate().evaluate_risk(&request, &snap);
        assert_eq!(first, second);
        assert_eq!(first.decided_at(), captured_at());
    }

    #[test]
    fn test_missing_data_falls_back_safely() {
        let snap = PortfolioSnapshot::new(captured_at(), DataPoint::Known(100_000.0));
        let decision = gate().evaluate_risk(&long(500.0), &snap);

        assert!(decision.is_approved());
        let assumed = &decision.fallbacks().assumed_safe;
        for name in [
            CHECK_PORTFOLIO_HEAT,
            CHECK_DAILY_LOSS,
            CHECK_WEEKLY_LOSS,
            CHECK_CORRELATION,
            CHECK_VOLATILITY_SIZING,
            CHECK_REGIME,
        ] {
            assert!(assumed.iter().any(|c| c == name), "{} should be assumed safe", name);
        }
        assert_eq!(decision.fallbacks().verified_safe, vec![CHECK_POSITION_SIZE.to_string()]);
        assert!(!decision.fallbacks().is_fully_verified());
    }

    #[test]
    fn test_missing_equity_rejects() {
        let snap = PortfolioSnapshot::new(captured_at(), DataPoint::NoData);
        let decision = gate().evaluate_risk(&long(500.0), &snap);
        assert!(!decision.is_approved());
        assert!(decision.rejection_reasons().contains(&CHECK_POSITION_SIZE.to_string()));
        // the regime check does not depend on equity
        assert!(decision.check(CHECK_REGIME).unwrap().passed);
    }

    #[test]
    fn test_invalid_stop_fails() {
        let request = TradeRequest::new("BTCUSDT", TradeSide::Long, 500.0, 100.0, 101.0, 95.0, StrategyKind::Reversal);
        let decision = gate().evaluate_risk(&request, &snapshot());
        assert!(decision.rejection_reasons().contains(&CHECK_POSITION_SIZE.to_string()));

        let request = TradeRequest::new("BTCUSDT", TradeSide::Short, 500.0, 100.0, 100.0, 95.0, StrategyKind::Reversal);
        assert!(!gate().evaluate_risk(&request, &snapshot()).is_approved());
    }

    #[test]
    fn test_invalid_values_do_not_panic() {
        for request in [long(0.0), long(-5.0), long(f64::NAN)] {
            let decision = gate().evaluate_risk(&request, &snapshot());
            assert!(!decision.is_approved());
        }
        let mut request = long(500.0);
        request.entry_price = f64::INFINITY;
        assert!(!gate().evaluate_risk(&request, &snapshot()).is_approved());
    }

    #[test]
    fn test_loss_limits() {
        let snap = snapshot().with_realized_pnl(PnlPeriod::Today, -2_500.0);
        let decision = gate().evaluate_risk(&long(1000.0), &snap);
        assert_eq!(decision.rejection_reasons(), &[CHECK_DAILY_LOSS.to_string()]);

        let snap = snapshot().with_realized_pnl(PnlPeriod::Week, -5_500.0);
        let decision = gate().evaluate_risk(&long(1000.0), &snap);
        assert_eq!(decision.rejection_reasons(), &[CHECK_WEEKLY_LOSS.to_string()]);

        // gains never count against the limit
        let snap = snapshot().with_realized_pnl(PnlPeriod::Today, 10_000.0);
        assert!(gate().evaluate_risk(&long(1000.0), &snap).is_approved());
    }

    #[test]
    fn test_correlated_exposure() {
        // 3.5% at risk in ETH
        let positions = vec![OpenPosition::new("ETHUSDT", TradeSide::Long, 35.0, 1000.0, 900.0)];

        let snap = snapshot().with_positions(positions.clone()).with_correlation("ETHUSDT", 0.85);
        let decision = gate().evaluate_risk(&long(1000.0), &snap);
        assert_eq!(decision.rejection_reasons(), &[CHECK_CORRELATION.to_string()]);

        let snap = snapshot().with_positions(positions.clone()).with_correlation("ETHUSDT", -0.9);
        assert!(!gate().evaluate_risk(&long(1000.0), &snap).is_approved());

        let snap = snapshot().with_positions(positions).with_correlation("ETHUSDT", 0.3);
        assert!(gate().evaluate_risk(&long(1000.0), &snap).is_approved());
    }

    #[test]
    fn test_same_symbol_counts_as_correlated() {
        let positions = vec![OpenPosition::new("BTCUSDT", TradeSide::Long, 3500.0, 100.0, 99.0)];
        let snap = snapshot().with_positions(positions);
        let decision = gate().evaluate_risk(&long(1000.0), &snap);
        assert!(decision.rejection_reasons().contains(&CHECK_CORRELATION.to_string()));
        assert!(!decision.check(CHECK_CORRELATION).unwrap().used_fallback);
    }

    #[test]
    fn test_volatility_sizing() {
        // ATR 2.0 x 1.5 → 333.33 units risk 1% of 100k
        let request = TradeRequest::new("BTCUSDT", TradeSide::Long, 1000.0 / 3.0, 100.0, 97.0, 106.0, StrategyKind::Reversal)
            .with_atr(2.0);
        let decision = gate().evaluate_risk(&request, &snapshot());
        assert!(decision.is_approved());
        assert!(decision.fallbacks().is_fully_verified());

        // 1% risk via a tighter stop but 50% above the volatility size
        let request =
            TradeRequest::new("BTCUSDT", TradeSide::Long, 500.0, 100.0, 98.0, 104.0, StrategyKind::Reversal).with_atr(2.0);
        let decision = gate().evaluate_risk(&request, &snapshot());
        assert_eq!(decision.rejection_reasons(), &[CHECK_VOLATILITY_SIZING.to_string()]);
    }

    #[test]
    fn test_regime_compatibility_and_override() {
        let snap = snapshot().with_regime(MarketRegime::Ranging);
        let breakout = TradeRequest::new("BTCUSDT", TradeSide::Long, 500.0, 100.0, 99.0, 102.0, StrategyKind::Breakout);

        let decision = gate().evaluate_risk(&breakout, &snap);
        assert_eq!(decision.rejection_reasons(), &[CHECK_REGIME.to_string()]);

        let decision = gate().evaluate_risk(&breakout.clone().with_regime_override(), &snap);
        assert!(decision.is_approved());

        let strict = RiskConfig {
            regime: crate::config::RegimePolicy {
                enforce: true,
                allow_override: false,
            },
            ..Default::default()
        };
        let decision = RiskGate::new(strict)
            .unwrap()
            .evaluate_risk(&breakout.with_regime_override(), &snap);
        assert!(!decision.is_approved());
    }

    #[test]
    fn test_crisis_blocks_reversal() {
        let snap = snapshot().with_regime(MarketRegime::Crisis);
        let decision = gate().evaluate_risk(&long(500.0), &snap);
        assert_eq!(decision.rejection_reasons(), &[CHECK_REGIME.to_string()]);
    }
}
