//! Turns an accepted signal into a concrete trade request for the risk gate

use common::{EngineError, EngineResult, Polarity};
use portfolio_risk::{RiskConfig, TradeRequest, TradeSide};
use serde::{Deserialize, Serialize};
use signal_generation::FusedSignal;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Target distance as a multiple of the stop distance
    #[serde(default = "default_reward_risk")]
    pub reward_risk: f64,

    /// Stop distance as a fraction of price when no ATR is available
    #[serde(default = "default_fallback_stop_pct")]
    pub fallback_stop_pct: f64,
}

fn default_reward_risk() -> f64 {
    2.0
}

fn default_fallback_stop_pct() -> f64 {
    0.02
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            reward_risk: default_reward_risk(),
            fallback_stop_pct: default_fallback_stop_pct(),
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !self.reward_risk.is_finite() || self.reward_risk <= 0.0 {
            return Err(EngineError::config(format!("reward_risk must be positive, got {}", self.reward_risk)));
        }
        if !(self.fallback_stop_pct > 0.0 && self.fallback_stop_pct < 1.0) {
            return Err(EngineError::config(format!(
                "fallback_stop_pct must be in (0, 1), got {}",
                self.fallback_stop_pct
            )));
        }
        Ok(())
    }
}

/// ATR-based stop, fixed reward:risk target, size risking the configured
/// fraction of equity.
///
/// Uses the risk gate's own `max_risk_per_trade` and `atr_stop_multiple` so a
/// planned trade is sized the way the gate will verify it.
#[derive(Debug, Clone)]
pub struct TradePlanner {
    config: PlannerConfig,
    risk_per_trade: f64,
    atr_stop_multiple: f64,
}

impl TradePlanner {
    pub fn new(config: PlannerConfig, risk: &RiskConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            risk_per_trade: risk.max_risk_per_trade,
            atr_stop_multiple: risk.atr_stop_multiple,
        })
    }

    /// Plan a trade in `direction` from `signal`'s completion bar.
    ///
    /// Unknown equity yields a zero size; the gate then rejects the request
    /// on its equity-dependent checks.
    pub fn plan(&self, signal: &FusedSignal, direction: Polarity, equity: Option<f64>) -> EngineResult<TradeRequest> {
        let side = match direction {
            Polarity::Bullish => TradeSide::Long,
            Polarity::Bearish => TradeSide::Short,
            Polarity::Neutral => {
                return Err(EngineError::InvalidInput(format!(
                    "cannot plan a trade without direction for {}",
                    signal.symbol()
                )))
            }
        };

        let entry = signal.reference_price();
        if !(entry.is_finite() && entry > 0.0) {
            return Err(EngineError::InvalidInput(format!("invalid entry price {}", entry)));
        }

        let atr = signal.atr().filter(|a| a.is_finite() && *a > 0.0);
        let stop_distance = match atr {
            Some(atr) => atr * self.atr_stop_multiple,
            None => entry * self.config.fallback_stop_pct,
        };
        // a long stop cannot go below zero
        let stop_distance = match side {
            TradeSide::Long => stop_distance.min(entry * 0.99),
            TradeSide::Short => stop_distance,
        };

        let (stop, target) = match side {
            TradeSide::Long => (entry - stop_distance, entry + stop_distance * self.config.reward_risk),
            TradeSide::Short => (entry + stop_distance, entry - stop_distance * self.config.reward_risk),
        };

        let size = match equity {
            Some(e) if e.is_finite() && e > 0.0 => e * self.risk_per_trade / stop_distance,
            _ => {
                warn!(symbol = %signal.symbol(), "Account equity unknown, planning zero size");
                0.0
            }
        };

        let mut request = TradeRequest::new(
            signal.symbol(),
            side,
            size,
            entry,
            stop,
            target,
            signal.candidate().strategy(),
        );
        if let Some(atr) = atr {
            request = request.with_atr(atr);
        }

        debug!(
            symbol = %signal.symbol(),
            side = %side,
            entry,
            stop,
            target,
            size,
            atr_based = atr.is_some(),
            "Planned trade"
        );
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{fixtures, IndicatorLibrary, StandardIndicators, Timeframe};
    use signal_generation::{AuxiliaryInputs, CandlestickDetector, PipelineConfig, SignalPipeline};

    fn accepted_signal() -> FusedSignal {
        let series = fixtures::bullish_engulfing_series("BTCUSDT", Timeframe::H1, 80).unwrap();
        let bundle = StandardIndicators::default().compute(&series).unwrap();
        let pipeline = SignalPipeline::new(PipelineConfig::default())
            .unwrap()
            .add_detector(Box::new(CandlestickDetector::default()));
        pipeline
            .process(&series, &bundle, &AuxiliaryInputs::none())
            .unwrap()
            .into_iter()
            .next()
            .expect("fixture yields an accepted signal")
    }

    fn planner() -> TradePlanner {
        TradePlanner::new(PlannerConfig::default(), &RiskConfig::default()).unwrap()
    }

    #[test]
    fn test_long_plan_uses_atr() {
        let signal = accepted_signal();
        let atr = signal.atr().unwrap();
        let request = planner().plan(&signal, Polarity::Bullish, Some(100_000.0)).unwrap();

        assert_eq!(request.side, TradeSide::Long);
        assert_eq!(request.entry_price, signal.reference_price());
        assert!((request.entry_price - request.stop_price - atr * 1.5).abs() < 1e-9);
        assert!((request.target_price - request.entry_price - atr * 3.0).abs() < 1e-9);
        // risks exactly 1% of equity
        let risk = request.size * (request.entry_price - request.stop_price);
        assert!((risk - 1_000.0).abs() < 1e-6);
        assert_eq!(request.atr, Some(atr));
    }

    #[test]
    fn test_short_plan_mirrors_long() {
        let signal = accepted_signal();
        let request = planner().plan(&signal, Polarity::Bearish, Some(100_000.0)).unwrap();
        assert_eq!(request.side, TradeSide::Short);
        assert!(request.stop_price > request.entry_price);
        assert!(request.target_price < request.entry_price);
    }

    #[test]
    fn test_unknown_equity_plans_zero_size() {
        let request = planner().plan(&accepted_signal(), Polarity::Bullish, None).unwrap();
        assert_eq!(request.size, 0.0);
    }

    #[test]
    fn test_neutral_direction_is_refused() {
        assert!(planner().plan(&accepted_signal(), Polarity::Neutral, Some(1.0)).is_err());
    }

    #[test]
    fn test_invalid_config() {
        let config = PlannerConfig {
            fallback_stop_pct: 0.0,
            ..Default::default()
        };
        assert!(TradePlanner::new(config, &RiskConfig::default()).is_err());
    }
}
