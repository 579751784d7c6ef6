//! Risk gate configuration

use anyhow::Context;
use common::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

/// Limits applied by the seven pre-trade checks.
///
/// Every fraction is relative to account equity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Largest stop-implied loss a single trade may carry
    #[serde(default = "default_max_risk_per_trade")]
    pub max_risk_per_trade: f64,

    /// Largest combined stop-implied loss across open positions plus the new trade
    #[serde(default = "default_max_portfolio_heat")]
    pub max_portfolio_heat: f64,

    /// Realized loss today plus the trade's worst case
    #[serde(default = "default_daily_loss_limit")]
    pub daily_loss_limit: f64,

    /// Realized loss over the rolling seven days plus the trade's worst case
    #[serde(default = "default_weekly_loss_limit")]
    pub weekly_loss_limit: f64,

    /// |correlation| at or above which an open position counts as correlated
    #[serde(default = "default_correlation_threshold")]
    pub correlation_threshold: f64,

    /// Largest combined risk across the trade and its correlated positions
    #[serde(default = "default_max_correlated_exposure")]
    pub max_correlated_exposure: f64,

    /// Allowed relative deviation from the volatility-derived size
    #[serde(default = "default_sizing_tolerance")]
    pub sizing_tolerance: f64,

    /// Stop distance in ATR multiples used by volatility sizing
    #[serde(default = "default_atr_stop_multiple")]
    pub atr_stop_multiple: f64,

    #[serde(default)]
    pub regime: RegimePolicy,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_risk_per_trade: default_max_risk_per_trade(),
            max_portfolio_heat: default_max_portfolio_heat(),
            daily_loss_limit: default_daily_loss_limit(),
            weekly_loss_limit: default_weekly_loss_limit(),
            correlation_threshold: default_correlation_threshold(),
            max_correlated_exposure: default_max_correlated_exposure(),
            sizing_tolerance: default_sizing_tolerance(),
            atr_stop_multiple: default_atr_stop_multiple(),
            regime: RegimePolicy::default(),
        }
    }
}

fn default_max_risk_per_trade() -> f64 {
    0.01
}

fn default_max_portfolio_heat() -> f64 {
    0.06
}

fn default_daily_loss_limit() -> f64 {
    0.03
}

fn default_weekly_loss_limit() -> f64 {
    0.06
}

fn default_correlation_threshold() -> f64 {
    0.7
}

fn default_max_correlated_exposure() -> f64 {
    0.04
}

fn default_sizing_tolerance() -> f64 {
    0.25
}

fn default_atr_stop_multiple() -> f64 {
    1.5
}

impl RiskConfig {
    pub fn validate(&self) -> EngineResult<()> {
        let fractions = [
            ("max_risk_per_trade", self.max_risk_per_trade),
            ("max_portfolio_heat", self.max_portfolio_heat),
            ("daily_loss_limit", self.daily_loss_limit),
            ("weekly_loss_limit", self.weekly_loss_limit),
            ("max_correlated_exposure", self.max_correlated_exposure),
        ];
        for (name, value) in fractions {
            if !value.is_finite() || value <= 0.0 || value > 1.0 {
                return Err(EngineError::config(format!("{} must be in (0, 1], got {}", name, value)));
            }
        }
        if !(0.0..=1.0).contains(&self.correlation_threshold) {
            return Err(EngineError::config(format!(
                "correlation_threshold must be in [0, 1], got {}",
                self.correlation_threshold
            )));
        }
        if !self.sizing_tolerance.is_finite() || self.sizing_tolerance < 0.0 {
            return Err(EngineError::config(format!(
                "sizing_tolerance must be non-negative, got {}",
                self.sizing_tolerance
            )));
        }
        if !self.atr_stop_multiple.is_finite() || self.atr_stop_multiple <= 0.0 {
            return Err(EngineError::config(format!(
                "atr_stop_multiple must be positive, got {}",
                self.atr_stop_multiple
            )));
        }
        if self.max_risk_per_trade > self.max_portfolio_heat {
            return Err(EngineError::config(
                "max_risk_per_trade cannot exceed max_portfolio_heat",
            ));
        }
        Ok(())
    }
}

/// How the regime check treats strategy/regime mismatches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimePolicy {
    /// When false the regime check always passes
    #[serde(default = "default_enforce")]
    pub enforce: bool,

    /// Honour a request's explicit override of a mismatch
    #[serde(default = "default_allow_override")]
    pub allow_override: bool,
}

impl Default for RegimePolicy {
    fn default() -> Self {
        Self {
            enforce: default_enforce(),
            allow_override: default_allow_override(),
        }
    }
}

fn default_enforce() -> bool {
    true
}

fn default_allow_override() -> bool {
    true
}

/// Load and validate configuration from a TOML file
pub fn load_config(path: &str) -> anyhow::Result<RiskConfig> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading risk config {}", path))?;
    let config: RiskConfig = toml::from_str(&content).with_context(|| format!("parsing risk config {}", path))?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to a TOML file
pub fn save_config(config: &RiskConfig, path: &str) -> anyhow::Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).with_context(|| format!("writing risk config {}", path))?;
    Ok(())
}

/// Write a commented default configuration file
pub fn create_config_template(path: &str) -> anyhow::Result<()> {
    std::fs::write(path, CONFIG_TEMPLATE).with_context(|| format!("writing risk config template {}", path))?;
    Ok(())
}

pub(crate) const CONFIG_TEMPLATE: &str = "# Risk Gate Configuration
# All limits are fractions of account equity

# Stop-implied loss allowed on a single trade
max_risk_per_trade = 0.01

# Combined stop-implied loss across open positions and the new trade
max_portfolio_heat = 0.06

# Realized loss today plus the trade's worst case
daily_loss_limit = 0.03

# Realized loss over the rolling seven days plus the trade's worst case
weekly_loss_limit = 0.06

# Open positions at or above this |correlation| count as correlated
correlation_threshold = 0.7

# Combined risk across the trade and its correlated positions
max_correlated_exposure = 0.04

# Allowed relative deviation from the volatility-derived position size
sizing_tolerance = 0.25

# Stop distance in ATR multiples for volatility sizing
atr_stop_multiple = 1.5

[regime]
# Reject strategies that do not suit the current market regime
enforce = true

# Let a request explicitly override a regime mismatch
allow_override = true
";
