//! Scanner configuration: one TOML file covering every layer

use crate::planner::PlannerConfig;
use anyhow::Context;
use common::{EngineError, EngineResult, IndicatorConfig, Timeframe};
use data_ingestion::RetryPolicy;
use portfolio_risk::RiskConfig;
use sentiment_overlay::OverlayConfig;
use serde::{Deserialize, Serialize};
use signal_generation::{CandlestickConfig, ConfluenceConfig, PipelineConfig};

/// Upper bounds accepted by [`ScanConfig::validate`]
pub const MAX_CONCURRENT_SYMBOLS: usize = 1024;
pub const MAX_COOLDOWN_MINUTES: i64 = 60 * 24 * 30;
pub const MAX_FAILURE_BACKOFF_SECS: i64 = 60 * 60 * 24;

/// What to scan and how the cycle behaves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<Timeframe>,

    /// Bars requested per fetch
    #[serde(default = "default_lookback")]
    pub lookback: usize,

    #[serde(default = "default_max_concurrent_symbols")]
    pub max_concurrent_symbols: usize,

    /// An alerted fingerprint is suppressed for this long
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,

    /// First backoff after a symbol's fetches all fail; doubles per consecutive failure
    #[serde(default = "default_failure_backoff_secs")]
    pub failure_backoff_secs: i64,

    #[serde(default = "default_max_failure_backoff_secs")]
    pub max_failure_backoff_secs: i64,
}

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}

fn default_timeframes() -> Vec<Timeframe> {
    vec![Timeframe::M15, Timeframe::H1, Timeframe::H4]
}

fn default_lookback() -> usize {
    200
}

fn default_max_concurrent_symbols() -> usize {
    8
}

fn default_cooldown_minutes() -> i64 {
    240
}

fn default_failure_backoff_secs() -> i64 {
    60
}

fn default_max_failure_backoff_secs() -> i64 {
    900
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            timeframes: default_timeframes(),
            lookback: default_lookback(),
            max_concurrent_symbols: default_max_concurrent_symbols(),
            cooldown_minutes: default_cooldown_minutes(),
            failure_backoff_secs: default_failure_backoff_secs(),
            max_failure_backoff_secs: default_max_failure_backoff_secs(),
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.symbols.is_empty() {
            return Err(EngineError::config("at least one symbol is required"));
        }
        if self.timeframes.is_empty() {
            return Err(EngineError::config("at least one timeframe is required"));
        }
        if self.lookback < 2 {
            return Err(EngineError::config(format!("lookback must be at least 2, got {}", self.lookback)));
        }
        if self.max_concurrent_symbols == 0 || self.max_concurrent_symbols > MAX_CONCURRENT_SYMBOLS {
            return Err(EngineError::config(format!(
                "max_concurrent_symbols must be in 1..={}, got {}",
                MAX_CONCURRENT_SYMBOLS, self.max_concurrent_symbols
            )));
        }
        if self.cooldown_minutes < 0 || self.failure_backoff_secs < 0 {
            return Err(EngineError::config("cooldown and backoff durations cannot be negative"));
        }
        if self.cooldown_minutes > MAX_COOLDOWN_MINUTES {
            return Err(EngineError::config(format!(
                "cooldown_minutes must be at most {}, got {}",
                MAX_COOLDOWN_MINUTES, self.cooldown_minutes
            )));
        }
        if self.max_failure_backoff_secs > MAX_FAILURE_BACKOFF_SECS {
            return Err(EngineError::config(format!(
                "max_failure_backoff_secs must be at most {}, got {}",
                MAX_FAILURE_BACKOFF_SECS, self.max_failure_backoff_secs
            )));
        }
        if self.failure_backoff_secs > self.max_failure_backoff_secs {
            return Err(EngineError::config(format!(
                "failure_backoff_secs ({}) exceeds max_failure_backoff_secs ({})",
                self.failure_backoff_secs, self.max_failure_backoff_secs
            )));
        }
        Ok(())
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cooldown_minutes)
    }
}

/// Full scanner configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub indicators: IndicatorConfig,
    #[serde(default)]
    pub patterns: CandlestickConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub confluence: ConfluenceConfig,
    #[serde(default)]
    pub sentiment: OverlayConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub risk: RiskConfig,
}

impl ScannerConfig {
    /// Validate every section; the first violation wins
    pub fn validate(&self) -> EngineResult<()> {
        self.scan.validate()?;
        self.retry.validate()?;
        self.indicators.validate()?;
        self.patterns.validate()?;
        self.pipeline.validate()?;
        self.confluence.validate()?;
        self.sentiment.validate()?;
        self.planner.validate()?;
        self.risk.validate()
    }
}

/// Load and validate configuration from a TOML file
pub fn load_config(path: &str) -> anyhow::Result<ScannerConfig> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading scanner config {}", path))?;
    let config: ScannerConfig =
        toml::from_str(&content).with_context(|| format!("parsing scanner config {}", path))?;
    config.validate().with_context(|| format!("validating scanner config {}", path))?;
    Ok(config)
}

/// Save configuration to a TOML file
pub fn save_config(config: &ScannerConfig, path: &str) -> anyhow::Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).with_context(|| format!("writing scanner config {}", path))?;
    Ok(())
}

/// Write a default configuration file with a short header
pub fn create_config_template(path: &str) -> anyhow::Result<()> {
    let body = toml::to_string_pretty(&ScannerConfig::default())?;
    let template = format!(
        "# Scanner Configuration\n\
         # Every section is optional; missing keys take the defaults shown here.\n\
         # Risk limits are fractions of account equity.\n\n{}",
        body
    );
    std::fs::write(path, template).with_context(|| format!("writing scanner config template {}", path))?;
    Ok(())
}
