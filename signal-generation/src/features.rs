// Feature Extraction
// Turns a candidate plus its candle window and indicators into ten normalized quality features

use common::{Candle, CandleSeries, EngineError, EngineResult, IndicatorBundle, PatternCandidate, Polarity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Value used for a feature that cannot be computed
pub const NEUTRAL_FEATURE_VALUE: f64 = 0.5;

/// The quality features, in breakdown order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    BodyRatio,
    WickRatio,
    VolumeSurge,
    Momentum,
    VolatilityQuality,
    TrendStrength,
    SrProximity,
    FibAlignment,
    VolumeProfile,
    OrderFlowImbalance,
}

impl Feature {
    pub const ALL: [Feature; 10] = [
        Feature::BodyRatio,
        Feature::WickRatio,
        Feature::VolumeSurge,
        Feature::Momentum,
        Feature::VolatilityQuality,
        Feature::TrendStrength,
        Feature::SrProximity,
        Feature::FibAlignment,
        Feature::VolumeProfile,
        Feature::OrderFlowImbalance,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Feature::BodyRatio => "body_ratio",
            Feature::WickRatio => "wick_ratio",
            Feature::VolumeSurge => "volume_surge",
            Feature::Momentum => "momentum",
            Feature::VolatilityQuality => "volatility_quality",
            Feature::TrendStrength => "trend_strength",
            Feature::SrProximity => "sr_proximity",
            Feature::FibAlignment => "fib_alignment",
            Feature::VolumeProfile => "volume_profile",
            Feature::OrderFlowImbalance => "order_flow_imbalance",
        }
    }

    pub fn from_name(name: &str) -> Option<Feature> {
        Feature::ALL.iter().copied().find(|f| f.name() == name)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Normalized feature values for one candidate.
///
/// Always holds all ten features; the ones that fell back to
/// [`NEUTRAL_FEATURE_VALUE`] are listed in `degraded()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: BTreeMap<Feature, f64>,
    degraded: Vec<Feature>,
}

impl FeatureVector {
    /// Build a vector from explicit values. Every feature must be present
    /// and lie in [0, 1].
    pub fn from_values<I>(values: I) -> EngineResult<Self>
    where
        I: IntoIterator<Item = (Feature, f64)>,
    {
        let values: BTreeMap<Feature, f64> = values.into_iter().collect();
        for feature in Feature::ALL {
            match values.get(&feature) {
                Some(v) if v.is_finite() && (0.0..=1.0).contains(v) => {}
                Some(v) => {
                    return Err(EngineError::InvalidInput(format!(
                        "feature {} = {} is outside [0, 1]",
                        feature, v
                    )))
                }
                None => return Err(EngineError::InvalidInput(format!("feature {} is missing", feature))),
            }
        }
        Ok(Self {
            values,
            degraded: Vec::new(),
        })
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.values.get(&feature).copied().unwrap_or(NEUTRAL_FEATURE_VALUE)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Feature, f64)> + '_ {
        self.values.iter().map(|(f, v)| (*f, *v))
    }

    pub fn degraded(&self) -> &[Feature] {
        &self.degraded
    }

    pub fn is_degraded(&self, feature: Feature) -> bool {
        self.degraded.contains(&feature)
    }
}

/// Lookbacks and tolerances used by the extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Bars averaged for the volume baseline
    #[serde(default = "default_volume_window")]
    pub volume_window: usize,
    /// Volume multiple that maps to 1.0
    #[serde(default = "default_volume_cap")]
    pub volume_cap: f64,
    /// ATR/close at or above this scores zero volatility quality
    #[serde(default = "default_atr_ceiling_pct")]
    pub atr_ceiling_pct: f64,
    /// EMA 9/50 spread (fraction of price) that counts as a full trend
    #[serde(default = "default_trend_spread_pct")]
    pub trend_spread_pct: f64,
    #[serde(default = "default_sr_tolerance_pct")]
    pub sr_tolerance_pct: f64,
    #[serde(default = "default_fib_tolerance_pct")]
    pub fib_tolerance_pct: f64,
    #[serde(default = "default_profile_window")]
    pub profile_window: usize,
    #[serde(default = "default_profile_bins")]
    pub profile_bins: usize,
}

fn default_volume_window() -> usize {
    20
}
fn default_volume_cap() -> f64 {
    3.0
}
fn default_atr_ceiling_pct() -> f64 {
    0.05
}
fn default_trend_spread_pct() -> f64 {
    0.03
}
fn default_sr_tolerance_pct() -> f64 {
    0.02
}
fn default_fib_tolerance_pct() -> f64 {
    0.01
}
fn default_profile_window() -> usize {
    50
}
fn default_profile_bins() -> usize {
    20
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            volume_window: default_volume_window(),
            volume_cap: default_volume_cap(),
            atr_ceiling_pct: default_atr_ceiling_pct(),
            trend_spread_pct: default_trend_spread_pct(),
            sr_tolerance_pct: default_sr_tolerance_pct(),
            fib_tolerance_pct: default_fib_tolerance_pct(),
            profile_window: default_profile_window(),
            profile_bins: default_profile_bins(),
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.volume_window == 0 || self.profile_window < 2 || self.profile_bins == 0 {
            return Err(EngineError::config(
                "volume_window, profile_window (>= 2) and profile_bins must be positive",
            ));
        }
        let positive = [
            ("volume_cap", self.volume_cap),
            ("atr_ceiling_pct", self.atr_ceiling_pct),
            ("trend_spread_pct", self.trend_spread_pct),
            ("sr_tolerance_pct", self.sr_tolerance_pct),
            ("fib_tolerance_pct", self.fib_tolerance_pct),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(EngineError::config(format!("{} must be positive, got {}", name, value)));
            }
        }
        Ok(())
    }
}

/// Inputs shared by every feature computation
struct Context<'a> {
    candidate: &'a PatternCandidate,
    candles: &'a [Candle],
    indicators: &'a IndicatorBundle,
    end: usize,
}

impl Context<'_> {
    fn completion(&self) -> &Candle {
        &self.candles[self.end]
    }

    fn direction(&self) -> f64 {
        self.candidate.polarity().sign()
    }

    fn key_candles(&self) -> &[Candle] {
        &self.candles[self.candidate.start_index()..=self.end]
    }
}

pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Compute every feature for `candidate`.
    ///
    /// Only bars up to the candidate's completion bar are read. Per-bar
    /// indicator values are read at or before that bar; the S/R and Fibonacci
    /// levels are used only when `indicators` was computed over the window
    /// ending at it, otherwise those two features degrade. A feature
    /// lacking history or indicator values degrades to neutral on its own;
    /// the call fails only when the candidate does not belong to `series`.
    pub fn extract(
        &self,
        candidate: &PatternCandidate,
        series: &CandleSeries,
        indicators: &IndicatorBundle,
    ) -> EngineResult<FeatureVector> {
        if candidate.symbol() != series.symbol() || candidate.timeframe() != series.timeframe() {
            return Err(EngineError::InvalidInput(format!(
                "candidate for {} {} applied to series {} {}",
                candidate.symbol(),
                candidate.timeframe(),
                series.symbol(),
                series.timeframe()
            )));
        }
        let end = candidate.end_index();
        match series.get(end) {
            Some(bar) if bar.timestamp == candidate.end_time() => {}
            _ => {
                return Err(EngineError::InvalidInput(format!(
                    "candidate '{}' completion bar {} does not match the series",
                    candidate.pattern(),
                    end
                )))
            }
        }

        let ctx = Context {
            candidate,
            candles: series.window_to(end),
            indicators,
            end,
        };

        let mut values = BTreeMap::new();
        let mut degraded = Vec::new();
        for feature in Feature::ALL {
            let result = self
                .compute(feature, &ctx)
                .map(|v| v.clamp(0.0, 1.0))
                .and_then(|v| {
                    if v.is_finite() {
                        Ok(v)
                    } else {
                        Err(EngineError::MissingIndicator {
                            feature: feature.name().to_string(),
                            indicator: "finite value".to_string(),
                        })
                    }
                });
            match result {
                Ok(value) => {
                    values.insert(feature, value);
                }
                Err(e) if e.is_feature_degradation() => {
                    debug!(
                        symbol = %candidate.symbol(),
                        feature = %feature,
                        reason = %e,
                        "Feature degraded to neutral"
                    );
                    values.insert(feature, NEUTRAL_FEATURE_VALUE);
                    degraded.push(feature);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(FeatureVector { values, degraded })
    }

    fn compute(&self, feature: Feature, ctx: &Context<'_>) -> EngineResult<f64> {
        match feature {
            Feature::BodyRatio => body_ratio(ctx),
            Feature::WickRatio => wick_ratio(ctx),
            Feature::VolumeSurge => self.volume_surge(ctx),
            Feature::Momentum => momentum(ctx),
            Feature::VolatilityQuality => self.volatility_quality(ctx),
            Feature::TrendStrength => self.trend_strength(ctx),
            Feature::SrProximity => proximity(
                ctx,
                &ctx.indicators.sr_levels,
                self.config.sr_tolerance_pct,
                Feature::SrProximity,
                "sr_levels",
            ),
            Feature::FibAlignment => proximity(
                ctx,
                &ctx.indicators.fib_levels,
                self.config.fib_tolerance_pct,
                Feature::FibAlignment,
                "fib_levels",
            ),
            Feature::VolumeProfile => self.volume_profile(ctx),
            Feature::OrderFlowImbalance => order_flow_imbalance(ctx),
        }
    }

    fn volume_surge(&self, ctx: &Context<'_>) -> EngineResult<f64> {
        let window = self.config.volume_window;
        if ctx.end < window {
            return Err(insufficient(Feature::VolumeSurge, window + 1, ctx.end + 1));
        }
        let baseline = ctx.candles[ctx.end - window..ctx.end]
            .iter()
            .map(|c| c.volume)
            .sum::<f64>()
            / window as f64;
        if baseline <= 0.0 {
            return Err(missing(Feature::VolumeSurge, "volume"));
        }
        let ratio = ctx.completion().volume / baseline;
        Ok(ratio.min(self.config.volume_cap) / self.config.volume_cap)
    }

    fn volatility_quality(&self, ctx: &Context<'_>) -> EngineResult<f64> {
        let atr = indicator(ctx.indicators.atr_at(ctx.end), Feature::VolatilityQuality, "atr")?;
        let close = ctx.completion().close;
        if close <= 0.0 {
            return Err(missing(Feature::VolatilityQuality, "close"));
        }
        Ok(1.0 - ((atr / close) / self.config.atr_ceiling_pct).min(1.0))
    }

    fn trend_strength(&self, ctx: &Context<'_>) -> EngineResult<f64> {
        let f = Feature::TrendStrength;
        let fast = indicator(ctx.indicators.ema_fast_at(ctx.end), f, "ema_fast")?;
        let mid = indicator(ctx.indicators.ema_mid_at(ctx.end), f, "ema_mid")?;
        let slow = indicator(ctx.indicators.ema_slow_at(ctx.end), f, "ema_slow")?;

        let pairs = [(fast, mid), (mid, slow), (fast, slow)];
        let bullish = pairs.iter().filter(|(a, b)| a > b).count() as f64;
        let bearish = pairs.iter().filter(|(a, b)| a < b).count() as f64;
        let agreeing = match ctx.candidate.polarity() {
            Polarity::Bullish => bullish,
            Polarity::Bearish => bearish,
            Polarity::Neutral => bullish.max(bearish),
        };

        let close = ctx.completion().close;
        if close <= 0.0 {
            return Err(missing(f, "close"));
        }
        let spread = ((fast - slow).abs() / close / self.config.trend_spread_pct).min(1.0);
        Ok(agreeing / pairs.len() as f64 * (0.7 + 0.3 * spread))
    }

    fn volume_profile(&self, ctx: &Context<'_>) -> EngineResult<f64> {
        let f = Feature::VolumeProfile;
        let window = self.config.profile_window;
        if ctx.end + 1 < window {
            return Err(insufficient(f, window, ctx.end + 1));
        }
        let bars = &ctx.candles[ctx.end + 1 - window..=ctx.end];

        let lo = bars.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let hi = bars.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let bins = self.config.profile_bins;
        let bin_of = |price: f64| -> usize {
            if hi <= lo {
                0
            } else {
                (((price - lo) / (hi - lo)) * bins as f64).floor().clamp(0.0, (bins - 1) as f64) as usize
            }
        };

        let mut profile = vec![0.0; bins];
        for bar in bars {
            profile[bin_of(bar.typical_price())] += bar.volume;
        }
        let peak = profile.iter().copied().fold(0.0, f64::max);
        if peak <= 0.0 {
            return Err(missing(f, "volume"));
        }
        Ok(profile[bin_of(ctx.completion().close)] / peak)
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self {
            config: FeatureConfig::default(),
        }
    }
}

fn body_ratio(ctx: &Context<'_>) -> EngineResult<f64> {
    mean_over_ranged(ctx, Feature::BodyRatio, |c| c.body() / c.range())
}

fn wick_ratio(ctx: &Context<'_>) -> EngineResult<f64> {
    mean_over_ranged(ctx, Feature::WickRatio, |c| {
        1.0 - c.upper_wick().max(c.lower_wick()) / c.range()
    })
}

/// Mean of `f` over key candles with a non-zero range
fn mean_over_ranged(ctx: &Context<'_>, feature: Feature, f: impl Fn(&Candle) -> f64) -> EngineResult<f64> {
    let values: Vec<f64> = ctx
        .key_candles()
        .iter()
        .filter(|c| c.range() > 0.0)
        .map(f)
        .collect();
    if values.is_empty() {
        return Err(insufficient(feature, 1, 0));
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

fn momentum(ctx: &Context<'_>) -> EngineResult<f64> {
    let f = Feature::Momentum;
    if ctx.end == 0 {
        return Err(insufficient(f, 2, 1));
    }
    let rsi_now = indicator(ctx.indicators.rsi_at(ctx.end), f, "rsi")?;
    let rsi_prev = indicator(ctx.indicators.rsi_at(ctx.end - 1), f, "rsi")?;
    let hist = indicator(ctx.indicators.macd_histogram_at(ctx.end), f, "macd_histogram")?;

    let rsi_dir = signum(rsi_now - rsi_prev);
    let macd_dir = signum(hist);

    let d = ctx.direction();
    if d != 0.0 {
        return Ok(0.5 + 0.25 * rsi_dir * d + 0.25 * macd_dir * d);
    }
    // no pattern direction: reward the two oscillators agreeing
    Ok(match rsi_dir * macd_dir {
        x if x > 0.0 => 1.0,
        x if x < 0.0 => 0.0,
        _ => NEUTRAL_FEATURE_VALUE,
    })
}

fn proximity(
    ctx: &Context<'_>,
    levels: &[f64],
    tolerance: f64,
    feature: Feature,
    name: &str,
) -> EngineResult<f64> {
    if ctx.indicators.len() != ctx.end + 1 {
        // levels summarise bars after the completion bar
        return Err(missing(feature, "levels as of the completion bar"));
    }
    let close = ctx.completion().close;
    let nearest = levels
        .iter()
        .filter(|l| l.is_finite())
        .map(|l| (close - l).abs())
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.min(d))));
    match nearest {
        Some(distance) if close > 0.0 => Ok(1.0 - ((distance / close) / tolerance).min(1.0)),
        _ => Err(missing(feature, name)),
    }
}

fn order_flow_imbalance(ctx: &Context<'_>) -> EngineResult<f64> {
    let bar = ctx.completion();
    let range = bar.range();
    if range <= 0.0 {
        return Err(missing(Feature::OrderFlowImbalance, "bar range"));
    }
    // -1 when closing on the low, +1 on the high
    let location = ((bar.close - bar.low) - (bar.high - bar.close)) / range;
    let d = ctx.direction();
    if d == 0.0 {
        Ok(0.5 + 0.5 * location.abs())
    } else {
        Ok(0.5 + 0.5 * location * d)
    }
}

fn signum(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn indicator(value: Option<f64>, feature: Feature, name: &str) -> EngineResult<f64> {
    value.ok_or_else(|| missing(feature, name))
}

fn missing(feature: Feature, indicator: &str) -> EngineError {
    EngineError::MissingIndicator {
        feature: feature.name().to_string(),
        indicator: indicator.to_string(),
    }
}

fn insufficient(feature: Feature, required: usize, available: usize) -> EngineError {
    EngineError::InsufficientHistory {
        feature: feature.name().to_string(),
        required,
        available,
    }
}
