//! OHLCV candles, timeframes and validated series

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bar interval. Ordered from shortest to longest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 8] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
        Timeframe::W1,
    ];

    /// Expected spacing between consecutive bars
    pub fn duration(self) -> Duration {
        match self {
            Timeframe::M1 => Duration::minutes(1),
            Timeframe::M5 => Duration::minutes(5),
            Timeframe::M15 => Duration::minutes(15),
            Timeframe::M30 => Duration::minutes(30),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::H4 => Duration::hours(4),
            Timeframe::D1 => Duration::days(1),
            Timeframe::W1 => Duration::weeks(1),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .iter()
            .copied()
            .find(|tf| tf.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EngineError::InvalidInput(format!("unknown timeframe '{}'", s)))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.as_str().to_string()
    }
}

/// One OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    fn is_sane(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite() && *p >= 0.0)
            && self.volume.is_finite()
            && self.volume >= 0.0
            && self.high >= self.low
            && self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
    }
}

/// A spacing between two consecutive bars wider than the timeframe allows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesGap {
    /// Index of the bar *after* the gap
    pub index: usize,
    /// Number of expected bars missing in between
    pub missing_bars: i64,
}

/// Ordered OHLCV bars for one symbol and timeframe.
///
/// Timestamps are strictly increasing; construction rejects anything else.
/// Gaps are detected and reported by [`CandleSeries::gaps`] but never filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleSeries {
    symbol: String,
    timeframe: Timeframe,
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, candles: Vec<Candle>) -> EngineResult<Self> {
        let symbol = symbol.into();

        for (i, candle) in candles.iter().enumerate() {
            if !candle.is_sane() {
                return Err(EngineError::InvalidSeries(format!(
                    "{} {}: bar {} has inconsistent prices or volume",
                    symbol, timeframe, i
                )));
            }
        }

        if let Some(i) = candles.windows(2).position(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(EngineError::InvalidSeries(format!(
                "{} {}: timestamp at bar {} is not after bar {}",
                symbol,
                timeframe,
                i + 1,
                i
            )));
        }

        let series = Self {
            symbol,
            timeframe,
            candles,
        };

        let gaps = series.gaps();
        if !gaps.is_empty() {
            tracing::debug!(
                symbol = %series.symbol,
                timeframe = %series.timeframe,
                gaps = gaps.len(),
                "Candle series contains gaps"
            );
        }

        Ok(series)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn last_index(&self) -> Option<usize> {
        self.candles.len().checked_sub(1)
    }

    /// Bars from the start of the series up to and including `end_index`.
    pub fn window_to(&self, end_index: usize) -> &[Candle] {
        let end = (end_index + 1).min(self.candles.len());
        &self.candles[..end]
    }

    /// The series as it stood when `end_index` closed.
    pub fn truncated(&self, end_index: usize) -> CandleSeries {
        CandleSeries {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            candles: self.window_to(end_index).to_vec(),
        }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Every place where consecutive bars are further apart than one timeframe.
    pub fn gaps(&self) -> Vec<SeriesGap> {
        let step = self.timeframe.duration();
        self.candles
            .windows(2)
            .enumerate()
            .filter_map(|(i, w)| {
                let spacing = w[1].timestamp - w[0].timestamp;
                if spacing > step {
                    Some(SeriesGap {
                        index: i + 1,
                        missing_bars: spacing.num_seconds() / step.num_seconds() - 1,
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn has_gaps(&self) -> bool {
        !self.gaps().is_empty()
    }
}
