//! Historical return correlation between symbols

use crate::portfolio::DataPoint;
use common::CandleSeries;
use statrs::statistics::Statistics;
use std::collections::HashMap;

/// Pearson correlation of two equally long samples.
///
/// `None` when fewer than two points or either side has zero variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let cov = xs.iter().covariance(ys.iter());
    let denom = xs.iter().std_dev() * ys.iter().std_dev();
    if !cov.is_finite() || !denom.is_finite() || denom <= f64::EPSILON {
        return None;
    }
    Some((cov / denom).clamp(-1.0, 1.0))
}

/// Correlation backend computed from close-to-close returns
#[derive(Debug, Clone)]
pub struct HistoricalCorrelation {
    min_samples: usize,
    returns: HashMap<String, Vec<f64>>,
}

impl Default for HistoricalCorrelation {
    fn default() -> Self {
        Self::new(20)
    }
}

impl HistoricalCorrelation {
    pub fn new(min_samples: usize) -> Self {
        Self {
            min_samples: min_samples.max(2),
            returns: HashMap::new(),
        }
    }

    /// Replace the return history for `symbol`
    pub fn add_closes(&mut self, symbol: impl Into<String>, closes: &[f64]) {
        let returns = closes
            .windows(2)
            .filter(|w| w[0] > 0.0)
            .map(|w| w[1] / w[0] - 1.0)
            .collect();
        self.returns.insert(symbol.into(), returns);
    }

    pub fn add_series(&mut self, series: &CandleSeries) {
        self.add_closes(series.symbol(), &series.closes());
    }

    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.returns.contains_key(symbol)
    }

    /// Correlation over the most recent overlapping returns
    pub fn correlation(&self, symbol: &str, other: &str) -> DataPoint<f64> {
        if symbol == other {
            return DataPoint::Known(1.0);
        }
        let (a, b) = match (self.returns.get(symbol), self.returns.get(other)) {
            (Some(a), Some(b)) => (a, b),
            _ => return DataPoint::NoData,
        };
        let n = a.len().min(b.len());
        if n < self.min_samples {
            return DataPoint::NoData;
        }
        pearson(&a[a.len() - n..], &b[b.len() - n..]).into()
    }
}
