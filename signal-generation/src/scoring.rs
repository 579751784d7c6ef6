// Quality Scoring
// Weighted sum of the feature vector under a validated, declarative weight table

use crate::features::{Feature, FeatureVector};
use common::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Feature weights. Every feature has a non-negative weight and the
/// weights sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct WeightTable {
    weights: BTreeMap<Feature, f64>,
}

impl WeightTable {
    pub fn new<I>(weights: I) -> EngineResult<Self>
    where
        I: IntoIterator<Item = (Feature, f64)>,
    {
        let weights: BTreeMap<Feature, f64> = weights.into_iter().collect();

        for feature in Feature::ALL {
            match weights.get(&feature) {
                Some(w) if w.is_finite() && *w >= 0.0 => {}
                Some(w) => {
                    return Err(EngineError::config(format!(
                        "weight for {} must be a non-negative number, got {}",
                        feature, w
                    )))
                }
                None => return Err(EngineError::config(format!("no weight for feature {}", feature))),
            }
        }

        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::config(format!("feature weights sum to {}, expected 1.0", sum)));
        }

        Ok(Self { weights })
    }

    pub fn weight(&self, feature: Feature) -> f64 {
        self.weights.get(&feature).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Feature, f64)> + '_ {
        self.weights.iter().map(|(f, w)| (*f, *w))
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        let weights = [
            (Feature::BodyRatio, 0.15),
            (Feature::WickRatio, 0.10),
            (Feature::VolumeSurge, 0.15),
            (Feature::Momentum, 0.12),
            (Feature::VolatilityQuality, 0.08),
            (Feature::TrendStrength, 0.12),
            (Feature::SrProximity, 0.10),
            (Feature::FibAlignment, 0.08),
            (Feature::VolumeProfile, 0.05),
            (Feature::OrderFlowImbalance, 0.05),
        ];
        Self {
            weights: weights.into_iter().collect(),
        }
    }
}

/// Keyed by feature name, as written in configuration files
impl TryFrom<BTreeMap<String, f64>> for WeightTable {
    type Error = EngineError;

    fn try_from(weights: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        let parsed = weights
            .into_iter()
            .map(|(name, w)| {
                Feature::from_name(&name)
                    .map(|f| (f, w))
                    .ok_or_else(|| EngineError::config(format!("unknown feature '{}' in weight table", name)))
            })
            .collect::<EngineResult<Vec<_>>>()?;
        WeightTable::new(parsed)
    }
}

impl From<WeightTable> for BTreeMap<String, f64> {
    fn from(table: WeightTable) -> Self {
        table.weights.into_iter().map(|(f, w)| (f.name().to_string(), w)).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QualityScorer {
    weights: WeightTable,
}

impl QualityScorer {
    pub fn new(weights: WeightTable) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    /// Σ feature × weight, in [0, 1].
    pub fn score(&self, features: &FeatureVector) -> f64 {
        self.weights
            .iter()
            .map(|(feature, weight)| features.get(feature) * weight)
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }
}
