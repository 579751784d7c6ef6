//! Per-cycle scan report

use chrono::{DateTime, Utc};
use common::Timeframe;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What happened to one symbol during a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SymbolOutcome {
    Alerted { alert_id: Uuid, fingerprint: String },
    /// Approved, but the same fingerprint was alerted within the cooldown
    Deduplicated { fingerprint: String },
    NoSignal,
    RiskRejected { reasons: Vec<String> },
    DataUnavailable { reason: String },
    /// Shutdown was requested before the symbol started
    Cancelled,
    /// The alert sink refused the alert; the fingerprint stays unrecorded
    AlertFailed { reason: String },
}

impl SymbolOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SymbolOutcome::Alerted { .. } => "alerted",
            SymbolOutcome::Deduplicated { .. } => "deduplicated",
            SymbolOutcome::NoSignal => "no_signal",
            SymbolOutcome::RiskRejected { .. } => "risk_rejected",
            SymbolOutcome::DataUnavailable { .. } => "data_unavailable",
            SymbolOutcome::Cancelled => "cancelled",
            SymbolOutcome::AlertFailed { .. } => "alert_failed",
        }
    }
}

impl fmt::Display for SymbolOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolOutcome::Alerted { alert_id, .. } => write!(f, "alerted ({})", alert_id),
            SymbolOutcome::Deduplicated { fingerprint } => write!(f, "deduplicated ({})", fingerprint),
            SymbolOutcome::NoSignal => write!(f, "no signal"),
            SymbolOutcome::RiskRejected { reasons } => write!(f, "risk rejected: {}", reasons.join(", ")),
            SymbolOutcome::DataUnavailable { reason } => write!(f, "data unavailable: {}", reason),
            SymbolOutcome::Cancelled => write!(f, "cancelled"),
            SymbolOutcome::AlertFailed { reason } => write!(f, "alert failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolReport {
    pub symbol: String,
    pub outcome: SymbolOutcome,
    /// Timeframes whose fetch or indicators failed, with the reason
    pub failed_timeframes: Vec<(Timeframe, String)>,
    /// Timeframes whose fetched series had missing bars, with the gap count
    #[serde(default)]
    pub data_gaps: Vec<(Timeframe, usize)>,
    /// Confluence alignment when signals were aggregated
    pub alignment_score: Option<f64>,
}

impl SymbolReport {
    pub fn new(symbol: impl Into<String>, outcome: SymbolOutcome) -> Self {
        Self {
            symbol: symbol.into(),
            outcome,
            failed_timeframes: Vec::new(),
            data_gaps: Vec::new(),
            alignment_score: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// In configured symbol order
    pub symbols: Vec<SymbolReport>,
}

impl ScanReport {
    pub fn get(&self, symbol: &str) -> Option<&SymbolReport> {
        self.symbols.iter().find(|r| r.symbol == symbol)
    }

    pub fn count(&self, label: &str) -> usize {
        self.symbols.iter().filter(|r| r.outcome.label() == label).count()
    }

    pub fn alerted(&self) -> usize {
        self.count("alerted")
    }

    /// Gaps seen across every symbol and timeframe this cycle
    pub fn total_gaps(&self) -> usize {
        self.symbols
            .iter()
            .flat_map(|r| r.data_gaps.iter().map(|(_, gaps)| *gaps))
            .sum()
    }

    /// "alerted=1 no_signal=2 ..." with zero counts omitted
    pub fn summary(&self) -> String {
        const LABELS: [&str; 7] = [
            "alerted",
            "deduplicated",
            "no_signal",
            "risk_rejected",
            "data_unavailable",
            "cancelled",
            "alert_failed",
        ];
        LABELS
            .iter()
            .filter_map(|label| match self.count(label) {
                0 => None,
                n => Some(format!("{}={}", label, n)),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
