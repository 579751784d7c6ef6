//! Alerts emitted by the scan cycle and the sink they are handed to

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{EngineResult, Polarity, Timeframe};
use portfolio_risk::RiskDecision;
use serde::{Deserialize, Serialize};
use signal_generation::{Action, ConfluenceResult, FusedSignal};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// An approved, deduplicated trade alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub pattern: String,
    pub fingerprint: String,
    pub direction: Polarity,
    pub action: Action,
    pub confidence: f64,
    pub alignment_score: f64,
    /// Contributing timeframes, shortest first
    pub timeframes: Vec<Timeframe>,
    /// Fusion breakdown of the lead signal
    pub breakdown: serde_json::Value,
    pub decision: RiskDecision,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        lead: &FusedSignal,
        confluence: &ConfluenceResult,
        decision: RiskDecision,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: lead.symbol().to_string(),
            timeframe: lead.timeframe(),
            pattern: lead.candidate().pattern().to_string(),
            fingerprint: lead.candidate().fingerprint(),
            direction: confluence.direction(),
            action: confluence.action(),
            confidence: lead.enhanced_confidence(),
            alignment_score: confluence.alignment_score(),
            timeframes: confluence.signals().keys().copied().collect(),
            breakdown: lead.breakdown().to_json(),
            decision,
            created_at,
        }
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        let request = self.decision.request();
        format!(
            "{} {} {} on {} ({}) conf {:.2} align {:.0} | entry {:.4} stop {:.4} target {:.4} size {:.4}",
            self.action,
            self.symbol,
            self.pattern,
            self.timeframe,
            self.direction,
            self.confidence,
            self.alignment_score,
            request.entry_price,
            request.stop_price,
            request.target_price,
            request.size
        )
    }
}

/// Where alerts go. Delivery channels implement this outside the workspace.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn emit(&self, alert: Alert) -> EngineResult<()>;
}

/// Keeps every alert in memory
#[derive(Debug, Default)]
pub struct InMemoryAlertSink {
    alerts: RwLock<Vec<Alert>>,
}

impl InMemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.alerts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.alerts.read().await.is_empty()
    }
}

#[async_trait]
impl AlertSink for InMemoryAlertSink {
    async fn emit(&self, alert: Alert) -> EngineResult<()> {
        info!(
            alert_id = %alert.id,
            symbol = %alert.symbol,
            timeframe = %alert.timeframe,
            "{}",
            alert.summary()
        );
        self.alerts.write().await.push(alert);
        Ok(())
    }
}
