//! Scan Coordinator - drives one scan cycle across symbols and timeframes
//!
//! Per symbol: fetch every timeframe (failover + retry) → indicators →
//! detect and fuse → aggregate across timeframes → plan trade → snapshot the
//! portfolio → risk gate → dedup → alert.
//!
//! Symbols run concurrently up to `max_concurrent_symbols`; a failure on one
//! symbol is recorded in the report and never aborts the cycle.

use crate::alerts::{Alert, AlertSink};
use crate::config::ScannerConfig;
use crate::planner::TradePlanner;
use crate::report::{ScanReport, SymbolOutcome, SymbolReport};
use crate::state::ScanState;
use chrono::{DateTime, Duration, Utc};
use common::{CandleSeries, EngineResult, IndicatorLibrary, StandardIndicators, Timeframe};
use data_ingestion::{fetch_with_retry, CandleProvider};
use futures::future::join_all;
use portfolio_risk::{PortfolioSnapshot, PortfolioState, RegimeSource, RiskGate};
use sentiment_overlay::{SentimentOverlay, SentimentSource};
use signal_generation::{
    Action, AuxiliaryInputs, CandlestickDetector, FusedSignal, MultiTimeframeAggregator, PatternDetector, SignalPipeline,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of one cycle: the report plus the updated state for the next one
#[derive(Debug)]
pub struct CycleOutcome {
    pub report: ScanReport,
    pub state: ScanState,
}

pub struct ScanCoordinator {
    config: ScannerConfig,
    provider: Arc<dyn CandleProvider>,
    indicators: Arc<dyn IndicatorLibrary>,
    pipeline: SignalPipeline,
    aggregator: MultiTimeframeAggregator,
    overlay: SentimentOverlay,
    planner: TradePlanner,
    gate: RiskGate,
    portfolio: Arc<dyn PortfolioState>,
    regimes: Option<Arc<dyn RegimeSource>>,
    alerts: Arc<dyn AlertSink>,
}

impl ScanCoordinator {
    /// Build every layer from `config`; any invalid section fails here.
    ///
    /// Starts with the reference indicator library and candlestick detector.
    pub fn new(
        config: ScannerConfig,
        provider: Arc<dyn CandleProvider>,
        portfolio: Arc<dyn PortfolioState>,
        alerts: Arc<dyn AlertSink>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let indicators: Arc<dyn IndicatorLibrary> = Arc::new(StandardIndicators::new(config.indicators.clone())?);
        let pipeline = SignalPipeline::new(config.pipeline.clone())?
            .add_detector(Box::new(CandlestickDetector::new(config.patterns.clone())?));

        Ok(Self {
            provider,
            indicators,
            pipeline,
            aggregator: MultiTimeframeAggregator::new(config.confluence.clone())?,
            overlay: SentimentOverlay::new(config.sentiment.clone())?,
            planner: TradePlanner::new(config.planner.clone(), &config.risk)?,
            gate: RiskGate::new(config.risk.clone())?,
            portfolio,
            regimes: None,
            alerts,
            config,
        })
    }

    pub fn with_indicator_library(mut self, indicators: Arc<dyn IndicatorLibrary>) -> Self {
        self.pipeline = self.pipeline.with_indicator_library(indicators.clone());
        self.indicators = indicators;
        self
    }

    pub fn with_detector(mut self, detector: Box<dyn PatternDetector>) -> Self {
        self.pipeline = self.pipeline.add_detector(detector);
        self
    }

    pub fn with_sentiment_source(mut self, source: Arc<dyn SentimentSource>) -> Self {
        self.overlay = self.overlay.add_source(source);
        self
    }

    pub fn with_regime_source(mut self, regimes: Arc<dyn RegimeSource>) -> Self {
        self.regimes = Some(regimes);
        self
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Run one full cycle.
    ///
    /// Once `shutdown` reads true no new provider requests are issued and
    /// symbols not yet started are reported as `Cancelled`.
    pub async fn run_cycle(&self, state: ScanState, shutdown: watch::Receiver<bool>) -> CycleOutcome {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let cooldown = self.config.scan.cooldown();
        state.prune(started_at, cooldown);

        info!(
            cycle_id = %cycle_id,
            symbols = self.config.scan.symbols.len(),
            timeframes = self.config.scan.timeframes.len(),
            "Starting scan cycle"
        );

        let semaphore = Semaphore::new(self.config.scan.max_concurrent_symbols);
        let tasks = self.config.scan.symbols.iter().map(|symbol| {
            let semaphore = &semaphore;
            let state = &state;
            let shutdown = shutdown.clone();
            async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return SymbolReport::new(symbol.as_str(), SymbolOutcome::Cancelled),
                };
                if *shutdown.borrow() {
                    debug!(symbol = %symbol, "Shutdown requested, skipping symbol");
                    return SymbolReport::new(symbol.as_str(), SymbolOutcome::Cancelled);
                }
                self.scan_symbol(symbol, state, shutdown, started_at).await
            }
        });
        let symbols = join_all(tasks).await;

        let report = ScanReport {
            cycle_id,
            started_at,
            finished_at: Utc::now(),
            symbols,
        };
        info!(cycle_id = %cycle_id, summary = %report.summary(), "Scan cycle complete");

        CycleOutcome { report, state }
    }

    async fn scan_symbol(
        &self,
        symbol: &str,
        state: &ScanState,
        shutdown: watch::Receiver<bool>,
        now: DateTime<Utc>,
    ) -> SymbolReport {
        if let Some(until) = state.backing_off(symbol, now) {
            debug!(symbol = %symbol, until = %until, "Symbol backing off after failed fetches");
            return SymbolReport::new(
                symbol,
                SymbolOutcome::DataUnavailable {
                    reason: format!(
                        "backing off until {} after {} failed cycles",
                        until,
                        state.consecutive_failures(symbol)
                    ),
                },
            );
        }

        let fetches = self.config.scan.timeframes.iter().map(|&timeframe| {
            let mut shutdown = shutdown.clone();
            async move {
                let result = fetch_with_retry(
                    self.provider.as_ref(),
                    symbol,
                    timeframe,
                    self.config.scan.lookback,
                    &self.config.retry,
                    &mut shutdown,
                )
                .await;
                (timeframe, result)
            }
        });
        let fetched = join_all(fetches).await;

        let mut failed_timeframes = Vec::new();
        let mut series: Vec<CandleSeries> = Vec::new();
        let mut cancelled = false;
        for (timeframe, result) in fetched {
            match result {
                Ok(s) => series.push(s),
                Err(e) if e.is_cancelled() => {
                    debug!(symbol = %symbol, timeframe = %timeframe, "Fetch cancelled by shutdown");
                    cancelled = true;
                }
                Err(e) => {
                    warn!(symbol = %symbol, timeframe = %timeframe, error = %e, "Timeframe unavailable this cycle");
                    failed_timeframes.push((timeframe, e.to_string()));
                }
            }
        }

        // a cancelled fetch says nothing about the provider
        if cancelled || (series.is_empty() && *shutdown.borrow()) {
            info!(symbol = %symbol, "Shutdown during fetch, symbol cancelled");
            let mut report = SymbolReport::new(symbol, SymbolOutcome::Cancelled);
            report.failed_timeframes = failed_timeframes;
            return report;
        }

        if series.is_empty() {
            let until = state.record_failure(
                symbol,
                now,
                Duration::seconds(self.config.scan.failure_backoff_secs),
                Duration::seconds(self.config.scan.max_failure_backoff_secs),
            );
            warn!(symbol = %symbol, until = %until, "All timeframes failed, backing off");
            let reason = failed_timeframes
                .iter()
                .map(|(tf, reason)| format!("{}: {}", tf, reason))
                .collect::<Vec<_>>()
                .join("; ");
            let mut report = SymbolReport::new(symbol, SymbolOutcome::DataUnavailable { reason });
            report.failed_timeframes = failed_timeframes;
            return report;
        }
        state.record_success(symbol);

        // one sentiment read shared by every timeframe
        let aux = AuxiliaryInputs::with_sentiment(self.overlay.read(symbol).await);

        let mut signals: BTreeMap<Timeframe, FusedSignal> = BTreeMap::new();
        for s in &series {
            match self.best_signal(s, &aux) {
                Ok(Some(signal)) => {
                    signals.insert(s.timeframe(), signal);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(symbol = %symbol, timeframe = %s.timeframe(), error = %e, "Signal generation failed");
                    failed_timeframes.push((s.timeframe(), e.to_string()));
                }
            }
        }

        let data_gaps: Vec<(Timeframe, usize)> = series
            .iter()
            .map(|s| (s.timeframe(), s.gaps().len()))
            .filter(|(_, gaps)| *gaps > 0)
            .collect();
        for (timeframe, gaps) in &data_gaps {
            warn!(symbol = %symbol, timeframe = %timeframe, gaps, "Candle series has gaps");
        }

        let mut report = SymbolReport::new(symbol, SymbolOutcome::NoSignal);
        report.failed_timeframes = failed_timeframes;
        report.data_gaps = data_gaps;
        if signals.is_empty() {
            debug!(symbol = %symbol, "No accepted signals");
            return report;
        }

        let confluence = match self.aggregator.aggregate(symbol, signals) {
            Ok(c) => c,
            Err(e) => {
                error!(symbol = %symbol, error = %e, "Confluence aggregation failed");
                return report;
            }
        };
        report.alignment_score = Some(confluence.alignment_score());

        let lead = match confluence.strongest_signal() {
            Some(lead) if confluence.action() != Action::Hold => lead,
            _ => {
                debug!(
                    symbol = %symbol,
                    action = %confluence.action(),
                    alignment = confluence.alignment_score(),
                    "Confluence recommends no trade"
                );
                return report;
            }
        };

        let snapshot = PortfolioSnapshot::capture(self.portfolio.as_ref(), self.regimes.as_deref(), symbol).await;
        let request = match self
            .planner
            .plan(lead, confluence.direction(), snapshot.equity().as_known().copied())
        {
            Ok(r) => r,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Trade planning failed");
                return report;
            }
        };

        let decision = self.gate.evaluate_risk(&request, &snapshot);
        if !decision.is_approved() {
            report.outcome = SymbolOutcome::RiskRejected {
                reasons: decision.rejection_reasons().to_vec(),
            };
            return report;
        }

        let fingerprint = lead.candidate().fingerprint();
        if state.is_duplicate(symbol, &fingerprint, now, self.config.scan.cooldown()) {
            debug!(symbol = %symbol, fingerprint = %fingerprint, "Alert already sent within cooldown");
            report.outcome = SymbolOutcome::Deduplicated { fingerprint };
            return report;
        }

        let alert = Alert::new(lead, &confluence, decision, now);
        let alert_id = alert.id;
        match self.alerts.emit(alert).await {
            Ok(()) => {
                state.record_alert(symbol, &fingerprint, now);
                report.outcome = SymbolOutcome::Alerted { alert_id, fingerprint };
            }
            Err(e) => {
                error!(symbol = %symbol, error = %e, "Alert sink rejected alert");
                report.outcome = SymbolOutcome::AlertFailed { reason: e.to_string() };
            }
        }
        report
    }

    /// Highest-confidence accepted signal completing on the series' last bar
    fn best_signal(&self, series: &CandleSeries, aux: &AuxiliaryInputs) -> EngineResult<Option<FusedSignal>> {
        let bundle = self.indicators.compute(series)?;
        let signals = self.pipeline.process(series, &bundle, aux)?;
        Ok(signals.into_iter().next())
    }
}
