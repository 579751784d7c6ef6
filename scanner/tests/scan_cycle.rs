use common::{fixtures, Timeframe};
use data_ingestion::{InMemoryProvider, ProviderChain, ProviderError};
use portfolio_risk::{InMemoryPortfolio, MarketRegime, OpenPosition, StaticRegimeSource, TradeSide};
use scanner::{InMemoryAlertSink, ScanCoordinator, ScanState, ScannerConfig, SymbolOutcome};
use sentiment_overlay::{SentimentScore, StaticSentimentSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

struct Harness {
    coordinator: ScanCoordinator,
    sink: Arc<InMemoryAlertSink>,
    chain: Arc<ProviderChain>,
}

async fn harness() -> Harness {
    // primary knows nothing, every fetch fails over to the backup
    let primary = Arc::new(InMemoryProvider::new("primary"));
    let backup = Arc::new(InMemoryProvider::new("backup"));
    for symbol in ["BTCUSDT", "ETHUSDT"] {
        for timeframe in [Timeframe::H1, Timeframe::H4] {
            backup
                .insert(fixtures::bullish_engulfing_series(symbol, timeframe, 80).unwrap())
                .await;
        }
    }
    let chain = Arc::new(ProviderChain::new().add_provider(primary).add_provider(backup));

    let portfolio = InMemoryPortfolio::new().with_equity(100_000.0);
    portfolio
        .open_position(OpenPosition::new("SOLUSDT", TradeSide::Long, 100.0, 150.0, 145.0))
        .await;

    let regimes = StaticRegimeSource::new()
        .with_regime("BTCUSDT", MarketRegime::TrendingDown)
        .with_regime("ETHUSDT", MarketRegime::Crisis);
    let sentiment = StaticSentimentSource::new("static").with_score("BTCUSDT", SentimentScore::new(0.6, 0.8, 25));

    let mut config = ScannerConfig::default();
    config.scan.symbols = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string(), "SOLUSDT".to_string()];
    config.scan.timeframes = vec![Timeframe::H1, Timeframe::H4];
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.retry.jitter_ms = 0;

    let sink = Arc::new(InMemoryAlertSink::new());
    let coordinator = ScanCoordinator::new(config, chain.clone(), Arc::new(portfolio), sink.clone())
        .unwrap()
        .with_regime_source(Arc::new(regimes))
        .with_sentiment_source(Arc::new(sentiment));

    Harness {
        coordinator,
        sink,
        chain,
    }
}

#[tokio::test]
async fn test_full_cycle_with_failover_gating_and_dedup() {
    let h = harness().await;
    let (_tx, rx) = watch::channel(false);

    let first = h.coordinator.run_cycle(ScanState::new(), rx.clone()).await;
    let report = &first.report;
    assert_eq!(report.symbols.len(), 3);

    let btc = report.get("BTCUSDT").unwrap();
    assert!(matches!(btc.outcome, SymbolOutcome::Alerted { .. }), "{:?}", btc.outcome);
    assert_eq!(btc.alignment_score, Some(100.0));
    assert!(btc.failed_timeframes.is_empty());

    match &report.get("ETHUSDT").unwrap().outcome {
        SymbolOutcome::RiskRejected { reasons } => assert_eq!(reasons, &vec!["regime".to_string()]),
        other => panic!("expected regime rejection, got {:?}", other),
    }

    let sol = report.get("SOLUSDT").unwrap();
    assert!(matches!(sol.outcome, SymbolOutcome::DataUnavailable { .. }));
    assert_eq!(sol.failed_timeframes.len(), 2);

    let alerts = h.sink.alerts().await;
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert.symbol, "BTCUSDT");
    assert_eq!(alert.pattern, "bullish_engulfing");
    assert!(alert.confidence >= 0.6);
    assert!(alert.decision.is_approved());
    assert_eq!(alert.timeframes, vec![Timeframe::H1, Timeframe::H4]);
    assert!(alert.breakdown.get("sentiment.static").is_some());
    assert!(alert.breakdown.get("quality_score").is_some());

    // every successful fetch came from the backup
    let stats = h.chain.stats();
    assert_eq!(stats[0].successes, 0);
    assert!(stats[1].successes >= 4);

    let second = h.coordinator.run_cycle(first.state, rx).await;
    assert!(matches!(
        second.report.get("BTCUSDT").unwrap().outcome,
        SymbolOutcome::Deduplicated { .. }
    ));
    match &second.report.get("SOLUSDT").unwrap().outcome {
        SymbolOutcome::DataUnavailable { reason } => assert!(reason.contains("backing off")),
        other => panic!("expected backoff, got {:?}", other),
    }
    assert_eq!(h.sink.len().await, 1);
}

#[tokio::test]
async fn test_cycle_without_sentiment_has_no_sentiment_key() {
    let backup = Arc::new(InMemoryProvider::new("backup"));
    backup
        .insert(fixtures::bullish_engulfing_series("BTCUSDT", Timeframe::H1, 80).unwrap())
        .await;

    let mut config = ScannerConfig::default();
    config.scan.symbols = vec!["BTCUSDT".to_string()];
    config.scan.timeframes = vec![Timeframe::H1];

    let sink = Arc::new(InMemoryAlertSink::new());
    let coordinator = ScanCoordinator::new(
        config,
        backup,
        Arc::new(InMemoryPortfolio::new().with_equity(50_000.0)),
        sink.clone(),
    )
    .unwrap();

    let (_tx, rx) = watch::channel(false);
    let outcome = coordinator.run_cycle(ScanState::new(), rx).await;
    assert_eq!(outcome.report.alerted(), 1);

    let alerts = sink.alerts().await;
    assert!(alerts[0].breakdown.get("sentiment").is_none());
    assert!(alerts[0].decision.fallbacks().assumed_safe.contains(&"regime".to_string()));
}

#[tokio::test]
async fn test_shutdown_mid_retry_cancels_only_the_waiting_symbol() {
    let memory = Arc::new(InMemoryProvider::new("memory"));
    for symbol in ["BTCUSDT", "ETHUSDT"] {
        memory
            .insert(fixtures::bullish_engulfing_series(symbol, Timeframe::H1, 80).unwrap())
            .await;
    }
    memory
        .push_failure("ETHUSDT", Timeframe::H1, ProviderError::RateLimited { retry_after_ms: Some(10_000) })
        .await;

    let mut config = ScannerConfig::default();
    config.scan.symbols = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()];
    config.scan.timeframes = vec![Timeframe::H1];
    config.retry.max_delay_ms = 10_000;
    config.retry.jitter_ms = 0;

    let sink = Arc::new(InMemoryAlertSink::new());
    let coordinator = ScanCoordinator::new(
        config,
        memory.clone(),
        Arc::new(InMemoryPortfolio::new().with_equity(100_000.0)),
        sink.clone(),
    )
    .unwrap();

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = tx.send(true);
    });
    let started = std::time::Instant::now();
    let outcome = coordinator.run_cycle(ScanState::new(), rx).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(matches!(
        outcome.report.get("BTCUSDT").unwrap().outcome,
        SymbolOutcome::Alerted { .. }
    ));
    assert_eq!(outcome.report.get("ETHUSDT").unwrap().outcome, SymbolOutcome::Cancelled);
    // cancellation is not a provider failure
    assert_eq!(outcome.state.consecutive_failures("ETHUSDT"), 0);
    assert!(outcome.state.record("ETHUSDT").is_none());
    assert_eq!(sink.len().await, 1);
}
