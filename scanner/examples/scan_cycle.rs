//! Two scan cycles over in-memory data

use anyhow::Context;
use common::{fixtures, Timeframe};
use data_ingestion::{InMemoryProvider, ProviderChain};
use portfolio_risk::{InMemoryPortfolio, MarketRegime, OpenPosition, StaticRegimeSource, TradeSide};
use scanner::{init_logging, InMemoryAlertSink, ScanCoordinator, ScanState, ScannerConfig};
use sentiment_overlay::{SentimentScore, StaticSentimentSource};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging("info");
    println!("=== Scan Cycle Example ===\n");

    let backup = Arc::new(InMemoryProvider::new("backup"));
    for symbol in ["BTCUSDT", "ETHUSDT"] {
        for timeframe in [Timeframe::H1, Timeframe::H4] {
            backup.insert(fixtures::bullish_engulfing_series(symbol, timeframe, 120)?).await;
        }
    }
    let chain = ProviderChain::new()
        .add_provider(Arc::new(InMemoryProvider::new("primary")))
        .add_provider(backup);
    let chain = Arc::new(chain);

    let portfolio = InMemoryPortfolio::new().with_equity(100_000.0);
    portfolio
        .open_position(OpenPosition::new("SOLUSDT", TradeSide::Long, 100.0, 150.0, 145.0))
        .await;

    let mut config = ScannerConfig::default();
    config.scan.symbols = vec!["BTCUSDT".into(), "ETHUSDT".into(), "SOLUSDT".into()];
    config.scan.timeframes = vec![Timeframe::H1, Timeframe::H4];
    config.retry.base_delay_ms = 10;

    let sink = Arc::new(InMemoryAlertSink::new());
    let coordinator = ScanCoordinator::new(config, chain.clone(), Arc::new(portfolio), sink.clone())
        .context("building scan coordinator")?
        .with_regime_source(Arc::new(
            StaticRegimeSource::new().with_regime("ETHUSDT", MarketRegime::Crisis),
        ))
        .with_sentiment_source(Arc::new(
            StaticSentimentSource::new("desk").with_score("BTCUSDT", SentimentScore::new(0.5, 0.7, 12)),
        ));

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut state = ScanState::new();
    for cycle in 1..=2 {
        let outcome = coordinator.run_cycle(state, shutdown_rx.clone()).await;
        println!("Cycle {} ({}):", cycle, outcome.report.summary());
        for symbol in &outcome.report.symbols {
            println!("  {:<8} {}", symbol.symbol, symbol.outcome);
        }
        println!();
        state = outcome.state;
    }

    for alert in sink.alerts().await {
        println!("{}", alert.summary());
        println!("{}\n", serde_json::to_string_pretty(&alert.breakdown)?);
    }

    for stats in chain.stats() {
        println!(
            "{}: {} ok, {} failed, {} rate limited",
            stats.provider, stats.successes, stats.failures, stats.rate_limited
        );
    }

    Ok(())
}
