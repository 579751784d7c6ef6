//! Example usage of the risk gate

use chrono::Utc;
use common::StrategyKind;
use portfolio_risk::{
    DataPoint, InMemoryPortfolio, MarketRegime, OpenPosition, PnlPeriod, PortfolioSnapshot, RiskConfig, RiskGate,
    StaticRegimeSource, TradeRequest, TradeSide,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("=== Risk Gate Example ===\n");

    // Example 1: Gate with default limits
    let gate = RiskGate::new(RiskConfig::default())?;
    println!("Risk per trade: {:.1}%", gate.config().max_risk_per_trade * 100.0);
    println!("Portfolio heat: {:.1}%\n", gate.config().max_portfolio_heat * 100.0);

    // Example 2: Live portfolio with one open position and a losing day
    let portfolio = InMemoryPortfolio::new().with_equity(100_000.0);
    portfolio
        .open_position(OpenPosition::new("ETHUSDT", TradeSide::Long, 20.0, 3000.0, 2900.0))
        .await;
    portfolio.record_realized_pnl(PnlPeriod::Today, -800.0).await;
    portfolio.set_correlation("BTCUSDT", "ETHUSDT", 0.82).await;
    let regimes = StaticRegimeSource::new().with_regime("BTCUSDT", MarketRegime::TrendingUp);

    let snapshot = PortfolioSnapshot::capture(&portfolio, Some(&regimes), "BTCUSDT").await;

    // Example 3: A well-sized trade
    let request = TradeRequest::new("BTCUSDT", TradeSide::Long, 0.5, 60_000.0, 58_500.0, 63_000.0, StrategyKind::TrendFollowing)
        .with_atr(1000.0);
    print_decision("Sized trade", &gate, &request, &snapshot);

    // Example 4: Same trade with a stop three times as wide
    let wide = TradeRequest::new("BTCUSDT", TradeSide::Long, 0.5, 60_000.0, 55_500.0, 69_000.0, StrategyKind::TrendFollowing)
        .with_atr(1000.0);
    print_decision("Wide stop", &gate, &wide, &snapshot);

    // Example 5: Nothing known but equity
    let sparse = PortfolioSnapshot::new(Utc::now(), DataPoint::Known(100_000.0));
    print_decision("Sparse snapshot", &gate, &request, &sparse);

    Ok(())
}

fn print_decision(label: &str, gate: &RiskGate, request: &TradeRequest, snapshot: &PortfolioSnapshot) {
    let decision = gate.evaluate_risk(request, snapshot);
    println!("{}: {}", label, decision.status());
    for check in decision.checks() {
        let mark = if check.passed { "✓" } else { "✗" };
        let note = if check.used_fallback { " (assumed)" } else { "" };
        println!("  {} {:<18} {}{}", mark, check.name, check.reason, note);
    }
    if !decision.rejection_reasons().is_empty() {
        println!("  Reasons: {}", decision.rejection_reasons().join(", "));
    }
    println!();
}
