//! Fuse candlestick patterns on two timeframes and aggregate them

use common::{fixtures, IndicatorConfig, IndicatorLibrary, StandardIndicators, Timeframe};
use sentiment_overlay::{SentimentReading, SentimentScore};
use signal_generation::{
    AuxiliaryInputs, CandlestickDetector, ConfluenceConfig, MultiTimeframeAggregator, PipelineConfig, SignalPipeline,
};
use std::collections::BTreeMap;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("debug").init();

    let indicators = StandardIndicators::new(IndicatorConfig::default())?;
    let pipeline =
        SignalPipeline::new(PipelineConfig::default())?.add_detector(Box::new(CandlestickDetector::default()));
    let aggregator = MultiTimeframeAggregator::new(ConfluenceConfig::default())?;

    let reading = SentimentReading::from_scores([("desk".to_string(), SentimentScore::new(0.4, 0.9, 30))]);
    let aux = AuxiliaryInputs::with_sentiment(reading);

    let mut signals = BTreeMap::new();
    for timeframe in [Timeframe::M15, Timeframe::H1, Timeframe::H4] {
        let series = fixtures::bullish_engulfing_series("BTCUSDT", timeframe, 100)?;
        let bundle = indicators.compute(&series)?;
        let accepted = pipeline.process(&series, &bundle, &aux)?;
        println!("{}: {} accepted", timeframe, accepted.len());
        if let Some(best) = accepted.into_iter().next() {
            println!("  {}", best.breakdown().to_text());
            signals.insert(timeframe, best);
        }
    }

    let result = aggregator.aggregate("BTCUSDT", signals)?;
    println!(
        "\n{} {} alignment {:.0} agreement {:.2}",
        result.action(),
        result.direction(),
        result.alignment_score(),
        result.agreement()
    );

    Ok(())
}
