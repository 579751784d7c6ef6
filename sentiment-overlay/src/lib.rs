//! Sentiment overlay
//!
//! Optional external sentiment feeding the confidence fusion. Sources that
//! are not configured, fail, or time out are simply absent from the
//! reading; nothing here ever invents a score.
//!
//! - `SentimentSource` is the capability each feed implements
//! - `SentimentOverlay` queries all registered sources concurrently
//! - `NewsToneSource` scores buffered news articles (tone + keyword lexicon)
//! - `StaticSentimentSource` serves fixed scores

pub mod news;
pub mod overlay;
pub mod source;

pub use news::{NewsArticle, NewsToneConfig, NewsToneSource};
pub use overlay::{OverlayConfig, SentimentOverlay, SentimentReading};
pub use source::{SentimentScore, SentimentSource, StaticSentimentSource};
