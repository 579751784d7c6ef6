//! Bounded retry with exponential backoff and jitter

use crate::provider::{CandleProvider, ProviderError};
use common::{CandleSeries, EngineError, EngineResult, Timeframe};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How transient provider failures are retried
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Upper bound of the random delay added to each backoff
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    /// Each provider call is abandoned after this long
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    250
}
fn default_max_delay_ms() -> u64 {
    8_000
}
fn default_jitter_ms() -> u64 {
    250
}
fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Longest delay or timeout a policy may configure
pub const MAX_RETRY_DELAY_MS: u64 = 60 * 60 * 1000;

impl RetryPolicy {
    pub fn validate(&self) -> EngineResult<()> {
        if self.request_timeout_ms == 0 {
            return Err(EngineError::config("request_timeout_ms must be positive"));
        }
        let bounded = [
            ("max_delay_ms", self.max_delay_ms),
            ("jitter_ms", self.jitter_ms),
            ("request_timeout_ms", self.request_timeout_ms),
        ];
        for (name, value) in bounded {
            if value > MAX_RETRY_DELAY_MS {
                return Err(EngineError::config(format!(
                    "{} must be at most {}, got {}",
                    name, MAX_RETRY_DELAY_MS, value
                )));
            }
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(EngineError::config(format!(
                "base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// `base * 2^attempt` capped at `max_delay_ms`, never shorter than the
    /// provider's retry-after hint, plus up to `jitter_ms` of random delay.
    pub fn backoff(&self, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_delay_ms);
        let floor = retry_after_ms.unwrap_or(0).min(self.max_delay_ms);
        let jitter = if self.jitter_ms > 0 {
            fastrand::u64(0..=self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(exp.max(floor) + jitter)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Fetch candles, retrying rate limits and timeouts per `policy`.
///
/// Non-transient errors and exhausted retries become
/// `EngineError::DataUnavailable`. A shutdown signal observed before a retry
/// (or during its backoff) stops further requests with `EngineError::Cancelled`.
pub async fn fetch_with_retry(
    provider: &dyn CandleProvider,
    symbol: &str,
    timeframe: Timeframe,
    lookback: usize,
    policy: &RetryPolicy,
    shutdown: &mut watch::Receiver<bool>,
) -> EngineResult<CandleSeries> {
    let mut attempt: u32 = 0;

    loop {
        let result = match tokio::time::timeout(
            policy.request_timeout(),
            provider.fetch_candles(symbol, timeframe, lookback),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        };

        let error = match result {
            Ok(series) => return Ok(series),
            Err(e) => e,
        };

        if !error.is_transient() {
            warn!(symbol = %symbol, timeframe = %timeframe, error = %error, "Fetch failed");
            return Err(EngineError::data_unavailable(symbol, Some(timeframe), error.to_string()));
        }
        if attempt >= policy.max_retries {
            warn!(symbol = %symbol, timeframe = %timeframe, attempts = attempt + 1, error = %error, "Retries exhausted");
            return Err(EngineError::data_unavailable(
                symbol,
                Some(timeframe),
                format!("{} after {} attempts", error, attempt + 1),
            ));
        }

        let retry_after_ms = match &error {
            ProviderError::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => None,
        };
        let delay = policy.backoff(attempt, retry_after_ms);
        debug!(symbol = %symbol, timeframe = %timeframe, attempt, delay_ms = delay.as_millis() as u64, "Backing off");

        sleep_or_shutdown(delay, shutdown)
            .await
            .map_err(|_| shutdown_error(symbol, timeframe))?;
        attempt += 1;
    }
}

/// Sleep until `delay` has elapsed, returning `Err(())` as soon as the
/// shutdown flag reads true. Flag flips that end false keep the original
/// deadline.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> Result<(), ()> {
    let deadline = Instant::now() + delay;
    loop {
        if *shutdown.borrow_and_update() {
            return Err(());
        }
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return Ok(()),
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // sender dropped, the flag can no longer change
                    tokio::time::sleep_until(deadline).await;
                    return Ok(());
                }
            }
        }
    }
}

fn shutdown_error(symbol: &str, timeframe: Timeframe) -> EngineError {
    EngineError::Cancelled(format!("shutdown requested before retrying {} {}", symbol, timeframe))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryProvider;
    use common::fixtures;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 10,
            jitter_ms: 1,
            request_timeout_ms: 200,
        }
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let policy = RetryPolicy {
            jitter_ms: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(0, None), Duration::from_millis(250));
        assert_eq!(policy.backoff(2, None), Duration::from_millis(1000));
        assert_eq!(policy.backoff(10, None), Duration::from_millis(8000));
        assert_eq!(policy.backoff(0, Some(3000)), Duration::from_millis(3000));
    }

    #[test]
    fn test_oversized_delays_fail_validation() {
        assert!(RetryPolicy::default().validate().is_ok());
        let huge = RetryPolicy {
            max_delay_ms: u64::MAX,
            ..RetryPolicy::default()
        };
        assert!(huge.validate().unwrap_err().is_configuration());
        let jittery = RetryPolicy {
            jitter_ms: MAX_RETRY_DELAY_MS + 1,
            ..RetryPolicy::default()
        };
        assert!(jittery.validate().is_err());
    }

    #[test]
    fn test_jitter_is_bounded() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d = policy.backoff(1, None).as_millis() as u64;
            assert!((500..=750).contains(&d));
        }
    }

    #[tokio::test]
    async fn test_recovers_after_rate_limit() {
        let provider = InMemoryProvider::new("memory");
        provider
            .insert(fixtures::trending_series("BTCUSDT", Timeframe::H1, 30).unwrap())
            .await;
        for _ in 0..2 {
            provider
                .push_failure("BTCUSDT", Timeframe::H1, ProviderError::RateLimited { retry_after_ms: None })
                .await;
        }

        let (_tx, mut rx) = watch::channel(false);
        let series = fetch_with_retry(&provider, "BTCUSDT", Timeframe::H1, 30, &fast_policy(), &mut rx)
            .await
            .unwrap();
        assert_eq!(series.len(), 30);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_data_unavailable() {
        let provider = InMemoryProvider::new("memory");
        for _ in 0..10 {
            provider
                .push_failure("BTCUSDT", Timeframe::H1, ProviderError::RateLimited { retry_after_ms: None })
                .await;
        }

        let (_tx, mut rx) = watch::channel(false);
        let err = fetch_with_retry(&provider, "BTCUSDT", Timeframe::H1, 30, &fast_policy(), &mut rx)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DataUnavailable { .. }));
        assert_eq!(provider.calls(), 4);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let provider = InMemoryProvider::new("memory");
        let (_tx, mut rx) = watch::channel(false);
        let err = fetch_with_retry(&provider, "NOPE", Timeframe::H1, 30, &fast_policy(), &mut rx)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DataUnavailable { .. }));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let provider = InMemoryProvider::new("slow").with_latency(Duration::from_millis(100));
        provider
            .insert(fixtures::trending_series("BTCUSDT", Timeframe::H1, 30).unwrap())
            .await;
        let policy = RetryPolicy {
            max_retries: 1,
            request_timeout_ms: 10,
            ..fast_policy()
        };

        let (_tx, mut rx) = watch::channel(false);
        let err = fetch_with_retry(&provider, "BTCUSDT", Timeframe::H1, 30, &policy, &mut rx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_stops_retries() {
        let provider = InMemoryProvider::new("memory");
        provider
            .push_failure("BTCUSDT", Timeframe::H1, ProviderError::Timeout)
            .await;

        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        let err = fetch_with_retry(&provider, "BTCUSDT", Timeframe::H1, 30, &fast_policy(), &mut rx)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(err.to_string().contains("shutdown"));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_during_backoff_cancels() {
        let provider = InMemoryProvider::new("memory");
        provider
            .insert(fixtures::trending_series("BTCUSDT", Timeframe::H1, 30).unwrap())
            .await;
        provider
            .push_failure("BTCUSDT", Timeframe::H1, ProviderError::RateLimited { retry_after_ms: None })
            .await;
        let policy = RetryPolicy {
            base_delay_ms: 5_000,
            max_delay_ms: 5_000,
            jitter_ms: 0,
            ..fast_policy()
        };

        let (tx, mut rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(true);
        });
        let started = std::time::Instant::now();
        let err = fetch_with_retry(&provider, "BTCUSDT", Timeframe::H1, 30, &policy, &mut rx)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_flag_flip_keeps_backoff_deadline() {
        let (tx, mut rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let _ = tx.send(false);
            tokio::time::sleep(Duration::from_millis(30)).await;
            let _ = tx.send(false);
        });
        let started = std::time::Instant::now();
        assert!(sleep_or_shutdown(Duration::from_millis(120), &mut rx).await.is_ok());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(120));
        assert!(elapsed < Duration::from_millis(200), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn test_dropped_sender_serves_backoff() {
        let (_, mut rx) = watch::channel(false);
        let started = std::time::Instant::now();
        assert!(sleep_or_shutdown(Duration::from_millis(40), &mut rx).await.is_ok());
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
