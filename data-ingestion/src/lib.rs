//! Market data acquisition
//!
//! Concrete vendor clients live outside this workspace. This crate defines
//! the capability they implement (`CandleProvider`), an ordered failover
//! chain over several providers, and the retry policy applied to
//! rate-limited or timed-out fetches.

pub mod chain;
pub mod memory;
pub mod provider;
pub mod retry;

pub use chain::{ProviderChain, ProviderStats};
pub use memory::InMemoryProvider;
pub use provider::{CandleProvider, ProviderError};
pub use retry::{fetch_with_retry, RetryPolicy, MAX_RETRY_DELAY_MS};
