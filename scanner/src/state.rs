//! Dedup and per-symbol backoff state carried between scan cycles

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::debug;

/// What the scanner remembers about one symbol
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolRecord {
    pub last_alert_at: Option<DateTime<Utc>>,
    /// Fingerprint → time it was alerted
    pub fingerprints: HashMap<String, DateTime<Utc>>,
    /// Cycles in a row in which every fetch for the symbol failed
    pub consecutive_failures: u32,
    pub backoff_until: Option<DateTime<Utc>>,
}

/// Keyed store injected into each scan cycle.
///
/// Entries are locked per symbol, so unrelated symbols never contend.
#[derive(Debug, Default)]
pub struct ScanState {
    symbols: DashMap<String, SymbolRecord>,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `fingerprint` was alerted less than `cooldown` before `now`
    pub fn is_duplicate(&self, symbol: &str, fingerprint: &str, now: DateTime<Utc>, cooldown: Duration) -> bool {
        self.symbols
            .get(symbol)
            .and_then(|record| record.fingerprints.get(fingerprint).copied())
            .map(|at| now - at < cooldown)
            .unwrap_or(false)
    }

    pub fn record_alert(&self, symbol: &str, fingerprint: &str, now: DateTime<Utc>) {
        let mut record = self.symbols.entry(symbol.to_string()).or_default();
        record.fingerprints.insert(fingerprint.to_string(), now);
        record.last_alert_at = Some(now);
    }

    /// Drop fingerprints older than `cooldown`; returns how many were removed
    pub fn prune(&self, now: DateTime<Utc>, cooldown: Duration) -> usize {
        let mut removed = 0;
        for mut entry in self.symbols.iter_mut() {
            let before = entry.fingerprints.len();
            entry.fingerprints.retain(|_, at| now - *at < cooldown);
            removed += before - entry.fingerprints.len();
        }
        if removed > 0 {
            debug!(removed, "Pruned expired alert fingerprints");
        }
        removed
    }

    /// Register a fully failed cycle for `symbol` and return when it may be
    /// fetched again: `base * 2^(failures - 1)`, capped at `max`.
    pub fn record_failure(&self, symbol: &str, now: DateTime<Utc>, base: Duration, max: Duration) -> DateTime<Utc> {
        let mut record = self.symbols.entry(symbol.to_string()).or_default();
        record.consecutive_failures = record.consecutive_failures.saturating_add(1);
        let exponent = (record.consecutive_failures - 1).min(16);
        let delay = base
            .checked_mul(2_i32.pow(exponent))
            .map(|d| d.min(max))
            .unwrap_or(max);
        let until = now + delay;
        record.backoff_until = Some(until);
        until
    }

    pub fn record_success(&self, symbol: &str) {
        if let Some(mut record) = self.symbols.get_mut(symbol) {
            record.consecutive_failures = 0;
            record.backoff_until = None;
        }
    }

    /// When the symbol is still backing off at `now`, the time it ends
    pub fn backing_off(&self, symbol: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.symbols
            .get(symbol)
            .and_then(|record| record.backoff_until)
            .filter(|until| *until > now)
    }

    pub fn consecutive_failures(&self, symbol: &str) -> u32 {
        self.symbols.get(symbol).map(|r| r.consecutive_failures).unwrap_or(0)
    }

    pub fn last_alert_at(&self, symbol: &str) -> Option<DateTime<Utc>> {
        self.symbols.get(symbol).and_then(|r| r.last_alert_at)
    }

    pub fn record(&self, symbol: &str) -> Option<SymbolRecord> {
        self.symbols.get(symbol).map(|r| r.clone())
    }

    /// Fingerprints held across all symbols
    pub fn fingerprint_count(&self) -> usize {
        self.symbols.iter().map(|r| r.fingerprints.len()).sum()
    }
}
