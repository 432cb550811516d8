//! TTL cache of classification suggestions
//!
//! Keyed by transaction content fingerprint. Expiry is checked lazily on
//! read, and a background sweep physically removes expired entries so memory
//! stays bounded even without read traffic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::LlmSuggestion;

/// TTL used when the configured TTL is zero
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

/// Interval between background sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// A cached suggestion with its absolute expiry
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub suggestion: LlmSuggestion,
    pub expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

type Entries = Arc<Mutex<HashMap<String, CacheEntry>>>;

#[derive(Debug)]
pub struct SuggestionCache {
    entries: Entries,
    ttl: Duration,
    shutdown: CancellationToken,
}

impl SuggestionCache {
    /// Create a cache with the given TTL and the default sweep interval.
    ///
    /// Must be called within a Tokio runtime (the sweep task is spawned).
    pub fn new(ttl: Duration) -> Self {
        Self::with_sweep_interval(ttl, DEFAULT_SWEEP_INTERVAL)
    }

    pub fn with_sweep_interval(ttl: Duration, sweep_interval: Duration) -> Self {
        let ttl = if ttl.is_zero() { DEFAULT_TTL } else { ttl };
        let entries: Entries = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        tokio::spawn(sweep_loop(entries.clone(), sweep_interval, shutdown.clone()));

        Self {
            entries,
            ttl,
            shutdown,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up a live entry; expired entries read as absent
    pub fn get(&self, key: &str) -> Option<LlmSuggestion> {
        let entries = self.lock();
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.suggestion.clone())
    }

    /// Insert or overwrite, expiring `ttl` from now
    pub fn set(&self, key: &str, suggestion: LlmSuggestion) {
        let entry = CacheEntry {
            suggestion,
            expires_at: Instant::now() + self.ttl,
        };
        self.lock().insert(key.to_string(), entry);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, including expired ones not yet swept
    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Remove every expired entry now, returning how many were dropped
    pub fn sweep_expired(&self) -> usize {
        sweep(&self.entries)
    }

    /// Stop the sweep task. Safe to call more than once.
    pub fn close(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        debug!("Suggestion cache closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for SuggestionCache {
    fn drop(&mut self) {
        self.close();
    }
}

fn sweep(entries: &Entries) -> usize {
    let now = Instant::now();
    let mut guard = entries.lock().unwrap_or_else(|p| p.into_inner());
    let before = guard.len();
    guard.retain(|_, entry| !entry.is_expired(now));
    before - guard.len()
}

async fn sweep_loop(entries: Entries, period: Duration, shutdown: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let removed = sweep(&entries);
                if removed > 0 {
                    debug!(removed, "Swept expired suggestions");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suggestion(category: &str) -> LlmSuggestion {
        LlmSuggestion {
            transaction_id: "tx-1".into(),
            category: category.into(),
            confidence: 0.9,
            is_new: false,
            description: String::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_within_ttl() {
        let cache = SuggestionCache::new(Duration::from_secs(60));
        cache.set("abc", suggestion("Dining"));
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(cache.get("abc"), Some(suggestion("Dining")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_reads_absent_but_stays_until_swept() {
        let cache = SuggestionCache::with_sweep_interval(
            Duration::from_secs(60),
            Duration::from_secs(3600),
        );
        cache.set("abc", suggestion("Dining"));
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(cache.get("abc").is_none());
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_removes_expired() {
        let cache =
            SuggestionCache::with_sweep_interval(Duration::from_secs(10), Duration::from_secs(30));
        cache.set("a", suggestion("Dining"));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_overwrites_and_extends() {
        let cache = SuggestionCache::new(Duration::from_secs(60));
        cache.set("k", suggestion("Dining"));
        tokio::time::sleep(Duration::from_secs(40)).await;
        cache.set("k", suggestion("Coffee Shops"));
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(cache.get("k").unwrap().category, "Coffee Shops");
    }

    #[tokio::test]
    async fn test_zero_ttl_uses_default() {
        let cache = SuggestionCache::new(Duration::ZERO);
        assert_eq!(cache.ttl(), DEFAULT_TTL);
    }

    #[tokio::test]
    async fn test_clear_and_close_are_safe() {
        let cache = SuggestionCache::new(Duration::from_secs(60));
        cache.set("a", suggestion("Dining"));
        cache.set("b", suggestion("Travel"));
        assert_eq!(cache.size(), 2);
        cache.clear();
        assert_eq!(cache.size(), 0);

        cache.close();
        cache.close();
        cache.set("c", suggestion("Travel"));
        assert!(cache.get("c").is_some());
    }
}
