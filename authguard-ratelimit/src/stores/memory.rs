//! In-memory rate limit store
//!
//! Uses DashMap for thread-safe concurrent access. Each check runs while the
//! entry's shard lock is held, which makes it atomic per key within one
//! process. State is not shared between processes: for distributed
//! deployments use the Redis store.
//!
//! Expired counters and logs are swept every `sweep_interval` checks, so
//! identities that never come back do not pile up.

use crate::algorithms::fixed_window::{FixedWindow, FixedWindowCounter};
use crate::algorithms::{Decision, RoutePolicy, SlidingWindowLog};
use crate::error::RateLimitResult;
use crate::stores::RateLimitStore;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Checks between two sweeps of expired entries
pub const DEFAULT_SWEEP_INTERVAL: u64 = 1_024;

/// In-memory rate limit store
pub struct MemoryStore {
    /// Fixed window counters, keyed by bucket key
    fixed_windows: DashMap<String, FixedWindowCounter>,
    /// Sliding window logs
    sliding_logs: DashMap<String, SlidingWindowLog>,
    operations: AtomicU64,
    sweep_interval: u64,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }

    /// Create a store that sweeps expired entries every `interval` checks
    pub fn with_sweep_interval(interval: u64) -> Self {
        let sweep_interval = interval.max(1);
        debug!(sweep_interval, "Creating new in-memory rate limit store");
        Self {
            fixed_windows: DashMap::new(),
            sliding_logs: DashMap::new(),
            operations: AtomicU64::new(0),
            sweep_interval,
        }
    }

    /// Get the number of tracked keys (for monitoring)
    pub fn key_count(&self) -> usize {
        self.fixed_windows.len() + self.sliding_logs.len()
    }

    /// Drop counters and logs whose expiry has passed
    pub fn cleanup(&self, now_ms: u64) {
        self.fixed_windows
            .retain(|_, counter| !counter.is_expired(now_ms));
        self.sliding_logs.retain(|_, log| !log.is_expired(now_ms));

        debug!(key_count = self.key_count(), "Cleanup complete");
    }

    /// Count a check and sweep when the interval is reached.
    ///
    /// Must not be called while holding a map entry.
    fn record_operation(&self, now_ms: u64) {
        let done = self.operations.fetch_add(1, Ordering::Relaxed) + 1;
        if done % self.sweep_interval == 0 {
            self.cleanup(now_ms);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn fixed_window(
        &self,
        key: &str,
        policy: &RoutePolicy,
        now_ms: u64,
    ) -> RateLimitResult<Decision> {
        let bucket = FixedWindow::bucket_key(key, now_ms, policy.window_seconds);

        let count = self
            .fixed_windows
            .entry(bucket)
            .or_default()
            .increment(now_ms, policy.window_seconds);

        trace!(key = %key, count = count, "Memory fixed window check");
        self.record_operation(now_ms);
        Ok(FixedWindow::decide(count, policy, now_ms))
    }

    async fn sliding_window(
        &self,
        key: &str,
        policy: &RoutePolicy,
        now_ms: u64,
    ) -> RateLimitResult<Decision> {
        let decision = {
            let mut log = self.sliding_logs.entry(key.to_string()).or_default();
            if log.is_expired(now_ms) {
                *log = SlidingWindowLog::new();
            }

            let decision = log.admit(now_ms, policy);
            trace!(
                key = %key,
                entries = log.len(),
                allowed = decision.allowed,
                "Memory sliding window check"
            );
            decision
        };
        self.record_operation(now_ms);
        Ok(decision)
    }

    async fn reset(&self, key: &str) -> RateLimitResult<()> {
        debug!(key = %key, "Resetting rate limit state");
        self.fixed_windows
            .retain(|bucket, _| !FixedWindow::is_bucket_of(bucket, key));
        self.sliding_logs.remove(key);
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const T0: u64 = 1_700_000_020_000;

    #[tokio::test]
    async fn test_fixed_window() {
        let store = MemoryStore::new();
        let policy = RoutePolicy::fixed(60, 3);

        for _ in 0..3 {
            assert!(store.fixed_window("k", &policy, T0).await.unwrap().allowed);
        }

        let decision = store.fixed_window("k", &policy, T0).await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.retry_after_seconds > 0 && decision.retry_after_seconds <= 60);
    }

    #[tokio::test]
    async fn test_fixed_window_rollover() {
        let store = MemoryStore::new();
        let policy = RoutePolicy::fixed(60, 1);

        assert!(store.fixed_window("k", &policy, T0).await.unwrap().allowed);
        assert!(!store.fixed_window("k", &policy, T0).await.unwrap().allowed);

        // T0 is 40s into its window
        let next_window = T0 + 20_000;
        assert!(store.fixed_window("k", &policy, next_window).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_sliding_window() {
        let store = MemoryStore::new();
        let policy = RoutePolicy::sliding(60, 3);

        for _ in 0..3 {
            assert!(store.sliding_window("k", &policy, T0).await.unwrap().allowed);
        }

        let decision = store.sliding_window("k", &policy, T0 + 30_000).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after_seconds, 30);
    }

    #[tokio::test]
    async fn test_reset() {
        let store = MemoryStore::new();
        let fixed = RoutePolicy::fixed(60, 1);
        let sliding = RoutePolicy::sliding(60, 1);

        store.fixed_window("k", &fixed, T0).await.unwrap();
        store.sliding_window("k", &sliding, T0).await.unwrap();
        store.fixed_window("k2", &fixed, T0).await.unwrap();

        store.reset("k").await.unwrap();

        assert!(store.fixed_window("k", &fixed, T0).await.unwrap().allowed);
        assert!(store.sliding_window("k", &sliding, T0).await.unwrap().allowed);
        assert!(!store.fixed_window("k2", &fixed, T0).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_reset_leaves_longer_identities_alone() {
        let store = MemoryStore::new();
        let policy = RoutePolicy::fixed(60, 1);

        store.fixed_window("fixed:S:ip:::1:2", &policy, T0).await.unwrap();
        store.fixed_window("fixed:S:ip:::1", &policy, T0).await.unwrap();

        store.reset("fixed:S:ip:::1").await.unwrap();

        assert!(store.fixed_window("fixed:S:ip:::1", &policy, T0).await.unwrap().allowed);
        assert!(!store.fixed_window("fixed:S:ip:::1:2", &policy, T0).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_rolling_windows_stay_bounded() {
        let store = MemoryStore::with_sweep_interval(100);
        let fixed = RoutePolicy::fixed(1, 5);
        let sliding = RoutePolicy::sliding(1, 5);

        for i in 0..1_000u64 {
            let now = T0 + i * 1_000;
            store.fixed_window("k", &fixed, now).await.unwrap();
            store
                .sliding_window(&format!("visitor-{}", i), &sliding, now)
                .await
                .unwrap();
        }

        assert!(store.key_count() <= 100, "key_count = {}", store.key_count());
    }

    #[tokio::test]
    async fn test_cleanup() {
        let store = MemoryStore::new();
        store
            .fixed_window("a", &RoutePolicy::fixed(60, 10), T0)
            .await
            .unwrap();
        store
            .sliding_window("b", &RoutePolicy::sliding(60, 10), T0)
            .await
            .unwrap();
        assert_eq!(store.key_count(), 2);

        store.cleanup(T0 + 1_000);
        assert_eq!(store.key_count(), 2);

        store.cleanup(T0 + 60_000);
        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_admit_exactly_limit() {
        let store = Arc::new(MemoryStore::new());
        let policy = RoutePolicy::sliding(60, 10);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.sliding_window("k", &policy, T0).await.unwrap() })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap().allowed {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 10);
    }

    #[test]
    fn test_store_type() {
        let store = MemoryStore::new();
        assert_eq!(store.store_type(), "memory");
    }
}
