//! Counters describing limiter behaviour.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters shared by all clones of a limiter.
#[derive(Debug, Clone, Default)]
pub struct RateLimitStats {
    inner: Arc<StatsInner>,
}

#[derive(Debug, Default)]
struct StatsInner {
    allowed: AtomicU64,
    rejected: AtomicU64,
    store_errors: AtomicU64,
    fail_open: AtomicU64,
}

impl RateLimitStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_allowed(&self) {
        self.inner.allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.inner.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_error(&self) {
        self.inner.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fail_open(&self) {
        self.inner.fail_open.fetch_add(1, Ordering::Relaxed);
    }

    /// Requests the store allowed.
    pub fn allowed(&self) -> u64 {
        self.inner.allowed.load(Ordering::Relaxed)
    }

    /// Requests the store rejected.
    pub fn rejected(&self) -> u64 {
        self.inner.rejected.load(Ordering::Relaxed)
    }

    /// Checks that failed to reach the store or timed out.
    pub fn store_errors(&self) -> u64 {
        self.inner.store_errors.load(Ordering::Relaxed)
    }

    /// Requests let through unchecked because the store was unavailable.
    pub fn fail_open(&self) -> u64 {
        self.inner.fail_open.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            allowed: self.allowed(),
            rejected: self.rejected(),
            store_errors: self.store_errors(),
            fail_open: self.fail_open(),
        }
    }
}

/// Point-in-time copy of [`RateLimitStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Requests the store allowed
    pub allowed: u64,
    /// Requests the store rejected
    pub rejected: u64,
    /// Failed store round-trips
    pub store_errors: u64,
    /// Requests let through by the fail-open policy
    pub fail_open: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let stats = RateLimitStats::new();
        let other = stats.clone();

        stats.record_allowed();
        other.record_rejected();
        other.record_store_error();
        other.record_fail_open();

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                allowed: 1,
                rejected: 1,
                store_errors: 1,
                fail_open: 1,
            }
        );
    }
}
