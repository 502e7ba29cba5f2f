//! Fixed Window Algorithm
//!
//! Time is divided into epoch-aligned windows of `window_seconds`. Each
//! window gets its own counter stored under `{key}:{window_start}`, so a
//! rollover starts a fresh count at 0 without any reset step.
//!
//! ## How It Works
//!
//! 1. `window_start = floor(now / window) * window`
//! 2. The counter for `{key}:{window_start}` is incremented atomically
//! 3. The first increment in a window sets the counter's expiry to the window length
//! 4. If `count <= max_requests` the request is allowed, otherwise it is
//!    rejected with `retry_after = window_start + window - now`
//!
//! ## Boundary Behaviour
//!
//! A client can spend its whole limit at the end of window N and again at the
//! start of window N+1, so up to `2 * max_requests` requests can land in a
//! short interval straddling the boundary. This is the accepted cost of one
//! counter per window; use the sliding window where it matters.

use super::{Decision, RoutePolicy};
use crate::retry;

/// Atomic increment with first-hit expiry.
///
/// `KEYS[1]` bucket key, `ARGV[1]` window length in seconds. Returns the
/// post-increment count.
pub const FIXED_WINDOW_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], tonumber(ARGV[1]))
end
return count
"#;

/// Fixed window state transitions
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedWindow;

impl FixedWindow {
    /// Bucket key for the window containing `now_ms`
    pub fn bucket_key(key: &str, now_ms: u64, window_seconds: u64) -> String {
        format!(
            "{}:{}",
            key,
            retry::fixed_window_start(now_ms, window_seconds)
        )
    }

    /// Whether `bucket` is one of `key`'s buckets, i.e. exactly `{key}:{digits}`
    ///
    /// Identity values may themselves contain `:` (IPv6), so a plain prefix
    /// match would also catch longer identities.
    pub fn is_bucket_of(bucket: &str, key: &str) -> bool {
        bucket
            .strip_prefix(key)
            .and_then(|rest| rest.strip_prefix(':'))
            .is_some_and(|start| !start.is_empty() && start.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Decide from the post-increment count of the current bucket
    pub fn decide(count: u64, policy: &RoutePolicy, now_ms: u64) -> Decision {
        if count <= policy.max_requests {
            Decision::allowed()
        } else {
            Decision::denied(retry::fixed_window_retry_after(
                now_ms,
                policy.window_seconds,
            ))
        }
    }
}

/// In-process counter for one fixed window bucket
#[derive(Debug, Clone)]
pub struct FixedWindowCounter {
    count: u64,
    expires_at_ms: u64,
}

impl FixedWindowCounter {
    /// A counter that has not been hit yet
    pub fn new() -> Self {
        Self {
            count: 0,
            expires_at_ms: 0,
        }
    }

    /// Whether the counter has outlived its expiry
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.count > 0 && now_ms >= self.expires_at_ms
    }

    /// Increment, setting the expiry on the first hit. Returns the new count.
    pub fn increment(&mut self, now_ms: u64, window_seconds: u64) -> u64 {
        if self.is_expired(now_ms) {
            self.count = 0;
        }
        self.count += 1;
        if self.count == 1 {
            self.expires_at_ms = now_ms.saturating_add(window_seconds.saturating_mul(1_000));
        }
        self.count
    }

    /// Current count
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Default for FixedWindowCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: u64 = 3_600;

    #[test]
    fn test_bucket_key_changes_at_boundary() {
        let before = FixedWindow::bucket_key("fixed:s:ip:1.2.3.4", 119_999, 60);
        let after = FixedWindow::bucket_key("fixed:s:ip:1.2.3.4", 120_000, 60);
        assert_eq!(before, "fixed:s:ip:1.2.3.4:60");
        assert_eq!(after, "fixed:s:ip:1.2.3.4:120");
    }

    #[test]
    fn test_is_bucket_of_requires_exact_key() {
        assert!(FixedWindow::is_bucket_of("fixed:S:ip:::1:1700000040", "fixed:S:ip:::1"));
        assert!(!FixedWindow::is_bucket_of("fixed:S:ip:::1:2:1700000040", "fixed:S:ip:::1"));
        assert!(!FixedWindow::is_bucket_of("fixed:S:ip:::1", "fixed:S:ip:::1"));
        assert!(!FixedWindow::is_bucket_of("fixed:S:ip:::1:", "fixed:S:ip:::1"));
        assert!(!FixedWindow::is_bucket_of("fixed:S:ip:::12:60", "fixed:S:ip:::1"));
    }

    #[test]
    fn test_decide_at_limit() {
        let policy = RoutePolicy::fixed(60, 5);
        assert!(FixedWindow::decide(5, &policy, 10_000).allowed);

        let denied = FixedWindow::decide(6, &policy, 10_000);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_seconds, 50);
    }

    #[test]
    fn test_counter_increments_and_expires() {
        let mut counter = FixedWindowCounter::new();
        let start = 100 * HOUR * 1_000;

        assert_eq!(counter.increment(start, 60), 1);
        assert_eq!(counter.increment(start + 1_000, 60), 2);
        assert!(!counter.is_expired(start + 59_999));
        assert!(counter.is_expired(start + 60_000));

        // Expiry is only set by the first hit
        assert_eq!(counter.increment(start + 60_000, 60), 1);
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_script_sets_expiry_only_on_first_hit() {
        assert!(FIXED_WINDOW_SCRIPT.contains("INCR"));
        assert!(FIXED_WINDOW_SCRIPT.contains("if count == 1 then"));
    }
}
