//! Sliding Window Log Algorithm
//!
//! Every accepted request is logged with its timestamp. A request is admitted
//! when fewer than `max_requests` entries remain inside the trailing window.
//!
//! ## How It Works
//!
//! 1. `cutoff = now - window`
//! 2. Entries with a timestamp `<= cutoff` are purged
//! 3. The remaining entries are counted
//! 4. If `count < max_requests`, a new entry is logged at `now`, the log's
//!    expiry is reset to the window length and the request is allowed
//! 5. Otherwise the request is rejected with
//!    `retry_after = ceil(oldest + window - now)`
//!
//! Purge, count and insert must run as one step. Two callers that both see
//! `count = max_requests - 1` before either inserts would otherwise let
//! `max_requests + 1` requests through.

use super::{Decision, RoutePolicy};
use crate::error::{RateLimitError, RateLimitResult};
use crate::retry;
use std::collections::VecDeque;

/// Atomic purge, count and conditional insert over a sorted set.
///
/// `KEYS[1]` log key, `ARGV[1]` now (ms), `ARGV[2]` window (ms),
/// `ARGV[3]` max requests, `ARGV[4]` unique member, `ARGV[5]` window (s).
/// Returns `{1, 0}` when allowed, `{0, oldest_ms}` when rejected.
pub const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])
local max_requests = tonumber(ARGV[3])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window_ms)

local count = redis.call('ZCARD', key)
if count < max_requests then
    redis.call('ZADD', key, now, ARGV[4])
    redis.call('EXPIRE', key, tonumber(ARGV[5]))
    return {1, 0}
end

local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
return {0, tonumber(oldest[2])}
"#;

/// In-process timestamp log for one key
#[derive(Debug, Clone, Default)]
pub struct SlidingWindowLog {
    /// Accepted request timestamps (ms)
    entries: VecDeque<u64>,
    /// When the whole log lapses if untouched
    expires_at_ms: u64,
}

impl SlidingWindowLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the log has lapsed and can be dropped
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    /// Number of logged entries, including ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Purge, count and conditionally log a request at `now_ms`
    pub fn admit(&mut self, now_ms: u64, policy: &RoutePolicy) -> Decision {
        let window_ms = policy.window_seconds.saturating_mul(1_000);

        // score <= now - window, written without underflow
        self.entries.retain(|&ts| ts.saturating_add(window_ms) > now_ms);

        if (self.entries.len() as u64) < policy.max_requests {
            self.entries.push_back(now_ms);
            self.expires_at_ms = now_ms.saturating_add(window_ms);
            return Decision::allowed();
        }

        let oldest = self.entries.iter().copied().min().unwrap_or(now_ms);
        Decision::denied(retry::sliding_window_retry_after(
            oldest,
            now_ms,
            policy.window_seconds,
        ))
    }
}

/// Decide from the sliding window script's reply
///
/// A rejection must carry a non-negative oldest score. Anything else means
/// the script or the stored log is broken and is reported as a store error.
pub fn decide_from_reply(
    reply: &[i64],
    now_ms: u64,
    policy: &RoutePolicy,
) -> RateLimitResult<Decision> {
    match reply {
        [1, ..] => Ok(Decision::allowed()),
        [0, oldest_ms] if *oldest_ms >= 0 => Ok(Decision::denied(
            retry::sliding_window_retry_after(*oldest_ms as u64, now_ms, policy.window_seconds),
        )),
        other => Err(RateLimitError::store(format!(
            "malformed sliding window reply: {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;

    #[test]
    fn test_decide_from_reply() {
        let policy = RoutePolicy::sliding(60, 5);

        assert_eq!(decide_from_reply(&[1, 0], T0, &policy).unwrap(), Decision::allowed());
        assert_eq!(
            decide_from_reply(&[0, (T0 - 30_000) as i64], T0, &policy).unwrap(),
            Decision::denied(30)
        );
    }

    #[test]
    fn test_malformed_reply_is_a_store_error() {
        let policy = RoutePolicy::sliding(60, 5);

        let replies: [&[i64]; 4] = [&[0], &[0, -1], &[], &[2, 0]];
        for reply in replies {
            assert!(matches!(
                decide_from_reply(reply, T0, &policy),
                Err(RateLimitError::StoreUnavailable(_))
            ));
        }
    }

    #[test]
    fn test_no_boundary_burst() {
        let policy = RoutePolicy::sliding(60, 5);
        let mut log = SlidingWindowLog::new();

        for _ in 0..5 {
            assert!(log.admit(T0, &policy).allowed);
        }

        let decision = log.admit(T0 + 59_000, &policy);
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after_seconds, 1);
    }

    #[test]
    fn test_admits_after_oldest_leaves_window() {
        let policy = RoutePolicy::sliding(60, 5);
        let mut log = SlidingWindowLog::new();

        for _ in 0..5 {
            log.admit(T0, &policy);
        }

        assert!(log.admit(T0 + 61_000, &policy).allowed);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_duplicate_timestamps_are_counted() {
        let policy = RoutePolicy::sliding(10, 3);
        let mut log = SlidingWindowLog::new();

        for _ in 0..3 {
            assert!(log.admit(T0, &policy).allowed);
        }
        assert!(!log.admit(T0, &policy).allowed);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_rejection_does_not_log() {
        let policy = RoutePolicy::sliding(60, 1);
        let mut log = SlidingWindowLog::new();

        log.admit(T0, &policy);
        log.admit(T0 + 10_000, &policy);
        log.admit(T0 + 20_000, &policy);

        assert_eq!(log.len(), 1);
        assert!(log.admit(T0 + 60_000, &policy).allowed);
    }

    #[test]
    fn test_expiry_follows_last_accept() {
        let policy = RoutePolicy::sliding(60, 5);
        let mut log = SlidingWindowLog::new();

        log.admit(T0, &policy);
        assert!(!log.is_expired(T0 + 59_999));
        assert!(log.is_expired(T0 + 60_000));
    }

    #[test]
    fn test_small_clock_values() {
        let policy = RoutePolicy::sliding(60, 2);
        let mut log = SlidingWindowLog::new();

        assert!(log.admit(0, &policy).allowed);
        assert!(log.admit(0, &policy).allowed);
        assert!(!log.admit(1_000, &policy).allowed);
    }
}
