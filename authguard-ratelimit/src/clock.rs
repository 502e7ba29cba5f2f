//! Wall-clock source for window computations.
//!
//! Fixed windows are aligned to the Unix epoch, so the clock reports
//! milliseconds since the epoch rather than a monotonic instant.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// System clock backed by `SystemTime::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        // A clock set before 1970 reads as the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually driven clock for deterministic tests.
///
/// Clones share the same time value.
///
/// ```
/// use authguard_ratelimit::clock::{Clock, MockClock};
/// use std::time::Duration;
///
/// let clock = MockClock::from_secs(3_600);
/// clock.advance(Duration::from_secs(59));
/// assert_eq!(clock.now_millis(), 3_659_000);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    millis: Arc<AtomicU64>,
}

impl MockClock {
    /// Create a mock clock at the given epoch milliseconds.
    pub fn new(millis: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(millis)),
        }
    }

    /// Create a mock clock at the given epoch seconds.
    pub fn from_secs(secs: u64) -> Self {
        Self::new(secs.saturating_mul(1_000))
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: Duration) {
        self.millis
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    /// Set the clock to specific epoch milliseconds.
    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_after_2020() {
        let clock = SystemClock::new();
        assert!(clock.now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_mock_clock_shared_between_clones() {
        let clock = MockClock::from_secs(10);
        let other = clock.clone();

        other.advance(Duration::from_millis(1_500));
        assert_eq!(clock.now_millis(), 11_500);

        clock.set(0);
        assert_eq!(other.now_millis(), 0);
    }
}
