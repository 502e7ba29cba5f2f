//! Retry-after computation
//!
//! All results are whole seconds rounded up, so a caller told to wait `n`
//! seconds is never rejected again for the same reason after waiting `n`.
//! Results never exceed the window length.

const MILLIS_PER_SEC: u64 = 1_000;

fn ceil_secs(millis: u64) -> u64 {
    millis.div_ceil(MILLIS_PER_SEC)
}

/// Start of the epoch-aligned fixed window containing `now_ms`, in epoch seconds
pub fn fixed_window_start(now_ms: u64, window_secs: u64) -> u64 {
    let now_secs = now_ms / MILLIS_PER_SEC;
    (now_secs / window_secs) * window_secs
}

/// Seconds until the fixed window containing `now_ms` rolls over
pub fn fixed_window_retry_after(now_ms: u64, window_secs: u64) -> u64 {
    let window_end_ms = fixed_window_start(now_ms, window_secs)
        .saturating_add(window_secs)
        .saturating_mul(MILLIS_PER_SEC);
    ceil_secs(window_end_ms.saturating_sub(now_ms)).min(window_secs)
}

/// Seconds until the oldest logged request leaves the sliding window
pub fn sliding_window_retry_after(oldest_ms: u64, now_ms: u64, window_secs: u64) -> u64 {
    let frees_at_ms = oldest_ms.saturating_add(window_secs.saturating_mul(MILLIS_PER_SEC));
    ceil_secs(frees_at_ms.saturating_sub(now_ms)).min(window_secs)
}
