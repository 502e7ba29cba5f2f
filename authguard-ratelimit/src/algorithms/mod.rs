//! Rate limiting algorithms
//!
//! This module provides the two windowing algorithms:
//!
//! - **Fixed Window**: Counts requests in epoch-aligned, non-overlapping buckets
//! - **Sliding Window Log**: Counts requests in a trailing window using a timestamp log
//!
//! Each algorithm is defined here once, as a state transition plus the Lua
//! script that performs the same transition atomically inside Redis.

pub mod fixed_window;
pub mod sliding_window;

pub use fixed_window::FixedWindow;
pub use sliding_window::SlidingWindowLog;

use crate::error::{RateLimitError, RateLimitResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Windowing algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Fixed, epoch-aligned windows
    ///
    /// Cheap (one counter per window) but can admit up to twice the limit
    /// across a window boundary.
    Fixed,

    /// Sliding window log
    ///
    /// Exact over any trailing window, at the cost of one log entry per
    /// accepted request.
    Sliding,
}

impl Algorithm {
    /// Name used inside rate limit keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Fixed => "fixed",
            Algorithm::Sliding => "sliding",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Longest accepted window, one leap year
pub const MAX_WINDOW_SECONDS: u64 = 366 * 24 * 60 * 60;

/// Per-route limit tuple, as supplied by configuration loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePolicy {
    /// Windowing algorithm
    pub algorithm: Algorithm,
    /// Window length in seconds
    pub window_seconds: u64,
    /// Maximum requests allowed per window
    pub max_requests: u64,
}

impl RoutePolicy {
    /// Fixed window policy
    pub fn fixed(window_seconds: u64, max_requests: u64) -> Self {
        Self {
            algorithm: Algorithm::Fixed,
            window_seconds,
            max_requests,
        }
    }

    /// Sliding window policy
    pub fn sliding(window_seconds: u64, max_requests: u64) -> Self {
        Self {
            algorithm: Algorithm::Sliding,
            window_seconds,
            max_requests,
        }
    }

    /// Reject zero limits and windows that are zero or longer than [`MAX_WINDOW_SECONDS`]
    pub fn validate(&self) -> RateLimitResult<()> {
        if self.window_seconds == 0 {
            return Err(RateLimitError::invalid("window_seconds must be greater than 0"));
        }
        if self.window_seconds > MAX_WINDOW_SECONDS {
            return Err(RateLimitError::invalid(format!(
                "window_seconds must be at most {}",
                MAX_WINDOW_SECONDS
            )));
        }
        if self.max_requests == 0 {
            return Err(RateLimitError::invalid("max_requests must be greater than 0"));
        }
        Ok(())
    }

    /// Human-readable description
    pub fn description(&self) -> String {
        match self.algorithm {
            Algorithm::Fixed => format!(
                "Fixed window: {} requests per {}s",
                self.max_requests, self.window_seconds
            ),
            Algorithm::Sliding => format!(
                "Sliding window: {} requests per {}s",
                self.max_requests, self.window_seconds
            ),
        }
    }
}

/// Outcome of one rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Seconds until a retry can succeed; 0 when allowed
    pub retry_after_seconds: u64,
}

impl Decision {
    /// An allowed decision
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after_seconds: 0,
        }
    }

    /// A rejected decision
    pub fn denied(retry_after_seconds: u64) -> Self {
        Self {
            allowed: false,
            retry_after_seconds,
        }
    }
}
