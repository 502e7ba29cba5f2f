//! Error types for rate limiting

use std::time::Duration;
use thiserror::Error;

/// Result type for rate limiting operations
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Rate limiting errors
///
/// `LimitExceeded` means the caller is over its limit. `StoreUnavailable`
/// means the limit could not be checked at all. Callers must be able to tell
/// the two apart, so they are never folded into one variant.
#[derive(Debug, Clone, Error)]
pub enum RateLimitError {
    /// Rate limit exceeded
    #[error("Rate limit exceeded for {key}. Retry after {retry_after_seconds}s")]
    LimitExceeded {
        /// Composite rate-limit key that was exhausted
        key: String,
        /// Maximum requests allowed in the window
        limit: u64,
        /// Window length in seconds
        window_seconds: u64,
        /// Seconds to wait before retrying
        retry_after_seconds: u64,
    },

    /// Window, limit or identity failed validation before touching the store
    #[error("Invalid rate limit parameters: {0}")]
    InvalidParameters(String),

    /// Shared store unreachable, timed out, or a script failed
    #[error("Rate limit store unavailable: {0}")]
    StoreUnavailable(String),

    /// Configuration error
    #[error("Rate limit configuration error: {0}")]
    Config(String),
}

impl RateLimitError {
    /// Create a limit exceeded error
    pub fn limit_exceeded(
        key: impl Into<String>,
        limit: u64,
        window_seconds: u64,
        retry_after_seconds: u64,
    ) -> Self {
        Self::LimitExceeded {
            key: key.into(),
            limit,
            window_seconds,
            retry_after_seconds,
        }
    }

    /// Create an invalid parameters error
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameters(msg.into())
    }

    /// Create a store error
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this error is a rate limit exceeded error
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Self::LimitExceeded { .. })
    }

    /// Check if this error is a transient infrastructure failure
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Get the retry-after duration if this is a limit exceeded error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::LimitExceeded {
                retry_after_seconds,
                ..
            } => Some(Duration::from_secs(*retry_after_seconds)),
            _ => None,
        }
    }

    /// Metadata for the transport layer, present only when the limit was exceeded
    pub fn metadata(&self) -> Option<RateLimitMetadata> {
        match self {
            Self::LimitExceeded {
                limit,
                window_seconds,
                retry_after_seconds,
                ..
            } => Some(RateLimitMetadata {
                limit: *limit,
                window_seconds: *window_seconds,
                retry_after_seconds: *retry_after_seconds,
            }),
            _ => None,
        }
    }

    /// Message suitable for end users. Infrastructure details stay out of it.
    pub fn user_message(&self) -> String {
        match self {
            Self::LimitExceeded {
                retry_after_seconds,
                ..
            } => format!(
                "Too many requests. Please try again in {} {}.",
                retry_after_seconds,
                if *retry_after_seconds == 1 {
                    "second"
                } else {
                    "seconds"
                }
            ),
            _ => "The service is temporarily unavailable. Please try again later.".to_string(),
        }
    }
}

#[cfg(feature = "redis")]
impl From<authguard_redis::RedisError> for RateLimitError {
    fn from(err: authguard_redis::RedisError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for RateLimitError {
    fn from(err: redis::RedisError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

/// Rate limit data the transport layer surfaces to clients on rejection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitMetadata {
    /// Maximum requests allowed in the window
    pub limit: u64,
    /// Window length in seconds
    pub window_seconds: u64,
    /// Seconds until the client should retry
    pub retry_after_seconds: u64,
}

impl RateLimitMetadata {
    /// Get header/trailer name-value pairs
    pub fn to_header_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("retry-after", self.retry_after_seconds.to_string()),
            ("x-ratelimit-limit", self.limit.to_string()),
            ("x-ratelimit-window", self.window_seconds.to_string()),
        ]
    }
}
