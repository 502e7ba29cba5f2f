//! # Authguard Rate Limiting
//!
//! Distributed rate limiting for authentication endpoints (sign-up, code
//! resend, sign-in), enforced against a shared store so every service
//! instance sees the same counts.
//!
//! ## Features
//!
//! - **Two Algorithms**: Epoch-aligned fixed window and sliding window log
//! - **Atomic Checks**: Each check is one indivisible store operation (Lua scripts on Redis)
//! - **Storage Backends**: In-memory (DashMap) and Redis for distributed deployments
//! - **Identity Keys**: Per email, user id or IP, isolated per scope
//! - **Explicit Failure Policy**: Fail-open or fail-closed when the store is down
//!
//! ## Quick Start
//!
//! ```rust
//! use authguard_ratelimit::RateLimiter;
//!
//! # tokio_test::block_on(async {
//! let limiter = RateLimiter::builder().build().await?;
//!
//! // Three code resends per hour per email address
//! match limiter
//!     .enforce_fixed_by_email("user@example.com", 3600, 3, Some("ResendCode"))
//!     .await
//! {
//!     Ok(()) => println!("Request allowed"),
//!     Err(e) if e.is_limit_exceeded() => println!("{}", e.user_message()),
//!     Err(e) => return Err(e),
//! }
//! # Ok::<(), authguard_ratelimit::RateLimitError>(())
//! # }).unwrap();
//! ```
//!
//! ## Algorithms
//!
//! ### Fixed Window
//!
//! Counts requests in epoch-aligned buckets. Up to twice the limit can pass in
//! a short interval straddling a bucket boundary.
//!
//! ### Sliding Window Log
//!
//! Logs each accepted request and counts the ones inside the trailing window.
//! No boundary burst, one log entry per accepted request.

pub mod algorithms;
pub mod clock;
pub mod config;
pub mod error;
pub mod key;
pub mod retry;
pub mod stats;
pub mod stores;

pub use algorithms::{Algorithm, Decision, RoutePolicy};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{FailurePolicy, RateLimitConfig, RateLimiterBuilder, StoreType};
pub use error::{RateLimitError, RateLimitMetadata, RateLimitResult};
pub use key::{Identity, IdentityKind, KeyBuilder, build_key, validate_scope};
pub use stats::{RateLimitStats, StatsSnapshot};
pub use stores::{MemoryStore, RateLimitStore};

#[cfg(feature = "redis")]
pub use stores::RedisStore;

use std::sync::Arc;
use tracing::{debug, trace, warn};

/// The enforcement facade
///
/// Holds the injected store and clock. Cheap to share behind an `Arc`; all
/// counts live in the store.
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
    stats: RateLimitStats,
}

impl RateLimiter {
    /// Create a new rate limiter builder
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::new()
    }

    /// Create a new rate limiter with the given store, clock and configuration
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
        config: RateLimitConfig,
    ) -> Self {
        debug!(
            store = store.store_type(),
            failure_policy = ?config.failure_policy,
            "Creating new rate limiter"
        );
        Self {
            store,
            clock,
            config,
            stats: RateLimitStats::new(),
        }
    }

    /// Check a request and return the decision without raising on rejection
    ///
    /// Store failures resolve through the configured [`FailurePolicy`].
    pub async fn check(
        &self,
        algorithm: Algorithm,
        identity: &Identity,
        scope: Option<&str>,
        window_seconds: u64,
        max_requests: u64,
    ) -> RateLimitResult<Decision> {
        let policy = RoutePolicy {
            algorithm,
            window_seconds,
            max_requests,
        };
        let (_, decision) = self.evaluate(&policy, identity, scope).await?;
        Ok(decision)
    }

    /// Enforce a limit, returning `LimitExceeded` when the request is rejected
    pub async fn enforce(
        &self,
        algorithm: Algorithm,
        identity: &Identity,
        scope: Option<&str>,
        window_seconds: u64,
        max_requests: u64,
    ) -> RateLimitResult<()> {
        let policy = RoutePolicy {
            algorithm,
            window_seconds,
            max_requests,
        };
        self.enforce_policy(&policy, identity, scope).await
    }

    /// Enforce the policy configured for `scope`
    pub async fn enforce_route(&self, scope: &str, identity: &Identity) -> RateLimitResult<()> {
        let policy = *self.config.policy(scope).ok_or_else(|| {
            RateLimitError::invalid(format!("no rate limit policy configured for '{}'", scope))
        })?;
        self.enforce_policy(&policy, identity, Some(scope)).await
    }

    /// Fixed window limit keyed on an email address
    pub async fn enforce_fixed_by_email(
        &self,
        email: &str,
        window_seconds: u64,
        max_requests: u64,
        scope: Option<&str>,
    ) -> RateLimitResult<()> {
        self.enforce(Algorithm::Fixed, &Identity::email(email), scope, window_seconds, max_requests)
            .await
    }

    /// Fixed window limit keyed on a user id
    pub async fn enforce_fixed_by_user_id(
        &self,
        user_id: &str,
        window_seconds: u64,
        max_requests: u64,
        scope: Option<&str>,
    ) -> RateLimitResult<()> {
        let identity = Identity::user_id(user_id);
        self.enforce(Algorithm::Fixed, &identity, scope, window_seconds, max_requests)
            .await
    }

    /// Fixed window limit keyed on a client IP
    pub async fn enforce_fixed_by_ip(
        &self,
        ip: &str,
        window_seconds: u64,
        max_requests: u64,
        scope: Option<&str>,
    ) -> RateLimitResult<()> {
        self.enforce(Algorithm::Fixed, &Identity::ip(ip), scope, window_seconds, max_requests)
            .await
    }

    /// Sliding window limit keyed on an email address
    pub async fn enforce_sliding_by_email(
        &self,
        email: &str,
        window_seconds: u64,
        max_requests: u64,
        scope: Option<&str>,
    ) -> RateLimitResult<()> {
        let identity = Identity::email(email);
        self.enforce(Algorithm::Sliding, &identity, scope, window_seconds, max_requests)
            .await
    }

    /// Sliding window limit keyed on a user id
    pub async fn enforce_sliding_by_user_id(
        &self,
        user_id: &str,
        window_seconds: u64,
        max_requests: u64,
        scope: Option<&str>,
    ) -> RateLimitResult<()> {
        let identity = Identity::user_id(user_id);
        self.enforce(Algorithm::Sliding, &identity, scope, window_seconds, max_requests)
            .await
    }

    /// Sliding window limit keyed on a client IP
    pub async fn enforce_sliding_by_ip(
        &self,
        ip: &str,
        window_seconds: u64,
        max_requests: u64,
        scope: Option<&str>,
    ) -> RateLimitResult<()> {
        self.enforce(Algorithm::Sliding, &Identity::ip(ip), scope, window_seconds, max_requests)
            .await
    }

    /// Reset the state for an identity under a scope
    pub async fn reset(
        &self,
        algorithm: Algorithm,
        identity: &Identity,
        scope: Option<&str>,
    ) -> RateLimitResult<()> {
        let scope = self.resolve_scope(scope)?;
        let key = KeyBuilder::key_for(algorithm, scope, identity);
        debug!(key = %key, "Resetting rate limit");
        self.store.reset(&key).await
    }

    /// Check that the store is reachable within the store timeout
    pub async fn health_check(&self) -> RateLimitResult<()> {
        match tokio::time::timeout(self.config.store_timeout, self.store.health_check()).await {
            Ok(result) => result,
            Err(_) => Err(RateLimitError::store("health check timed out")),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Get the limiter's counters
    pub fn stats(&self) -> &RateLimitStats {
        &self.stats
    }

    /// Name of the underlying store
    pub fn store_type(&self) -> &'static str {
        self.store.store_type()
    }

    async fn enforce_policy(
        &self,
        policy: &RoutePolicy,
        identity: &Identity,
        scope: Option<&str>,
    ) -> RateLimitResult<()> {
        let (key, decision) = self.evaluate(policy, identity, scope).await?;
        if decision.allowed {
            return Ok(());
        }

        warn!(
            algorithm = %policy.algorithm,
            scope = scope.unwrap_or(&self.config.default_scope),
            identity_kind = %identity.kind(),
            retry_after_seconds = decision.retry_after_seconds,
            "Rate limit exceeded"
        );
        Err(RateLimitError::limit_exceeded(
            key,
            policy.max_requests,
            policy.window_seconds,
            decision.retry_after_seconds,
        ))
    }

    /// Validate, build the key and run one atomic store operation
    async fn evaluate(
        &self,
        policy: &RoutePolicy,
        identity: &Identity,
        scope: Option<&str>,
    ) -> RateLimitResult<(String, Decision)> {
        policy.validate()?;
        if identity.is_blank() {
            return Err(RateLimitError::invalid(format!(
                "{} identity must not be empty",
                identity.kind()
            )));
        }
        let scope = self.resolve_scope(scope)?;
        let key = KeyBuilder::key_for(policy.algorithm, scope, identity);
        let now_ms = self.clock.now_millis();

        trace!(key = %key, policy = %policy.description(), "Checking rate limit");

        let attempt = async {
            match policy.algorithm {
                Algorithm::Fixed => self.store.fixed_window(&key, policy, now_ms).await,
                Algorithm::Sliding => self.store.sliding_window(&key, policy, now_ms).await,
            }
        };

        let outcome = match tokio::time::timeout(self.config.store_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(RateLimitError::store(format!(
                "store did not answer within {:?}",
                self.config.store_timeout
            ))),
        };

        match outcome {
            Ok(decision) => {
                if decision.allowed {
                    self.stats.record_allowed();
                } else {
                    self.stats.record_rejected();
                }
                trace!(key = %key, allowed = decision.allowed, "Rate limit decision");
                Ok((key, decision))
            }
            Err(err) => self.on_store_failure(key, err),
        }
    }

    fn on_store_failure(
        &self,
        key: String,
        err: RateLimitError,
    ) -> RateLimitResult<(String, Decision)> {
        self.stats.record_store_error();
        let err = match err {
            RateLimitError::StoreUnavailable(_) => err,
            other => RateLimitError::store(other.to_string()),
        };

        match self.config.failure_policy {
            FailurePolicy::FailOpen => {
                self.stats.record_fail_open();
                warn!(
                    store = self.store.store_type(),
                    error = %err,
                    "Rate limit store unavailable, failing open"
                );
                Ok((key, Decision::allowed()))
            }
            FailurePolicy::FailClosed => {
                warn!(
                    store = self.store.store_type(),
                    error = %err,
                    "Rate limit store unavailable, failing closed"
                );
                Err(err)
            }
        }
    }

    fn resolve_scope<'a>(&'a self, scope: Option<&'a str>) -> RateLimitResult<&'a str> {
        let scope = scope.unwrap_or(&self.config.default_scope);
        key::validate_scope(scope)?;
        Ok(scope)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("store", &self.store.store_type())
            .field("config", &self.config)
            .finish()
    }
}
