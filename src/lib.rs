// Authguard - distributed rate limiting for authentication endpoints
//
// This package re-exports the engine and, behind the `redis` feature, the
// pooled Redis connection crate it runs against in production.

// Re-export the engine
pub use authguard_ratelimit::*;

// Re-export optional crates
#[cfg(feature = "redis")]
pub use authguard_redis;

/// Prelude for common imports.
///
/// ```rust
/// use authguard::prelude::*;
///
/// # tokio_test::block_on(async {
/// let limiter = RateLimiter::builder()
///     .policy("SignInService.SignIn", RoutePolicy::sliding(60, 5))
///     .build()
///     .await?;
///
/// let identity = Identity::ip("203.0.113.9");
/// limiter.enforce_route("SignInService.SignIn", &identity).await?;
/// # Ok::<(), RateLimitError>(())
/// # }).unwrap();
/// ```
pub mod prelude {
    pub use authguard_ratelimit::{
        Algorithm, Decision, FailurePolicy, Identity, RateLimitConfig, RateLimitError,
        RateLimitResult, RateLimiter, RoutePolicy,
    };

    #[cfg(feature = "redis")]
    pub use authguard_redis::{RedisConfig, RedisPool};
}
