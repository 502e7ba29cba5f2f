//! Rate limit storage backends
//!
//! This module provides different storage backends for rate limiting:
//!
//! - **Memory**: In-memory storage using DashMap (single instance, tests)
//! - **Redis**: Shared store for multi-instance deployments, driven by Lua scripts
//!
//! Every check is exactly one atomic operation against the store. Stores keep
//! no cached counts of their own beyond what the backend itself holds.

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis::RedisStore;

use crate::algorithms::{Decision, RoutePolicy};
use crate::error::RateLimitResult;
use async_trait::async_trait;

/// Trait for rate limit storage backends
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically increment the fixed window bucket for `key` at `now_ms`
    async fn fixed_window(
        &self,
        key: &str,
        policy: &RoutePolicy,
        now_ms: u64,
    ) -> RateLimitResult<Decision>;

    /// Atomically purge, count and conditionally log a request for `key` at `now_ms`
    async fn sliding_window(
        &self,
        key: &str,
        policy: &RoutePolicy,
        now_ms: u64,
    ) -> RateLimitResult<Decision>;

    /// Drop all state held for `key`, under both algorithms
    async fn reset(&self, key: &str) -> RateLimitResult<()>;

    /// Verify the backend is reachable
    async fn health_check(&self) -> RateLimitResult<()> {
        Ok(())
    }

    /// Get store type name for debugging
    fn store_type(&self) -> &'static str;
}
