//! Redis rate limit store
//!
//! Uses Redis for distributed rate limiting across multiple instances.
//! Requires the `redis` feature to be enabled.
//!
//! Both algorithms run as Lua scripts, so each check is a single server-side
//! operation that Redis never interleaves with another client's. A check that
//! is cancelled mid-flight has either run completely or not at all.

use crate::algorithms::fixed_window::{FIXED_WINDOW_SCRIPT, FixedWindow};
use crate::algorithms::sliding_window::{SLIDING_WINDOW_SCRIPT, decide_from_reply};
use crate::algorithms::{Decision, RoutePolicy};
use crate::error::{RateLimitError, RateLimitResult};
use crate::stores::RateLimitStore;
use async_trait::async_trait;
use authguard_redis::RedisPool;
use redis::Script;
use tracing::{debug, trace};
use uuid::Uuid;

const SCAN_BATCH: usize = 100;

/// Escape `MATCH` glob metacharacters so `value` only matches itself
fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Redis-backed rate limit store
///
/// Connections come from an injected pool. Scripts are sent by hash
/// (`EVALSHA`) and loaded on first use.
pub struct RedisStore {
    /// Connection pool
    pool: RedisPool,
    /// Key prefix
    prefix: String,
    fixed_script: Script,
    sliding_script: Script,
}

impl RedisStore {
    /// Create a store over an existing pool with the default `ratelimit` prefix
    pub fn new(pool: RedisPool) -> Self {
        Self::with_prefix(pool, "ratelimit")
    }

    /// Create a store with a custom key prefix
    pub fn with_prefix(pool: RedisPool, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        debug!(prefix = %prefix, "Creating Redis rate limit store");
        Self {
            pool,
            prefix,
            fixed_script: Script::new(FIXED_WINDOW_SCRIPT),
            sliding_script: Script::new(SLIDING_WINDOW_SCRIPT),
        }
    }

    /// Get the full key with prefix
    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn fixed_window(
        &self,
        key: &str,
        policy: &RoutePolicy,
        now_ms: u64,
    ) -> RateLimitResult<Decision> {
        let bucket = self.key(&FixedWindow::bucket_key(key, now_ms, policy.window_seconds));

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| RateLimitError::store(e.to_string()))?;

        let count: u64 = self
            .fixed_script
            .key(&bucket)
            .arg(policy.window_seconds)
            .invoke_async(&mut *conn)
            .await?;

        trace!(key = %key, count = count, "Redis fixed window check");
        Ok(FixedWindow::decide(count, policy, now_ms))
    }

    async fn sliding_window(
        &self,
        key: &str,
        policy: &RoutePolicy,
        now_ms: u64,
    ) -> RateLimitResult<Decision> {
        let log_key = self.key(key);
        // Unique member per request so equal timestamps are all counted
        let member = format!("{}-{}", now_ms, Uuid::new_v4());

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| RateLimitError::store(e.to_string()))?;

        let reply: Vec<i64> = self
            .sliding_script
            .key(&log_key)
            .arg(now_ms)
            .arg(policy.window_seconds.saturating_mul(1_000))
            .arg(policy.max_requests)
            .arg(member)
            .arg(policy.window_seconds)
            .invoke_async(&mut *conn)
            .await?;

        trace!(key = %key, reply = ?reply, "Redis sliding window check");
        decide_from_reply(&reply, now_ms, policy)
    }

    async fn reset(&self, key: &str) -> RateLimitResult<()> {
        debug!(key = %key, "Resetting rate limit state in Redis");

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| RateLimitError::store(e.to_string()))?;

        // Sliding log lives at the bare key, fixed buckets at `{key}:{window_start}`
        let full_key = self.key(key);
        let mut doomed = vec![full_key.clone()];
        let pattern = format!("{}:*", escape_glob(&full_key));
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut *conn)
                .await?;
            doomed.extend(
                batch
                    .into_iter()
                    .filter(|candidate| FixedWindow::is_bucket_of(candidate, &full_key)),
            );
            if next == 0 {
                break;
            }
            cursor = next;
        }

        let _: () = redis::cmd("DEL")
            .arg(&doomed)
            .query_async(&mut *conn)
            .await?;

        Ok(())
    }

    async fn health_check(&self) -> RateLimitResult<()> {
        authguard_redis::ping(&self.pool).await?;
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .finish()
    }
}
