//! Redis connection pool.

use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use tracing::info;

use crate::{RedisConfig, RedisError, Result};

/// Type alias for the connection pool.
pub type RedisPool = Pool<RedisConnectionManager>;

/// Builder for creating Redis connection pools.
pub struct RedisPoolBuilder {
    config: RedisConfig,
}

impl RedisPoolBuilder {
    /// Create a new pool builder.
    pub fn new(config: RedisConfig) -> Self {
        Self { config }
    }

    /// Build the connection pool and verify it with a `PING`.
    pub async fn build(self) -> Result<RedisPool> {
        if self.config.pool_size == 0 {
            return Err(RedisError::Config("pool_size must be greater than 0".into()));
        }

        let manager = RedisConnectionManager::new(self.config.connection_url())
            .map_err(|e| RedisError::Connection(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(self.config.pool_size)
            .min_idle(self.config.min_idle)
            .connection_timeout(self.config.connection_timeout)
            .build(manager)
            .await
            .map_err(|e| RedisError::Pool(e.to_string()))?;

        ping(&pool).await?;

        info!(
            pool_size = self.config.pool_size,
            url = %self.config.redacted_url(),
            "Redis connection pool created"
        );

        Ok(pool)
    }
}

/// Build a pool from configuration.
pub async fn connect(config: RedisConfig) -> Result<RedisPool> {
    RedisPoolBuilder::new(config).build().await
}

/// Round-trip a `PING` through a pooled connection.
pub async fn ping(pool: &RedisPool) -> Result<()> {
    let mut conn = pool.get().await?;
    let _: String = redis::cmd("PING")
        .query_async(&mut *conn)
        .await
        .map_err(|e| RedisError::Connection(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_pool_size_rejected() {
        let config = RedisConfig::builder().pool_size(0).build();
        let result = RedisPoolBuilder::new(config).build().await;
        assert!(matches!(result, Err(RedisError::Config(_))));
    }

    #[tokio::test]
    #[ignore = "Requires running Redis instance"]
    async fn test_connect_and_ping() {
        let pool = connect(RedisConfig::new("redis://localhost:6379"))
            .await
            .unwrap();
        ping(&pool).await.unwrap();
    }
}
