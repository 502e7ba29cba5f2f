//! # Authguard Redis
//!
//! Pooled Redis connections for the authguard rate-limiting engine.
//!
//! The engine never opens a connection per check: a [`RedisPool`] is built
//! once at startup and injected into the Redis-backed store.
//!
//! ```rust,ignore
//! use authguard_redis::{RedisConfig, connect};
//!
//! # async fn example() -> authguard_redis::Result<()> {
//! let config = RedisConfig::from_env().pool_size(32).build();
//! let pool = connect(config).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod pool;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use error::{RedisError, Result};
pub use pool::{RedisPool, RedisPoolBuilder, connect, ping};

// Re-export redis crate for convenience
pub use redis;
