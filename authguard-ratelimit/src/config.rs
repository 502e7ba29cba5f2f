//! Rate limiter configuration and builder

use crate::RateLimiter;
use crate::algorithms::RoutePolicy;
use crate::clock::{Clock, SystemClock};
use crate::error::{RateLimitError, RateLimitResult};
use crate::key::validate_scope;
use crate::stores::{MemoryStore, RateLimitStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// What to do when the shared store cannot be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Allow the request and log a warning
    #[default]
    FailOpen,
    /// Reject the request with a transient error
    FailClosed,
}

impl FromStr for FailurePolicy {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" | "fail_open" | "fail-open" => Ok(Self::FailOpen),
            "closed" | "fail_closed" | "fail-closed" => Ok(Self::FailClosed),
            other => Err(RateLimitError::config(format!(
                "unknown failure policy '{}', expected 'open' or 'closed'",
                other
            ))),
        }
    }
}

/// Store type for rate limiting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StoreType {
    /// In-memory store (single instance only)
    #[default]
    Memory,
    /// Redis store (distributed)
    Redis,
    /// Caller-supplied store
    Custom,
}

/// Configuration for the rate limiter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Key prefix for shared storage
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Behaviour when the store is unavailable
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Upper bound on one store round-trip
    #[serde(with = "millis_serde", default = "default_store_timeout")]
    pub store_timeout: Duration,
    /// Scope used when a call site does not name one
    #[serde(default = "default_scope")]
    pub default_scope: String,
    /// Per-operation limits, keyed by scope
    #[serde(default)]
    pub policies: HashMap<String, RoutePolicy>,
}

fn default_key_prefix() -> String {
    "ratelimit".to_string()
}

fn default_store_timeout() -> Duration {
    Duration::from_millis(250)
}

fn default_scope() -> String {
    "default".to_string()
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            failure_policy: FailurePolicy::default(),
            store_timeout: default_store_timeout(),
            default_scope: default_scope(),
            policies: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Create a new configuration builder
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::new()
    }

    /// Defaults overridden by `RATELIMIT_*` environment variables
    pub fn from_env() -> RateLimitResult<Self> {
        let mut config = Self::default();

        if let Ok(policy) = std::env::var("RATELIMIT_FAILURE_POLICY") {
            config.failure_policy = policy.parse()?;
        }

        if let Ok(timeout) = std::env::var("RATELIMIT_STORE_TIMEOUT_MS") {
            let millis: u64 = timeout.parse().map_err(|_| {
                RateLimitError::config(format!(
                    "RATELIMIT_STORE_TIMEOUT_MS must be an integer, got '{}'",
                    timeout
                ))
            })?;
            config.store_timeout = Duration::from_millis(millis);
        }

        if let Ok(prefix) = std::env::var("RATELIMIT_KEY_PREFIX") {
            config.key_prefix = prefix;
        }

        config.validate()?;
        Ok(config)
    }

    /// Look up the policy configured for a scope
    pub fn policy(&self, scope: &str) -> Option<&RoutePolicy> {
        self.policies.get(scope)
    }

    /// Validate timeouts, scope and every route policy
    pub fn validate(&self) -> RateLimitResult<()> {
        if self.store_timeout.is_zero() {
            return Err(RateLimitError::config("store_timeout must be non-zero"));
        }
        validate_scope(&self.default_scope)
            .map_err(|e| RateLimitError::config(format!("default_scope: {}", e)))?;
        for (scope, policy) in &self.policies {
            validate_scope(scope)
                .and_then(|_| policy.validate())
                .map_err(|e| RateLimitError::config(format!("policy '{}': {}", scope, e)))?;
        }
        Ok(())
    }
}

/// Builder for creating a RateLimiter
pub struct RateLimiterBuilder {
    config: RateLimitConfig,
    store_type: StoreType,
    store: Option<Arc<dyn RateLimitStore>>,
    clock: Option<Arc<dyn Clock>>,
    #[cfg(feature = "redis")]
    redis_pool: Option<authguard_redis::RedisPool>,
    #[cfg(feature = "redis")]
    redis_config: Option<authguard_redis::RedisConfig>,
}

impl RateLimiterBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: RateLimitConfig::default(),
            store_type: StoreType::Memory,
            store: None,
            clock: None,
            #[cfg(feature = "redis")]
            redis_pool: None,
            #[cfg(feature = "redis")]
            redis_config: None,
        }
    }

    /// Start from an existing configuration
    pub fn config(mut self, config: RateLimitConfig) -> Self {
        self.config = config;
        self
    }

    /// Use in-memory store (default)
    pub fn memory_store(mut self) -> Self {
        self.store_type = StoreType::Memory;
        self
    }

    /// Use a caller-supplied store
    pub fn store(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.store_type = StoreType::Custom;
        self.store = Some(store);
        self
    }

    /// Use Redis over an existing connection pool
    #[cfg(feature = "redis")]
    pub fn redis_store(mut self, pool: authguard_redis::RedisPool) -> Self {
        self.store_type = StoreType::Redis;
        self.redis_pool = Some(pool);
        self
    }

    /// Use Redis, connecting a new pool at build time
    #[cfg(feature = "redis")]
    pub fn redis_config(mut self, config: authguard_redis::RedisConfig) -> Self {
        self.store_type = StoreType::Redis;
        self.redis_config = Some(config);
        self
    }

    /// Use a specific clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the key prefix for shared storage
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    /// Set the store failure policy
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    /// Bound each store round-trip
    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.config.store_timeout = timeout;
        self
    }

    /// Set the scope used when a call site does not name one
    pub fn default_scope(mut self, scope: impl Into<String>) -> Self {
        self.config.default_scope = scope.into();
        self
    }

    /// Register the policy for a scope
    pub fn policy(mut self, scope: impl Into<String>, policy: RoutePolicy) -> Self {
        self.config.policies.insert(scope.into(), policy);
        self
    }

    /// Build the rate limiter
    pub async fn build(self) -> RateLimitResult<RateLimiter> {
        self.config.validate()?;

        debug!(
            store_type = ?self.store_type,
            failure_policy = ?self.config.failure_policy,
            policies = self.config.policies.len(),
            "Building rate limiter"
        );

        let store: Arc<dyn RateLimitStore> = match self.store_type {
            StoreType::Memory => Arc::new(MemoryStore::new()),
            StoreType::Custom => self
                .store
                .ok_or_else(|| RateLimitError::config("Custom store must be supplied"))?,
            #[cfg(feature = "redis")]
            StoreType::Redis => {
                let pool = match (self.redis_pool, self.redis_config) {
                    (Some(pool), _) => pool,
                    (None, Some(config)) => authguard_redis::connect(config).await?,
                    (None, None) => {
                        return Err(RateLimitError::config(
                            "Redis pool or configuration must be specified for Redis store",
                        ));
                    }
                };
                Arc::new(crate::stores::RedisStore::with_prefix(
                    pool,
                    self.config.key_prefix.clone(),
                ))
            }
            #[cfg(not(feature = "redis"))]
            StoreType::Redis => {
                return Err(RateLimitError::config(
                    "Redis feature is not enabled. Add `redis` feature to use Redis store.",
                ));
            }
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));

        Ok(RateLimiter::new(store, clock, self.config))
    }
}

impl Default for RateLimiterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

mod millis_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.failure_policy, FailurePolicy::FailOpen);
        assert_eq!(config.key_prefix, "ratelimit");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_failure_policy_parse() {
        assert_eq!("open".parse::<FailurePolicy>().unwrap(), FailurePolicy::FailOpen);
        assert_eq!(
            "Fail-Closed".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::FailClosed
        );
        assert!("sometimes".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn test_deserialize_config() {
        let config: RateLimitConfig = serde_json::from_str(
            r#"{
                "failure_policy": "fail_closed",
                "store_timeout": 100,
                "policies": {
                    "SignUpService.InitiateSignUp": {"algorithm": "fixed", "window_seconds": 3600, "max_requests": 3},
                    "SignInService.SignIn": {"algorithm": "sliding", "window_seconds": 60, "max_requests": 5}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.failure_policy, FailurePolicy::FailClosed);
        assert_eq!(config.store_timeout, Duration::from_millis(100));
        assert_eq!(
            config.policy("SignInService.SignIn"),
            Some(&RoutePolicy::sliding(60, 5))
        );
        assert_eq!(config.default_scope, "default");
    }

    #[test]
    fn test_invalid_route_policy_rejected() {
        let config = RateLimitConfig {
            policies: HashMap::from([("SignIn".to_string(), RoutePolicy::fixed(60, 0))]),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RateLimitError::Config(_))));
    }

    #[test]
    fn test_scope_with_separator_rejected() {
        let config = RateLimitConfig {
            policies: HashMap::from([("Sign:In".to_string(), RoutePolicy::fixed(60, 5))]),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RateLimitError::Config(_))));

        let config = RateLimitConfig {
            default_scope: "a:b".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RateLimitError::Config(_))));
    }

    #[tokio::test]
    async fn test_builder_memory_store() {
        let limiter = RateLimiterBuilder::new()
            .failure_policy(FailurePolicy::FailClosed)
            .policy("ResendCode", RoutePolicy::fixed(3600, 3))
            .build()
            .await
            .unwrap();

        assert_eq!(limiter.store_type(), "memory");
        assert_eq!(limiter.config().failure_policy, FailurePolicy::FailClosed);
    }

    #[tokio::test]
    async fn test_builder_rejects_zero_timeout() {
        let result = RateLimiterBuilder::new()
            .store_timeout(Duration::ZERO)
            .build()
            .await;
        assert!(result.is_err());
    }

    #[cfg(not(feature = "redis"))]
    #[tokio::test]
    async fn test_builder_redis_without_feature() {
        let mut builder = RateLimiterBuilder::new();
        builder.store_type = StoreType::Redis;
        assert!(matches!(builder.build().await, Err(RateLimitError::Config(_))));
    }
}
