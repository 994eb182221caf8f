//! Redis connection module
//!
//! This module provides the Redis client used by the Redis session store,
//! with binary get/set operations and TTL support.

use redis::{AsyncCommands, Client, RedisResult};
use tracing::info;

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
        }
    }
}

/// Redis client handle
///
/// Every call acquires a multiplexed connection, so the pool is cheap to
/// clone and share between request tasks.
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// Open a Redis client for the configured URL
    ///
    /// No connection is made until the first command.
    pub fn new(config: &RedisConfig) -> RedisResult<Self> {
        let client = Client::open(config.url.as_str())?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisPool { client })
    }

    async fn get_connection(&self) -> RedisResult<redis::aio::MultiplexedConnection> {
        self.client.get_multiplexed_async_connection().await
    }

    /// Store a binary value with an optional TTL
    pub async fn set(&self, key: &str, value: &[u8], ttl_seconds: Option<u64>) -> RedisResult<()> {
        let mut conn = self.get_connection().await?;

        match ttl_seconds {
            Some(ttl) if ttl > 0 => conn.set_ex(key, value, ttl).await,
            _ => conn.set(key, value).await,
        }
    }

    /// Fetch a binary value by key
    pub async fn get(&self, key: &str) -> RedisResult<Option<Vec<u8>>> {
        let mut conn = self.get_connection().await?;
        conn.get(key).await
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> RedisResult<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_is_rejected() {
        let config = RedisConfig {
            url: "not-a-redis-url".to_string(),
        };
        assert!(RedisPool::new(&config).is_err());
    }

    #[tokio::test]
    #[ignore = "requires a Redis server on localhost:6379"]
    async fn test_set_get_with_ttl() -> RedisResult<()> {
        let pool = RedisPool::new(&RedisConfig::default())?;
        assert!(pool.health_check().await?);

        let key = "test_key";
        pool.set(key, b"test_value", Some(5)).await?;
        assert_eq!(pool.get(key).await?, Some(b"test_value".to_vec()));

        pool.set(key, b"kept", None).await?;
        assert_eq!(pool.get(key).await?, Some(b"kept".to_vec()));

        Ok(())
    }
}
