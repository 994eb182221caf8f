use async_trait::async_trait;

use super::{SessionStore, StoreResult};
use crate::cache::RedisPool;

const KEY_PREFIX: &str = "session:";

/// Session store backed by Redis
///
/// Every write refreshes the key TTL, so a session nobody touches is
/// dropped by Redis once `ttl_seconds` have passed since its last write.
#[derive(Clone)]
pub struct RedisStore {
    pool: RedisPool,
    ttl_seconds: u64,
}

impl RedisStore {
    /// Create a store on top of an existing pool
    pub fn new(pool: RedisPool, ttl_seconds: u64) -> Self {
        Self { pool, ttl_seconds }
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> StoreResult<bool> {
        Ok(self.pool.health_check().await?)
    }

    fn redis_key(key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.pool.get(&Self::redis_key(key)).await?)
    }

    async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.pool
            .set(&Self::redis_key(key), value, Some(self.ttl_seconds))
            .await?;
        Ok(())
    }
}
