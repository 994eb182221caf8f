//! Session store contract and backends
//!
//! A session store persists opaque session blobs under a session key. It has
//! no knowledge of what the blob means: expiry policy, renewal and
//! revocation all live in the session manager.
//!
//! Three backends are provided:
//! - [`MemoryStore`]: process-local map, for tests and single-node demos
//! - [`FilesystemStore`]: one file per session in a directory
//! - [`RedisStore`]: Redis keys with a TTL, so stale sessions are collected
//!   by Redis itself

mod filesystem;
mod memory;
mod redis_store;

use async_trait::async_trait;

pub use crate::error::{StoreError, StoreResult};
pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Key-value persistence for serialized session records
///
/// Implementations must be safe to share between concurrent requests.
/// A key with no stored value yields `Ok(None)`; `Err` is reserved for
/// backend failures.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the raw record stored under `key`
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()>;
}
