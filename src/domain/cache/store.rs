//! Store adapter trait definition

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Failure talking to the backing key-value store
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("{0}")]
    Backend(String),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection pool exhausted after waiting {0:?}")]
    PoolExhausted(Duration),
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// Capability interface over a remote key-value backend
///
/// Keys are fully-qualified; namespacing happens above this layer.
/// A missing key is `Ok(None)` from `get`, never an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    /// Gets the raw bytes stored under a key
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores raw bytes under a key with a TTL
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;

    /// Deletes a single key
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Deletes a batch of keys; succeeds without I/O on empty input
    async fn delete_many(&self, keys: &[String]) -> Result<(), StoreError>;

    /// Lists keys matching a glob pattern
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Checks if a key exists
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Round-trips the backend to verify connectivity
    async fn ping(&self) -> Result<(), StoreError>;
}
