//! In-memory store adapter using moka

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache as MokaCache;
use regex::Regex;

use crate::domain::cache::{CacheStore, StoreError};

/// Configuration for the in-memory store
#[derive(Debug, Clone)]
pub struct InMemoryStoreConfig {
    /// Maximum number of entries
    pub max_capacity: u64,
}

impl Default for InMemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
        }
    }
}

impl InMemoryStoreConfig {
    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }
}

/// `ttl` and `expires_at` are `None` for entries stored without expiry
#[derive(Debug, Clone)]
struct StoredValue {
    data: Vec<u8>,
    ttl: Option<Duration>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        let ttl = (!ttl.is_zero()).then_some(ttl);

        Self {
            data,
            ttl,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() >= expires_at)
    }
}

struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Thread-safe in-process store
///
/// Honors per-entry TTLs and glob listing with the same `*`, `?` and
/// `[...]` wildcards Redis understands.
#[derive(Debug)]
pub struct InMemoryStore {
    cache: MokaCache<String, StoredValue>,
    config: InMemoryStoreConfig,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_config(InMemoryStoreConfig::default())
    }

    pub fn with_config(config: InMemoryStoreConfig) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self { cache, config }
    }

    pub fn config(&self) -> &InMemoryStoreConfig {
        &self.config
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        self.cache.run_pending_tasks().await;
        self.cache.iter().filter(|(_, v)| !v.is_expired()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn live(&self, key: &str) -> Option<StoredValue> {
        let entry = self.cache.get(key).await?;

        if entry.is_expired() {
            self.cache.invalidate(key).await;
            return None;
        }

        Some(entry)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Translates a Redis-style glob into an anchored regex
fn glob_to_regex(pattern: &str) -> Result<Regex, StoreError> {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '[' if !chars.clone().any(|c| c == ']') => regex.push_str(r"\["),
            '[' => {
                regex.push('[');
                if chars.peek() == Some(&'^') {
                    chars.next();
                    regex.push('^');
                }
                for class_char in chars.by_ref() {
                    if class_char == ']' {
                        break;
                    }
                    if class_char == '\\' || class_char == '[' {
                        regex.push('\\');
                    }
                    regex.push(class_char);
                }
                regex.push(']');
            }
            '\\' => {
                if let Some(escaped) = chars.next() {
                    regex.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }

    regex.push('$');
    Regex::new(&regex).map_err(|e| StoreError::backend(format!("Invalid pattern: {}", e)))
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.live(key).await.map(|entry| entry.data))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        self.cache
            .insert(key.to_string(), StoredValue::new(value.to_vec(), ttl))
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StoreError> {
        for key in keys {
            self.cache.invalidate(key).await;
        }
        Ok(())
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let regex = glob_to_regex(pattern)?;

        self.cache.run_pending_tasks().await;

        let mut keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, value)| !value.is_expired() && regex.is_match(key))
            .map(|(key, _)| key.as_ref().clone())
            .collect();

        keys.sort_unstable();
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.live(key).await.is_some())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
