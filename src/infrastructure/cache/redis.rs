//! Redis store adapter

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client, IntoConnectionInfo, RedisResult};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info};

use crate::config::CacheSettings;
use crate::domain::cache::{CacheStore, StoreError};
use crate::domain::CacheError;

const SCAN_BATCH: usize = 100;

/// Configuration for the Redis adapter
#[derive(Clone)]
pub struct RedisStoreConfig {
    /// `host:port` of the Redis server
    pub addr: String,
    pub password: Option<String>,
    pub db: i64,
    /// Connect timeout, also bounds the startup PING
    pub dial_timeout: Duration,
    /// Bound on GET, EXISTS and SCAN round-trips
    pub read_timeout: Duration,
    /// Bound on SET and DEL round-trips
    pub write_timeout: Duration,
    /// Maximum concurrent in-flight commands
    pub pool_size: usize,
    /// Connections opened eagerly at startup
    pub min_idle_conns: usize,
    /// How long a command waits for a free pool slot
    pub pool_timeout: Duration,
}

impl fmt::Debug for RedisStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStoreConfig")
            .field("addr", &self.addr)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("db", &self.db)
            .field("dial_timeout", &self.dial_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("pool_size", &self.pool_size)
            .field("min_idle_conns", &self.min_idle_conns)
            .field("pool_timeout", &self.pool_timeout)
            .finish()
    }
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self::from_settings(&CacheSettings::default())
    }
}

impl RedisStoreConfig {
    /// Creates a configuration for the given `host:port`
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self {
            addr: settings.addr.clone(),
            password: settings.password.clone(),
            db: settings.db,
            dial_timeout: settings.dial_timeout(),
            read_timeout: settings.read_timeout(),
            write_timeout: settings.write_timeout(),
            pool_size: settings.pool_size,
            min_idle_conns: settings.min_idle_conns,
            pool_timeout: settings.pool_timeout(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    fn connection_info(&self) -> Result<redis::ConnectionInfo, CacheError> {
        let mut info = format!("redis://{}/{}", self.addr, self.db)
            .into_connection_info()
            .map_err(|e| CacheError::validation(format!("Invalid Redis address: {}", e)))?;

        if let Some(password) = &self.password {
            info.redis.password = Some(password.clone());
        }

        Ok(info)
    }
}

/// Redis-backed store
///
/// Keeps `max(min_idle_conns, 1)` multiplexed connections open and limits
/// in-flight commands to `pool_size`; callers beyond that wait up to
/// `pool_timeout` for a slot.
pub struct RedisStore {
    connections: Vec<ConnectionManager>,
    next: AtomicUsize,
    slots: Semaphore,
    config: RedisStoreConfig,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("config", &self.config)
            .field("connections", &self.connections.len())
            .field("available_slots", &self.slots.available_permits())
            .finish()
    }
}

impl RedisStore {
    /// Connects to Redis and verifies the server answers PING
    pub async fn connect(config: RedisStoreConfig) -> Result<Self, CacheError> {
        if config.pool_size == 0 {
            return Err(CacheError::validation("pool_size must be at least 1"));
        }

        let client = Client::open(config.connection_info()?)
            .map_err(|e| CacheError::connection(format!("Failed to create Redis client: {}", e)))?;

        let manager_config = || {
            ConnectionManagerConfig::new()
                .set_connection_timeout(config.dial_timeout)
                .set_response_timeout(config.read_timeout.max(config.write_timeout))
        };

        let connection_count = config.min_idle_conns.max(1);
        let connections = try_join_all((0..connection_count).map(|_| {
            let connect = ConnectionManager::new_with_config(client.clone(), manager_config());
            let (addr, dial_timeout) = (&config.addr, config.dial_timeout);
            async move {
                tokio::time::timeout(dial_timeout, connect)
                    .await
                    .map_err(|_| {
                        CacheError::connection(format!(
                            "Timed out connecting to Redis at {} after {:?}",
                            addr, dial_timeout
                        ))
                    })?
                    .map_err(|e| CacheError::connection(format!("Failed to connect to Redis: {}", e)))
            }
        }))
        .await?;

        let store = Self {
            connections,
            next: AtomicUsize::new(0),
            slots: Semaphore::new(config.pool_size),
            config,
        };

        store.probe().await?;

        info!(
            addr = %store.config.addr,
            db = store.config.db,
            connections = store.connections.len(),
            pool_size = store.config.pool_size,
            "Connected to Redis"
        );

        Ok(store)
    }

    async fn probe(&self) -> Result<(), CacheError> {
        let (_slot, mut conn) = self
            .acquire()
            .await
            .map_err(|e| CacheError::connection(e.to_string()))?;

        let cmd = redis::cmd("PING");
        let ping = cmd.query_async::<String>(&mut conn);

        match tokio::time::timeout(self.config.dial_timeout, ping).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(CacheError::connection(format!("Redis PING failed: {}", e))),
            Err(_) => Err(CacheError::connection(format!(
                "Redis PING timed out after {:?}",
                self.config.dial_timeout
            ))),
        }
    }

    pub fn config(&self) -> &RedisStoreConfig {
        &self.config
    }

    async fn acquire(&self) -> Result<(SemaphorePermit<'_>, ConnectionManager), StoreError> {
        let slot = tokio::time::timeout(self.config.pool_timeout, self.slots.acquire())
            .await
            .map_err(|_| StoreError::PoolExhausted(self.config.pool_timeout))?
            .map_err(|_| StoreError::backend("connection pool closed"))?;

        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();

        Ok((slot, self.connections[index].clone()))
    }

    async fn bounded<T>(
        timeout: Duration,
        command: impl Future<Output = RedisResult<T>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(timeout, command)
            .await
            .map_err(|_| StoreError::Timeout(timeout))?
            .map_err(|e| StoreError::backend(e.to_string()))
    }

    /// `None` for a zero TTL, which stores without expiry
    fn ttl_millis(ttl: Duration) -> Option<u64> {
        if ttl.is_zero() {
            return None;
        }
        Some(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1))
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let (_slot, mut conn) = self.acquire().await?;
        Self::bounded(self.config.read_timeout, conn.get(key)).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let (_slot, mut conn) = self.acquire().await?;
        match Self::ttl_millis(ttl) {
            Some(millis) => {
                Self::bounded(
                    self.config.write_timeout,
                    conn.pset_ex::<_, _, ()>(key, value, millis),
                )
                .await
            }
            None => Self::bounded(self.config.write_timeout, conn.set::<_, _, ()>(key, value)).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let (_slot, mut conn) = self.acquire().await?;
        Self::bounded(self.config.write_timeout, conn.del::<_, ()>(key)).await
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }

        let (_slot, mut conn) = self.acquire().await?;
        Self::bounded(self.config.write_timeout, conn.del::<_, ()>(keys)).await
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let (_slot, mut conn) = self.acquire().await?;

        // SCAN instead of KEYS so large keyspaces don't block the server
        let mut cursor = 0u64;
        let mut matched = Vec::new();

        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH);

            let (next_cursor, keys) = Self::bounded(
                self.config.read_timeout,
                cmd.query_async::<(u64, Vec<String>)>(&mut conn),
            )
            .await?;
            matched.extend(keys);
            cursor = next_cursor;

            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once
        matched.sort_unstable();
        matched.dedup();

        debug!(pattern, count = matched.len(), "Scanned Redis keys");
        Ok(matched)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let (_slot, mut conn) = self.acquire().await?;
        Self::bounded(self.config.read_timeout, conn.exists(key)).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let (_slot, mut conn) = self.acquire().await?;
        Self::bounded(
            self.config.read_timeout,
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map(|_| ())
    }
}
