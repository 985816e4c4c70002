//! Store factory for runtime backend selection

use std::sync::Arc;

use serde::Deserialize;

use crate::config::CacheSettings;
use crate::domain::cache::CacheStore;
use crate::domain::CacheError;

use super::in_memory::{InMemoryStore, InMemoryStoreConfig};
use super::redis::{RedisStore, RedisStoreConfig};

/// Supported store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    /// In-process store using moka
    InMemory,
    /// Redis store
    #[default]
    Redis,
}

impl std::fmt::Display for CacheType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheType::InMemory => write!(f, "in_memory"),
            CacheType::Redis => write!(f, "redis"),
        }
    }
}

impl std::str::FromStr for CacheType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(CacheType::InMemory),
            "redis" => Ok(CacheType::Redis),
            _ => Err(CacheError::validation(format!(
                "Unknown cache type: {}. Valid types: in_memory, redis",
                s
            ))),
        }
    }
}

/// Factory for creating store instances
#[derive(Debug, Default)]
pub struct CacheFactory;

impl CacheFactory {
    pub fn new() -> Self {
        Self
    }

    /// Validates the settings and builds the configured store
    ///
    /// Redis stores are probed before returning, so an unreachable
    /// server fails here rather than on first use.
    pub async fn create(&self, settings: &CacheSettings) -> Result<Arc<dyn CacheStore>, CacheError> {
        settings.validate_settings()?;

        match settings.backend {
            CacheType::InMemory => Ok(self.create_in_memory(
                InMemoryStoreConfig::default().with_max_capacity(settings.max_capacity),
            )),
            CacheType::Redis => {
                let store = RedisStore::connect(RedisStoreConfig::from_settings(settings)).await?;
                Ok(Arc::new(store))
            }
        }
    }

    pub fn create_in_memory(&self, config: InMemoryStoreConfig) -> Arc<dyn CacheStore> {
        Arc::new(InMemoryStore::with_config(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cache_type_from_str() {
        assert_eq!("in_memory".parse::<CacheType>().unwrap(), CacheType::InMemory);
        assert_eq!("inmemory".parse::<CacheType>().unwrap(), CacheType::InMemory);
        assert_eq!("memory".parse::<CacheType>().unwrap(), CacheType::InMemory);
        assert_eq!("redis".parse::<CacheType>().unwrap(), CacheType::Redis);
        assert_eq!("REDIS".parse::<CacheType>().unwrap(), CacheType::Redis);
    }

    #[test]
    fn test_cache_type_from_str_invalid() {
        let result = "memcached".parse::<CacheType>();
        assert!(matches!(result, Err(CacheError::Validation { .. })));
    }

    #[test]
    fn test_cache_type_display() {
        assert_eq!(CacheType::InMemory.to_string(), "in_memory");
        assert_eq!(CacheType::Redis.to_string(), "redis");
    }

    #[tokio::test]
    async fn test_factory_create_in_memory() {
        let factory = CacheFactory::new();
        let store = factory.create(&CacheSettings::in_memory()).await.unwrap();

        store.set("test", b"1", Duration::from_secs(60)).await.unwrap();
        assert!(store.exists("test").await.unwrap());
    }

    #[tokio::test]
    async fn test_factory_rejects_invalid_settings_before_connecting() {
        let factory = CacheFactory::new();
        let settings = CacheSettings::redis("no-port-here");

        let result = factory.create(&settings).await;
        assert!(matches!(result, Err(CacheError::Validation { .. })));
    }
}
