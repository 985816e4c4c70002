//! Cache backend settings and their validation

use std::time::Duration;

use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::domain::CacheError;
use crate::infrastructure::cache::CacheType;

/// Connection and namespacing settings for the cache backend
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_pool_bounds"))]
pub struct CacheSettings {
    #[serde(default)]
    pub backend: CacheType,
    #[validate(custom(function = "validate_addr"))]
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default)]
    pub password: Option<String>,
    #[validate(range(min = 0, max = 15))]
    #[serde(default)]
    pub db: i64,
    #[serde(default)]
    pub key_prefix: Option<String>,
    #[validate(range(min = 1))]
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,
    #[validate(range(min = 1))]
    #[serde(default = "default_io_timeout_ms")]
    pub read_timeout_ms: u64,
    #[validate(range(min = 1))]
    #[serde(default = "default_io_timeout_ms")]
    pub write_timeout_ms: u64,
    #[validate(range(min = 1))]
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_min_idle_conns")]
    pub min_idle_conns: usize,
    #[validate(range(min = 1))]
    #[serde(default = "default_pool_timeout_ms")]
    pub pool_timeout_ms: u64,
    #[validate(length(min = 1))]
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[validate(range(min = 1))]
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

fn default_addr() -> String {
    "127.0.0.1:6379".to_string()
}

fn default_dial_timeout_ms() -> u64 {
    5_000
}

fn default_io_timeout_ms() -> u64 {
    3_000
}

fn default_pool_size() -> usize {
    10
}

fn default_min_idle_conns() -> usize {
    1
}

fn default_pool_timeout_ms() -> u64 {
    4_000
}

fn default_service_name() -> String {
    "tagged-cache".to_string()
}

fn default_max_capacity() -> u64 {
    10_000
}

fn validate_addr(addr: &str) -> Result<(), ValidationError> {
    let valid = addr
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());

    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("addr").with_message("expected host:port".into()))
    }
}

fn validate_pool_bounds(settings: &CacheSettings) -> Result<(), ValidationError> {
    if settings.min_idle_conns > settings.pool_size {
        return Err(ValidationError::new("min_idle_conns")
            .with_message("min_idle_conns must not exceed pool_size".into()));
    }
    Ok(())
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheType::default(),
            addr: default_addr(),
            password: None,
            db: 0,
            key_prefix: None,
            dial_timeout_ms: default_dial_timeout_ms(),
            read_timeout_ms: default_io_timeout_ms(),
            write_timeout_ms: default_io_timeout_ms(),
            pool_size: default_pool_size(),
            min_idle_conns: default_min_idle_conns(),
            pool_timeout_ms: default_pool_timeout_ms(),
            service_name: default_service_name(),
            max_capacity: default_max_capacity(),
        }
    }
}

impl CacheSettings {
    /// Settings for the in-process backend
    pub fn in_memory() -> Self {
        Self {
            backend: CacheType::InMemory,
            ..Default::default()
        }
    }

    /// Settings for a Redis backend at the given `host:port`
    pub fn redis(addr: impl Into<String>) -> Self {
        Self {
            backend: CacheType::Redis,
            addr: addr.into(),
            ..Default::default()
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn pool_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_timeout_ms)
    }

    /// Validates the settings, mapping failures to `CacheError::Validation`
    pub fn validate_settings(&self) -> Result<(), CacheError> {
        self.validate()
            .map_err(|e| CacheError::validation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = CacheSettings::default();

        assert_eq!(settings.backend, CacheType::Redis);
        assert_eq!(settings.pool_size, 10);
        assert_eq!(settings.dial_timeout(), Duration::from_secs(5));
        assert!(settings.validate_settings().is_ok());
    }

    #[test]
    fn test_missing_port_is_rejected() {
        let settings = CacheSettings::redis("localhost");
        let err = settings.validate_settings().unwrap_err();

        assert!(matches!(err, CacheError::Validation { .. }));
    }

    #[test]
    fn test_zero_pool_size_is_rejected() {
        let settings = CacheSettings {
            min_idle_conns: 0,
            ..CacheSettings::default().with_pool_size(0)
        };

        assert!(settings.validate_settings().is_err());
    }

    #[test]
    fn test_min_idle_above_pool_size_is_rejected() {
        let settings = CacheSettings {
            min_idle_conns: 5,
            ..CacheSettings::default().with_pool_size(2)
        };

        let err = settings.validate_settings().unwrap_err();
        assert!(err.to_string().contains("min_idle_conns"));
    }

    #[test]
    fn test_db_out_of_range_is_rejected() {
        let settings = CacheSettings {
            db: 16,
            ..Default::default()
        };

        assert!(settings.validate_settings().is_err());
    }

    #[test]
    fn test_negative_db_is_rejected() {
        let settings = CacheSettings {
            db: -1,
            ..Default::default()
        };

        assert!(matches!(
            settings.validate_settings(),
            Err(CacheError::Validation { .. })
        ));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let settings: CacheSettings =
            serde_json::from_str(r#"{"addr": "cache:6380", "key_prefix": "svc", "db": 2}"#)
                .unwrap();

        assert_eq!(settings.addr, "cache:6380");
        assert_eq!(settings.key_prefix.as_deref(), Some("svc"));
        assert_eq!(settings.db, 2);
        assert_eq!(settings.min_idle_conns, 1);
        assert_eq!(settings.service_name, "tagged-cache");
    }
}
