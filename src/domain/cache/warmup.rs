//! Bulk pre-population entries

use std::time::Duration;

use serde::Deserialize;

/// One entry for bulk cache pre-population
#[derive(Debug, Clone, Deserialize)]
pub struct WarmupKey<V> {
    pub key: String,
    pub value: V,
    #[serde(rename = "ttl_secs", with = "ttl_secs")]
    pub ttl: Duration,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl<V> WarmupKey<V> {
    pub fn new(key: impl Into<String>, value: V, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            value,
            ttl,
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

mod ttl_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
