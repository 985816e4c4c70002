//! Tagged cache
//!
//! A caching facade over a remote key-value store with:
//! - Prefix namespacing of keys
//! - Tag-based group invalidation
//! - Hit/miss/error metrics per instance and per service
//! - Cancellation and deadlines on every call

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{AppConfig, CacheSettings};
pub use domain::{
    Cache, CacheError, CacheExt, CacheMetrics, CacheValue, KeyNamespacer, MetricsSnapshot,
    OpContext, WarmupKey,
};
pub use infrastructure::cache::{CacheFactory, CacheType, InMemoryStore, RedisStore, TaggedCache};
