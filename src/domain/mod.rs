//! Domain layer - Cache contract and error taxonomy

pub mod cache;
pub mod error;

pub use cache::{
    Cache, CacheExt, CacheKeyBuilder, CacheMetrics, CacheStore, CacheValue, KeyNamespacer,
    MetricsSnapshot, OpContext, StoreError, TagIndex, WarmupKey,
};
pub use error::CacheError;
