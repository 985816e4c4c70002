//! Cache domain - contract, keys, tags, metrics, store capability and call context

mod codec;
mod context;
mod facade;
mod key;
mod metrics;
mod store;
mod tag_index;
mod warmup;

pub use codec::{decode, encode, CacheValue};
pub use context::OpContext;
pub use facade::{Cache, CacheExt};
pub use key::{CacheKeyBuilder, KeyNamespacer};
pub use self::metrics::{CacheMetrics, MetricsSnapshot};
pub use store::{CacheStore, StoreError};
pub use tag_index::TagIndex;
pub use warmup::WarmupKey;

#[cfg(test)]
pub use store::MockCacheStore;
