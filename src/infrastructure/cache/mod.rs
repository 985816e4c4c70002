//! Cache infrastructure - Store adapters and the tagged facade

mod factory;
mod in_memory;
mod redis;
mod tagged;

pub use factory::{CacheFactory, CacheType};
pub use in_memory::{InMemoryStore, InMemoryStoreConfig};
pub use self::redis::{RedisStore, RedisStoreConfig};
pub use tagged::TaggedCache;
