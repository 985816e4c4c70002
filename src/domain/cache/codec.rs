//! Value encoding contract
//!
//! Cached values travel as JSON bytes. A type is cacheable when it
//! round-trips through serde, which the `CacheValue` bound makes explicit.

use serde::{de::DeserializeOwned, Serialize};

/// Types that can be stored in and read back from the cache
pub trait CacheValue: Serialize + DeserializeOwned + Send + Sync {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Send + Sync {}

/// Encodes a value to bytes
pub fn encode<V: Serialize + ?Sized>(value: &V) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}

/// Decodes bytes into the caller's expected type
pub fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Result<V, serde_json::Error> {
    serde_json::from_slice(bytes)
}
