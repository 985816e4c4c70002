//! Cache contract
//!
//! `Cache` works on encoded bytes so it stays dyn-compatible; `CacheExt`
//! layers typed reads and writes on top through the JSON codec.

use std::collections::HashSet;
use std::fmt::Debug;
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::CacheError;

use super::codec::{self, CacheValue};
use super::context::OpContext;
use super::metrics::MetricsSnapshot;
use super::warmup::WarmupKey;

/// Tagged cache capability
///
/// Keys are logical; implementations apply their own namespacing. A missing
/// key is `CacheError::NotFound`.
#[async_trait]
pub trait Cache: Send + Sync + Debug {
    /// Gets the encoded value stored under `key`
    async fn get_raw(&self, ctx: &OpContext, key: &str) -> Result<Vec<u8>, CacheError>;

    /// Stores an encoded value with a TTL; a zero TTL never expires
    async fn set_raw(
        &self,
        ctx: &OpContext,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Stores an encoded value, then records the key under every tag
    async fn set_raw_with_tags(
        &self,
        ctx: &OpContext,
        key: &str,
        value: &[u8],
        ttl: Duration,
        tags: &[&str],
    ) -> Result<(), CacheError>;

    async fn delete(&self, ctx: &OpContext, key: &str) -> Result<(), CacheError>;

    /// Deletes every key matching a glob pattern, returning how many matched
    async fn delete_pattern(&self, ctx: &OpContext, pattern: &str) -> Result<usize, CacheError>;

    async fn exists(&self, ctx: &OpContext, key: &str) -> Result<bool, CacheError>;

    /// Writes encoded entries in order, stopping at the first failure
    async fn warm_raw(
        &self,
        ctx: &OpContext,
        entries: &[WarmupKey<Vec<u8>>],
    ) -> Result<(), CacheError>;

    /// Deletes every key recorded under any of the tags, returning the count
    async fn invalidate_by_tags(&self, ctx: &OpContext, tags: &[&str]) -> Result<usize, CacheError>;

    /// Keys currently associated with a tag
    fn tagged_keys(&self, tag: &str) -> HashSet<String>;

    fn metrics(&self) -> MetricsSnapshot;

    /// Wraps a value that failed to encode before any I/O; `elapsed` is the
    /// time spent trying
    fn encode_failed(
        &self,
        operation: &'static str,
        key: &str,
        _elapsed: Duration,
        error: serde_json::Error,
    ) -> CacheError {
        CacheError::serialization(operation, key, error.to_string())
    }

    /// Wraps stored bytes that failed to decode after a successful read
    fn decode_failed(
        &self,
        operation: &'static str,
        key: &str,
        error: serde_json::Error,
    ) -> CacheError {
        CacheError::serialization(operation, key, error.to_string())
    }
}

/// Typed operations over any `Cache`
pub trait CacheExt: Cache {
    /// Gets and decodes the value stored under `key`
    fn get<'a, V>(
        &'a self,
        ctx: &'a OpContext,
        key: &'a str,
    ) -> impl Future<Output = Result<V, CacheError>> + Send + 'a
    where
        V: CacheValue + 'a,
    {
        async move {
            let data = self.get_raw(ctx, key).await?;
            codec::decode(&data).map_err(|e| self.decode_failed("get", key, e))
        }
    }

    /// Encodes and stores a value with a TTL
    fn set<'a, V>(
        &'a self,
        ctx: &'a OpContext,
        key: &'a str,
        value: &'a V,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), CacheError>> + Send + 'a
    where
        V: Serialize + ?Sized + Sync,
    {
        async move {
            let data = encode(self, "set", key, value)?;
            self.set_raw(ctx, key, &data, ttl).await
        }
    }

    /// Encodes and stores a value, then records the key under every tag
    fn set_with_tags<'a, V, T>(
        &'a self,
        ctx: &'a OpContext,
        key: &'a str,
        value: &'a V,
        ttl: Duration,
        tags: &'a [T],
    ) -> impl Future<Output = Result<(), CacheError>> + Send + 'a
    where
        V: Serialize + ?Sized + Sync,
        T: AsRef<str> + Sync,
    {
        async move {
            let data = encode(self, "set", key, value)?;
            let tags: Vec<&str> = tags.iter().map(|tag| tag.as_ref()).collect();
            self.set_raw_with_tags(ctx, key, &data, ttl, &tags).await
        }
    }

    /// Writes each entry in order, stopping at the first failure
    ///
    /// Entries before the failing one stay written. An entry that cannot be
    /// encoded fails the same way a failed write does.
    fn warm<'a, V>(
        &'a self,
        ctx: &'a OpContext,
        entries: &'a [WarmupKey<V>],
    ) -> impl Future<Output = Result<(), CacheError>> + Send + 'a
    where
        V: Serialize + Sync,
    {
        async move {
            let mut encoded = Vec::with_capacity(entries.len());
            let mut failure = None;

            for (index, entry) in entries.iter().enumerate() {
                match encode(self, "set", &entry.key, &entry.value) {
                    Ok(value) => encoded.push(WarmupKey {
                        key: entry.key.clone(),
                        value,
                        ttl: entry.ttl,
                        tags: entry.tags.clone(),
                    }),
                    Err(e) => {
                        failure = Some(CacheError::warmup(index, entry.key.clone(), e));
                        break;
                    }
                }
            }

            self.warm_raw(ctx, &encoded).await?;
            failure.map_or(Ok(()), Err)
        }
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}

fn encode<C, V>(cache: &C, operation: &'static str, key: &str, value: &V) -> Result<Vec<u8>, CacheError>
where
    C: Cache + ?Sized,
    V: Serialize + ?Sized,
{
    let start = Instant::now();
    codec::encode(value).map_err(|e| cache.encode_failed(operation, key, start.elapsed(), e))
}
