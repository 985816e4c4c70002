//! Tagged, metered cache facade
//!
//! Wraps a `CacheStore` with key namespacing, an in-process tag index for
//! group invalidation, and per-operation metrics. Typed access comes from
//! `CacheExt`.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, instrument, trace, warn};

use crate::config::CacheSettings;
use crate::domain::cache::{
    Cache, CacheMetrics, CacheStore, KeyNamespacer, MetricsSnapshot, OpContext, StoreError,
    TagIndex, WarmupKey,
};
use crate::domain::CacheError;

use super::factory::CacheFactory;

/// Read-through cache with tag-based group invalidation
///
/// Safe to share across tasks behind an `Arc`. Writes to the same key are
/// last-write-wins; nothing here is versioned.
#[derive(Debug)]
pub struct TaggedCache {
    store: Arc<dyn CacheStore>,
    keys: KeyNamespacer,
    tags: TagIndex,
    metrics: Arc<CacheMetrics>,
}

impl TaggedCache {
    pub fn new(store: Arc<dyn CacheStore>, keys: KeyNamespacer, metrics: Arc<CacheMetrics>) -> Self {
        Self {
            store,
            keys,
            tags: TagIndex::new(),
            metrics,
        }
    }

    /// Validates settings and builds the configured store
    ///
    /// Fails fast when the settings are invalid or the backend is unreachable.
    pub async fn connect(settings: &CacheSettings) -> Result<Self, CacheError> {
        let store = CacheFactory::new().create(settings).await?;

        Ok(Self::new(
            store,
            KeyNamespacer::new(settings.key_prefix.clone()),
            Arc::new(CacheMetrics::new(settings.service_name.clone())),
        ))
    }

    pub fn namespacer(&self) -> &KeyNamespacer {
        &self.keys
    }

    pub fn metrics_collector(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    /// Checks the backend is reachable
    pub async fn ping(&self, ctx: &OpContext) -> Result<(), CacheError> {
        self.observe("ping", async {
            ctx.run("ping", async {
                self.store
                    .ping()
                    .await
                    .map_err(|e| Self::store_error("ping", "", e))
            })
            .await
        })
        .await
    }

    async fn delete_full_key(
        &self,
        ctx: &OpContext,
        key: &str,
        full_key: &str,
    ) -> Result<(), CacheError> {
        self.observe("delete", async {
            ctx.run("delete", async {
                self.store
                    .delete(full_key)
                    .await
                    .map_err(|e| Self::store_error("delete", key, e))
            })
            .await
        })
        .await
    }

    /// Times an operation and counts it; failures other than NotFound
    /// increment the error counter once
    async fn observe<T, F>(&self, operation: &'static str, future: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        let start = Instant::now();
        let result = future.await;
        self.metrics.record_operation(operation, start.elapsed());

        if let Err(e) = &result {
            if !e.is_not_found() {
                self.record_failure(operation, e);
            }
        }

        result
    }

    fn record_failure(&self, operation: &'static str, error: &CacheError) {
        self.metrics.record_error(operation);
        warn!(operation, code = error.code(), error = %error, "cache operation failed");
    }

    fn store_error(operation: &str, key: &str, error: StoreError) -> CacheError {
        CacheError::transient(operation, key, error.to_string())
    }
}

#[async_trait]
impl Cache for TaggedCache {
    /// A missing key is `CacheError::NotFound` and counts as a miss; any
    /// returned bytes count as a hit
    #[instrument(level = "debug", skip_all, fields(key = %key))]
    async fn get_raw(&self, ctx: &OpContext, key: &str) -> Result<Vec<u8>, CacheError> {
        let full_key = self.keys.build(key);

        self.observe("get", async {
            let data = ctx
                .run("get", async {
                    self.store
                        .get(&full_key)
                        .await
                        .map_err(|e| Self::store_error("get", key, e))
                })
                .await?;

            match data {
                Some(data) => {
                    self.metrics.record_hit("get");
                    Ok(data)
                }
                None => {
                    self.metrics.record_miss("get");
                    trace!("cache miss");
                    Err(CacheError::not_found(key))
                }
            }
        })
        .await
    }

    #[instrument(level = "debug", skip_all, fields(key = %key, ttl = ?ttl))]
    async fn set_raw(
        &self,
        ctx: &OpContext,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let full_key = self.keys.build(key);

        self.observe("set", async {
            ctx.run("set", async {
                self.store
                    .set(&full_key, value, ttl)
                    .await
                    .map_err(|e| Self::store_error("set", key, e))
            })
            .await?;

            debug!(bytes = value.len(), "cache set");
            Ok(())
        })
        .await
    }

    /// Tags are untouched when the write fails
    async fn set_raw_with_tags(
        &self,
        ctx: &OpContext,
        key: &str,
        value: &[u8],
        ttl: Duration,
        tags: &[&str],
    ) -> Result<(), CacheError> {
        self.set_raw(ctx, key, value, ttl).await?;

        let full_key = self.keys.build(key);
        for tag in tags {
            self.tags.add_key_to_tag(tag, &full_key);
        }

        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(key = %key))]
    async fn delete(&self, ctx: &OpContext, key: &str) -> Result<(), CacheError> {
        let full_key = self.keys.build(key);
        self.delete_full_key(ctx, key, &full_key).await
    }

    /// Pattern is given in logical-key terms. No delete is issued when
    /// nothing matches.
    #[instrument(level = "debug", skip_all, fields(pattern = %pattern))]
    async fn delete_pattern(&self, ctx: &OpContext, pattern: &str) -> Result<usize, CacheError> {
        let full_pattern = self.keys.build_pattern(pattern);

        self.observe("delete_pattern", async {
            let keys = ctx
                .run("delete_pattern", async {
                    self.store
                        .keys_matching(&full_pattern)
                        .await
                        .map_err(|e| Self::store_error("delete_pattern", pattern, e))
                })
                .await?;

            if keys.is_empty() {
                trace!("no keys matched");
                return Ok(0);
            }

            ctx.run("delete_pattern", async {
                self.store
                    .delete_many(&keys)
                    .await
                    .map_err(|e| Self::store_error("delete_pattern", pattern, e))
            })
            .await?;

            debug!(count = keys.len(), "deleted keys by pattern");
            Ok(keys.len())
        })
        .await
    }

    #[instrument(level = "debug", skip_all, fields(key = %key))]
    async fn exists(&self, ctx: &OpContext, key: &str) -> Result<bool, CacheError> {
        let full_key = self.keys.build(key);

        self.observe("exists", async {
            ctx.run("exists", async {
                self.store
                    .exists(&full_key)
                    .await
                    .map_err(|e| Self::store_error("exists", key, e))
            })
            .await
        })
        .await
    }

    /// Entries written before a failure stay in the cache. The returned
    /// `CacheError::Warmup` names the failing entry.
    #[instrument(level = "debug", skip_all, fields(entries = entries.len()))]
    async fn warm_raw(
        &self,
        ctx: &OpContext,
        entries: &[WarmupKey<Vec<u8>>],
    ) -> Result<(), CacheError> {
        let start = Instant::now();

        let result = async {
            for (index, entry) in entries.iter().enumerate() {
                let tags: Vec<&str> = entry.tags.iter().map(String::as_str).collect();
                self.set_raw_with_tags(ctx, &entry.key, &entry.value, entry.ttl, &tags)
                    .await
                    .map_err(|e| CacheError::warmup(index, entry.key.clone(), e))?;
            }
            Ok(())
        }
        .await;

        self.metrics.observe_duration("warm", start.elapsed());

        if let Err(e) = &result {
            warn!(error = %e, "cache warmup stopped early");
        }
        result
    }

    /// Tags are detached from the index before any delete is attempted. If a
    /// delete fails the remaining keys stay in the backend and are no longer
    /// reachable through their tags, so retrying the same call is a no-op.
    #[instrument(level = "debug", skip_all, fields(tags = tags.len()))]
    async fn invalidate_by_tags(&self, ctx: &OpContext, tags: &[&str]) -> Result<usize, CacheError> {
        let start = Instant::now();

        let mut full_keys: Vec<String> = tags
            .iter()
            .flat_map(|tag| self.tags.remove_tag(tag))
            .collect();
        full_keys.sort_unstable();
        full_keys.dedup();

        let mut result = Ok(full_keys.len());

        for (deleted, full_key) in full_keys.iter().enumerate() {
            let key = self.keys.strip(full_key);

            if let Err(e) = self.delete_full_key(ctx, key, full_key).await {
                warn!(
                    key,
                    stranded = full_keys.len() - deleted,
                    "tag invalidation aborted; detached keys were not deleted"
                );
                result = Err(CacheError::invalidation(key, e));
                break;
            }
        }

        self.metrics
            .observe_duration("invalidate_by_tags", start.elapsed());

        if let Ok(count) = &result {
            debug!(count, "invalidated keys by tag");
        }
        result
    }

    /// Membership can outlive the entries: the index is not reconciled
    /// with backend expiry.
    fn tagged_keys(&self, tag: &str) -> HashSet<String> {
        self.tags.keys_for(tag)
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Counts as a failed operation; nothing reached the store
    fn encode_failed(
        &self,
        operation: &'static str,
        key: &str,
        elapsed: Duration,
        error: serde_json::Error,
    ) -> CacheError {
        let error = CacheError::serialization(operation, key, error.to_string());
        self.metrics.record_operation(operation, elapsed);
        self.record_failure(operation, &error);
        error
    }

    /// The read already counted as a hit; the failure adds an error
    fn decode_failed(
        &self,
        operation: &'static str,
        key: &str,
        error: serde_json::Error,
    ) -> CacheError {
        let error = CacheError::serialization(operation, key, error.to_string());
        self.record_failure(operation, &error);
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mockall::predicate::eq;
    use serde::{Deserialize, Serialize};
    use tokio_test::{assert_err, assert_ok};
    use tokio_util::sync::CancellationToken;

    use crate::domain::cache::{CacheExt, MockCacheStore};
    use crate::infrastructure::cache::InMemoryStore;

    const TTL: Duration = Duration::from_secs(60);

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        id: u32,
        name: String,
    }

    fn user(id: u32) -> User {
        User {
            id,
            name: format!("user-{}", id),
        }
    }

    fn cache_with(store: impl CacheStore + 'static, prefix: Option<&str>) -> TaggedCache {
        TaggedCache::new(
            Arc::new(store),
            KeyNamespacer::new(prefix),
            Arc::new(CacheMetrics::new("test")),
        )
    }

    fn in_memory() -> TaggedCache {
        cache_with(InMemoryStore::new(), Some("app"))
    }

    #[tokio::test]
    async fn test_get_never_written_is_not_found() {
        let cache = in_memory();
        let ctx = OpContext::background();

        let err = cache.get::<User>(&ctx, "user:404").await.unwrap_err();

        assert!(err.is_not_found());
        let snapshot = cache.metrics();
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.errors, 0);
        assert_eq!(snapshot.total_ops, 1);
    }

    #[tokio::test]
    async fn test_set_then_get_round_trips() {
        let cache = in_memory();
        let ctx = OpContext::background();

        cache.set(&ctx, "user:1", &user(1), TTL).await.unwrap();
        let value: User = cache.get(&ctx, "user:1").await.unwrap();

        assert_eq!(value, user(1));
        assert_eq!(cache.metrics().hits, 1);
    }

    #[tokio::test]
    async fn test_keys_are_prefixed_in_store() {
        let mut store = MockCacheStore::new();
        store
            .expect_set()
            .withf(|key, _, ttl| key == "app:user:1" && *ttl == TTL)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let cache = cache_with(store, Some("app"));
        assert_ok!(cache.set(&OpContext::background(), "user:1", &1, TTL).await);
    }

    #[tokio::test]
    async fn test_transient_get_is_counted_as_error() {
        let mut store = MockCacheStore::new();
        store
            .expect_get()
            .returning(|_| Err(StoreError::backend("connection reset")));

        let cache = cache_with(store, None);
        let err = cache
            .get::<User>(&OpContext::background(), "user:1")
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Transient { ref operation, ref key, .. }
            if operation == "get" && key == "user:1"));
        let snapshot = cache.metrics();
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.misses, 0);
        assert_eq!(snapshot.hits, 0);
    }

    #[tokio::test]
    async fn test_decode_failure_is_serialization_error() {
        let mut store = MockCacheStore::new();
        store
            .expect_get()
            .returning(|_| Ok(Some(b"not json".to_vec())));

        let cache = cache_with(store, None);
        let err = cache
            .get::<User>(&OpContext::background(), "user:1")
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Serialization { .. }));
        let snapshot = cache.metrics();
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.hits, 1);
    }

    #[tokio::test]
    async fn test_encode_failure_never_reaches_store() {
        let mut store = MockCacheStore::new();
        store.expect_set().never();

        let cache = cache_with(store, None);
        let mut unencodable = std::collections::HashMap::new();
        unencodable.insert(vec![1u8], 1);

        let err = cache
            .set(&OpContext::background(), "k", &unencodable, TTL)
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Serialization { .. }));
        let snapshot = cache.metrics();
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.total_ops, 1);
    }

    #[tokio::test]
    async fn test_failed_set_with_tags_leaves_index_untouched() {
        let mut store = MockCacheStore::new();
        store
            .expect_set()
            .returning(|_, _, _| Err(StoreError::backend("down")));

        let cache = cache_with(store, None);
        let result = cache
            .set_with_tags(&OpContext::background(), "k", &1, TTL, &["t1"])
            .await;

        assert_err!(result);
        assert!(cache.tagged_keys("t1").is_empty());
    }

    #[tokio::test]
    async fn test_set_with_tags_then_invalidate_removes_entry() {
        let cache = in_memory();
        let ctx = OpContext::background();

        cache
            .set_with_tags(&ctx, "user:1", &user(1), TTL, &["t1", "t2"])
            .await
            .unwrap();
        assert!(cache.tagged_keys("t2").contains("app:user:1"));

        let deleted = cache.invalidate_by_tags(&ctx, &["t1"]).await.unwrap();

        assert_eq!(deleted, 1);
        assert!(cache.get::<User>(&ctx, "user:1").await.unwrap_err().is_not_found());
        assert!(cache.tagged_keys("t1").is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_unknown_tag_is_noop() {
        let mut store = MockCacheStore::new();
        store.expect_delete().never();

        let cache = cache_with(store, None);
        let deleted = cache
            .invalidate_by_tags(&OpContext::background(), &["nobody"])
            .await
            .unwrap();

        assert_eq!(deleted, 0);
        assert_eq!(cache.metrics().total_ops, 0);
    }

    #[tokio::test]
    async fn test_invalidate_partial_failure_forgets_tag() {
        let mut store = MockCacheStore::new();
        store.expect_set().returning(|_, _, _| Ok(()));
        store
            .expect_delete()
            .with(eq("a"))
            .times(1)
            .returning(|_| Ok(()));
        store
            .expect_delete()
            .with(eq("b"))
            .times(1)
            .returning(|_| Err(StoreError::backend("timeout")));

        let cache = cache_with(store, None);
        let ctx = OpContext::background();
        for key in ["a", "b", "c"] {
            cache.set_with_tags(&ctx, key, &1, TTL, &["grp"]).await.unwrap();
        }

        let err = cache.invalidate_by_tags(&ctx, &["grp"]).await.unwrap_err();
        match err {
            CacheError::Invalidation { key, source } => {
                assert_eq!(key, "b");
                assert!(source.is_retryable());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(cache.metrics().errors, 1);

        // the tag is already gone, so a retry finds nothing to delete
        let retried = cache.invalidate_by_tags(&ctx, &["grp"]).await.unwrap();
        assert_eq!(retried, 0);
    }

    #[tokio::test]
    async fn test_invalidate_key_shared_by_two_tags_deletes_once() {
        let mut store = MockCacheStore::new();
        store.expect_set().returning(|_, _, _| Ok(()));
        store.expect_delete().times(1).returning(|_| Ok(()));

        let cache = cache_with(store, None);
        let ctx = OpContext::background();
        cache
            .set_with_tags(&ctx, "k", &1, TTL, &["t1", "t2"])
            .await
            .unwrap();

        let deleted = cache.invalidate_by_tags(&ctx, &["t1", "t2"]).await.unwrap();
        assert_eq!(deleted, 1);
    }

    #[tokio::test]
    async fn test_delete_pattern_without_matches_issues_no_delete() {
        let mut store = MockCacheStore::new();
        store
            .expect_keys_matching()
            .with(eq("app:session:*"))
            .returning(|_| Ok(Vec::new()));
        store.expect_delete_many().never();

        let cache = cache_with(store, Some("app"));
        let matched = cache
            .delete_pattern(&OpContext::background(), "session:*")
            .await
            .unwrap();

        assert_eq!(matched, 0);
    }

    #[tokio::test]
    async fn test_delete_pattern_issues_single_batch() {
        let mut store = MockCacheStore::new();
        store
            .expect_keys_matching()
            .returning(|_| Ok(vec!["app:s:1".to_string(), "app:s:2".to_string()]));
        store
            .expect_delete_many()
            .withf(|keys| keys.len() == 2)
            .times(1)
            .returning(|_| Ok(()));

        let cache = cache_with(store, Some("app"));
        let matched = cache
            .delete_pattern(&OpContext::background(), "s:*")
            .await
            .unwrap();

        assert_eq!(matched, 2);
    }

    #[tokio::test]
    async fn test_warm_stops_at_third_entry_without_rollback() {
        let written = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&written);

        let mut store = MockCacheStore::new();
        store.expect_set().times(3).returning(move |key, _, _| {
            if key == "k3" {
                return Err(StoreError::backend("OOM command not allowed"));
            }
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        store.expect_delete().never();

        let cache = cache_with(store, None);
        let entries: Vec<WarmupKey<u32>> = (1..=4)
            .map(|n| WarmupKey::new(format!("k{}", n), n, TTL).with_tag("warm"))
            .collect();

        let err = cache
            .warm(&OpContext::background(), &entries)
            .await
            .unwrap_err();

        match err {
            CacheError::Warmup { index, key, .. } => {
                assert_eq!(index, 2);
                assert_eq!(key, "k3");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(written.load(Ordering::SeqCst), 2);
        assert_eq!(cache.tagged_keys("warm").len(), 2);
        assert_eq!(cache.metrics().errors, 1);
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let cache = in_memory();
        let ctx = OpContext::background();

        cache.set(&ctx, "k", &"v", TTL).await.unwrap();
        assert!(cache.exists(&ctx, "k").await.unwrap());

        cache.delete(&ctx, "k").await.unwrap();
        assert!(!cache.exists(&ctx, "k").await.unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_context_is_counted_and_skips_store() {
        let mut store = MockCacheStore::new();
        store.expect_get().never();

        let cache = cache_with(store, None);
        let token = CancellationToken::new();
        token.cancel();

        let err = cache
            .get::<u32>(&OpContext::with_token(token), "k")
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Cancelled { .. }));
        let snapshot = cache.metrics();
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.total_ops, 1);
    }

    #[tokio::test]
    async fn test_hit_rate_after_hits_and_misses() {
        let cache = in_memory();
        let ctx = OpContext::background();
        cache.set(&ctx, "present", &1, TTL).await.unwrap();

        for _ in 0..3 {
            let _: u32 = cache.get(&ctx, "present").await.unwrap();
        }
        let _ = cache.get::<u32>(&ctx, "absent").await;

        let snapshot = cache.metrics();
        assert_eq!(snapshot.hits, 3);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.hit_rate, 0.75);
        assert_eq!(snapshot.errors, 0);
    }

    #[tokio::test]
    async fn test_set_accepts_borrowed_str() {
        let cache = in_memory();
        let ctx = OpContext::background();

        cache.set(&ctx, "greeting", "hello", TTL).await.unwrap();
        cache
            .set_with_tags(&ctx, "farewell", &"bye", TTL, &["words"])
            .await
            .unwrap();

        let greeting: String = cache.get(&ctx, "greeting").await.unwrap();
        let farewell: String = cache.get(&ctx, "farewell").await.unwrap();
        assert_eq!(greeting, "hello");
        assert_eq!(farewell, "bye");
    }

    #[tokio::test]
    async fn test_usable_through_dyn_cache() {
        let cache: Arc<dyn Cache> = Arc::new(in_memory());
        let ctx = OpContext::background();

        cache
            .set_with_tags(&ctx, "user:1", &user(1), TTL, &["user"])
            .await
            .unwrap();
        let loaded: User = cache.get(&ctx, "user:1").await.unwrap();
        assert_eq!(loaded, user(1));

        let entries = vec![WarmupKey::new("user:2", user(2), TTL).with_tag("user")];
        cache.warm(&ctx, &entries).await.unwrap();
        assert_eq!(cache.tagged_keys("user").len(), 2);

        assert_eq!(cache.invalidate_by_tags(&ctx, &["user"]).await.unwrap(), 2);
        assert!(!cache.exists(&ctx, "user:2").await.unwrap());
        assert_eq!(cache.metrics().hits, 1);
    }

    #[tokio::test]
    async fn test_warm_unencodable_entry_keeps_earlier_writes() {
        let mut store = MockCacheStore::new();
        store
            .expect_set()
            .withf(|key, _, _| key == "k1")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let cache = cache_with(store, None);
        let mut unencodable = std::collections::HashMap::new();
        unencodable.insert(vec![1u8], 1u32);

        let entries = vec![
            WarmupKey::new("k1", std::collections::HashMap::new(), TTL),
            WarmupKey::new("k2", unencodable, TTL),
            WarmupKey::new("k3", std::collections::HashMap::new(), TTL),
        ];

        let err = cache
            .warm(&OpContext::background(), &entries)
            .await
            .unwrap_err();

        match err {
            CacheError::Warmup { index, key, source } => {
                assert_eq!(index, 1);
                assert_eq!(key, "k2");
                assert!(matches!(*source, CacheError::Serialization { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let snapshot = cache.metrics();
        assert_eq!(snapshot.total_ops, 2);
        assert_eq!(snapshot.errors, 1);
    }
}
