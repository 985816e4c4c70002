//! Metrics collector
//!
//! In-process counters per cache instance, mirrored into the `metrics`
//! facade so any installed recorder sees the same observations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, histogram};

/// Point-in-time view of cache activity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub total_ops: u64,
    /// `hits / (hits + misses)`, 0 when nothing was looked up
    pub hit_rate: f64,
    pub average_duration: Duration,
}

/// Instance-scoped cache counters
///
/// Each facade owns its own collector, so building two caches with the same
/// service name never conflicts. Observations are also forwarded to the
/// global `metrics` recorder labelled by service and operation.
#[derive(Debug)]
pub struct CacheMetrics {
    service: String,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    total_ops: AtomicU64,
    total_duration_nanos: AtomicU64,
}

impl CacheMetrics {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_ops: AtomicU64::new(0),
            total_duration_nanos: AtomicU64::new(0),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn record_hit(&self, operation: &'static str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!("cache_hits_total", "service" => self.service.clone(), "operation" => operation)
            .increment(1);
    }

    pub fn record_miss(&self, operation: &'static str) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("cache_misses_total", "service" => self.service.clone(), "operation" => operation)
            .increment(1);
    }

    pub fn record_error(&self, operation: &'static str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        counter!("cache_errors_total", "service" => self.service.clone(), "operation" => operation)
            .increment(1);
    }

    /// Counts one completed operation and its duration
    pub fn record_operation(&self, operation: &'static str, duration: Duration) {
        self.total_ops.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.total_duration_nanos.fetch_add(nanos, Ordering::Relaxed);

        counter!("cache_operations_total", "service" => self.service.clone(), "operation" => operation)
            .increment(1);
        self.observe_duration(operation, duration);
    }

    /// Records a duration in the histogram only; composite operations use
    /// this so their inner calls are not counted twice
    pub fn observe_duration(&self, operation: &'static str, duration: Duration) {
        histogram!(
            "cache_operation_duration_seconds",
            "service" => self.service.clone(),
            "operation" => operation
        )
        .record(duration.as_secs_f64());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total_ops = self.total_ops.load(Ordering::Relaxed);
        let total_nanos = self.total_duration_nanos.load(Ordering::Relaxed);

        let lookups = hits + misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        };

        let average_duration = if total_ops == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(total_nanos / total_ops)
        };

        MetricsSnapshot {
            hits,
            misses,
            errors: self.errors.load(Ordering::Relaxed),
            total_ops,
            hit_rate,
            average_duration,
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.total_ops.store(0, Ordering::Relaxed);
        self.total_duration_nanos.store(0, Ordering::Relaxed);
    }
}
