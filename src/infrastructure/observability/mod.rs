//! Observability infrastructure - Prometheus export

mod config;
mod metrics;

pub use self::config::MetricsConfig;
pub use self::metrics::{init_metrics, PrometheusMetrics};
