mod app_config;
mod cache;

pub use app_config::{AppConfig, LogFormat, LoggingConfig};
pub use cache::CacheSettings;
