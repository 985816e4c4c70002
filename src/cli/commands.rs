use std::time::Duration;

use anyhow::Context;
use serde_json::Value;

use crate::config::AppConfig;
use crate::domain::{Cache, CacheExt, OpContext, WarmupKey};
use crate::infrastructure::cache::TaggedCache;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::observability::init_metrics;

use super::{Cli, Command};

/// Runs one CLI command against the configured backend
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_logging(&config.logging);

    let prometheus = if cli.metrics {
        init_metrics(&config.metrics)
    } else {
        None
    };

    let cache = TaggedCache::connect(&config.cache)
        .await
        .with_context(|| format!("Failed to connect to {} backend", config.cache.backend))?;
    let ctx = OpContext::with_timeout(Duration::from_millis(cli.timeout_ms));

    execute(&cache, &ctx, cli.command).await?;

    if let Some(prometheus) = prometheus {
        print!("{}", prometheus.render());
    }

    Ok(())
}

async fn execute(cache: &TaggedCache, ctx: &OpContext, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Ping => {
            cache.ping(ctx).await?;
            println!("PONG");
        }
        Command::Get { key } => match cache.get::<Value>(ctx, &key).await {
            Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            Err(e) if e.is_not_found() => println!("(nil)"),
            Err(e) => return Err(e.into()),
        },
        Command::Set {
            key,
            value,
            ttl,
            tags,
        } => {
            let value: Value = serde_json::from_str(&value).context("Value must be valid JSON")?;
            let ttl = Duration::from_secs(ttl);

            if tags.is_empty() {
                cache.set(ctx, &key, &value, ttl).await?;
            } else {
                cache.set_with_tags(ctx, &key, &value, ttl, &tags).await?;
            }
            println!("OK");
        }
        Command::Delete { key } => {
            cache.delete(ctx, &key).await?;
            println!("OK");
        }
        Command::DeletePattern { pattern } => {
            let deleted = cache.delete_pattern(ctx, &pattern).await?;
            println!("{} key(s) deleted", deleted);
        }
        Command::Exists { key } => {
            println!("{}", cache.exists(ctx, &key).await?);
        }
        Command::Warm { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let entries: Vec<WarmupKey<Value>> =
                serde_json::from_str(&raw).context("Warmup file must be a JSON array of entries")?;

            cache.warm(ctx, &entries).await?;
            println!("{} key(s) warmed", entries.len());
        }
    }

    Ok(())
}
