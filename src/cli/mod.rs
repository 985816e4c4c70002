//! CLI module for the tagged cache
//!
//! Operator commands that run one cache operation against the configured
//! backend and print the result.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::run;

/// Tagged cache - inspect and maintain a tagged Redis cache
#[derive(Debug, Parser)]
#[command(name = "tagged-cache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Print Prometheus metrics after the command
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Per-command deadline in milliseconds
    #[arg(long, global = true, default_value_t = 5_000)]
    pub timeout_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check the backend is reachable
    Ping,

    /// Print the JSON value stored under a key
    Get { key: String },

    /// Store a JSON value
    Set {
        key: String,
        /// JSON-encoded value
        value: String,
        /// Time-to-live in seconds
        #[arg(long, default_value_t = 3_600)]
        ttl: u64,
        /// Tag to associate with the key (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Delete a key
    Delete { key: String },

    /// Delete every key matching a glob pattern
    DeletePattern { pattern: String },

    /// Check whether a key exists
    Exists { key: String },

    /// Pre-populate entries from a JSON file of `{key, value, ttl_secs, tags}` objects
    Warm { file: PathBuf },
}
