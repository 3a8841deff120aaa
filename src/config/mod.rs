//! Configuration module for tiercache.
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_DATABASE: &str = "tiercache";
const DEFAULT_LOCAL_CAPACITY: u64 = 10_000;
const DEFAULT_TTL_SECS: u64 = 60;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    // Remote cache
    pub redis_url: String,

    // MongoDB
    pub mongodb_uri: String,
    pub mongodb_database: String,

    /// Bound on each registered type's local tier.
    pub local_capacity: u64,
    /// TTL given to registered types.
    pub default_ttl: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    /// Fails if `MONGODB_URI` is not set or a numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let local_capacity = match var("CACHE_LOCAL_CAPACITY") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("CACHE_LOCAL_CAPACITY must be a positive integer, got {raw}"))?,
            None => DEFAULT_LOCAL_CAPACITY,
        };

        let ttl_secs = match var("CACHE_DEFAULT_TTL_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("CACHE_DEFAULT_TTL_SECS must be a number of seconds, got {raw}"))?,
            None => DEFAULT_TTL_SECS,
        };

        Ok(Self {
            redis_url: var("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            mongodb_uri: var("MONGODB_URI").context("MONGODB_URI must be set")?,
            mongodb_database: var("MONGODB_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            local_capacity,
            default_ttl: Duration::from_secs(ttl_secs),
        })
    }
}
