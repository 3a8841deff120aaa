//! Tiercache - load-through caching for database-backed entity types.
//!
//! ## Architecture
//!
//! - `cache` - remote store adapter, two-tier cache, load-through cache, registry and clients
//! - `database` - MongoDB integration and the query-backed loader helper
//! - `config` - Environment configuration
//! - `context` - Cancellation and deadlines for blocking calls
//! - `metrics` - Hit, miss and load counters
//! - `error` - Error types

pub mod cache;
pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod metrics;

pub use cache::{CacheManager, CacheType, Client, RemoteStore, TierPolicy, TypeTemplate};
pub use context::Context;
pub use error::{CacheError, Result};
pub use metrics::{CountingMetrics, Metrics, NoopMetrics};
