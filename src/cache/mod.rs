//! Cache module - two-tier load-through caching for entity types.
//!
//! ## Architecture
//!
//! Three layers, each implementing the same narrow [`Store`] contract:
//! - [`RemoteStore`] - shared remote tier with TTL jitter and tags
//! - [`TwoTierCache`] - optional in-process moka tier in front of the remote one
//! - [`LoadThroughCache`] - fills misses from a loader, one load per key at a time
//!
//! [`CacheManager`] wires the layers per registered [`CacheType`] and hands
//! back a [`Client`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! let manager = CacheManager::new(RemoteStore::new(Arc::new(redis)));
//! let client = manager.register(currency_type, Duration::from_secs(60), TierPolicy::LocalAndRemote)?;
//!
//! let usd = client.get(&ctx, "1").await?;
//! client.invalidate(&ctx, "1").await?;
//! ```

mod client;
mod config;
mod loadable;
mod memory;
mod payload;
mod redis_client;
mod registry;
mod remote;
mod store;
mod tiered;
mod typed;
mod types;

pub use client::{Client, DELIMITER, cache_key};
pub use config::CacheConfig;
pub use loadable::{LoadThroughCache, Loader};
pub use memory::MemoryClient;
pub use payload::{Payload, decode_into, encode};
pub use redis_client::RedisClient;
pub use registry::{CacheManager, DEFAULT_LOCAL_CAPACITY, Registration};
pub use remote::{EntryOptions, RemoteClient, RemoteStore, STORE_TYPE, TAG_KEY_PREFIX, TAG_TTL, jittered_ttl, tag_key};
pub use store::Store;
pub use tiered::{LocalTier, RemoteTier, TierPolicy, TwoTierCache};
pub use typed::TypedCache;
pub use types::{CacheType, TypeTemplate, loader_fn, validate_type};
