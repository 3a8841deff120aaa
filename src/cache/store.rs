//! The narrow get/set/delete contract shared by every cache layer.

use std::time::Duration;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::Result;

/// A keyed cache layer.
///
/// Tiers, the two-tier composition and the load-through cache all speak
/// this contract, so they compose by construction.
#[async_trait]
pub trait Store<V>: Send + Sync {
    /// Look up `key`. A miss is `Err(CacheError::NotFound)`.
    async fn get(&self, ctx: &Context, key: &str) -> Result<V>;

    /// Store `value` under `key` for `ttl`. A zero TTL means no expiry.
    async fn set(&self, ctx: &Context, key: &str, value: V, ttl: Duration) -> Result<()>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn delete(&self, ctx: &Context, key: &str) -> Result<()>;
}
