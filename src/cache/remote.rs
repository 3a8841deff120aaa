//! Remote store adapter.
//!
//! Wraps a key/value service (Redis in production) with TTL jitter and
//! tag-based bulk invalidation. The wire protocol lives behind
//! [`RemoteClient`]; this module only needs its eight semantic operations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::error::{CacheError, Result};

/// Store type reported by [`RemoteStore::store_type`].
pub const STORE_TYPE: &str = "redis";

/// Tag sets live under `cache_tag_<tag>`.
pub const TAG_KEY_PREFIX: &str = "cache_tag_";

/// Tag sets outlive their members but are not immortal.
pub const TAG_TTL: Duration = Duration::from_secs(720 * 60 * 60); // 30 days

/// Lower bound of the TTL jitter factor; the upper bound is 1.0.
const JITTER_FLOOR: f64 = 0.9;

/// The remote key/value operations the adapter relies on.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// `GET key`. `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// `SET key value [PX ttl]`. `None` stores without expiry.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;

    /// `DEL key...`, returning how many keys existed.
    async fn del(&self, keys: &[String]) -> Result<u64>;

    /// `PTTL key`. `None` when the key has no expiry; `NotFound` when it
    /// does not exist.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// `PEXPIRE key ttl`. `false` when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// `SADD key member...`, returning how many members were new.
    async fn sadd(&self, key: &str, members: &[String]) -> Result<u64>;

    /// `SMEMBERS key`.
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// `FLUSHALL`.
    async fn flush_all(&self) -> Result<()>;
}

/// Per-write options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryOptions {
    /// Overrides the store's default TTL.
    pub ttl: Option<Duration>,
    /// Tags the key is added to.
    pub tags: Vec<String>,
}

impl EntryOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Key of the member set for `tag`.
pub fn tag_key(tag: &str) -> String {
    format!("{TAG_KEY_PREFIX}{tag}")
}

/// Scale `ttl` by `0.9 + unit * 0.1`, where `unit` is in `[0, 1)`.
///
/// The result is rounded up to whole milliseconds and never exceeds `ttl`,
/// so it always lies in `[0.9 * ttl, ttl]`. A zero `ttl` stays zero.
pub fn jittered_ttl(ttl: Duration, unit: f64) -> Duration {
    if ttl.is_zero() {
        return ttl;
    }

    let unit = unit.clamp(0.0, 1.0);
    let factor = JITTER_FLOOR + unit * (1.0 - JITTER_FLOOR);
    let millis = ttl.as_millis() as f64;
    let scaled = (millis * factor).ceil().min(millis).max(1.0);

    Duration::from_millis(scaled as u64)
}

/// Remote tier adapter shared by every registered type.
#[derive(Clone)]
pub struct RemoteStore {
    client: Arc<dyn RemoteClient>,
    default_ttl: Duration,
}

impl RemoteStore {
    /// Wrap `client`. Writes without an explicit TTL never expire.
    pub fn new(client: Arc<dyn RemoteClient>) -> Self {
        Self {
            client,
            default_ttl: Duration::ZERO,
        }
    }

    /// Set the TTL applied when a write carries none.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn store_type(&self) -> &'static str {
        STORE_TYPE
    }

    /// Fetch the payload stored under `key`.
    pub async fn get(&self, ctx: &Context, key: &str) -> Result<Vec<u8>> {
        ctx.run(self.client.get(key))
            .await?
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    /// Fetch the payload and its remaining TTL (`None` if it never expires).
    ///
    /// A key that expires between the two reads is reported as `NotFound`.
    pub async fn get_with_ttl(&self, ctx: &Context, key: &str) -> Result<(Vec<u8>, Option<Duration>)> {
        let value = self.get(ctx, key).await?;
        let ttl = ctx.run(self.client.ttl(key)).await?;
        Ok((value, ttl))
    }

    /// Store `value` under `key` with a jittered TTL, then attach any tags.
    pub async fn set(&self, ctx: &Context, key: &str, value: &[u8], options: &EntryOptions) -> Result<()> {
        let ttl = jittered_ttl(options.ttl.unwrap_or(self.default_ttl), rand::random::<f64>());
        let expiry = (!ttl.is_zero()).then_some(ttl);

        if let Err(e) = ctx.run(self.client.set(key, value, expiry)).await {
            error!("Remote set failed for {}: {}", key, e);
            return Err(e);
        }

        if !options.tags.is_empty() {
            self.set_tags(ctx, key, &options.tags).await;
        }

        Ok(())
    }

    /// Add `key` to each tag set and push the set's expiry out.
    /// Failures here are logged and swallowed.
    async fn set_tags(&self, ctx: &Context, key: &str, tags: &[String]) {
        let member = [key.to_string()];

        for tag in tags {
            let tag_key = tag_key(tag);

            if let Err(e) = ctx.run(self.client.sadd(&tag_key, &member)).await {
                warn!("Failed to add {} to tag {}: {}", key, tag, e);
                continue;
            }

            if let Err(e) = ctx.run(self.client.expire(&tag_key, TAG_TTL)).await {
                warn!("Failed to refresh TTL of tag {}: {}", tag, e);
            }
        }
    }

    /// Remove `key`.
    pub async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        ctx.run(self.client.del(&[key.to_string()])).await?;
        Ok(())
    }

    /// Delete every key carrying one of `tags`, then the tag sets themselves.
    ///
    /// Deletion failures are collected and returned together; a tag whose
    /// members cannot be listed is skipped.
    pub async fn invalidate_by_tags<S: AsRef<str> + Sync>(&self, ctx: &Context, tags: &[S]) -> Result<()> {
        let mut errors = Vec::new();

        for tag in tags {
            let tag = tag.as_ref();
            let tag_key = tag_key(tag);

            let members = match ctx.run(self.client.smembers(&tag_key)).await {
                Ok(members) => members,
                Err(e) => {
                    warn!("Skipping tag {}: cannot list members: {}", tag, e);
                    continue;
                }
            };

            for member in &members {
                if let Err(e) = self.delete(ctx, member).await {
                    errors.push(e);
                }
            }

            if let Err(e) = self.delete(ctx, &tag_key).await {
                errors.push(e);
            }

            debug!("Invalidated tag {} ({} keys)", tag, members.len());
        }

        CacheError::aggregate(errors)
    }

    /// Flush the entire remote store. Administrative use only.
    pub async fn clear(&self, ctx: &Context) -> Result<()> {
        ctx.run(self.client.flush_all()).await?;
        info!("Remote store flushed");
        Ok(())
    }
}

impl std::fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStore")
            .field("store_type", &STORE_TYPE)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}
