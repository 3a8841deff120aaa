//! Two-tier cache: an in-process map in front of the remote store.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::payload::Payload;
use super::remote::{EntryOptions, RemoteStore};
use super::store::Store;
use super::{CacheConfig, TypedCache};
use crate::context::Context;
use crate::error::{CacheError, Result};
use crate::metrics::{Metrics, Tier};

/// Which tiers a registered type is cached in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierPolicy {
    /// Only the shared remote store.
    RemoteOnly,
    /// An in-process map checked before the remote store.
    LocalAndRemote,
}

/// In-process tier over a bounded moka cache.
pub struct LocalTier<T> {
    cache: TypedCache<String, Payload<T>>,
}

impl<T: Send + Sync + 'static> LocalTier<T> {
    pub fn new(name: &str, config: CacheConfig) -> Self {
        Self {
            cache: TypedCache::new(name, config),
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Store<Payload<T>> for LocalTier<T> {
    async fn get(&self, _ctx: &Context, key: &str) -> Result<Payload<T>> {
        self.cache
            .get(&key.to_string())
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    async fn set(&self, _ctx: &Context, key: &str, value: Payload<T>, ttl: Duration) -> Result<()> {
        self.cache.insert_with_ttl(key.to_string(), value, ttl);
        Ok(())
    }

    async fn delete(&self, _ctx: &Context, key: &str) -> Result<()> {
        self.cache.invalidate(&key.to_string());
        Ok(())
    }
}

/// Remote tier: encodes structured values, hands back encoded bytes.
pub struct RemoteTier<T> {
    store: RemoteStore,
    _marker: PhantomData<fn() -> T>,
}

impl<T> RemoteTier<T> {
    pub fn new(store: RemoteStore) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// Payload plus remaining TTL, for promotion into the local tier.
    pub async fn get_with_ttl(&self, ctx: &Context, key: &str) -> Result<(Payload<T>, Option<Duration>)> {
        let (bytes, ttl) = self.store.get_with_ttl(ctx, key).await?;
        Ok((Payload::encoded(bytes), ttl))
    }
}

#[async_trait]
impl<T: Serialize + Send + Sync + 'static> Store<Payload<T>> for RemoteTier<T> {
    async fn get(&self, ctx: &Context, key: &str) -> Result<Payload<T>> {
        let bytes = self.store.get(ctx, key).await?;
        Ok(Payload::encoded(bytes))
    }

    async fn set(&self, ctx: &Context, key: &str, value: Payload<T>, ttl: Duration) -> Result<()> {
        let bytes = value.to_bytes()?;
        self.store
            .set(ctx, key, &bytes, &EntryOptions::with_ttl(ttl))
            .await
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        self.store.delete(ctx, key).await
    }
}

enum Topology<T> {
    RemoteOnly {
        remote: RemoteTier<T>,
    },
    LocalThenRemote {
        local: LocalTier<T>,
        remote: RemoteTier<T>,
    },
}

/// Composes the tiers selected by a [`TierPolicy`].
///
/// Writes go to every tier. Reads check the local tier first and promote
/// remote hits into it.
pub struct TwoTierCache<T> {
    prefix: Arc<str>,
    ttl: Duration,
    topology: Topology<T>,
    metrics: Arc<dyn Metrics>,
}

impl<T: Serialize + Send + Sync + 'static> TwoTierCache<T> {
    /// Remote-only topology.
    pub fn remote_only(prefix: impl Into<Arc<str>>, ttl: Duration, remote: RemoteStore, metrics: Arc<dyn Metrics>) -> Self {
        Self {
            prefix: prefix.into(),
            ttl,
            topology: Topology::RemoteOnly {
                remote: RemoteTier::new(remote),
            },
            metrics,
        }
    }

    /// Local-then-remote topology with a local tier bounded by `local_capacity`.
    pub fn local_then_remote(
        prefix: impl Into<Arc<str>>,
        ttl: Duration,
        local_capacity: u64,
        remote: RemoteStore,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        let prefix = prefix.into();
        let local = LocalTier::new(&prefix, CacheConfig::for_type(local_capacity, ttl));

        Self {
            prefix,
            ttl,
            topology: Topology::LocalThenRemote {
                local,
                remote: RemoteTier::new(remote),
            },
            metrics,
        }
    }

    /// Build the topology `policy` asks for.
    pub fn with_policy(
        policy: TierPolicy,
        prefix: impl Into<Arc<str>>,
        ttl: Duration,
        local_capacity: u64,
        remote: RemoteStore,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        match policy {
            TierPolicy::RemoteOnly => Self::remote_only(prefix, ttl, remote, metrics),
            TierPolicy::LocalAndRemote => Self::local_then_remote(prefix, ttl, local_capacity, remote, metrics),
        }
    }

    pub fn policy(&self) -> TierPolicy {
        match self.topology {
            Topology::RemoteOnly { .. } => TierPolicy::RemoteOnly,
            Topology::LocalThenRemote { .. } => TierPolicy::LocalAndRemote,
        }
    }

    /// Entries currently held in the local tier (zero when there is none).
    pub fn local_entry_count(&self) -> u64 {
        match &self.topology {
            Topology::RemoteOnly { .. } => 0,
            Topology::LocalThenRemote { local, .. } => local.entry_count(),
        }
    }

    /// TTL for a promoted entry: what the remote has left, capped at ours.
    fn promotion_ttl(&self, remaining: Option<Duration>) -> Duration {
        match remaining {
            Some(left) if !self.ttl.is_zero() => left.min(self.ttl),
            Some(left) => left,
            None => self.ttl,
        }
    }
}

#[async_trait]
impl<T: Serialize + Send + Sync + 'static> Store<Payload<T>> for TwoTierCache<T> {
    async fn get(&self, ctx: &Context, key: &str) -> Result<Payload<T>> {
        match &self.topology {
            Topology::RemoteOnly { remote } => {
                let payload = remote.get(ctx, key).await?;
                self.metrics.record_hit(&self.prefix, Tier::Remote);
                Ok(payload)
            }
            Topology::LocalThenRemote { local, remote } => {
                match local.get(ctx, key).await {
                    Ok(payload) => {
                        self.metrics.record_hit(&self.prefix, Tier::Local);
                        return Ok(payload);
                    }
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }

                let (payload, remaining) = remote.get_with_ttl(ctx, key).await?;
                self.metrics.record_hit(&self.prefix, Tier::Remote);

                local.set(ctx, key, payload.clone(), self.promotion_ttl(remaining)).await?;
                debug!("Promoted {} into local tier", key);

                Ok(payload)
            }
        }
    }

    async fn set(&self, ctx: &Context, key: &str, value: Payload<T>, ttl: Duration) -> Result<()> {
        match &self.topology {
            Topology::RemoteOnly { remote } => remote.set(ctx, key, value, ttl).await,
            Topology::LocalThenRemote { local, remote } => {
                local.set(ctx, key, value.clone(), ttl).await?;
                remote.set(ctx, key, value, ttl).await
            }
        }
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        match &self.topology {
            Topology::RemoteOnly { remote } => remote.delete(ctx, key).await,
            Topology::LocalThenRemote { local, remote } => {
                let mut errors = Vec::new();
                if let Err(e) = local.delete(ctx, key).await {
                    errors.push(e);
                }
                if let Err(e) = remote.delete(ctx, key).await {
                    errors.push(e);
                }
                CacheError::aggregate(errors)
            }
        }
    }
}
