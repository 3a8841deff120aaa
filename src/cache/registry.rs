//! Cache manager - registration of cacheable types.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::client::Client;
use super::loadable::LoadThroughCache;
use super::remote::RemoteStore;
use super::tiered::{TierPolicy, TwoTierCache};
use super::types::{CacheType, loader_for, validate_type};
use crate::context::Context;
use crate::error::{CacheError, Result};
use crate::metrics::{Metrics, NoopMetrics};

/// Default bound on each type's local tier.
pub const DEFAULT_LOCAL_CAPACITY: u64 = 10_000;

/// What was registered under a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub prefix: String,
    pub ttl: Duration,
    pub policy: TierPolicy,
    pub type_name: &'static str,
}

/// Central registry of cacheable types over one remote store.
///
/// Each prefix can be registered once. Registration hands back a
/// [`Client`] that owns the type's cache stack.
///
/// ## Example
///
/// ```rust,ignore
/// let manager = CacheManager::new(RemoteStore::new(redis));
/// let currencies = manager.register(currency_type, Duration::from_secs(60), TierPolicy::LocalAndRemote)?;
/// let usd = currencies.get(&ctx, "1").await?;
/// ```
#[derive(Clone)]
pub struct CacheManager {
    remote: RemoteStore,
    types: Arc<RwLock<HashMap<String, Registration>>>,
    metrics: Arc<dyn Metrics>,
    local_capacity: u64,
}

impl CacheManager {
    pub fn new(remote: RemoteStore) -> Self {
        info!("Cache manager initialized ({} store)", remote.store_type());
        Self {
            remote,
            types: Arc::new(RwLock::new(HashMap::new())),
            metrics: Arc::new(NoopMetrics),
            local_capacity: DEFAULT_LOCAL_CAPACITY,
        }
    }

    /// Report hits, misses and loads of every type registered afterwards.
    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Bound the local tier of every type registered afterwards.
    pub fn with_local_capacity(mut self, capacity: u64) -> Self {
        self.local_capacity = capacity;
        self
    }

    /// Register `ty` and build its client.
    ///
    /// Fails with [`CacheError::DuplicatePrefix`] if the prefix is taken,
    /// leaving the existing registration untouched.
    pub fn register<C: CacheType>(&self, ty: C, ttl: Duration, policy: TierPolicy) -> Result<Client<C>> {
        validate_type(&ty)?;
        let prefix = ty.cache_prefix().to_string();

        {
            let mut types = self.types.write();
            if types.contains_key(&prefix) {
                return Err(CacheError::DuplicatePrefix(prefix));
            }
            types.insert(
                prefix.clone(),
                Registration {
                    prefix: prefix.clone(),
                    ttl,
                    policy,
                    type_name: std::any::type_name::<C::Value>(),
                },
            );
        }

        let ty = Arc::new(ty);
        let tiers = TwoTierCache::with_policy(
            policy,
            prefix.as_str(),
            ttl,
            self.local_capacity,
            self.remote.clone(),
            Arc::clone(&self.metrics),
        );
        let cache = LoadThroughCache::new(
            prefix.as_str(),
            ttl,
            tiers,
            loader_for(Arc::clone(&ty)),
            Arc::clone(&self.metrics),
        );

        info!("Registered cache type {} ({:?}, ttl {:?})", prefix, policy, ttl);
        Ok(Client::new(ty, cache))
    }

    /// Whether `prefix` is registered.
    pub fn contains(&self, prefix: &str) -> bool {
        self.types.read().contains_key(prefix)
    }

    pub fn registration(&self, prefix: &str) -> Option<Registration> {
        self.types.read().get(prefix).cloned()
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }

    /// Registered prefixes, sorted.
    pub fn prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = self.types.read().keys().cloned().collect();
        prefixes.sort();
        prefixes
    }

    /// The shared remote store, for tag invalidation and clearing.
    pub fn store(&self) -> &RemoteStore {
        &self.remote
    }

    /// Delete every remote entry tagged with any of `tags`.
    pub async fn invalidate_by_tags<S: AsRef<str> + Sync>(&self, ctx: &Context, tags: &[S]) -> Result<()> {
        debug!("Invalidating {} tag(s)", tags.len());
        self.remote.invalidate_by_tags(ctx, tags).await
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("store", &self.remote.store_type())
            .field("type_count", &self.len())
            .field("prefixes", &self.prefixes())
            .finish()
    }
}
