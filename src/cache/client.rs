//! Per-type cache client.

use std::sync::Arc;

use super::loadable::LoadThroughCache;
use super::payload::{Payload, decode_into};
use super::store::Store;
use super::tiered::{TierPolicy, TwoTierCache};
use super::types::CacheType;
use crate::context::Context;
use crate::error::{CacheError, Result};

/// Separator between a type's prefix and the external key.
pub const DELIMITER: &str = ":";

/// Build the internal cache key for `external` under `prefix`.
pub fn cache_key(prefix: &str, external: &str) -> String {
    format!("{prefix}{DELIMITER}{external}")
}

/// Handle returned by registration; all reads for one type go through it.
///
/// Clone-friendly: clones share the same cache stack.
pub struct Client<C: CacheType> {
    ty: Arc<C>,
    cache: Arc<LoadThroughCache<C::Value, TwoTierCache<C::Value>>>,
}

impl<C: CacheType> Clone for Client<C> {
    fn clone(&self) -> Self {
        Self {
            ty: Arc::clone(&self.ty),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<C: CacheType> Client<C> {
    pub(crate) fn new(ty: Arc<C>, cache: LoadThroughCache<C::Value, TwoTierCache<C::Value>>) -> Self {
        Self {
            ty,
            cache: Arc::new(cache),
        }
    }

    pub fn prefix(&self) -> &str {
        self.ty.cache_prefix()
    }

    pub fn policy(&self) -> TierPolicy {
        self.cache.store().policy()
    }

    /// Internal key for `external`.
    pub fn cache_key(&self, external: &str) -> String {
        cache_key(self.prefix(), external)
    }

    /// Fetch the value for `key`, loading it on a miss.
    ///
    /// Every call returns its own value; mutating it never affects what
    /// other callers see.
    pub async fn get(&self, ctx: &Context, key: &str) -> Result<C::Value> {
        let internal = self.cache_key(key);

        let payload = self.cache.get(ctx, &internal).await.map_err(|e| match e {
            CacheError::Load { .. } => e,
            other => CacheError::Load {
                key: internal.clone(),
                source: Arc::new(other),
            },
        })?;

        match payload {
            Payload::Encoded(bytes) => {
                let mut record = self.ty.new_value();
                decode_into(&mut record, &bytes).map_err(|source| CacheError::Decode {
                    key: internal,
                    source,
                })?;
                Ok(record)
            }
            Payload::Value(value) => Ok(C::Value::clone(&value)),
        }
    }

    /// Drop `key` from every tier; the next `get` reloads it.
    pub async fn invalidate(&self, ctx: &Context, key: &str) -> Result<()> {
        self.cache.delete(ctx, &self.cache_key(key)).await
    }
}

impl<C: CacheType> std::fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("prefix", &self.prefix())
            .field("policy", &self.policy())
            .finish()
    }
}
