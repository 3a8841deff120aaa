//! Cacheable entity types.
//!
//! A type is a cache prefix, a loader and a constructor for fresh values.
//! Implement [`CacheType`] directly, or build one from closures with
//! [`TypeTemplate`].

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::loadable::Loader;
use super::payload::{decode_into, encode};
use crate::context::Context;
use crate::error::{CacheError, Result};

/// An entity type served through the cache.
#[async_trait]
pub trait CacheType: Send + Sync + 'static {
    /// What the loader produces and the client returns.
    type Value: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Prefix of every cache key of this type.
    fn cache_prefix(&self) -> &str;

    /// Load the value for the internal (prefixed) cache key.
    async fn load(&self, ctx: &Context, key: &str) -> Result<Self::Value>;

    /// A fresh, independently owned value to decode cached payloads into.
    fn new_value(&self) -> Self::Value;
}

/// Wrap an async closure as a [`Loader`].
pub fn loader_fn<V, F, Fut>(f: F) -> Loader<V>
where
    F: Fn(Context, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V>> + Send + 'static,
{
    Arc::new(move |ctx: Context, key: String| f(ctx, key).boxed())
}

/// Adapt a registered type into the loader the load-through cache calls.
pub(crate) fn loader_for<C: CacheType>(ty: Arc<C>) -> Loader<C::Value> {
    Arc::new(move |ctx: Context, key: String| {
        let ty = Arc::clone(&ty);
        async move { ty.load(&ctx, &key).await }.boxed()
    })
}

/// Check a type before it is registered.
///
/// The prefix must be non-blank, and a freshly constructed value must
/// survive the payload codec, since that is how the remote tier stores it.
pub fn validate_type<C: CacheType + ?Sized>(ty: &C) -> Result<()> {
    if ty.cache_prefix().trim().is_empty() {
        return Err(CacheError::EmptyPrefix);
    }

    let bytes = encode(&ty.new_value())
        .map_err(|e| CacheError::InvalidType(format!("constructed value cannot be encoded: {e}")))?;

    let mut target = ty.new_value();
    decode_into(&mut target, &bytes)
        .map_err(|e| CacheError::InvalidType(format!("constructed value cannot be decoded: {e}")))?;

    Ok(())
}

/// A [`CacheType`] built from a prefix, a loader and a constructor.
pub struct TypeTemplate<V> {
    prefix: String,
    load: Loader<V>,
    new_fn: Arc<dyn Fn() -> V + Send + Sync>,
}

impl<V> TypeTemplate<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Build and validate a type.
    pub fn new<F>(prefix: impl Into<String>, load: Loader<V>, new_fn: F) -> Result<Self>
    where
        F: Fn() -> V + Send + Sync + 'static,
    {
        let template = Self {
            prefix: prefix.into(),
            load,
            new_fn: Arc::new(new_fn),
        };
        validate_type(&template)?;
        Ok(template)
    }
}

#[async_trait]
impl<V> CacheType for TypeTemplate<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Value = V;

    fn cache_prefix(&self) -> &str {
        &self.prefix
    }

    async fn load(&self, ctx: &Context, key: &str) -> Result<V> {
        (self.load)(ctx.clone(), key.to_string()).await
    }

    fn new_value(&self) -> V {
        (self.new_fn)()
    }
}

impl<V> std::fmt::Debug for TypeTemplate<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeTemplate")
            .field("prefix", &self.prefix)
            .field("value_type", &std::any::type_name::<V>())
            .finish()
    }
}
