//! Load-through cache with per-key load coalescing.
//!
//! A miss invokes the loader, stores the result and returns it. Concurrent
//! misses on the same key share a single loader invocation, which runs on
//! its own task so it finishes even if every caller stops waiting.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use tracing::{debug, warn};

use super::payload::Payload;
use super::store::Store;
use crate::context::Context;
use crate::error::{CacheError, Result};
use crate::metrics::Metrics;

/// Produces the value for a cache key on a miss.
///
/// Receives the full internal key and the context of the caller that
/// started the load.
pub type Loader<T> = Arc<dyn Fn(Context, String) -> BoxFuture<'static, Result<T>> + Send + Sync>;

type FlightOutcome<T> = std::result::Result<Payload<T>, Arc<CacheError>>;
type SharedOutcome<T> = Shared<BoxFuture<'static, FlightOutcome<T>>>;

/// A running load and the context of the caller that started it.
struct Flight<T> {
    id: u64,
    owner: Context,
    outcome: SharedOutcome<T>,
}

/// Removes the flight's map entry when its task ends, panics included.
/// A newer flight registered under the same key is left alone.
struct FlightGuard<T> {
    in_flight: Arc<DashMap<String, Flight<T>>>,
    key: String,
    id: u64,
}

impl<T> Drop for FlightGuard<T> {
    fn drop(&mut self) {
        self.in_flight.remove_if(&self.key, |_, flight| flight.id == self.id);
    }
}

/// Wraps a [`Store`] with a loader.
///
/// `get` never reports a miss: it either returns a payload or the reason
/// the load failed. Failed loads leave the store untouched.
pub struct LoadThroughCache<T, S> {
    prefix: Arc<str>,
    ttl: Duration,
    store: Arc<S>,
    loader: Loader<T>,
    metrics: Arc<dyn Metrics>,
    in_flight: Arc<DashMap<String, Flight<T>>>,
    next_flight: AtomicU64,
}

impl<T, S> LoadThroughCache<T, S>
where
    T: Serialize + Send + Sync + 'static,
    S: Store<Payload<T>> + 'static,
{
    pub fn new(prefix: impl Into<Arc<str>>, ttl: Duration, store: S, loader: Loader<T>, metrics: Arc<dyn Metrics>) -> Self {
        Self {
            prefix: prefix.into(),
            ttl,
            store: Arc::new(store),
            loader,
            metrics,
            in_flight: Arc::new(DashMap::new()),
            next_flight: AtomicU64::new(0),
        }
    }

    /// The wrapped store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Keys with a load currently running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Join the running load for `key`, or start one owned by `ctx`.
    ///
    /// A load whose owner has already been cancelled or timed out is
    /// replaced rather than joined.
    fn join_or_start(&self, ctx: &Context, key: &str) -> SharedOutcome<T> {
        match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(mut running) => {
                if running.get().owner.check().is_ok() {
                    debug!("Joining in-flight load for {}", key);
                    return running.get().outcome.clone();
                }
                debug!("Replacing load for {} abandoned by its caller", key);
                let flight = self.start_load(ctx.clone(), key.to_string());
                let outcome = flight.outcome.clone();
                running.insert(flight);
                outcome
            }
            Entry::Vacant(slot) => {
                let flight = self.start_load(ctx.clone(), key.to_string());
                let outcome = flight.outcome.clone();
                slot.insert(flight);
                outcome
            }
        }
    }

    /// Spawn the load for `key`. Must be called with the map entry held, so
    /// the task cannot unregister itself before it is registered.
    fn start_load(&self, ctx: Context, key: String) -> Flight<T> {
        let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
        let prefix = Arc::clone(&self.prefix);
        let ttl = self.ttl;
        let store = Arc::clone(&self.store);
        let loader = Arc::clone(&self.loader);
        let metrics = Arc::clone(&self.metrics);
        let in_flight = Arc::clone(&self.in_flight);
        let task_key = key.clone();
        let owner = ctx.clone();

        let task = tokio::spawn(async move {
            // Unregisters before the outcome reaches any waiter.
            let guard = FlightGuard {
                in_flight,
                key: task_key,
                id,
            };
            let outcome = Self::load_and_store(&ctx, &guard.key, &prefix, ttl, &*store, &loader, &*metrics).await;
            outcome.map_err(Arc::new)
        });

        let outcome = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Load task for {} ended abnormally: {}", key, e);
                    Err(Arc::new(CacheError::LoadAborted(e.to_string())))
                }
            }
        }
        .boxed()
        .shared();

        Flight { id, owner, outcome }
    }

    async fn load_and_store(
        ctx: &Context,
        key: &str,
        prefix: &str,
        ttl: Duration,
        store: &S,
        loader: &Loader<T>,
        metrics: &dyn Metrics,
    ) -> Result<Payload<T>> {
        // A flight that finished just before this one started may already
        // have filled the store.
        match store.get(ctx, key).await {
            Ok(payload) => return Ok(payload),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        metrics.record_load(prefix);
        let value = match ctx.run(loader(ctx.clone(), key.to_string())).await {
            Ok(value) => value,
            Err(e) => {
                metrics.record_load_error(prefix);
                warn!("Load failed for {}: {}", key, e);
                return Err(e);
            }
        };

        let payload = Payload::value(value);
        if let Err(e) = store.set(ctx, key, payload.clone(), ttl).await {
            warn!("Loaded {} but could not cache it: {}", key, e);
        }

        Ok(payload)
    }
}

#[async_trait]
impl<T, S> Store<Payload<T>> for LoadThroughCache<T, S>
where
    T: Serialize + Send + Sync + 'static,
    S: Store<Payload<T>> + 'static,
{
    async fn get(&self, ctx: &Context, key: &str) -> Result<Payload<T>> {
        match self.store.get(ctx, key).await {
            Ok(payload) => return Ok(payload),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        self.metrics.record_miss(&self.prefix);
        let flight = self.join_or_start(ctx, key);

        ctx.run(async {
            flight.await.map_err(|source| CacheError::Load {
                key: key.to_string(),
                source,
            })
        })
        .await
    }

    async fn set(&self, ctx: &Context, key: &str, value: Payload<T>, ttl: Duration) -> Result<()> {
        self.store.set(ctx, key, value, ttl).await
    }

    /// Does not wait for a running load; one that finishes after the
    /// delete may put the entry back.
    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        self.store.delete(ctx, key).await
    }
}
