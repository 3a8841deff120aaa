//! End-to-end tests over the in-process remote client and an in-memory
//! query executor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tiercache::cache::{
    CacheManager, Client, EntryOptions, MemoryClient, RemoteClient, RemoteStore, TierPolicy, TypeTemplate, tag_key,
};
use tiercache::context::Context;
use tiercache::database::{
    Currency, Filter, MemoryExecutor, QueryExecutor, db_load, int64_convert, noop_convert, range_convert,
};
use tiercache::error::{CacheError, Result};
use tiercache::metrics::CountingMetrics;

const TTL: Duration = Duration::from_secs(60);

fn currencies() -> Vec<Currency> {
    vec![
        Currency::new(1, "USD"),
        Currency::new(2, "EUR"),
        Currency::new(3, "ACW"),
        Currency::new(5, "GBP"),
        Currency::new(8, "JPY"),
    ]
}

/// Executor that answers slowly, optionally with an error.
struct SlowExecutor {
    inner: MemoryExecutor<Currency>,
    delay: Duration,
    fail: bool,
}

impl SlowExecutor {
    fn new(delay: Duration, fail: bool) -> Self {
        Self {
            inner: MemoryExecutor::new(currencies()),
            delay,
            fail,
        }
    }
}

#[async_trait]
impl QueryExecutor<Currency> for SlowExecutor {
    async fn find(&self, ctx: &Context, filter: &Filter) -> Result<Vec<Currency>> {
        let rows = self.inner.find(ctx, filter).await?;
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(CacheError::Query("database unavailable".to_string()));
        }
        Ok(rows)
    }
}

struct Harness {
    remote: Arc<MemoryClient>,
    metrics: Arc<CountingMetrics>,
    manager: CacheManager,
}

fn harness() -> Harness {
    let remote = Arc::new(MemoryClient::new());
    let metrics = Arc::new(CountingMetrics::new());
    let manager = CacheManager::new(RemoteStore::new(remote.clone())).with_metrics(metrics.clone());
    Harness {
        remote,
        metrics,
        manager,
    }
}

fn by_id<E>(
    manager: &CacheManager,
    executor: Arc<E>,
    policy: TierPolicy,
) -> Client<TypeTemplate<Option<Currency>>>
where
    E: QueryExecutor<Currency> + 'static,
{
    let load = db_load(executor, "id", "", "currency", int64_convert(), || None::<Currency>).unwrap();
    let ty = TypeTemplate::new("currency", load, || None::<Currency>).unwrap();
    manager.register(ty, TTL, policy).unwrap()
}

#[tokio::test]
async fn registering_a_prefix_twice_fails_and_keeps_the_first() {
    let h = harness();
    let executor = Arc::new(MemoryExecutor::new(currencies()));
    let first = by_id(&h.manager, executor.clone(), TierPolicy::RemoteOnly);
    let before = h.manager.registration("currency");

    let load = db_load(executor.clone(), "name", "", "currency", noop_convert(), || None::<Currency>).unwrap();
    let again = TypeTemplate::new("currency", load, || None::<Currency>).unwrap();
    let err = h
        .manager
        .register(again, Duration::from_secs(1), TierPolicy::LocalAndRemote)
        .unwrap_err();

    assert!(matches!(err, CacheError::DuplicatePrefix(_)));
    assert_eq!(h.manager.registration("currency"), before);
    assert_eq!(h.manager.len(), 1);

    // The surviving client still answers by id.
    let usd = first.get(&Context::background(), "1").await.unwrap();
    assert_eq!(usd.map(|c| c.name), Some("USD".to_string()));
}

#[tokio::test]
async fn first_get_loads_once_and_later_gets_hit_the_cache() {
    for policy in [TierPolicy::RemoteOnly, TierPolicy::LocalAndRemote] {
        let h = harness();
        let executor = Arc::new(MemoryExecutor::new(currencies()));
        let client = by_id(&h.manager, executor.clone(), policy);
        let ctx = Context::background();

        let first = client.get(&ctx, "2").await.unwrap();
        assert_eq!(first.as_ref().map(|c| c.name.as_str()), Some("EUR"));
        assert_eq!(executor.queries(), 1);
        assert!(h.remote.get("currency:2").await.unwrap().is_some());

        for _ in 0..5 {
            assert_eq!(client.get(&ctx, "2").await.unwrap(), first);
        }
        assert_eq!(executor.queries(), 1, "{policy:?} reloaded a cached key");
        assert_eq!(h.metrics.snapshot("currency").loads, 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_share_one_load() {
    let h = harness();
    let executor = Arc::new(SlowExecutor::new(Duration::from_millis(50), false));
    let client = by_id(&h.manager, executor.clone(), TierPolicy::LocalAndRemote);

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.get(&Context::background(), "3").await })
        })
        .collect();

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap().unwrap());
    }

    assert_eq!(executor.inner.queries(), 1);
    assert_eq!(h.metrics.loads("currency"), 1);
    assert!(results.iter().all(|r| r == &results[0]));
    assert_eq!(results[0].as_ref().map(|c| c.id), Some(3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_share_one_failure() {
    let h = harness();
    let executor = Arc::new(SlowExecutor::new(Duration::from_millis(50), true));
    let client = by_id(&h.manager, executor.clone(), TierPolicy::RemoteOnly);

    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.get(&Context::background(), "1").await })
        })
        .collect();

    for task in tasks {
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err.root_cause(), CacheError::Query(_)));
    }

    assert_eq!(executor.inner.queries(), 1);
    assert_eq!(h.metrics.snapshot("currency").load_errors, 1);
    assert!(h.remote.is_empty(), "a failed load must not be cached");
}

#[tokio::test]
async fn invalidate_forces_a_reload() {
    for policy in [TierPolicy::RemoteOnly, TierPolicy::LocalAndRemote] {
        let h = harness();
        let executor = Arc::new(MemoryExecutor::new(currencies()));
        let client = by_id(&h.manager, executor.clone(), policy);
        let ctx = Context::background();

        client.get(&ctx, "5").await.unwrap();
        client.invalidate(&ctx, "5").await.unwrap();
        assert_eq!(h.remote.get("currency:5").await.unwrap(), None);

        client.get(&ctx, "5").await.unwrap();
        assert_eq!(executor.queries(), 2, "{policy:?} served a stale entry");
    }
}

#[tokio::test]
async fn results_are_independent_copies() {
    for policy in [TierPolicy::RemoteOnly, TierPolicy::LocalAndRemote] {
        let h = harness();
        let client = by_id(&h.manager, Arc::new(MemoryExecutor::new(currencies())), policy);
        let ctx = Context::background();

        let mut first = client.get(&ctx, "8").await.unwrap().unwrap();
        first.name.push_str("-mutated");

        let second = client.get(&ctx, "8").await.unwrap().unwrap();
        assert_eq!(second.name, "JPY", "{policy:?} shared a mutable value");
    }
}

#[tokio::test]
async fn range_key_loads_the_batch_in_one_query() {
    let h = harness();
    let executor = Arc::new(MemoryExecutor::new(currencies()));
    let load = db_load(executor.clone(), "id", "in", "currencyByIDBatch", range_convert(), Vec::<Currency>::new).unwrap();
    let ty = TypeTemplate::new("currencyByIDBatch", load, Vec::<Currency>::new).unwrap();
    let client = h.manager.register(ty, TTL, TierPolicy::RemoteOnly).unwrap();
    let ctx = Context::background();

    let rows = client.get(&ctx, "1-10").await.unwrap();
    assert_eq!(rows.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2, 3, 5, 8]);
    assert_eq!(executor.queries(), 1);

    // Served from the remote tier the second time.
    assert_eq!(client.get(&ctx, "1-10").await.unwrap(), rows);
    assert_eq!(executor.queries(), 1);
}

#[tokio::test]
async fn bad_keys_fail_without_querying_or_caching() {
    let h = harness();
    let executor = Arc::new(MemoryExecutor::new(currencies()));
    let client = by_id(&h.manager, executor.clone(), TierPolicy::LocalAndRemote);

    let err = client.get(&Context::background(), "usd").await.unwrap_err();

    assert!(matches!(err, CacheError::Load { .. }));
    assert!(matches!(err.root_cause(), CacheError::Conversion { .. }));
    assert_eq!(executor.queries(), 0);
    assert!(h.remote.is_empty());
}

#[tokio::test]
async fn lookup_by_name_through_the_remote_tier() {
    let h = harness();
    let executor = Arc::new(MemoryExecutor::new(currencies()));
    let load = db_load(executor.clone(), "name", "", "currencyByName", noop_convert(), || None::<Currency>).unwrap();
    let ty = TypeTemplate::new("currencyByName", load, || None::<Currency>).unwrap();
    let client = h.manager.register(ty, TTL, TierPolicy::RemoteOnly).unwrap();

    let acw = client.get(&Context::background(), "ACW").await.unwrap();
    assert_eq!(acw.map(|c| c.id), Some(3));

    let missing = client.get(&Context::background(), "XXX").await.unwrap();
    assert_eq!(missing, None);
}

#[tokio::test]
async fn managers_sharing_a_remote_store_share_entries() {
    let remote = Arc::new(MemoryClient::new());
    let executor = Arc::new(MemoryExecutor::new(currencies()));

    let first = CacheManager::new(RemoteStore::new(remote.clone()));
    let second = CacheManager::new(RemoteStore::new(remote.clone()));
    let a = by_id(&first, executor.clone(), TierPolicy::LocalAndRemote);
    let b = by_id(&second, executor.clone(), TierPolicy::LocalAndRemote);
    let ctx = Context::background();

    let loaded = a.get(&ctx, "1").await.unwrap();
    let promoted = b.get(&ctx, "1").await.unwrap();

    assert_eq!(loaded, promoted);
    assert_eq!(executor.queries(), 1);
}

#[tokio::test]
async fn tag_invalidation_removes_members_and_the_tag() {
    let h = harness();
    let store = h.manager.store();
    let ctx = Context::background();
    let tagged = EntryOptions::with_ttl(TTL).tag("fiat");

    store.set(&ctx, "k1", b"1", &tagged).await.unwrap();
    store.set(&ctx, "k2", b"2", &tagged).await.unwrap();
    store.set(&ctx, "k3", b"3", &EntryOptions::with_ttl(TTL)).await.unwrap();
    assert_eq!(h.remote.smembers(&tag_key("fiat")).await.unwrap().len(), 2);

    h.manager.invalidate_by_tags(&ctx, &["fiat"]).await.unwrap();

    assert_eq!(h.remote.get("k1").await.unwrap(), None);
    assert_eq!(h.remote.get("k2").await.unwrap(), None);
    assert_eq!(h.remote.get(&tag_key("fiat")).await.unwrap(), None);
    assert_eq!(h.remote.get("k3").await.unwrap(), Some(b"3".to_vec()));
}

#[tokio::test]
async fn clear_empties_the_remote_store() {
    let h = harness();
    let client = by_id(&h.manager, Arc::new(MemoryExecutor::new(currencies())), TierPolicy::RemoteOnly);
    let ctx = Context::background();

    client.get(&ctx, "1").await.unwrap();
    client.get(&ctx, "2").await.unwrap();
    assert_eq!(h.remote.len(), 2);

    h.manager.store().clear(&ctx).await.unwrap();
    assert!(h.remote.is_empty());
}

#[tokio::test]
async fn cancelled_context_fails_the_get() {
    let h = harness();
    let executor = Arc::new(MemoryExecutor::new(currencies()));
    let client = by_id(&h.manager, executor.clone(), TierPolicy::RemoteOnly);

    let ctx = Context::background();
    ctx.cancel();

    let err = client.get(&ctx, "1").await.unwrap_err();
    assert!(matches!(err.root_cause(), CacheError::Cancelled));
    assert_eq!(executor.queries(), 0);
}
