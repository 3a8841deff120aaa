//! Typed cache wrapper around Moka.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::sync::Cache;

use super::CacheConfig;

/// Value plus the TTL it was inserted with.
#[derive(Clone)]
struct Timed<V> {
    value: V,
    ttl: Option<Duration>,
}

/// Expires each entry after the TTL it carries.
/// Re-inserting a key restarts its clock.
struct PerEntryExpiry;

impl<K, V> Expiry<K, Timed<V>> for PerEntryExpiry {
    fn expire_after_create(&self, _key: &K, entry: &Timed<V>, _created_at: Instant) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_update(
        &self,
        _key: &K,
        entry: &Timed<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        entry.ttl
    }
}

/// A typed cache wrapper that provides a clean API over Moka.
///
/// This cache is:
/// - Thread-safe (uses Arc internally)
/// - Bounded, with an optional cache-wide TTL and a per-entry TTL
/// - Clone-friendly (cloning is cheap, shares the same underlying cache)
pub struct TypedCache<K, V> {
    inner: Arc<Cache<K, Timed<V>>>,
    name: Arc<str>,
}

// Manual Clone implementation that doesn't require K: Clone, V: Clone
impl<K, V> Clone for TypedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            name: Arc::clone(&self.name),
        }
    }
}

impl<K, V> TypedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a new typed cache with the given name and config.
    pub fn new(name: impl Into<Arc<str>>, config: CacheConfig) -> Self {
        let mut builder = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(PerEntryExpiry);

        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }

        Self {
            inner: Arc::new(builder.build()),
            name: name.into(),
        }
    }

    /// Insert a key-value pair that expires after `ttl`.
    ///
    /// A zero `ttl` falls back to the cache-wide TTL.
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let ttl = (!ttl.is_zero()).then_some(ttl);
        self.inner.insert(key, Timed { value, ttl });
    }

    /// Get a value from the cache.
    ///
    /// Returns `Some(value)` if the key exists and hasn't expired.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).map(|entry| entry.value)
    }

    /// Remove a key from the cache.
    pub fn invalidate(&self, key: &K) {
        self.inner.invalidate(key);
    }

    /// Get the number of entries in the cache.
    ///
    /// Note: This may not be perfectly accurate due to concurrent operations.
    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

impl<K, V> std::fmt::Debug for TypedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedCache")
            .field("name", &self.name)
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn config() -> CacheConfig {
        CacheConfig::for_type(100, Duration::ZERO)
    }

    #[test]
    fn test_insert_get_invalidate() {
        let cache: TypedCache<String, u32> = TypedCache::new("numbers", config());

        cache.insert_with_ttl("a".to_string(), 1, Duration::from_secs(60));
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        cache.invalidate(&"a".to_string());
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    #[test]
    fn test_per_entry_ttl_expires() {
        let cache: TypedCache<String, u32> = TypedCache::new("short", config());

        cache.insert_with_ttl("short".to_string(), 1, Duration::from_millis(50));
        cache.insert_with_ttl("long".to_string(), 2, Duration::from_secs(60));
        assert_eq!(cache.get(&"short".to_string()), Some(1));

        sleep(Duration::from_millis(120));

        assert_eq!(cache.get(&"short".to_string()), None);
        assert_eq!(cache.get(&"long".to_string()), Some(2));
    }

    #[test]
    fn test_reinsert_restarts_ttl() {
        let cache: TypedCache<String, u32> = TypedCache::new("restart", config());

        cache.insert_with_ttl("k".to_string(), 1, Duration::from_millis(50));
        cache.insert_with_ttl("k".to_string(), 2, Duration::from_secs(60));

        sleep(Duration::from_millis(120));
        assert_eq!(cache.get(&"k".to_string()), Some(2));
    }

    #[test]
    fn test_cache_wide_ttl_caps_entries() {
        let cache: TypedCache<String, u32> =
            TypedCache::new("capped", CacheConfig::for_type(100, Duration::from_millis(50)));

        cache.insert_with_ttl("k".to_string(), 1, Duration::from_secs(60));
        sleep(Duration::from_millis(120));
        assert_eq!(cache.get(&"k".to_string()), None);
    }

    #[test]
    fn test_entry_count() {
        let cache: TypedCache<u64, u64> = TypedCache::new("bulk", config());
        for i in 0..10 {
            cache.insert_with_ttl(i, i * 2, Duration::ZERO);
        }
        assert_eq!(cache.entry_count(), 10);

        cache.invalidate(&3);
        assert_eq!(cache.entry_count(), 9);
    }
}
