//! In-process remote client.
//!
//! Mirrors the Redis semantics the adapter relies on (string values,
//! member sets, per-key expiry, type errors) without a server. Used by
//! tests and for running the cache without Redis.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::remote::RemoteClient;
use crate::error::{CacheError, Result};

#[derive(Debug, Clone)]
enum Data {
    Bytes(Vec<u8>),
    Members(HashSet<String>),
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    data: Data,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

fn wrong_type() -> CacheError {
    CacheError::Remote(redis::RedisError::from((
        redis::ErrorKind::TypeError,
        "WRONGTYPE Operation against a key holding the wrong kind of value",
    )))
}

/// A [`RemoteClient`] backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryClient {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` against the live entry for `key`, dropping it first if expired.
    fn with_live<T>(&self, key: &str, f: impl FnOnce(Option<&mut MemoryEntry>) -> T) -> T {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }

        f(entries.get_mut(key))
    }
}

#[async_trait]
impl RemoteClient for MemoryClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_live(key, |entry| match entry {
            None => Ok(None),
            Some(MemoryEntry { data: Data::Bytes(bytes), .. }) => Ok(Some(bytes.clone())),
            Some(_) => Err(wrong_type()),
        })
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let entry = MemoryEntry {
            data: Data::Bytes(value.to_vec()),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let removed = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|entry| !entry.is_expired(now))
            .count();

        Ok(removed as u64)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Instant::now();
        self.with_live(key, |entry| match entry {
            Some(entry) => Ok(entry.expires_at.map(|at| at.saturating_duration_since(now))),
            None => Err(CacheError::NotFound(key.to_string())),
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        Ok(self.with_live(key, |entry| match entry {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        }))
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }

        let entry = entries.entry(key.to_string()).or_insert_with(|| MemoryEntry {
            data: Data::Members(HashSet::new()),
            expires_at: None,
        });

        match &mut entry.data {
            Data::Members(set) => {
                let added = members.iter().filter(|m| set.insert((*m).clone())).count();
                Ok(added as u64)
            }
            Data::Bytes(_) => Err(wrong_type()),
        }
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.with_live(key, |entry| match entry {
            None => Ok(Vec::new()),
            Some(MemoryEntry { data: Data::Members(set), .. }) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type()),
        })
    }

    async fn flush_all(&self) -> Result<()> {
        self.entries.lock().clear();
        Ok(())
    }
}
