//! Redis-backed remote client.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::info;

use super::remote::RemoteClient;
use crate::error::{CacheError, Result};

/// A [`RemoteClient`] over a Redis connection manager.
///
/// Reconnection is handled by the manager; clones share the connection.
#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
}

impl RedisClient {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/0`) and verify the
    /// server answers.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let mut manager = ConnectionManager::new(client).await?;

        let _: String = redis::cmd("PING").query_async(&mut manager).await?;
        info!("Successfully connected to Redis");

        Ok(Self { manager })
    }

    /// Wrap an existing connection manager.
    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self { manager }
    }
}

/// Milliseconds for Redis, never zero.
fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Interpret a `PTTL` reply: -2 is a missing key, -1 a key without expiry.
fn remaining_ttl(key: &str, pttl: i64) -> Result<Option<Duration>> {
    match pttl {
        -2 => Err(CacheError::NotFound(key.to_string())),
        ms => Ok(u64::try_from(ms).ok().map(Duration::from_millis)),
    }
}

#[async_trait]
impl RemoteClient for RedisClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.manager.clone();
        match ttl {
            Some(ttl) => conn.pset_ex::<_, _, ()>(key, value, millis(ttl)).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.manager.clone();
        Ok(conn.del(keys).await?)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.manager.clone();
        let pttl: i64 = conn.pttl(key).await?;
        remaining_ttl(key, pttl)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.manager.clone();
        let ms = i64::try_from(millis(ttl)).unwrap_or(i64::MAX);
        Ok(conn.pexpire(key, ms).await?)
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<u64> {
        let mut conn = self.manager.clone();
        Ok(conn.sadd(key, members).await?)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        Ok(conn.smembers(key).await?)
    }

    async fn flush_all(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("FLUSHALL").query_async(&mut conn).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient").finish_non_exhaustive()
    }
}
