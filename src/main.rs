//! Tiercache - demo binary.
//!
//! Registers currency lookups over MongoDB, then fetches every key given on
//! the command line through the cache and prints the results as JSON.
//!
//! ```text
//! tiercache currency:1 currencyByName:ACW currencyByIDBatch:1-10
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tiercache::cache::{CacheManager, Client, RedisClient, RemoteStore, TierPolicy, TypeTemplate};
use tiercache::config::Config;
use tiercache::context::Context;
use tiercache::database::{
    CURRENCY_COLLECTION, Currency, Database, db_load, int64_convert, noop_convert, range_convert,
};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

const BY_ID: &str = "currency";
const BY_NAME: &str = "currencyByName";
const BY_ID_BATCH: &str = "currencyByIDBatch";

/// Upper bound on a single fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

struct Clients {
    by_id: Client<TypeTemplate<Option<Currency>>>,
    by_name: Client<TypeTemplate<Option<Currency>>>,
    by_id_batch: Client<TypeTemplate<Vec<Currency>>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tiercache=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let keys: Vec<String> = std::env::args().skip(1).collect();
    if keys.is_empty() {
        bail!("usage: tiercache <prefix:key>...");
    }

    let config = Config::from_env()?;
    info!("Configuration loaded successfully");

    info!("Connecting to Redis...");
    let redis = RedisClient::connect(&config.redis_url).await?;

    info!("Connecting to MongoDB...");
    let db = Database::connect(&config.mongodb_uri, &config.mongodb_database).await?;

    let manager = CacheManager::new(RemoteStore::new(Arc::new(redis))).with_local_capacity(config.local_capacity);
    let clients = register(&manager, &db, config.default_ttl)?;

    let ctx = Context::background();
    let shutdown = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling fetches");
            shutdown.cancel();
        }
    });

    for key in &keys {
        let ctx = ctx.with_timeout(FETCH_TIMEOUT);
        match fetch(&clients, &ctx, key).await {
            Ok(json) => println!("{key} => {json}"),
            Err(e) => eprintln!("{key} => error: {e:#}"),
        }
    }

    Ok(())
}

fn register(manager: &CacheManager, db: &Database, ttl: Duration) -> Result<Clients> {
    let executor = Arc::new(db.executor::<Currency>(CURRENCY_COLLECTION));

    let load = db_load(executor.clone(), "id", "", BY_ID, int64_convert(), || None::<Currency>)?;
    let by_id = manager.register(
        TypeTemplate::new(BY_ID, load, || None::<Currency>)?,
        ttl,
        TierPolicy::LocalAndRemote,
    )?;

    let load = db_load(executor.clone(), "name", "", BY_NAME, noop_convert(), || None::<Currency>)?;
    let by_name = manager.register(
        TypeTemplate::new(BY_NAME, load, || None::<Currency>)?,
        ttl,
        TierPolicy::RemoteOnly,
    )?;

    let load = db_load(executor, "id", "in", BY_ID_BATCH, range_convert(), Vec::<Currency>::new)?;
    let by_id_batch = manager.register(
        TypeTemplate::new(BY_ID_BATCH, load, Vec::<Currency>::new)?,
        ttl,
        TierPolicy::RemoteOnly,
    )?;

    info!("Registered cache types: {:?}", manager.prefixes());

    Ok(Clients {
        by_id,
        by_name,
        by_id_batch,
    })
}

async fn fetch(clients: &Clients, ctx: &Context, key: &str) -> Result<String> {
    let Some((prefix, external)) = key.split_once(':') else {
        bail!("key must look like <prefix>:<key>");
    };

    let json = match prefix {
        BY_ID => serde_json::to_string_pretty(&clients.by_id.get(ctx, external).await?)?,
        BY_NAME => serde_json::to_string_pretty(&clients.by_name.get(ctx, external).await?)?,
        BY_ID_BATCH => serde_json::to_string_pretty(&clients.by_id_batch.get(ctx, external).await?)?,
        other => bail!("unknown prefix {other}"),
    };

    Ok(json)
}
