//! Note caching.
//!
//! ```text
//! GET /note → NoteCache → L1 (DashMap) → L2 (Redis) → repository
//! ```
//!
//! - [`backend`]: the byte store, local or Redis backed
//! - [`pubsub`]: cross-instance L1 eviction
//! - [`notes`]: typed note/list entries, stale tracking
//! - [`refresh`]: background pass that repairs stale keys
//!
//! If Redis is disabled or unreachable at startup, the server runs with the
//! local tier only.

pub mod backend;
pub mod notes;
pub mod pubsub;
pub mod refresh;

use std::time::Duration;

use tokio::task::JoinHandle;

pub use backend::{CacheBackend, CachedEntry};
pub use notes::{CacheKey, FillTicket, NoteCache, StaleEntry, note_key, notes_key};
pub use pubsub::{CacheInvalidationListener, INVALIDATION_CHANNEL};
pub use refresh::{CacheRefresher, RefreshOutcome, RefreshReport};

use crate::config::RedisConfig;

/// Builds the cache backend from configuration.
///
/// Returns the invalidation listener handle when running against Redis so
/// the caller can abort it on shutdown.
pub async fn create_cache_backend(
    config: &RedisConfig,
    ttl: Duration,
) -> (CacheBackend, Option<JoinHandle<()>>) {
    if !config.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return (CacheBackend::new_local(ttl), None);
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let timeout = Duration::from_millis(config.timeout_ms);
    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    if let Some(ref mut pool_config) = redis_config.pool {
        pool_config.max_size = config.pool_size;
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);
    }

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create Redis pool. Falling back to local cache.");
            return (CacheBackend::new_local(ttl), None);
        }
    };

    if let Err(e) = pool.get().await {
        tracing::warn!(error = %e, "Failed to connect to Redis. Falling back to local cache.");
        return (CacheBackend::new_local(ttl), None);
    }

    tracing::info!("Connected to Redis");
    let backend = CacheBackend::new_redis(pool, ttl);
    let listener = CacheInvalidationListener {
        redis_url: config.url.clone(),
        local_cache: backend.local_cache().clone(),
        evictions: backend.eviction_counter().clone(),
    }
    .start();

    (backend, Some(listener))
}
