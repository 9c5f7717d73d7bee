//! Cache backend with L1 (DashMap) and optional L2 (Redis) tiers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_redis::Pool;
use recados_storage::{CacheError, CacheStore};
use redis::AsyncCommands;

use super::pubsub::INVALIDATION_CHANNEL;

/// A cached entry with TTL support.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            cached_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

#[derive(Clone)]
enum Tiers {
    /// Single instance: local DashMap only
    Local(Arc<DashMap<String, CachedEntry>>),

    /// Multiple instances: Redis + local L1
    Redis {
        redis: Pool,
        local: Arc<DashMap<String, CachedEntry>>,
    },
}

/// Production [`CacheStore`].
///
/// Unlike a fire-and-forget cache, `set` and `delete` complete only after the
/// Redis command has been acknowledged, so a caller that sees `Ok` from
/// `delete` knows no tier still holds the key. `set` touches L1 only once L2
/// has accepted the value.
///
/// Every L1 eviction, local or received over pub/sub, bumps `evictions`.
/// An L2 hit is promoted into L1 and dropped again if an eviction ran
/// while it was in flight, so a read that fetched a value just before its
/// deletion cannot park it in L1.
pub struct CacheBackend {
    tiers: Tiers,
    ttl: Duration,
    refreshing: AtomicBool,
    evictions: Arc<AtomicU64>,
}

impl CacheBackend {
    pub fn new_local(ttl: Duration) -> Self {
        Self {
            tiers: Tiers::Local(Arc::new(DashMap::new())),
            ttl,
            refreshing: AtomicBool::new(false),
            evictions: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn new_redis(redis_pool: Pool, ttl: Duration) -> Self {
        Self {
            tiers: Tiers::Redis {
                redis: redis_pool,
                local: Arc::new(DashMap::new()),
            },
            ttl,
            refreshing: AtomicBool::new(false),
            evictions: Arc::new(AtomicU64::new(0)),
        }
    }

    /// `"local"` or `"redis"`.
    pub fn mode(&self) -> &'static str {
        match self.tiers {
            Tiers::Local(_) => "local",
            Tiers::Redis { .. } => "redis",
        }
    }

    pub fn l1_len(&self) -> usize {
        self.local_cache().len()
    }

    /// The L1 map, shared with the invalidation listener.
    pub fn local_cache(&self) -> &Arc<DashMap<String, CachedEntry>> {
        match &self.tiers {
            Tiers::Local(map) => map,
            Tiers::Redis { local, .. } => local,
        }
    }

    /// Eviction counter, shared with the invalidation listener.
    pub fn eviction_counter(&self) -> &Arc<AtomicU64> {
        &self.evictions
    }

    /// For readiness checks. Always `true` in local mode.
    pub async fn is_available(&self) -> bool {
        match &self.tiers {
            Tiers::Local(_) => true,
            Tiers::Redis { redis, .. } => redis.get().await.is_ok(),
        }
    }

    fn l1_get(local: &DashMap<String, CachedEntry>, key: &str) -> Option<Arc<Vec<u8>>> {
        if let Some(entry) = local.get(key) {
            if !entry.is_expired() {
                return Some(Arc::clone(&entry.data));
            }
            drop(entry);
            local.remove(key);
        }
        None
    }
}

#[async_trait]
impl CacheStore for CacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError> {
        match &self.tiers {
            Tiers::Local(map) => {
                let result = Self::l1_get(map, key);
                if result.is_some() {
                    crate::metrics::record_cache_hit("L1");
                } else {
                    crate::metrics::record_cache_miss();
                }
                Ok(result)
            }
            Tiers::Redis { redis, local } => {
                if let Some(data) = Self::l1_get(local, key) {
                    tracing::debug!(key = %key, "cache hit (L1)");
                    crate::metrics::record_cache_hit("L1");
                    return Ok(Some(data));
                }

                let seen = self.evictions.load(Ordering::SeqCst);
                let mut conn = redis
                    .get()
                    .await
                    .map_err(|e| CacheError::unavailable(e.to_string()))?;
                let value: Option<Vec<u8>> = conn
                    .get(key)
                    .await
                    .map_err(|e| CacheError::command(e.to_string()))?;

                match value {
                    Some(data) => {
                        tracing::debug!(key = %key, "cache hit (L2)");
                        crate::metrics::record_cache_hit("L2");
                        let entry = CachedEntry::new(data, self.ttl);
                        let data = Arc::clone(&entry.data);
                        local.insert(key.to_string(), entry);
                        if self.evictions.load(Ordering::SeqCst) != seen {
                            local.remove(key);
                        }
                        Ok(Some(data))
                    }
                    None => {
                        crate::metrics::record_cache_miss();
                        Ok(None)
                    }
                }
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        match &self.tiers {
            Tiers::Local(map) => {
                map.insert(key.to_string(), CachedEntry::new(value, self.ttl));
                Ok(())
            }
            Tiers::Redis { redis, local } => {
                let mut conn = redis
                    .get()
                    .await
                    .map_err(|e| CacheError::unavailable(e.to_string()))?;
                conn.set_ex::<_, _, ()>(key, value.as_slice(), self.ttl.as_secs().max(1))
                    .await
                    .map_err(|e| CacheError::command(e.to_string()))?;
                local.insert(key.to_string(), CachedEntry::new(value, self.ttl));
                tracing::debug!(key = %key, "cache set (L2+L1)");
                Ok(())
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match &self.tiers {
            Tiers::Local(map) => {
                self.evictions.fetch_add(1, Ordering::SeqCst);
                map.remove(key);
                tracing::debug!(key = %key, "cache invalidated (local)");
                Ok(())
            }
            Tiers::Redis { redis, local } => {
                local.remove(key);

                let mut conn = redis
                    .get()
                    .await
                    .map_err(|e| CacheError::unavailable(e.to_string()))?;
                conn.del::<_, ()>(key)
                    .await
                    .map_err(|e| CacheError::command(e.to_string()))?;
                // Other instances drop their L1 copy on this message.
                conn.publish::<_, _, ()>(INVALIDATION_CHANNEL, key)
                    .await
                    .map_err(|e| CacheError::command(e.to_string()))?;
                // catches an L2 read that promoted the old value meanwhile
                self.evictions.fetch_add(1, Ordering::SeqCst);
                local.remove(key);
                tracing::debug!(key = %key, "cache invalidated (L1+L2+pub/sub)");
                Ok(())
            }
        }
    }

    fn set_refreshing(&self, refreshing: bool) -> bool {
        self.refreshing.swap(refreshing, Ordering::SeqCst)
    }

    fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }
}
