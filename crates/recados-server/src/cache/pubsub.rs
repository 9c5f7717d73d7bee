//! Cross-instance L1 invalidation over Redis Pub/Sub.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;

use super::backend::CachedEntry;

/// Channel every instance publishes deleted keys to.
pub const INVALIDATION_CHANNEL: &str = "cache:invalidate";

const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Subscribes to [`INVALIDATION_CHANNEL`] and removes each received key from
/// this instance's L1 map.
///
/// ```text
/// Instance 1: cache.delete("note:abc")
///   -> DEL note:abc, PUBLISH cache:invalidate "note:abc"
/// Instance 2: listener receives "note:abc" -> removes from L1
/// ```
pub struct CacheInvalidationListener {
    pub redis_url: String,
    pub local_cache: Arc<DashMap<String, CachedEntry>>,
    /// Bumped before each removal; see [`super::CacheBackend`].
    pub evictions: Arc<AtomicU64>,
}

impl CacheInvalidationListener {
    /// Spawns the listener. It reconnects with exponential backoff until the
    /// returned handle is aborted.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut backoff = Duration::from_secs(1);
            loop {
                match self.run().await {
                    Ok(()) => {
                        tracing::warn!("pub/sub connection closed, resubscribing");
                        backoff = Duration::from_secs(1);
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            backoff_secs = backoff.as_secs(),
                            "Cache invalidation listener error, reconnecting"
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        })
    }

    fn evict(&self, key: &str) {
        self.evictions.fetch_add(1, Ordering::SeqCst);
        self.local_cache.remove(key);
    }

    async fn run(&self) -> Result<(), String> {
        use futures_util::StreamExt;

        let client = redis::Client::open(self.redis_url.as_str())
            .map_err(|e| format!("failed to create Redis client: {e}"))?;
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| format!("failed to get pub/sub connection: {e}"))?;
        pubsub
            .subscribe(INVALIDATION_CHANNEL)
            .await
            .map_err(|e| format!("failed to subscribe: {e}"))?;

        tracing::info!(channel = INVALIDATION_CHANNEL, "Subscribed to cache invalidations");

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            match msg.get_payload::<String>() {
                Ok(key) => {
                    tracing::debug!(key = %key, "received cache invalidation");
                    self.evict(&key);
                }
                Err(e) => tracing::warn!(error = %e, "unreadable invalidation payload"),
            }
        }
        Ok(())
    }
}
