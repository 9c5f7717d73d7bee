use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use recados_storage::{CacheError, CacheStore};

/// Process-local cache with switchable failure modes.
///
/// A test double for exercising invalidation and fill failures. Servers use
/// the local or Redis-backed `CacheBackend` instead.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Arc<Vec<u8>>>,
    refreshing: AtomicBool,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
    tear_writes: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes `set` store the value and then report a failure, like a
    /// two-tier store whose second tier is down.
    pub fn tear_writes(&self, tear: bool) {
        self.tear_writes.store(tear, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("injected read failure"));
        }
        Ok(self.entries.get(key).map(|e| Arc::clone(e.value())))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("injected write failure"));
        }
        self.entries.insert(key.to_string(), Arc::new(value));
        if self.tear_writes.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("injected torn write"));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("injected delete failure"));
        }
        self.entries.remove(key);
        Ok(())
    }

    fn set_refreshing(&self, refreshing: bool) -> bool {
        self.refreshing.swap(refreshing, Ordering::SeqCst)
    }

    fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }
}
