use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use recados_core::{Identity, IdentityDraft};
use recados_storage::{IdentityRepository, StorageError};

/// In-memory identity store.
///
/// Names are indexed separately so that uniqueness is decided under the
/// index shard lock, not by a racy lookup-then-insert.
#[derive(Debug)]
pub struct InMemoryIdentityRepository {
    by_id: DashMap<i64, Identity>,
    by_name: DashMap<String, i64>,
    next_id: AtomicI64,
    unavailable: AtomicBool,
}

impl InMemoryIdentityRepository {
    pub fn new() -> Self {
        Self {
            by_id: DashMap::new(),
            by_name: DashMap::new(),
            next_id: AtomicI64::new(1),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent call fail with a connection error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::connection_error("identity store unavailable"));
        }
        Ok(())
    }
}

impl Default for InMemoryIdentityRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityRepository for InMemoryIdentityRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<Identity>, StorageError> {
        self.check_available()?;
        let Some(id) = self.by_name.get(name).map(|e| *e.value()) else {
            return Ok(None);
        };
        Ok(self.by_id.get(&id).map(|e| e.value().clone()))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Identity>, StorageError> {
        self.check_available()?;
        Ok(self.by_id.get(&id).map(|e| e.value().clone()))
    }

    async fn create(&self, draft: IdentityDraft) -> Result<Identity, StorageError> {
        self.check_available()?;
        match self.by_name.entry(draft.name.clone()) {
            Entry::Occupied(_) => Err(StorageError::already_exists("identity", draft.name)),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let identity = Identity {
                    id,
                    name: draft.name,
                    credential_hash: draft.credential_hash,
                };
                self.by_id.insert(id, identity.clone());
                slot.insert(id);
                tracing::debug!(identity_id = id, "identity created (memory)");
                Ok(identity)
            }
        }
    }
}
