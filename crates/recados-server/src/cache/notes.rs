//! Note-shaped view over a [`CacheStore`].
//!
//! Two key families are cached:
//!
//! - `note:<uid>`: one note, MessagePack encoded, carrying its owner id
//! - `notes:<owner>`: an owner's full list
//!
//! Reads fall through to the repository whenever the store is refreshing or
//! the key is in the stale set. A failed invalidation puts the key in the
//! stale set; the refresh pass clears it.
//!
//! Fills race with writes: a reader may load a note, a writer may then
//! update and invalidate it, and the reader may finally store its old copy.
//! Every fill therefore carries a [`FillTicket`] taken before the source
//! read. If any invalidation ran in between, the freshly stored value is
//! deleted again.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use recados_core::Note;
use recados_storage::{CacheError, DynCacheStore};
use serde::{Deserialize, Serialize};

pub fn note_key(uid: &str) -> String {
    format!("note:{uid}")
}

pub fn notes_key(owner_id: i64) -> String {
    format!("notes:{owner_id}")
}

/// A parsed cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey {
    Note(String),
    Notes(i64),
}

impl CacheKey {
    pub fn parse(key: &str) -> Option<Self> {
        if let Some(owner) = key.strip_prefix("notes:") {
            return owner.parse().ok().map(Self::Notes);
        }
        key.strip_prefix("note:")
            .filter(|uid| !uid.is_empty())
            .map(|uid| Self::Note(uid.to_string()))
    }
}

/// Bookkeeping for a key whose cached value may be out of date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleEntry {
    /// Owner whose notes the key describes; needed to reload it.
    pub owner_id: i64,
    /// Bumped on every re-mark so a refresh only clears what it saw.
    pub seq: u64,
}

/// Invalidation epoch observed before a source read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket(u64);

#[derive(Serialize, Deserialize)]
struct CachedNotes {
    owner_id: i64,
    notes: Vec<Note>,
}

pub struct NoteCache {
    store: DynCacheStore,
    stale: DashMap<String, StaleEntry>,
    seq: AtomicU64,
    epoch: AtomicU64,
}

impl NoteCache {
    pub fn new(store: DynCacheStore) -> Self {
        Self {
            store,
            stale: DashMap::new(),
            seq: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &DynCacheStore {
        &self.store
    }

    /// Take before reading from the repository; pass to the matching `put_*`.
    pub fn ticket(&self) -> FillTicket {
        FillTicket(self.epoch.load(Ordering::SeqCst))
    }

    pub fn is_stale(&self, key: &str) -> bool {
        self.stale.contains_key(key)
    }

    pub fn stale_len(&self) -> usize {
        self.stale.len()
    }

    /// Snapshot of the stale set.
    pub fn stale_entries(&self) -> Vec<(String, StaleEntry)> {
        self.stale
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    fn bypass(&self, key: &str) -> bool {
        self.store.is_refreshing() || self.is_stale(key)
    }

    async fn read(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        if self.bypass(key) {
            tracing::debug!(key = %key, "cache bypassed");
            return None;
        }
        match self.store.get(key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed");
                None
            }
        }
    }

    /// Returns the cached note only if `owner_id` owns it.
    pub async fn get_note(&self, uid: &str, owner_id: i64) -> Option<Note> {
        let key = note_key(uid);
        let bytes = self.read(&key).await?;
        match rmp_serde::from_slice::<Note>(&bytes) {
            Ok(note) if note.is_owned_by(owner_id) => Some(note),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "undecodable cache entry");
                None
            }
        }
    }

    pub async fn get_notes(&self, owner_id: i64) -> Option<Vec<Note>> {
        let key = notes_key(owner_id);
        let bytes = self.read(&key).await?;
        match rmp_serde::from_slice::<CachedNotes>(&bytes) {
            Ok(cached) if cached.owner_id == owner_id => Some(cached.notes),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "undecodable cache entry");
                None
            }
        }
    }

    /// Read-path fill. Skipped while refreshing or if the key is stale.
    pub async fn put_note(&self, note: &Note, ticket: FillTicket) {
        let key = note_key(&note.uid);
        if self.bypass(&key) {
            return;
        }
        if let Err(e) = self.refill_note(note, ticket).await {
            tracing::debug!(key = %key, error = %e, "cache fill failed");
        }
    }

    pub async fn put_notes(&self, owner_id: i64, notes: &[Note], ticket: FillTicket) {
        let key = notes_key(owner_id);
        if self.bypass(&key) {
            return;
        }
        if let Err(e) = self.refill_notes(owner_id, notes, ticket).await {
            tracing::debug!(key = %key, error = %e, "cache fill failed");
        }
    }

    /// Stores `note` regardless of the refreshing flag. Used by the refresh pass.
    pub(crate) async fn refill_note(&self, note: &Note, ticket: FillTicket) -> Result<(), CacheError> {
        let bytes = rmp_serde::to_vec_named(note).map_err(|e| CacheError::command(e.to_string()))?;
        self.fill(&note_key(&note.uid), note.owner_id, bytes, ticket)
            .await
    }

    pub(crate) async fn refill_notes(
        &self,
        owner_id: i64,
        notes: &[Note],
        ticket: FillTicket,
    ) -> Result<(), CacheError> {
        let cached = CachedNotes {
            owner_id,
            notes: notes.to_vec(),
        };
        let bytes =
            rmp_serde::to_vec_named(&cached).map_err(|e| CacheError::command(e.to_string()))?;
        self.fill(&notes_key(owner_id), owner_id, bytes, ticket).await
    }

    async fn fill(
        &self,
        key: &str,
        owner_id: i64,
        bytes: Vec<u8>,
        ticket: FillTicket,
    ) -> Result<(), CacheError> {
        // A failed set may still have reached some tier, so the epoch is
        // checked whatever it returned.
        let stored = self.store.set(key, bytes).await;
        if self.epoch.load(Ordering::SeqCst) != ticket.0 {
            tracing::debug!(key = %key, "fill raced an invalidation, dropping it");
            if let Err(e) = self.store.delete(key).await {
                tracing::warn!(key = %key, error = %e, "dropping raced fill failed, key marked stale");
                crate::metrics::record_invalidation_failure();
                self.mark_stale(key.to_string(), owner_id);
                return Err(e);
            }
        }
        stored
    }

    pub(crate) async fn evict(&self, key: &str) -> Result<(), CacheError> {
        self.store.delete(key).await
    }

    /// Drops every cached view of note `uid`. Call only after the write is
    /// durable.
    ///
    /// Never fails: a key whose delete fails is logged, counted and marked
    /// stale. Keys touched while a refresh pass runs are marked stale too,
    /// since the pass may be holding a pre-write copy.
    pub async fn invalidate(&self, uid: &str, owner_id: i64) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let refreshing = self.store.is_refreshing();

        for key in [note_key(uid), notes_key(owner_id)] {
            let failed = match self.store.delete(&key).await {
                Ok(()) => false,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "cache invalidation failed, key marked stale");
                    crate::metrics::record_invalidation_failure();
                    true
                }
            };
            if failed || refreshing {
                self.mark_stale(key, owner_id);
            }
        }
    }

    fn mark_stale(&self, key: String, owner_id: i64) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.stale.insert(key, StaleEntry { owner_id, seq });
    }

    /// Removes `key` from the stale set if it was not re-marked since `seq`.
    pub(crate) fn resolve(&self, key: &str, seq: u64) -> bool {
        self.stale.remove_if(key, |_, entry| entry.seq == seq).is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use recados_db_memory::MemoryCache;
    use recados_storage::CacheStore;
    use time::OffsetDateTime;

    use super::*;

    fn note(uid: &str, owner_id: i64, title: &str) -> Note {
        Note {
            uid: uid.into(),
            owner_id,
            title: title.into(),
            details: "d".into(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn setup() -> (Arc<MemoryCache>, NoteCache) {
        let store = Arc::new(MemoryCache::new());
        let cache = NoteCache::new(store.clone());
        (store, cache)
    }

    #[test]
    fn key_parsing() {
        assert_eq!(CacheKey::parse("note:abc"), Some(CacheKey::Note("abc".into())));
        assert_eq!(CacheKey::parse("notes:7"), Some(CacheKey::Notes(7)));
        assert_eq!(CacheKey::parse("notes:x"), None);
        assert_eq!(CacheKey::parse("note:"), None);
        assert_eq!(CacheKey::parse("other"), None);
    }

    #[tokio::test]
    async fn cached_note_is_owner_checked() {
        let (_, cache) = setup();
        let ticket = cache.ticket();
        cache.put_note(&note("a", 1, "t"), ticket).await;

        assert_eq!(cache.get_note("a", 1).await.unwrap().title, "t");
        assert!(cache.get_note("a", 2).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_removes_both_keys() {
        let (store, cache) = setup();
        let ticket = cache.ticket();
        cache.put_note(&note("a", 1, "t"), ticket).await;
        cache.put_notes(1, &[note("a", 1, "t")], ticket).await;

        cache.invalidate("a", 1).await;
        assert!(!store.contains("note:a"));
        assert!(!store.contains("notes:1"));
        assert_eq!(cache.stale_len(), 0);
    }

    #[tokio::test]
    async fn failed_invalidation_marks_stale_and_bypasses() {
        let (store, cache) = setup();
        cache.put_note(&note("a", 1, "old"), cache.ticket()).await;

        store.fail_deletes(true);
        cache.invalidate("a", 1).await;

        assert!(store.contains("note:a"));
        assert!(cache.is_stale("note:a"));
        assert!(cache.is_stale("notes:1"));
        // the old bytes are still in the store but never served
        assert!(cache.get_note("a", 1).await.is_none());
    }

    #[tokio::test]
    async fn fill_that_raced_an_invalidation_is_dropped() {
        let (store, cache) = setup();
        let ticket = cache.ticket();
        // a write lands between the reader's source read and its fill
        cache.invalidate("a", 1).await;
        cache.put_note(&note("a", 1, "old"), ticket).await;

        assert!(!store.contains("note:a"));
    }

    #[tokio::test]
    async fn torn_fill_after_invalidation_is_not_served() {
        let (store, cache) = setup();
        let ticket = cache.ticket();
        cache.invalidate("a", 1).await;

        // the value lands in the store but the set still reports failure
        store.tear_writes(true);
        cache.put_note(&note("a", 1, "old"), ticket).await;
        store.tear_writes(false);

        assert!(!store.contains("note:a"));
        assert!(cache.get_note("a", 1).await.is_none());
    }

    #[tokio::test]
    async fn raced_fill_that_cannot_be_dropped_is_marked_stale() {
        let (store, cache) = setup();
        let ticket = cache.ticket();
        cache.invalidate("a", 1).await;

        store.tear_writes(true);
        store.fail_deletes(true);
        cache.put_note(&note("a", 1, "old"), ticket).await;
        store.tear_writes(false);

        assert!(store.contains("note:a"));
        assert!(cache.is_stale("note:a"));
        assert!(cache.get_note("a", 1).await.is_none());
    }

    #[tokio::test]
    async fn reads_bypass_while_refreshing() {
        let (store, cache) = setup();
        cache.put_note(&note("a", 1, "t"), cache.ticket()).await;

        store.set_refreshing(true);
        assert!(cache.get_note("a", 1).await.is_none());
        store.set_refreshing(false);
        assert!(cache.get_note("a", 1).await.is_some());
    }

    #[tokio::test]
    async fn invalidation_during_refresh_is_marked_stale() {
        let (store, cache) = setup();
        store.set_refreshing(true);
        cache.invalidate("a", 1).await;
        store.set_refreshing(false);

        assert!(cache.is_stale("note:a"));
    }

    #[tokio::test]
    async fn resolve_respects_sequence() {
        let (store, cache) = setup();
        store.fail_deletes(true);
        cache.invalidate("a", 1).await;
        let first = cache
            .stale_entries()
            .into_iter()
            .find(|(k, _)| k == "note:a")
            .map(|(_, e)| e.seq)
            .unwrap();

        cache.invalidate("a", 1).await;
        assert!(!cache.resolve("note:a", first));
        assert!(cache.is_stale("note:a"));
    }
}
