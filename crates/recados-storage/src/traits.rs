//! Port traits implemented by persistence and cache backends.

use std::sync::Arc;

use async_trait::async_trait;
use recados_core::{Identity, IdentityDraft, Note, NoteChanges, NoteDraft};

use crate::error::{CacheError, StorageError};

/// Lookup and creation of registered identities.
///
/// Implementations must enforce uniqueness of `name` and report a violation
/// as [`StorageError::AlreadyExists`].
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Finds an identity by its unique name.
    async fn find_by_name(&self, name: &str) -> Result<Option<Identity>, StorageError>;

    /// Finds an identity by id.
    async fn find_by_id(&self, id: i64) -> Result<Option<Identity>, StorageError>;

    /// Persists a new identity and returns it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the name is taken.
    async fn create(&self, draft: IdentityDraft) -> Result<Identity, StorageError>;
}

/// CRUD over notes.
///
/// Reads are always scoped by owner, so a caller can never observe a note
/// belonging to someone else through this trait.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Persists a new note.
    async fn create(&self, draft: NoteDraft) -> Result<Note, StorageError>;

    /// Returns the note with `uid` only if it is owned by `owner_id`.
    async fn find_by_uid_and_owner(
        &self,
        uid: &str,
        owner_id: i64,
    ) -> Result<Option<Note>, StorageError>;

    /// Returns every note owned by `owner_id`, oldest first.
    async fn find_all_by_owner(&self, owner_id: i64) -> Result<Vec<Note>, StorageError>;

    /// Applies `changes` to the note and returns the stored result.
    ///
    /// Only the fields present in `changes` are written, in a single atomic
    /// step, so disjoint concurrent edits of the same note both survive. The
    /// row is matched on both uid and owner; ownership is never rewritten.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no such note exists for that owner.
    async fn update(
        &self,
        uid: &str,
        owner_id: i64,
        changes: NoteChanges,
    ) -> Result<Note, StorageError>;

    /// Removes the note and returns the number of rows affected (0 or 1).
    async fn delete(&self, uid: &str) -> Result<u64, StorageError>;
}

/// Key/value cache with a process-wide `refreshing` signal.
///
/// `delete` must be atomic at key granularity and must not return before the
/// key is gone from every tier the implementation manages.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the cached bytes for `key`, if present and fresh.
    async fn get(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError>;

    /// Stores `value` under `key`, replacing any previous entry.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError>;

    /// Removes `key`.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Raises or lowers the `refreshing` flag and returns its previous value.
    ///
    /// The swap is atomic, so exactly one caller observes `false` when
    /// several race to raise the flag.
    fn set_refreshing(&self, refreshing: bool) -> bool;

    /// Returns `true` while a repopulation pass is running.
    fn is_refreshing(&self) -> bool;
}
