use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use recados_core::{Note, NoteChanges, NoteDraft};
use recados_storage::{NoteRepository, StorageError};

#[derive(Debug, Clone)]
struct StoredNote {
    seq: u64,
    note: Note,
}

/// In-memory note store keyed by uid.
///
/// Each note remembers its insertion sequence so that listings come back in
/// a stable order for a given store state.
#[derive(Debug)]
pub struct InMemoryNoteRepository {
    notes: DashMap<String, StoredNote>,
    seq: AtomicU64,
    unavailable: AtomicBool,
}

impl InMemoryNoteRepository {
    pub fn new() -> Self {
        Self {
            notes: DashMap::new(),
            seq: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent call fail with a connection error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::connection_error("note store unavailable"));
        }
        Ok(())
    }
}

impl Default for InMemoryNoteRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NoteRepository for InMemoryNoteRepository {
    async fn create(&self, draft: NoteDraft) -> Result<Note, StorageError> {
        self.check_available()?;
        match self.notes.entry(draft.uid.clone()) {
            Entry::Occupied(_) => Err(StorageError::already_exists("note", draft.uid)),
            Entry::Vacant(slot) => {
                let note = Note::from(draft);
                let seq = self.seq.fetch_add(1, Ordering::SeqCst);
                slot.insert(StoredNote {
                    seq,
                    note: note.clone(),
                });
                Ok(note)
            }
        }
    }

    async fn find_by_uid_and_owner(
        &self,
        uid: &str,
        owner_id: i64,
    ) -> Result<Option<Note>, StorageError> {
        self.check_available()?;
        Ok(self
            .notes
            .get(uid)
            .filter(|stored| stored.note.is_owned_by(owner_id))
            .map(|stored| stored.note.clone()))
    }

    async fn find_all_by_owner(&self, owner_id: i64) -> Result<Vec<Note>, StorageError> {
        self.check_available()?;
        let mut owned: Vec<StoredNote> = self
            .notes
            .iter()
            .filter(|entry| entry.note.is_owned_by(owner_id))
            .map(|entry| entry.value().clone())
            .collect();
        owned.sort_by_key(|stored| stored.seq);
        Ok(owned.into_iter().map(|stored| stored.note).collect())
    }

    async fn update(
        &self,
        uid: &str,
        owner_id: i64,
        changes: NoteChanges,
    ) -> Result<Note, StorageError> {
        self.check_available()?;
        // merged under the shard write lock
        let mut stored = self
            .notes
            .get_mut(uid)
            .filter(|stored| stored.note.is_owned_by(owner_id))
            .ok_or_else(|| StorageError::not_found("note", uid))?;
        stored.note.apply(changes);
        Ok(stored.note.clone())
    }

    async fn delete(&self, uid: &str) -> Result<u64, StorageError> {
        self.check_available()?;
        Ok(u64::from(self.notes.remove(uid).is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn draft(uid: &str, owner_id: i64) -> NoteDraft {
        NoteDraft {
            uid: uid.to_string(),
            owner_id,
            title: format!("title {uid}"),
            details: format!("details {uid}"),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn lookups_are_owner_scoped() {
        let repo = InMemoryNoteRepository::new();
        repo.create(draft("a", 1)).await.unwrap();

        assert!(repo.find_by_uid_and_owner("a", 1).await.unwrap().is_some());
        assert!(repo.find_by_uid_and_owner("a", 2).await.unwrap().is_none());
        assert!(repo.find_all_by_owner(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_keeps_insertion_order() {
        let repo = InMemoryNoteRepository::new();
        for uid in ["c", "a", "b"] {
            repo.create(draft(uid, 1)).await.unwrap();
        }
        repo.create(draft("z", 2)).await.unwrap();

        let uids: Vec<String> = repo
            .find_all_by_owner(1)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.uid)
            .collect();
        assert_eq!(uids, ["c", "a", "b"]);
    }

    fn title(t: &str) -> NoteChanges {
        NoteChanges {
            title: Some(t.into()),
            details: None,
        }
    }

    #[tokio::test]
    async fn update_cannot_cross_owners() {
        let repo = InMemoryNoteRepository::new();
        repo.create(draft("a", 1)).await.unwrap();

        let err = repo.update("a", 2, title("hijacked")).await.unwrap_err();
        assert!(err.is_not_found());
        let stored = repo.find_by_uid_and_owner("a", 1).await.unwrap().unwrap();
        assert_eq!(stored.title, "title a");
    }

    #[tokio::test]
    async fn disjoint_concurrent_edits_both_survive() {
        let repo = std::sync::Arc::new(InMemoryNoteRepository::new());
        repo.create(draft("a", 1)).await.unwrap();

        let (r1, r2) = (repo.clone(), repo.clone());
        let (first, second) = tokio::join!(
            tokio::spawn(async move { r1.update("a", 1, title("X")).await }),
            tokio::spawn(async move {
                r2.update(
                    "a",
                    1,
                    NoteChanges {
                        title: None,
                        details: Some("Y".into()),
                    },
                )
                .await
            }),
        );
        first.unwrap().unwrap();
        second.unwrap().unwrap();

        let stored = repo.find_by_uid_and_owner("a", 1).await.unwrap().unwrap();
        assert_eq!(stored.title, "X");
        assert_eq!(stored.details, "Y");
    }

    #[tokio::test]
    async fn delete_counts_once() {
        let repo = InMemoryNoteRepository::new();
        repo.create(draft("a", 1)).await.unwrap();
        assert_eq!(repo.delete("a").await.unwrap(), 1);
        assert_eq!(repo.delete("a").await.unwrap(), 0);
    }
}
