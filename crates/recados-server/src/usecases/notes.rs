use std::sync::Arc;

use recados_core::{Note, NoteChanges, NoteDraft, generate_uid, validate_uid};
use recados_storage::{DynNoteRepository, StorageError};
use time::OffsetDateTime;

use crate::cache::NoteCache;

#[derive(Debug, thiserror::Error)]
pub enum NoteError {
    #[error("Missing field: {field}")]
    MissingField { field: &'static str },

    /// The note does not exist or belongs to someone else.
    #[error("Note not found")]
    NoteNotFound,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Body of a create request; both fields are required.
#[derive(Debug, Clone, Default)]
pub struct NewNote {
    pub title: Option<String>,
    pub details: Option<String>,
}

fn required(field: &'static str, value: Option<String>) -> Result<String, NoteError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(NoteError::MissingField { field }),
    }
}

fn not_blank(field: &'static str, value: Option<String>) -> Result<Option<String>, NoteError> {
    match value {
        Some(v) if v.trim().is_empty() => Err(NoteError::MissingField { field }),
        other => Ok(other),
    }
}

/// Note CRUD scoped to the calling subject.
///
/// Writes go to the repository first; both cache keys of the affected owner
/// are invalidated before the call returns.
pub struct NoteService {
    notes: DynNoteRepository,
    cache: Arc<NoteCache>,
}

impl NoteService {
    pub fn new(notes: DynNoteRepository, cache: Arc<NoteCache>) -> Self {
        Self { notes, cache }
    }

    pub async fn create(&self, subject_id: i64, new: NewNote) -> Result<Note, NoteError> {
        let title = required("title", new.title)?;
        let details = required("details", new.details)?;

        let note = self
            .notes
            .create(NoteDraft {
                uid: generate_uid(),
                owner_id: subject_id,
                title,
                details,
                created_at: OffsetDateTime::now_utc(),
            })
            .await?;
        self.cache.invalidate(&note.uid, subject_id).await;

        tracing::info!(uid = %note.uid, subject_id, "note created");
        Ok(note)
    }

    pub async fn view(&self, subject_id: i64, uid: &str) -> Result<Note, NoteError> {
        if validate_uid(uid).is_err() {
            return Err(NoteError::NoteNotFound);
        }
        if let Some(note) = self.cache.get_note(uid, subject_id).await {
            return Ok(note);
        }

        let ticket = self.cache.ticket();
        let note = self
            .notes
            .find_by_uid_and_owner(uid, subject_id)
            .await?
            .ok_or(NoteError::NoteNotFound)?;
        self.cache.put_note(&note, ticket).await;
        Ok(note)
    }

    pub async fn view_all(&self, subject_id: i64) -> Result<Vec<Note>, NoteError> {
        if let Some(notes) = self.cache.get_notes(subject_id).await {
            return Ok(notes);
        }

        let ticket = self.cache.ticket();
        let notes = self.notes.find_all_by_owner(subject_id).await?;
        self.cache.put_notes(subject_id, &notes, ticket).await;
        Ok(notes)
    }

    /// Applies a partial update. At least one of title or details must be
    /// given; a given field must not be blank.
    pub async fn edit(
        &self,
        subject_id: i64,
        uid: &str,
        changes: NoteChanges,
    ) -> Result<Note, NoteError> {
        if changes.is_empty() {
            return Err(NoteError::MissingField {
                field: "title/details",
            });
        }
        let changes = NoteChanges {
            title: not_blank("title", changes.title)?,
            details: not_blank("details", changes.details)?,
        };

        if validate_uid(uid).is_err() {
            return Err(NoteError::NoteNotFound);
        }
        // The repository merges only the given fields and checks ownership
        // in the same step.
        let updated = self
            .notes
            .update(uid, subject_id, changes)
            .await
            .map_err(|e| match e {
                StorageError::NotFound { .. } => NoteError::NoteNotFound,
                other => NoteError::Storage(other),
            })?;
        self.cache.invalidate(uid, subject_id).await;

        tracing::info!(uid = %uid, subject_id, "note edited");
        Ok(updated)
    }

    /// Returns the number of notes removed.
    pub async fn delete(&self, subject_id: i64, uid: &str) -> Result<u64, NoteError> {
        self.load_owned(subject_id, uid).await?;

        let affected = self.notes.delete(uid).await?;
        self.cache.invalidate(uid, subject_id).await;

        tracing::info!(uid = %uid, subject_id, affected, "note deleted");
        Ok(affected)
    }

    // Writes always check ownership against the repository, never the cache.
    async fn load_owned(&self, subject_id: i64, uid: &str) -> Result<Note, NoteError> {
        if validate_uid(uid).is_err() {
            return Err(NoteError::NoteNotFound);
        }
        self.notes
            .find_by_uid_and_owner(uid, subject_id)
            .await?
            .ok_or(NoteError::NoteNotFound)
    }
}
