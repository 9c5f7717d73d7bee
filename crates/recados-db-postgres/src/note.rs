//! Note persistence. Every statement filters on the owner except `delete`,
//! whose caller has already established ownership.

use async_trait::async_trait;
use recados_core::{Note, NoteChanges, NoteDraft};
use recados_storage::{NoteRepository, StorageError};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::error::{is_unique_violation, query_error};

type NoteRow = (String, i64, String, String, OffsetDateTime);

fn into_note((uid, owner_id, title, details, created_at): NoteRow) -> Note {
    Note {
        uid,
        owner_id,
        title,
        details,
        created_at,
    }
}

#[derive(Debug, Clone)]
pub struct PostgresNoteRepository {
    pool: PgPool,
}

impl PostgresNoteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NoteRepository for PostgresNoteRepository {
    #[instrument(skip(self, draft), fields(note_uid = %draft.uid, owner_id = draft.owner_id))]
    async fn create(&self, draft: NoteDraft) -> Result<Note, StorageError> {
        let row: NoteRow = query_as(
            "INSERT INTO notes (uid, owner_id, title, details, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING uid, owner_id, title, details, created_at",
        )
        .bind(&draft.uid)
        .bind(draft.owner_id)
        .bind(&draft.title)
        .bind(&draft.details)
        .bind(draft.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::already_exists("note", draft.uid.clone())
            } else {
                query_error(e)
            }
        })?;
        Ok(into_note(row))
    }

    #[instrument(skip(self))]
    async fn find_by_uid_and_owner(
        &self,
        uid: &str,
        owner_id: i64,
    ) -> Result<Option<Note>, StorageError> {
        let row: Option<NoteRow> = query_as(
            "SELECT uid, owner_id, title, details, created_at FROM notes \
             WHERE uid = $1 AND owner_id = $2",
        )
        .bind(uid)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(row.map(into_note))
    }

    #[instrument(skip(self))]
    async fn find_all_by_owner(&self, owner_id: i64) -> Result<Vec<Note>, StorageError> {
        let rows: Vec<NoteRow> = query_as(
            "SELECT uid, owner_id, title, details, created_at FROM notes \
             WHERE owner_id = $1 ORDER BY seq",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(rows.into_iter().map(into_note).collect())
    }

    // Absent fields keep their stored value; the merge happens in one statement.
    #[instrument(skip(self, changes))]
    async fn update(
        &self,
        uid: &str,
        owner_id: i64,
        changes: NoteChanges,
    ) -> Result<Note, StorageError> {
        let row: Option<NoteRow> = query_as(
            "UPDATE notes SET title = COALESCE($3, title), details = COALESCE($4, details) \
             WHERE uid = $1 AND owner_id = $2 \
             RETURNING uid, owner_id, title, details, created_at",
        )
        .bind(uid)
        .bind(owner_id)
        .bind(changes.title)
        .bind(changes.details)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.map(into_note)
            .ok_or_else(|| StorageError::not_found("note", uid))
    }

    #[instrument(skip(self))]
    async fn delete(&self, uid: &str) -> Result<u64, StorageError> {
        let result = query("DELETE FROM notes WHERE uid = $1")
            .bind(uid)
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        let affected = result.rows_affected();
        debug!(note_uid = uid, affected, "note deleted");
        Ok(affected)
    }
}
