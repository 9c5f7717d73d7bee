//! Domain records.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Maximum length of an identity name, in Unicode scalar values.
pub const MAX_NAME_LENGTH: usize = 36;

/// Maximum length of a plaintext credential, in Unicode scalar values.
pub const MAX_PASSWORD_LENGTH: usize = 36;

// =============================================================================
// Identity
// =============================================================================

/// A registered user. Unique by `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub name: String,
    /// PHC-formatted password hash. Never serialized to clients.
    pub credential_hash: String,
}

/// An identity that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityDraft {
    pub name: String,
    pub credential_hash: String,
}

// =============================================================================
// Note
// =============================================================================

/// A short note owned by exactly one identity.
///
/// `uid` and `owner_id` never change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub uid: String,
    pub owner_id: i64,
    pub title: String,
    pub details: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Note {
    /// Returns `true` if `subject_id` owns this note.
    #[must_use]
    pub fn is_owned_by(&self, subject_id: i64) -> bool {
        self.owner_id == subject_id
    }

    /// Applies a change set in place. Ownership and uid are untouched.
    pub fn apply(&mut self, changes: NoteChanges) {
        if let Some(title) = changes.title {
            self.title = title;
        }
        if let Some(details) = changes.details {
            self.details = details;
        }
    }
}

/// Fields of a note about to be created. The repository assigns nothing;
/// uid and timestamp are generated by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft {
    pub uid: String,
    pub owner_id: i64,
    pub title: String,
    pub details: String,
    pub created_at: OffsetDateTime,
}

impl From<NoteDraft> for Note {
    fn from(draft: NoteDraft) -> Self {
        Self {
            uid: draft.uid,
            owner_id: draft.owner_id,
            title: draft.title,
            details: draft.details,
            created_at: draft.created_at,
        }
    }
}

/// Partial update for a note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteChanges {
    pub title: Option<String>,
    pub details: Option<String>,
}

impl NoteChanges {
    /// Returns `true` if there is nothing to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.details.is_none()
    }
}
