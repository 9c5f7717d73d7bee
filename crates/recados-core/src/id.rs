use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IdError {
    #[error("Invalid note uid: {0}")]
    Invalid(String),
}

/// Generates a new note uid (UUID v4, hyphenated).
pub fn generate_uid() -> String {
    Uuid::new_v4().to_string()
}

/// Checks that a client-supplied uid is a well-formed UUID.
///
/// Lookups with a malformed uid can never match a stored note, so callers
/// may use this to short-circuit before touching persistence.
pub fn validate_uid(uid: &str) -> Result<(), IdError> {
    Uuid::parse_str(uid)
        .map(|_| ())
        .map_err(|_| IdError::Invalid(uid.to_string()))
}
