//! Response-code vocabulary.
//!
//! Every API response carries one of these codes in its `msg` field. Clients
//! match on the exact strings, so the spelling of each variant is part of the
//! public contract and must not change.

use std::fmt;

use serde::{Serialize, Serializer};

/// Machine-readable status code returned with every API response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    // Success codes
    UserCreated,
    LogonSuccessful,
    NoteCreated,
    NoteView,
    NoteEdited,
    NoteDeleted,

    // Failure codes
    ExpiredTokenError,
    MissingFieldError,
    NoteNotFoundError,
    InvalidUsernameError,
    UsernameLengthError,
    PasswordLengthError,
    UserAlreadyExistsError,
    InvalidCredentialsError,
    InternalServerError,
}

impl ResponseCode {
    /// Returns the wire spelling of the code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserCreated => "UserCreated",
            Self::LogonSuccessful => "LogonSuccessful",
            Self::NoteCreated => "NoteCreated",
            Self::NoteView => "NoteView",
            Self::NoteEdited => "NoteEdited",
            Self::NoteDeleted => "NoteDeleted",
            Self::ExpiredTokenError => "ExpiredTokenError",
            Self::MissingFieldError => "MissingFieldError",
            Self::NoteNotFoundError => "NoteNotFoundError",
            Self::InvalidUsernameError => "InvalidUsernameError",
            Self::UsernameLengthError => "UsernameLengthError",
            Self::PasswordLengthError => "PasswordLengthError",
            Self::UserAlreadyExistsError => "UserAlreadyExistsError",
            Self::InvalidCredentialsError => "InvalidCredentialsError",
            Self::InternalServerError => "InternalServerError",
        }
    }

    /// Returns `true` for codes that acknowledge a successful operation.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::UserCreated
                | Self::LogonSuccessful
                | Self::NoteCreated
                | Self::NoteView
                | Self::NoteEdited
                | Self::NoteDeleted
        )
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ResponseCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}
