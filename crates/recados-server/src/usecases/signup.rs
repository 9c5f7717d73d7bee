use recados_auth::{PasswordError, hash_password_async};
use recados_core::{IdentityDraft, MAX_NAME_LENGTH, MAX_PASSWORD_LENGTH};
use recados_storage::{DynIdentityRepository, StorageError};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum SignUpError {
    #[error("Missing field: {field}")]
    MissingField { field: &'static str },

    #[error("Username must not be empty")]
    InvalidUsername,

    #[error("Username longer than 36 characters")]
    UsernameLength,

    #[error("Password must be 1 to 36 characters")]
    PasswordLength,

    #[error("Username already taken")]
    UserAlreadyExists,

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Default)]
pub struct SignUpRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedUp {
    pub username: String,
    pub userid: i64,
}

pub struct SignUpService {
    identities: DynIdentityRepository,
}

impl SignUpService {
    pub fn new(identities: DynIdentityRepository) -> Self {
        Self { identities }
    }

    pub async fn sign_up(&self, request: SignUpRequest) -> Result<SignedUp, SignUpError> {
        let username = request
            .username
            .ok_or(SignUpError::MissingField { field: "username" })?;
        if username.trim().is_empty() {
            return Err(SignUpError::InvalidUsername);
        }
        if username.chars().count() > MAX_NAME_LENGTH {
            return Err(SignUpError::UsernameLength);
        }

        let password = request
            .password
            .ok_or(SignUpError::MissingField { field: "password" })?;
        let len = password.chars().count();
        if len == 0 || len > MAX_PASSWORD_LENGTH {
            return Err(SignUpError::PasswordLength);
        }

        if self.identities.find_by_name(&username).await?.is_some() {
            return Err(SignUpError::UserAlreadyExists);
        }

        let credential_hash = hash_password_async(password).await?;
        let identity = self
            .identities
            .create(IdentityDraft {
                name: username,
                credential_hash,
            })
            .await
            .map_err(|e| match e {
                // lost a race with a concurrent signup for the same name
                StorageError::AlreadyExists { .. } => SignUpError::UserAlreadyExists,
                other => SignUpError::Storage(other),
            })?;

        tracing::info!(userid = identity.id, "identity created");
        Ok(SignedUp {
            username: identity.name,
            userid: identity.id,
        })
    }
}
