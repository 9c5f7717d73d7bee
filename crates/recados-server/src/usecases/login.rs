use std::sync::Arc;

use recados_auth::{PasswordError, TokenError, TokenService, verify_password_async};
use recados_storage::{DynIdentityRepository, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("Missing field: {field}")]
    MissingField { field: &'static str },

    /// Unknown name or wrong password; callers cannot tell which.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Default)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

pub struct LoginService {
    identities: DynIdentityRepository,
    tokens: Arc<TokenService>,
}

impl LoginService {
    pub fn new(identities: DynIdentityRepository, tokens: Arc<TokenService>) -> Self {
        Self { identities, tokens }
    }

    /// Returns a signed bearer token.
    pub async fn login(&self, request: LoginRequest) -> Result<String, LoginError> {
        let username = request
            .username
            .ok_or(LoginError::MissingField { field: "username" })?;
        let password = request
            .password
            .ok_or(LoginError::MissingField { field: "password" })?;

        let Some(identity) = self.identities.find_by_name(&username).await? else {
            tracing::debug!("login for unknown name");
            return Err(LoginError::InvalidCredentials);
        };
        if !verify_password_async(password, identity.credential_hash.clone()).await? {
            tracing::debug!(userid = identity.id, "login with wrong password");
            return Err(LoginError::InvalidCredentials);
        }

        let token = self.tokens.issue(&identity)?;
        tracing::info!(userid = identity.id, "token issued");
        Ok(token)
    }
}
