//! Authentication error types.

/// The single failure kind reported by the token verifier.
///
/// Malformed input, a bad signature and an expired token are all reported
/// this way; the cause is only visible in debug logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid token")]
pub struct InvalidTokenError;

/// Failure to sign a new token.
#[derive(Debug, thiserror::Error)]
#[error("Token encoding failed: {message}")]
pub struct TokenError {
    pub message: String,
}

impl TokenError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Password hashing failures.
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// The stored hash is not a valid PHC string, or hashing itself failed.
    #[error("Password hash error: {0}")]
    Hash(String),

    /// The blocking task running the hash was cancelled or panicked.
    #[error("Password task failed: {0}")]
    Task(String),
}

impl From<argon2::password_hash::Error> for PasswordError {
    fn from(err: argon2::password_hash::Error) -> Self {
        Self::Hash(err.to_string())
    }
}

/// Reasons a request is rejected before reaching a handler.
///
/// Every variant renders the same 401 `ExpiredTokenError` response.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No `Authorization` header.
    #[error("Missing Authorization header")]
    MissingCredentials,

    /// Header present but not of the form `Bearer <token>`.
    #[error("Malformed Authorization header")]
    MalformedHeader,

    /// The verifier rejected the token.
    #[error("Invalid token")]
    InvalidToken,
}

impl From<InvalidTokenError> for AuthError {
    fn from(_: InvalidTokenError) -> Self {
        Self::InvalidToken
    }
}
