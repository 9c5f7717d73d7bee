//! Authentication for the Recados notes server.
//!
//! - [`token`]: HS256 bearer tokens; [`TokenService::verify`] is the only
//!   place a token is trusted
//! - [`password`]: Argon2id hashing for stored credentials
//! - [`middleware`]: axum middleware that turns a bearer header into an
//!   [`AuthContext`], plus the extractor handlers use to read it
//! - [`config`]: `[auth]` configuration section

pub mod config;
pub mod error;
pub mod middleware;
pub mod password;
pub mod token;

pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, InvalidTokenError, PasswordError, TokenError};
pub use middleware::{AuthContext, AuthState, Authenticated, authenticate};
pub use password::{hash_password, hash_password_async, verify_password, verify_password_async};
pub use token::{Claim, TokenClaims, TokenService};
