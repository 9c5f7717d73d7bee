//! Axum integration: the [`authenticate`] middleware, the [`Authenticated`]
//! extractor and the 401 response for [`AuthError`](crate::AuthError).

pub mod auth;
pub mod error;
pub mod types;

pub use auth::{AuthState, Authenticated, authenticate, parse_bearer};
pub use types::AuthContext;
