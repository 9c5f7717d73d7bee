//! Authentication configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Token signing settings.
///
/// ```toml
/// [auth]
/// token_secret = "change-me"
/// token_lifetime = "1h"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret used to sign and verify bearer tokens.
    pub token_secret: String,

    /// How long an issued token stays valid.
    #[serde(with = "humantime_serde")]
    pub token_lifetime: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: String::new(),
            token_lifetime: Duration::from_secs(3600),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Creates a configuration with the given secret and the default lifetime.
    #[must_use]
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            token_secret: secret.into(),
            ..Default::default()
        }
    }

    /// # Errors
    ///
    /// Fails when the secret is empty or the lifetime is zero or too large to
    /// express as a timestamp offset.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_secret.trim().is_empty() {
            return Err(ConfigError::Missing("auth.token_secret".to_string()));
        }
        if self.token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "auth.token_lifetime must be greater than zero".to_string(),
            ));
        }
        if i64::try_from(self.token_lifetime.as_secs()).is_err() {
            return Err(ConfigError::InvalidValue(
                "auth.token_lifetime is too large".to_string(),
            ));
        }
        Ok(())
    }
}
