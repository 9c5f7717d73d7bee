//! Bearer token issuance and verification (HS256 JWT).

use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use recados_core::Identity;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::AuthConfig;
use crate::error::{InvalidTokenError, TokenError};

/// Claims carried by an issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub userid: i64,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

/// What a successful verification yields. Lives for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub subject_id: i64,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

/// Signs tokens for logged-in identities and verifies them on the way back in.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    #[must_use]
    pub fn new(secret: &[u8], lifetime: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            lifetime,
        }
    }

    /// Builds the service from validated configuration.
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.token_secret.as_bytes(), config.token_lifetime)
    }

    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Issues a token for `identity`, valid from now for the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns `TokenError` if the claims cannot be signed.
    pub fn issue(&self, identity: &Identity) -> Result<String, TokenError> {
        self.issue_at(identity, OffsetDateTime::now_utc())
    }

    /// Issues a token as if the current time were `issued_at`.
    pub fn issue_at(
        &self,
        identity: &Identity,
        issued_at: OffsetDateTime,
    ) -> Result<String, TokenError> {
        let lifetime = i64::try_from(self.lifetime.as_secs())
            .map_err(|_| TokenError::new("token lifetime out of range"))?;
        let iat = issued_at.unix_timestamp();
        let claims = TokenClaims {
            userid: identity.id,
            username: identity.name.clone(),
            iat,
            exp: iat.saturating_add(lifetime),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::new(e.to_string()))
    }

    /// Verifies signature and expiry and returns the embedded subject.
    ///
    /// The token is accepted only while the current time is strictly before
    /// `exp`; no leeway is granted.
    ///
    /// # Errors
    ///
    /// Any failure yields [`InvalidTokenError`].
    pub fn verify(&self, token: &str) -> Result<Claim, InvalidTokenError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// Verifies as if the current time were `now`.
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<Claim, InvalidTokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // expiry is checked against `now` below
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                InvalidTokenError
            })?
            .claims;

        if now.unix_timestamp() >= claims.exp {
            tracing::debug!(subject_id = claims.userid, exp = claims.exp, "token expired");
            return Err(InvalidTokenError);
        }

        let issued_at =
            OffsetDateTime::from_unix_timestamp(claims.iat).map_err(|_| InvalidTokenError)?;
        let expires_at =
            OffsetDateTime::from_unix_timestamp(claims.exp).map_err(|_| InvalidTokenError)?;

        Ok(Claim {
            subject_id: claims.userid,
            issued_at,
            expires_at,
        })
    }
}
