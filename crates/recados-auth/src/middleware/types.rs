//! Request-scoped authentication context.

use time::OffsetDateTime;

use crate::token::Claim;

/// The verified identity attached to a request by [`authenticate`](super::authenticate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub subject_id: i64,
    pub expires_at: OffsetDateTime,
}

impl From<Claim> for AuthContext {
    fn from(claim: Claim) -> Self {
        Self {
            subject_id: claim.subject_id,
            expires_at: claim.expires_at,
        }
    }
}
