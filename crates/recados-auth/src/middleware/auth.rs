//! Bearer authentication middleware and the extractor that reads its result.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::error::AuthError;
use crate::token::TokenService;

use super::types::AuthContext;

/// State required by [`authenticate`]. Make it reachable from the router
/// state with `FromRef`.
#[derive(Debug, Clone)]
pub struct AuthState {
    pub tokens: Arc<TokenService>,
}

impl AuthState {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

/// Verifies the bearer token and stores an [`AuthContext`] in the request
/// extensions. Requests without a valid token never reach the handler.
///
/// ```ignore
/// let notes = Router::new()
///     .route("/note", get(list))
///     .route_layer(axum::middleware::from_fn_with_state(auth_state, authenticate));
/// ```
pub async fn authenticate(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    let token = parse_bearer(header)?;
    let claim = state.tokens.verify(token)?;

    tracing::debug!(subject_id = claim.subject_id, "token verified");
    req.extensions_mut().insert(AuthContext::from(claim));
    Ok(next.run(req).await)
}

/// Splits `<scheme> <token>`. The scheme must be `Bearer` (any case) and the
/// token must be a single non-empty word.
pub fn parse_bearer(header: &str) -> Result<&str, AuthError> {
    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MalformedHeader)?;
    let token = token.trim();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() || token.contains(' ') {
        return Err(AuthError::MalformedHeader);
    }
    Ok(token)
}

/// Extractor for handlers behind [`authenticate`].
///
/// Fails with 401 if the middleware did not run, so a handler can never
/// observe a request without a verified subject.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated(pub AuthContext);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .copied()
            .map(Self)
            .ok_or(AuthError::MissingCredentials)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        Router,
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware::from_fn_with_state,
        routing::get,
    };
    use recados_core::Identity;
    use tower::ServiceExt;

    use super::*;

    fn state() -> AuthState {
        AuthState::new(Arc::new(TokenService::new(
            b"middleware-secret",
            Duration::from_secs(60),
        )))
    }

    async fn whoami(Authenticated(ctx): Authenticated) -> String {
        ctx.subject_id.to_string()
    }

    fn app(state: AuthState) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .route_layer(from_fn_with_state(state, authenticate))
    }

    async fn call(app: Router, header: Option<&str>) -> (StatusCode, String) {
        let mut builder = HttpRequest::builder().uri("/whoami");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn bearer_parsing() {
        assert_eq!(parse_bearer("Bearer abc").unwrap(), "abc");
        assert_eq!(parse_bearer("bearer abc").unwrap(), "abc");
        assert!(parse_bearer("Bearer").is_err());
        assert!(parse_bearer("Bearer ").is_err());
        assert!(parse_bearer("Basic abc").is_err());
        assert!(parse_bearer("Bearer a b").is_err());
        assert!(parse_bearer("abc").is_err());
    }

    #[tokio::test]
    async fn valid_token_reaches_handler_with_subject() {
        let state = state();
        let token = state
            .tokens
            .issue(&Identity {
                id: 9,
                name: "teste".into(),
                credential_hash: String::new(),
            })
            .unwrap();

        let (status, body) = call(app(state), Some(&format!("Bearer {token}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "9");
    }

    #[tokio::test]
    async fn missing_or_bad_header_is_rejected() {
        for header in [None, Some("Bearer nope"), Some("Token abc"), Some("")] {
            let (status, body) = call(app(state()), header).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "header {header:?}");
            assert!(body.contains("ExpiredTokenError"));
        }
    }

    #[tokio::test]
    async fn extractor_without_middleware_rejects() {
        let app = Router::new().route("/whoami", get(whoami));
        let (status, _) = call(app, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
