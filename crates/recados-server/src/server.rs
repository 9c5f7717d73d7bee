use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    middleware,
    routing::{get, post},
};
use recados_auth::{AuthState, TokenService, authenticate};
use recados_db_memory::{InMemoryIdentityRepository, InMemoryNoteRepository};
use recados_db_postgres::PostgresStorage;
use recados_storage::{DynIdentityRepository, DynNoteRepository};
use tokio::task::JoinHandle;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::cache::{CacheBackend, CacheRefresher, NoteCache, create_cache_backend};
use crate::config::{AppConfig, StorageBackend};
use crate::usecases::{LoginService, NoteService, SignUpService};
use crate::{handlers, metrics};

/// Backends probed by `/readyz`.
#[derive(Default)]
pub struct Readiness {
    postgres: Option<PostgresStorage>,
    cache: Option<Arc<CacheBackend>>,
}

impl Readiness {
    pub fn new(postgres: Option<PostgresStorage>, cache: Option<Arc<CacheBackend>>) -> Self {
        Self { postgres, cache }
    }

    pub async fn check(&self) -> Result<(), String> {
        if let Some(pg) = &self.postgres {
            pg.ping().await.map_err(|e| format!("postgres: {e}"))?;
        }
        if let Some(cache) = &self.cache {
            if !cache.is_available().await {
                return Err(format!("cache ({}) unavailable", cache.mode()));
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub notes: Arc<NoteService>,
    pub signup: Arc<SignUpService>,
    pub login: Arc<LoginService>,
    pub auth: AuthState,
    pub readiness: Arc<Readiness>,
    pub body_limit: usize,
}

impl AppState {
    pub fn new(
        identities: DynIdentityRepository,
        notes: DynNoteRepository,
        cache: Arc<NoteCache>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            notes: Arc::new(NoteService::new(notes, cache)),
            signup: Arc::new(SignUpService::new(identities.clone())),
            login: Arc::new(LoginService::new(identities, tokens.clone())),
            auth: AuthState::new(tokens),
            readiness: Arc::new(Readiness::default()),
            body_limit: 64 * 1024,
        }
    }

    pub fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = Arc::new(readiness);
        self
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.body_limit;

    // Everything under /note requires a verified bearer token.
    let notes = Router::new()
        .route("/note", post(handlers::create_note).get(handlers::list_notes))
        .route(
            "/note/{uid}",
            get(handlers::view_note)
                .put(handlers::edit_note)
                .delete(handlers::delete_note),
        )
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            authenticate,
        ));

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/metrics", get(handlers::metrics))
        .route("/user", post(handlers::sign_up))
        .route("/auth", post(handlers::login))
        .merge(notes)
        // route_layer so MatchedPath is populated
        .route_layer(middleware::from_fn(metrics::track_http))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = tracing::field::Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub struct RecadosServer {
    addr: SocketAddr,
    app: Router,
    /// Background tasks aborted on shutdown.
    tasks: Vec<JoinHandle<()>>,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Connects storage and cache, starts the refresh task and assembles the router.
    pub async fn build(self) -> anyhow::Result<RecadosServer> {
        let cfg = self.config;
        cfg.validate().map_err(anyhow::Error::msg)?;

        let tokens = Arc::new(TokenService::from_config(&cfg.auth));

        let identities: DynIdentityRepository;
        let notes: DynNoteRepository;
        let mut postgres = None;
        match cfg.storage.backend {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                identities = Arc::new(InMemoryIdentityRepository::new());
                notes = Arc::new(InMemoryNoteRepository::new());
            }
            StorageBackend::Postgres => {
                let storage = PostgresStorage::connect(&cfg.storage.postgres).await?;
                identities = storage.identities();
                notes = storage.notes();
                postgres = Some(storage);
            }
        }

        let mut tasks = Vec::new();
        let (backend, listener) = create_cache_backend(&cfg.redis, cfg.cache.ttl).await;
        tasks.extend(listener);
        let backend = Arc::new(backend);

        let note_cache = Arc::new(NoteCache::new(backend.clone()));
        let refresher = Arc::new(CacheRefresher::new(note_cache.clone(), notes.clone()));
        tasks.push(refresher.spawn(cfg.cache.refresh_interval));

        let state = AppState::new(identities, notes, note_cache, tokens)
            .with_readiness(Readiness::new(postgres, Some(backend)))
            .with_body_limit(cfg.server.body_limit_bytes);

        Ok(RecadosServer {
            addr: self.addr,
            app: build_app(state),
            tasks,
        })
    }
}

impl RecadosServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let result = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        for task in &self.tasks {
            task.abort();
        }
        result?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use recados_db_memory::MemoryCache;
    use tower::ServiceExt;

    use super::*;

    fn app(body_limit: usize) -> Router {
        let tokens = Arc::new(TokenService::new(b"router-secret", Duration::from_secs(60)));
        let state = AppState::new(
            Arc::new(InMemoryIdentityRepository::new()),
            Arc::new(InMemoryNoteRepository::new()),
            Arc::new(NoteCache::new(Arc::new(MemoryCache::new()))),
            tokens,
        )
        .with_body_limit(body_limit);
        build_app(state)
    }

    #[tokio::test]
    async fn note_routes_require_a_token() {
        for (method, uri) in [
            ("GET", "/note"),
            ("POST", "/note"),
            ("GET", "/note/abc"),
            ("PUT", "/note/abc"),
            ("DELETE", "/note/abc"),
        ] {
            let response = app(1024)
                .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn public_routes_are_open() {
        let response = app(1024)
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let body = format!(r#"{{"username":"{}","password":"x"}}"#, "a".repeat(4096));
        let response = app(256)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/user")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
        assert_ne!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn non_json_body_is_missing_field() {
        let response = app(1024)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/user")
                    .body(Body::from("username=teste"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["msg"], "MissingFieldError");
    }

    #[tokio::test]
    async fn readiness_without_backends_is_ready() {
        assert!(Readiness::default().check().await.is_ok());
    }
}
