use std::sync::Arc;
use std::time::Duration;

use recados_auth::TokenService;
use recados_core::Identity;
use recados_db_memory::{InMemoryIdentityRepository, InMemoryNoteRepository, MemoryCache};
use recados_server::{AppState, NoteCache, build_app};
use reqwest::StatusCode;
use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio::task::JoinHandle;

struct TestServer {
    base: String,
    client: reqwest::Client,
    tokens: Arc<TokenService>,
    cache: Arc<MemoryCache>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let tokens = Arc::new(TokenService::new(
            b"integration-secret",
            Duration::from_secs(3600),
        ));
        let cache = Arc::new(MemoryCache::new());
        let state = AppState::new(
            Arc::new(InMemoryIdentityRepository::new()),
            Arc::new(InMemoryNoteRepository::new()),
            Arc::new(NoteCache::new(cache.clone())),
            tokens.clone(),
        );
        let app = build_app(state);

        let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("bind");
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await;
        });

        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            tokens,
            cache,
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = self.client.post(self.url(path)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        read(req.send().await.unwrap()).await
    }

    async fn put(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        read(resp).await
    }

    async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        read(resp).await
    }

    async fn delete(&self, path: &str, token: &str) -> (StatusCode, Value) {
        let resp = self
            .client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        read(resp).await
    }

    /// Signs up and logs in; returns the token.
    async fn user(&self, name: &str) -> String {
        let creds = json!({"username": name, "password": "teste123"});
        let (status, _) = self.post("/user", None, creds.clone()).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = self.post("/auth", None, creds).await;
        assert_eq!(status, StatusCode::OK);
        body["data"].as_str().unwrap().to_string()
    }

    async fn create_note(&self, token: &str, title: &str) -> String {
        let (status, body) = self
            .post(
                "/note",
                Some(token),
                json!({"title": title, "details": "Que o prazo esta acabando"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["data"]["uid"].as_str().unwrap().to_string()
    }
}

async fn read(resp: reqwest::Response) -> (StatusCode, Value) {
    let status = resp.status();
    let body = resp.json().await.unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn signup_and_login() {
    let srv = TestServer::start().await;

    let creds = json!({"username": "teste", "password": "teste123"});
    let (status, body) = srv.post("/user", None, creds.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], "UserCreated");
    assert_eq!(body["data"]["username"], "teste");
    assert!(body["data"]["userid"].is_i64());

    let (status, body) = srv.post("/user", None, creds.clone()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["msg"], "UserAlreadyExistsError");

    let (status, body) = srv
        .post("/user", None, json!({"username": "a".repeat(37), "password": "x"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "UsernameLengthError");

    let (status, body) = srv.post("/user", None, json!({"username": "outro"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "MissingFieldError");

    let (status, body) = srv.post("/auth", None, creds).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], "LogonSuccessful");
    assert!(srv.tokens.verify(body["data"].as_str().unwrap()).is_ok());

    let (status, body) = srv
        .post("/auth", None, json!({"username": "teste", "password": "errada"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["msg"], "InvalidCredentialsError");

    srv.stop().await;
}

#[tokio::test]
async fn note_lifecycle() {
    let srv = TestServer::start().await;
    let token = srv.user("teste").await;

    let (status, body) = srv
        .post(
            "/note",
            Some(&token),
            json!({"title": "Lembre-se", "details": "Que o prazo esta acabando"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], "NoteCreated");
    assert!(body["data"].get("owner_id").is_none());
    let uid = body["data"]["uid"].as_str().unwrap().to_string();

    let (status, body) = srv.get("/note", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], "NoteView");
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = srv.get(&format!("/note/{uid}"), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Lembre-se");

    let (status, body) = srv
        .put(&format!("/note/{uid}"), &token, json!({"title": "Olha só"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], "NoteEdited");
    assert_eq!(body["data"]["title"], "Olha só");
    assert_eq!(body["data"]["details"], "Que o prazo esta acabando");

    // both the single view and the list reflect the edit
    let (_, body) = srv.get(&format!("/note/{uid}"), &token).await;
    assert_eq!(body["data"]["title"], "Olha só");
    let (_, body) = srv.get("/note", &token).await;
    assert_eq!(body["data"][0]["title"], "Olha só");

    let (status, body) = srv.delete(&format!("/note/{uid}"), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"msg": "NoteDeleted", "data": {"affected": 1}}));

    let (status, body) = srv.get(&format!("/note/{uid}"), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["msg"], "NoteNotFoundError");

    srv.stop().await;
}

#[tokio::test]
async fn missing_fields() {
    let srv = TestServer::start().await;
    let token = srv.user("teste").await;

    let (status, body) = srv
        .post("/note", Some(&token), json!({"title": "Lembre-se"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"msg": "MissingFieldError", "data": "details"}));

    let uid = srv.create_note(&token, "Lembre-se").await;
    let (status, body) = srv.put(&format!("/note/{uid}"), &token, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "MissingFieldError");

    srv.stop().await;
}

#[tokio::test]
async fn notes_are_private_to_their_owner() {
    let srv = TestServer::start().await;
    let alice = srv.user("alice").await;
    let bob = srv.user("bob").await;
    let uid = srv.create_note(&alice, "segredo").await;

    // warm the cache as the owner first
    let (status, _) = srv.get(&format!("/note/{uid}"), &alice).await;
    assert_eq!(status, StatusCode::OK);

    let path = format!("/note/{uid}");
    let (status, body) = srv.get(&path, &bob).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["msg"], "NoteNotFoundError");

    let (status, _) = srv.put(&path, &bob, json!({"title": "x"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = srv.delete(&path, &bob).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = srv.get("/note", &bob).await;
    assert_eq!(body["data"], json!([]));

    let (_, body) = srv.get(&path, &alice).await;
    assert_eq!(body["data"]["title"], "segredo");

    srv.stop().await;
}

#[tokio::test]
async fn unknown_uid_is_not_found() {
    let srv = TestServer::start().await;
    let token = srv.user("teste").await;

    let (status, body) = srv.get("/note/UID-QUE-NAO-EXISTE", &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["msg"], "NoteNotFoundError");

    srv.stop().await;
}

#[tokio::test]
async fn rejected_credentials_are_uniform() {
    let srv = TestServer::start().await;
    let expected = json!({"msg": "ExpiredTokenError", "data": null});

    // no header
    let resp = srv.client.get(srv.url("/note")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key("www-authenticate"));
    assert_eq!(read(resp).await.1, expected);

    // wrong scheme
    let resp = srv
        .client
        .get(srv.url("/note"))
        .header("authorization", "Token abc")
        .send()
        .await
        .unwrap();
    assert_eq!(read(resp).await, (StatusCode::UNAUTHORIZED, expected.clone()));

    // garbage token
    let (status, body) = srv.get("/note", "not.a.jwt").await;
    assert_eq!((status, body), (StatusCode::UNAUTHORIZED, expected.clone()));

    // expired token
    let identity = Identity {
        id: 1,
        name: "teste".into(),
        credential_hash: String::new(),
    };
    let issued = OffsetDateTime::now_utc() - time::Duration::hours(2);
    let stale = srv.tokens.issue_at(&identity, issued).unwrap();
    let (status, body) = srv.get("/note", &stale).await;
    assert_eq!((status, body), (StatusCode::UNAUTHORIZED, expected.clone()));

    // signed with another secret
    let other = TokenService::new(b"another-secret", Duration::from_secs(3600));
    let forged = other.issue(&identity).unwrap();
    let (status, body) = srv.get("/note", &forged).await;
    assert_eq!((status, body), (StatusCode::UNAUTHORIZED, expected));

    srv.stop().await;
}

#[tokio::test]
async fn edit_is_visible_when_cache_invalidation_fails() {
    let srv = TestServer::start().await;
    let token = srv.user("teste").await;
    let uid = srv.create_note(&token, "antes").await;
    let path = format!("/note/{uid}");

    let (_, body) = srv.get(&path, &token).await;
    assert_eq!(body["data"]["title"], "antes");

    srv.cache.fail_deletes(true);
    let (status, body) = srv.put(&path, &token, json!({"title": "depois"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "depois");

    let (_, body) = srv.get(&path, &token).await;
    assert_eq!(body["data"]["title"], "depois");
    let (_, body) = srv.get("/note", &token).await;
    assert_eq!(body["data"][0]["title"], "depois");

    srv.stop().await;
}

#[tokio::test]
async fn health_endpoints() {
    let srv = TestServer::start().await;

    let resp = srv.client.get(srv.url("/healthz")).send().await.unwrap();
    assert_eq!(read(resp).await, (StatusCode::OK, json!({"status": "ok"})));

    let resp = srv.client.get(srv.url("/readyz")).send().await.unwrap();
    assert_eq!(read(resp).await, (StatusCode::OK, json!({"status": "ready"})));

    srv.stop().await;
}
