use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::IntoResponse,
};
use recados_auth::Authenticated;
use recados_core::{Note, NoteChanges, ResponseCode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{ApiResult, ok};
use crate::server::AppState;
use crate::usecases::{LoginRequest, NewNote, SignUpRequest};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Request body shared by `/user` and `/auth`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CredentialsBody {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NoteBody {
    pub title: Option<String>,
    pub details: Option<String>,
}

/// A note as clients see it. The owner id is not exposed.
#[derive(Debug, Serialize)]
pub struct NoteDto {
    pub uid: String,
    pub title: String,
    pub details: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Note> for NoteDto {
    fn from(note: Note) -> Self {
        Self {
            uid: note.uid,
            title: note.title,
            details: note.details,
            created_at: note.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub affected: u64,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match state.readiness.check().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { status: "ready" })),
        Err(reason) => {
            tracing::warn!(reason = %reason, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                }),
            )
        }
    }
}

pub async fn metrics() -> impl IntoResponse {
    match crate::metrics::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "metrics recorder not installed".to_string(),
        ),
    }
}

// ---- Identity ----

pub async fn sign_up(
    State(state): State<AppState>,
    body: Result<Json<CredentialsBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let created = state
        .signup
        .sign_up(SignUpRequest {
            username: body.username,
            password: body.password,
        })
        .await?;
    Ok(ok(ResponseCode::UserCreated, created))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<CredentialsBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let token = state
        .login
        .login(LoginRequest {
            username: body.username,
            password: body.password,
        })
        .await?;
    Ok(ok(ResponseCode::LogonSuccessful, token))
}

// ---- Notes ----

pub async fn create_note(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    body: Result<Json<NoteBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let note = state
        .notes
        .create(
            ctx.subject_id,
            NewNote {
                title: body.title,
                details: body.details,
            },
        )
        .await?;
    Ok(ok(ResponseCode::NoteCreated, NoteDto::from(note)))
}

pub async fn list_notes(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
) -> ApiResult<impl IntoResponse> {
    let notes = state.notes.view_all(ctx.subject_id).await?;
    let notes: Vec<NoteDto> = notes.into_iter().map(NoteDto::from).collect();
    Ok(ok(ResponseCode::NoteView, notes))
}

pub async fn view_note(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(uid): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let note = state.notes.view(ctx.subject_id, &uid).await?;
    Ok(ok(ResponseCode::NoteView, NoteDto::from(note)))
}

pub async fn edit_note(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(uid): Path<String>,
    body: Result<Json<NoteBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let note = state
        .notes
        .edit(
            ctx.subject_id,
            &uid,
            NoteChanges {
                title: body.title,
                details: body.details,
            },
        )
        .await?;
    Ok(ok(ResponseCode::NoteEdited, NoteDto::from(note)))
}

pub async fn delete_note(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(uid): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let affected = state.notes.delete(ctx.subject_id, &uid).await?;
    Ok(ok(ResponseCode::NoteDeleted, Deleted { affected }))
}
