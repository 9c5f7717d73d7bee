//! HTTP boundary errors and the `{msg, data}` response envelope.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use recados_core::ResponseCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::usecases::{LoginError, NoteError, SignUpError};

/// Every response body, success or failure.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub msg: ResponseCode,
    pub data: T,
}

/// 200 with `code` and `data`.
pub fn ok<T: Serialize>(code: ResponseCode, data: T) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::OK, Json(Envelope { msg: code, data }))
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Note(#[from] NoteError),

    #[error(transparent)]
    SignUp(#[from] SignUpError),

    #[error(transparent)]
    Login(#[from] LoginError),

    /// The body was absent or not a JSON object.
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBody(rejection.body_text())
    }
}

impl ApiError {
    pub fn code(&self) -> ResponseCode {
        match self {
            ApiError::Note(NoteError::MissingField { .. })
            | ApiError::SignUp(SignUpError::MissingField { .. })
            | ApiError::Login(LoginError::MissingField { .. })
            | ApiError::InvalidBody(_) => ResponseCode::MissingFieldError,
            ApiError::Note(NoteError::NoteNotFound) => ResponseCode::NoteNotFoundError,
            ApiError::SignUp(SignUpError::InvalidUsername) => ResponseCode::InvalidUsernameError,
            ApiError::SignUp(SignUpError::UsernameLength) => ResponseCode::UsernameLengthError,
            ApiError::SignUp(SignUpError::PasswordLength) => ResponseCode::PasswordLengthError,
            ApiError::SignUp(SignUpError::UserAlreadyExists) => {
                ResponseCode::UserAlreadyExistsError
            }
            ApiError::Login(LoginError::InvalidCredentials) => {
                ResponseCode::InvalidCredentialsError
            }
            ApiError::Note(NoteError::Storage(_))
            | ApiError::SignUp(SignUpError::Password(_) | SignUpError::Storage(_))
            | ApiError::Login(
                LoginError::Password(_) | LoginError::Token(_) | LoginError::Storage(_),
            ) => ResponseCode::InternalServerError,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.code() {
            ResponseCode::MissingFieldError
            | ResponseCode::InvalidUsernameError
            | ResponseCode::UsernameLengthError
            | ResponseCode::PasswordLengthError => StatusCode::BAD_REQUEST,
            ResponseCode::ExpiredTokenError => StatusCode::UNAUTHORIZED,
            ResponseCode::NoteNotFoundError => StatusCode::NOT_FOUND,
            ResponseCode::UserAlreadyExistsError | ResponseCode::InvalidCredentialsError => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn data(&self) -> Value {
        match self {
            ApiError::Note(NoteError::MissingField { field })
            | ApiError::SignUp(SignUpError::MissingField { field })
            | ApiError::Login(LoginError::MissingField { field }) => Value::from(*field),
            ApiError::InvalidBody(reason) => Value::from(reason.as_str()),
            _ => Value::Null,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            // internal details stay in the log
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = Envelope {
            msg: self.code(),
            data: self.data(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use recados_storage::StorageError;
    use serde_json::json;

    use super::*;

    async fn render(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn not_found_is_404() {
        let (status, body) = render(NoteError::NoteNotFound.into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"msg": "NoteNotFoundError", "data": null}));
    }

    #[tokio::test]
    async fn missing_field_names_the_field() {
        let (status, body) = render(NoteError::MissingField { field: "title" }.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"msg": "MissingFieldError", "data": "title"}));
    }

    #[tokio::test]
    async fn conflicts() {
        let (status, _) = render(SignUpError::UserAlreadyExists.into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, body) = render(LoginError::InvalidCredentials.into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["msg"], "InvalidCredentialsError");
    }

    #[tokio::test]
    async fn storage_errors_are_opaque() {
        let err = NoteError::Storage(StorageError::connection_error("db password=hunter2"));
        let (status, body) = render(err.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"msg": "InternalServerError", "data": null}));
    }

    #[test]
    fn length_errors_are_bad_requests() {
        for err in [
            SignUpError::InvalidUsername,
            SignUpError::UsernameLength,
            SignUpError::PasswordLength,
        ] {
            assert_eq!(ApiError::from(err).status_code(), StatusCode::BAD_REQUEST);
        }
    }
}
