use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// AppError
///
/// Every rejection the forum can produce. Handlers, the vote ledger and the
/// authorization guard all return `Result<T, AppError>`; the HTTP mapping lives
/// in the `IntoResponse` impl below.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} must be provided")]
    MissingInput(&'static str),

    #[error("malformed request body")]
    MalformedPayload,

    #[error("malformed id")]
    MalformedId,

    #[error("token missing or invalid")]
    TokenError,

    #[error("can be modified by author only")]
    OwnershipError,

    #[error("wrong password")]
    PasswordError,

    #[error("already voted this direction")]
    RepeatVoteError,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already taken")]
    Conflict(&'static str),

    #[error("vote was modified concurrently, try again")]
    VoteConflict,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingInput(_) | AppError::MalformedPayload | AppError::MalformedId => {
                StatusCode::BAD_REQUEST
            }
            AppError::TokenError
            | AppError::OwnershipError
            | AppError::PasswordError
            | AppError::RepeatVoteError
            | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::VoteConflict => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return match db_err.constraint() {
                    Some("users_username_key") => AppError::Conflict("username"),
                    Some("users_email_key") => AppError::Conflict("email"),
                    _ => AppError::Conflict("username or email"),
                };
            }
        }
        tracing::error!("database error: {:?}", err);
        AppError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("request body rejected: {}", rejection.body_text());
        AppError::MalformedPayload
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        tracing::debug!("path rejected: {}", rejection.body_text());
        AppError::MalformedId
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details stay in the logs.
        let message = match &self {
            AppError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
