//! Error taxonomy for the job pipeline.
//!
//! Each component maps its failures onto one of these kinds rather than
//! inventing ad-hoc error types; the taxonomy is what `submission::api`
//! converts into HTTP status codes and what `worker::dispatch` uses to
//! decide retry vs. terminal failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Errors surfaced by the Job Store (C1).
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("database connection error: {0}")]
    Pool(String),

    #[error("database query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("illegal status transition for job {job_id}: {from} -> {to}")]
    IllegalTransition {
        job_id: uuid::Uuid,
        from: String,
        to: String,
    },

    #[error("job not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("migration error: {0}")]
    Migration(String),
}

impl From<deadpool_postgres::PoolError> for DatabaseError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        DatabaseError::Pool(e.to_string())
    }
}

/// Errors surfaced by the Job Stream (C2).
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("stream entry missing required field: {0}")]
    MalformedEntry(String),

    #[error("failed to serialize stream payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors returned by the external Generator call (C4).
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("generator request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("generator transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// 5xx, connection reset, timeout: safe to retry.
    #[error("transient upstream error: {status} {message}")]
    Transient { status: u16, message: String },

    /// 4xx other than 408/429: never retried, job fails immediately.
    #[error("permanent upstream error: {status} {message}")]
    Permanent { status: u16, message: String },
}

impl GeneratorError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GeneratorError::Timeout(_) | GeneratorError::Transport(_) | GeneratorError::Transient { .. }
        )
    }
}

/// Errors from auth / service-token verification (C6).
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing or malformed authorization header")]
    MissingCredential,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token expired or invalid: {0}")]
    InvalidToken(String),

    #[error("caller lacks the required role: {0}")]
    Forbidden(&'static str),

    #[error("password hashing error: {0}")]
    Hash(String),

    #[error("account already exists")]
    Conflict,
}

/// Top-level error surfaced by the Submission API (C3). Each variant maps to
/// exactly one of the taxonomy kinds in SPEC_FULL.md §7.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Storage(#[from] DatabaseError),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Auth(AuthError::Forbidden(_)) => {
                (StatusCode::FORBIDDEN, self.to_string())
            }
            ApiError::Auth(AuthError::Conflict) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::Auth(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Storage(DatabaseError::IllegalTransition { .. }) => {
                // IllegalTransition is internal and never the sole cause of a
                // 5xx; callers that hit it raced another writer, so treat it
                // as a conflict rather than a server error.
                (StatusCode::CONFLICT, "job state changed concurrently".to_string())
            }
            ApiError::Storage(_) | ApiError::Stream(_) => {
                tracing::error!(error = %self, "internal error handling request");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "temporarily unavailable".to_string(),
                )
            }
        };

        (status, axum::Json(ErrorBody { error: message })).into_response()
    }
}
