use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde_json::json;

pub type AppResult<T> = Result<T, ChatError>;

/// Everything the chat core can fail with. `TransientConflict` is internal
/// to the matchmaker (a lost seat race) and is retried there, never returned
/// to a caller.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    InvalidOperation(&'static str),

    #[error("already joined this chat")]
    AlreadyMember,

    #[error("not a member of this chat")]
    NotMember,

    #[error("{0}")]
    ValidationFailure(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("storage error: {0}")]
    PersistenceFailure(#[from] sqlx::Error),

    #[error("lost a matchmaking race")]
    TransientConflict,

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = match &self {
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::InvalidOperation(_)
            | ChatError::AlreadyMember
            | ChatError::NotMember
            | ChatError::ValidationFailure(_) => StatusCode::BAD_REQUEST,
            ChatError::Unauthorized => StatusCode::UNAUTHORIZED,
            ChatError::TransientConflict => StatusCode::SERVICE_UNAVAILABLE,
            ChatError::PersistenceFailure(_)
            | ChatError::Session(_)
            | ChatError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
