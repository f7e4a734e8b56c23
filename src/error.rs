//! HTTP-facing error type.
//!
//! Module errors convert into `ApiError`, which renders as
//! `{"error": message}` with the matching status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::db::DbError;
use crate::google_api::GoogleApiError;
use crate::processor::ProcessorError;
use crate::recall::RecallError;
use crate::sync::SyncError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn not_found(what: &str, id: &str) -> Self {
        Self::NotFound(format!("{} {} not found", what, id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("API error {}: {}", status, self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Conflict(_) => Self::Conflict(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<GoogleApiError> for ApiError {
    fn from(e: GoogleApiError) -> Self {
        match e {
            GoogleApiError::TokenNotFound(_) => Self::BadRequest(e.to_string()),
            GoogleApiError::Db(db) => db.into(),
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<RecallError> for ApiError {
    fn from(e: RecallError) -> Self {
        match e {
            RecallError::Db(db) => db.into(),
            RecallError::MeetingNotFound(_) => Self::NotFound(e.to_string()),
            RecallError::NoMeetingUrl(_) | RecallError::InvalidPayload => {
                Self::BadRequest(e.to_string())
            }
            RecallError::NotConfigured => Self::BadRequest(e.to_string()),
            RecallError::BotAlreadyActive(_) => Self::Conflict(e.to_string()),
            RecallError::InvalidToken => Self::Unauthorized(e.to_string()),
            RecallError::Http(_) | RecallError::Api { .. } | RecallError::Json(_) => {
                Self::Upstream(e.to_string())
            }
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Db(db) => db.into(),
            SyncError::Google(google) => google.into(),
            SyncError::AlreadyRunning(_) => Self::Conflict(e.to_string()),
        }
    }
}

impl From<ProcessorError> for ApiError {
    fn from(e: ProcessorError) -> Self {
        match e {
            ProcessorError::Db(db) => db.into(),
            ProcessorError::ThreadNotFound(_) | ProcessorError::MeetingNotFound(_) => {
                Self::NotFound(e.to_string())
            }
            ProcessorError::NoMessages(_)
            | ProcessorError::NoTranscript(_)
            | ProcessorError::LlmNotConfigured => Self::BadRequest(e.to_string()),
            ProcessorError::Llm(_) => Self::Upstream(e.to_string()),
            ProcessorError::QueueFull | ProcessorError::QueueClosed => {
                Self::Internal(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(DbError::Conflict("Customer dana@acme.io".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(RecallError::Api { status: 500, message: "x".into() }).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(RecallError::InvalidToken).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(ProcessorError::ThreadNotFound("t".into())).status(),
            StatusCode::NOT_FOUND
        );
        let missing_llm = ApiError::from(ProcessorError::LlmNotConfigured);
        assert_eq!(missing_llm.status(), StatusCode::BAD_REQUEST);
        assert_eq!(missing_llm.to_string(), "No LLM provider configured");
    }
}
