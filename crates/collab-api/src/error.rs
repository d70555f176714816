//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps [`WorkflowError`] to HTTP status codes and JSON bodies of the form
//! `{"error": {"code", "message", "details"}}`.
//!
//! Two audiences see these errors. Moderators get the full message.
//! Party-facing handlers pass their errors through [`AppError::party_facing`],
//! which replaces validation detail with a fixed prompt and strips state
//! names that would reveal the moderation layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use collab_negotiation::WorkflowError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Message shown to a party for any validation failure.
pub const PARTY_VALIDATION_MESSAGE: &str = "please provide more detail";
/// Message shown to a party when a counter is already pending.
pub const PARTY_DUPLICATE_COUNTER_MESSAGE: &str = "a response is already pending";
/// Message shown to a party when an action is not available.
pub const PARTY_INVALID_TRANSITION_MESSAGE: &str =
    "this action is not available for the collaboration right now";

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "INVALID_TRANSITION").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Business-rule validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not permitted (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The action is not legal from the current state (409).
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A counter is already awaiting review for the collaboration (409).
    #[error("duplicate active counter: {0}")]
    DuplicateActiveCounter(String),

    /// Concurrent modification outlasted the retry budget (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status code and machine-readable error code.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::InvalidTransition(_) => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            Self::DuplicateActiveCounter(_) => (StatusCode::CONFLICT, "DUPLICATE_ACTIVE_COUNTER"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Rewrite for a party audience.
    pub fn party_facing(self) -> Self {
        match self {
            Self::Validation(detail) | Self::BadRequest(detail) => {
                tracing::debug!(detail = %detail, "party request failed validation");
                Self::Validation(PARTY_VALIDATION_MESSAGE.to_string())
            }
            Self::InvalidTransition(detail) => {
                tracing::debug!(detail = %detail, "party action not available");
                Self::InvalidTransition(PARTY_INVALID_TRANSITION_MESSAGE.to_string())
            }
            Self::DuplicateActiveCounter(_) => {
                Self::DuplicateActiveCounter(PARTY_DUPLICATE_COUNTER_MESSAGE.to_string())
            }
            other => other,
        }
    }

    /// Response message. Party-facing rewrites are returned without the
    /// variant prefix.
    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::Validation(m) if m == PARTY_VALIDATION_MESSAGE => m.clone(),
            Self::InvalidTransition(m) if m == PARTY_INVALID_TRANSITION_MESSAGE => m.clone(),
            Self::DuplicateActiveCounter(m) if m == PARTY_DUPLICATE_COUNTER_MESSAGE => m.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if let Self::Internal(_) = &self {
            tracing::error!(error = %self, "internal server error");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.client_message(),
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        match &err {
            WorkflowError::Validation(_) | WorkflowError::UnknownField { .. } => {
                Self::Validation(err.to_string())
            }
            WorkflowError::InvalidTransition { .. } => Self::InvalidTransition(err.to_string()),
            WorkflowError::DuplicateActiveCounter { .. } => {
                Self::DuplicateActiveCounter(err.to_string())
            }
            WorkflowError::NotFound { .. } => Self::NotFound(err.to_string()),
            WorkflowError::NotParty { .. } => Self::Forbidden(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(format!("database error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collab_core::CollaborationId;
    use collab_state::Action;
    use http_body_util::BodyExt;

    async fn response_parts(err: AppError) -> (StatusCode, ErrorBody) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        (status, body)
    }

    #[test]
    fn status_codes() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (AppError::Validation("x".into()), StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (AppError::InvalidTransition("x".into()), StatusCode::CONFLICT, "INVALID_TRANSITION"),
            (
                AppError::DuplicateActiveCounter("x".into()),
                StatusCode::CONFLICT,
                "DUPLICATE_ACTIVE_COUNTER",
            ),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT, "CONFLICT"),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_and_code(), (status, code), "{err:?}");
        }
    }

    #[test]
    fn workflow_errors_map_to_variants() {
        let err = AppError::from(WorkflowError::InvalidTransition {
            state: "rejected".into(),
            action: Action::Approve,
        });
        assert!(matches!(err, AppError::InvalidTransition(ref m) if m.contains("rejected")));

        let err = AppError::from(WorkflowError::DuplicateActiveCounter {
            collaboration_id: CollaborationId::new(),
        });
        assert!(matches!(err, AppError::DuplicateActiveCounter(_)));

        let err = AppError::from(WorkflowError::UnknownField {
            field: "colour".into(),
        });
        assert!(matches!(err, AppError::Validation(_)));

        let err = AppError::from(WorkflowError::NotParty {
            actor: "venue:x".into(),
        });
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let (status, body) =
            response_parts(AppError::Internal("db connection failed".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.message, "An internal error occurred");
    }

    #[tokio::test]
    async fn party_facing_validation_is_generic() {
        let err = AppError::Validation("rejectionReason must be at least 10 characters".into());
        let (status, body) = response_parts(err.party_facing()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.error.message, PARTY_VALIDATION_MESSAGE);
    }

    #[tokio::test]
    async fn party_facing_transition_hides_state_names() {
        let err = AppError::from(WorkflowError::InvalidTransition {
            state: "pending_admin_review".into(),
            action: Action::Accept,
        });
        let (status, body) = response_parts(err.party_facing()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.error.code, "INVALID_TRANSITION");
        assert!(!body.error.message.contains("pending_admin_review"));
    }

    #[tokio::test]
    async fn moderator_sees_full_validation_detail() {
        let err = AppError::Validation("flagReason must be at least 5 characters".into());
        let (_, body) = response_parts(err).await;
        assert!(body.error.message.contains("flagReason"));
    }

    #[tokio::test]
    async fn party_facing_duplicate_counter_message() {
        let err = AppError::from(WorkflowError::DuplicateActiveCounter {
            collaboration_id: CollaborationId::new(),
        });
        let (_, body) = response_parts(err.party_facing()).await;
        assert_eq!(body.error.code, "DUPLICATE_ACTIVE_COUNTER");
        assert_eq!(body.error.message, PARTY_DUPLICATE_COUNTER_MESSAGE);
    }
}
