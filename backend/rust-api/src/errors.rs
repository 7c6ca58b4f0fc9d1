use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Error taxonomy shared by every quiz/stats/admin operation.
///
/// Authorization and scope-resolution failures stay typed so callers can
/// tell them apart; store failures are logged here and surfaced with a
/// generic message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("The selected scope does not contain any modules")]
    EmptyScope,

    #[error("The selected modules do not contain any questions yet")]
    NoQuestions,

    #[error("You have already mastered every question in this scope. Pick another module to keep going!")]
    AllMastered,

    #[error("This session was already submitted (score: {score})")]
    AlreadyCompleted { score: i32 },

    #[error("Storage operation failed")]
    Store(#[from] mongodb::error::Error),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn permission_denied(message: impl Into<String>) -> Self {
        ApiError::PermissionDenied(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    /// Stable machine-readable code, part of the API contract.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::PermissionDenied(_) => "permission_denied",
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::EmptyScope => "empty_scope",
            ApiError::NoQuestions => "no_questions",
            ApiError::AllMastered => "all_mastered",
            ApiError::AlreadyCompleted { .. } => "already_completed",
            ApiError::Store(_) => "store_error",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::EmptyScope | ApiError::NoQuestions | ApiError::AllMastered => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::AlreadyCompleted { .. } => StatusCode::CONFLICT,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Store(err) => {
                tracing::error!("Store error: {}", err);
            }
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {:#}", err);
            }
            _ => {}
        }

        let mut body = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let ApiError::AlreadyCompleted { score } = &self {
            body["score"] = json!(score);
        }

        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            ApiError::permission_denied("nope").status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ApiError::not_found("gone").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::bad_request("bad").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::EmptyScope.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ApiError::NoQuestions.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ApiError::AllMastered.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            ApiError::AlreadyCompleted { score: 80 }.status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn store_errors_do_not_leak_internals() {
        let err = ApiError::Internal(anyhow::anyhow!("mongodb://secret@host failed"));
        assert_eq!(err.to_string(), "Internal server error");
    }

    #[test]
    fn already_completed_carries_the_stored_score() {
        let err = ApiError::AlreadyCompleted { score: 75 };
        assert!(err.to_string().contains("75"));
    }
}
