use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Result type for assistant operations
pub type AssistantResult<T> = Result<T, AssistantError>;

/// Errors that can occur in the assistant domain
#[derive(Debug, Error)]
pub enum AssistantError {
    /// Credential resolution or refresh failed; tool capability is gone
    /// until reconfigured
    #[error("Credential error: {0}")]
    Credential(String),

    /// A tool backend is unreachable or failed its probe
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A tool invocation failed; surfaced to the model as an error
    /// result, never aborts the reasoning loop
    #[error("Tool invocation error: {0}")]
    ToolInvocation(String),

    /// Model provider error; fatal to the turn, not the session
    #[error("Model error: {0}")]
    Model(String),

    /// Malformed arguments or an orphaned/duplicate tool call id
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A turn is already in flight for this session
    #[error("A turn is already in progress for this session")]
    TurnInProgress,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AssistantError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AssistantError::Credential(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AssistantError::BackendUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            AssistantError::ToolInvocation(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AssistantError::Model(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AssistantError::Protocol(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AssistantError::SessionNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AssistantError::TurnInProgress => (StatusCode::CONFLICT, self.to_string()),
            AssistantError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (
                AssistantError::Credential("denied".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AssistantError::BackendUnavailable("billing".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AssistantError::Model("upstream 500".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AssistantError::Protocol("duplicate call id".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AssistantError::SessionNotFound("abc".into()),
                StatusCode::NOT_FOUND,
            ),
            (AssistantError::TurnInProgress, StatusCode::CONFLICT),
        ];

        for (error, expected) in cases {
            let response = error.into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_internal_error_hides_detail() {
        let response = AssistantError::Internal("secret detail".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
