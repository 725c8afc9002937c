//! API error mapping

use crate::workflow::EngineError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors returned by API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown gate '{0}'")]
    UnknownGate(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownGate(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(e) => match e {
                EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
                // Both are "your view of the workflow is stale"
                EngineError::InvalidGateState { .. } | EngineError::VersionConflict { .. } => {
                    StatusCode::CONFLICT
                }
                EngineError::Collaborator { .. } => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found = ApiError::Engine(EngineError::NotFound { id: "wf-x".into() });
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let conflict = ApiError::Engine(EngineError::VersionConflict {
            id: "wf-x".into(),
            expected: 1,
            found: 2,
        });
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let unknown_gate = ApiError::UnknownGate("nonsense".into());
        assert_eq!(unknown_gate.status(), StatusCode::BAD_REQUEST);
    }
}
