//! Engine error → HTTP status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use penalty_engine::EngineError;
use tracing::warn;

use crate::api_types::ErrorResponse;

pub fn status_for(e: &EngineError) -> StatusCode {
    match e {
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Conflict { .. } => StatusCode::CONFLICT,
        EngineError::Upstream(_) => StatusCode::BAD_GATEWAY,
        EngineError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn kind_of(e: &EngineError) -> &'static str {
    match e {
        EngineError::Validation(_) => "validation",
        EngineError::NotFound(_) => "not_found",
        EngineError::Conflict { .. } => "conflict",
        EngineError::Upstream(_) => "upstream",
        EngineError::Persistence(_) => "persistence",
    }
}

pub fn error_body(e: &EngineError) -> ErrorResponse {
    ErrorResponse {
        error: e.to_string(),
        kind: kind_of(e).to_string(),
        retryable: e.is_retryable(),
    }
}

/// Handler error wrapper so handlers can use `?` on engine results.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        match &self.0 {
            EngineError::Upstream(u) => {
                warn!(status = status.as_u16(), upstream = u.service(), error = %u, "upstream call failed");
            }
            e if status.is_server_error() => {
                warn!(status = status.as_u16(), error = %e, "request failed");
            }
            _ => {}
        }
        (status, Json(error_body(&self.0))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use penalty_store::StoreError;

    #[test]
    fn taxonomy_maps_to_statuses() {
        assert_eq!(
            status_for(&EngineError::Validation("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&EngineError::conflict("1_FPN", "cannot remove a paid record")),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&EngineError::NotFound("1_FPN".into())),
            StatusCode::NOT_FOUND
        );
        let persistence: EngineError = StoreError::Backend("down".into()).into();
        assert_eq!(status_for(&persistence), StatusCode::SERVICE_UNAVAILABLE);
        assert!(error_body(&persistence).retryable);
    }
}
