use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// 引擎错误分类
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing or malformed input, rejected before any side effect
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced record absent or outside the caller's organization
    #[error("Not found: {0}")]
    NotFound(String),

    /// Already ordered, illegal transition, accepted elsewhere
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Extraction service unavailable or returned unparseable output
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Rate limited by the extraction provider, caller may retry
    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Export error: {0}")]
    Export(#[from] csv::Error),
}

impl EngineError {
    pub fn not_found(entity: &str, id: i64) -> Self {
        EngineError::NotFound(format!("{} {}", entity, id))
    }

    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::Conflict(_) => "CONFLICT",
            EngineError::Upstream(_) => "UPSTREAM_ERROR",
            EngineError::Transient(_) => "TRANSIENT_ERROR",
            EngineError::Database(_) => "DATABASE_ERROR",
            EngineError::Export(_) => "EXPORT_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::Upstream(_) => StatusCode::BAD_GATEWAY,
            EngineError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Database(_) | EngineError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let EngineError::Database(ref e) = self {
            tracing::error!("Database failure: {:?}", e);
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
                "retryable": self.is_retryable(),
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(EngineError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(EngineError::not_found("invoice", 3).status(), StatusCode::NOT_FOUND);
        assert_eq!(EngineError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(EngineError::Upstream("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(EngineError::Transient("x".into()).status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(EngineError::Transient("429".into()).is_retryable());
        assert!(!EngineError::Upstream("502".into()).is_retryable());
    }

    #[test]
    fn not_found_message_carries_id() {
        assert_eq!(EngineError::not_found("invoice", 42).to_string(), "Not found: invoice 42");
    }
}
