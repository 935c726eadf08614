use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};

/// Structured error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Field-level details for validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Asset upload failed: {0}")]
    AssetUploadFailed(String),

    #[error("Inconsistent option-stock ledger: {0}")]
    InconsistentLedger(String),

    #[error("SKU generation exhausted after {0} attempts")]
    SkuGenerationExhausted(u32),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::InconsistentLedger(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::AssetUploadFailed(_) => StatusCode::BAD_GATEWAY,
            Self::DatabaseError(_) | Self::SkuGenerationExhausted(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message suitable for HTTP responses. Internal errors return generic
    /// messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    fn details(&self) -> Option<Vec<String>> {
        match self {
            Self::ValidationError(msg) if msg.contains(';') => {
                Some(msg.split(';').map(|d| d.trim().to_string()).collect())
            }
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            message: self.response_message(),
            details: self.details(),
            timestamp: Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = ServiceError::NotFound("Product abc not found".into());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.response_message().contains("abc"));
    }

    #[test]
    fn ledger_errors_are_unprocessable() {
        let err = ServiceError::InconsistentLedger("Size:M not declared".into());
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = ServiceError::InternalError("pool exhausted on node 3".into());
        assert_eq!(err.response_message(), "Internal server error");
    }

    #[test]
    fn validation_details_split_on_semicolons() {
        let err =
            ServiceError::ValidationError("name must not be blank; price must be positive".into());
        let details = err.details().expect("details expected");
        assert_eq!(details.len(), 2);
        assert_eq!(details[1], "price must be positive");
    }
}
