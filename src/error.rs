/// Unified error types for the resolver node
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the resolver
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Malformed DID URI
    #[error("Invalid DID: {0}")]
    InvalidDid(String),

    /// Unknown DID method or unmatched route handler
    #[error("Method not implemented: {0}")]
    MethodNotImplemented(String),

    /// Driver or cache produced no document
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request timeout elapsed before resolution completed
    #[error("Request timed out")]
    RequestTimeout,

    /// Document signature failed verification
    #[error("Document integrity failed verification: {0}")]
    Integrity(String),

    /// Cache entry too short to carry a TTL header
    #[error("Corrupt cache entry: {0} bytes")]
    CorruptEntry(usize),

    /// Cache store database errors
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Keyring decode or store open failure at startup; fatal to the node
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Resolver stalled while starting
    #[error("Resolver stalled {0}")]
    Stalled(&'static str),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSON error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert ResolverError to HTTP response
impl IntoResponse for ResolverError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ResolverError::InvalidDid(_) => {
                (StatusCode::NOT_FOUND, "InvalidDid", self.to_string())
            }
            ResolverError::MethodNotImplemented(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "NotImplemented",
                self.to_string(),
            ),
            ResolverError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            ResolverError::RequestTimeout => {
                (StatusCode::REQUEST_TIMEOUT, "Timeout", self.to_string())
            }
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for resolver operations
pub type ResolverResult<T> = Result<T, ResolverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ResolverError::InvalidDid("x".into()), StatusCode::NOT_FOUND),
            (
                ResolverError::MethodNotImplemented("xyz".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ResolverError::NotFound("missing".into()),
                StatusCode::NOT_FOUND,
            ),
            (ResolverError::RequestTimeout, StatusCode::REQUEST_TIMEOUT),
            (
                ResolverError::Integrity("bad signature".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ResolverError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
