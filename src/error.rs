//! Error types for the catalog service
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Store Error Enum ==
/// Unified error type for the data-access core and the HTTP layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Backing store could not be reached after all connection attempts
    #[error("Connection failed after {attempts} attempt(s): {cause}")]
    Connection { attempts: u32, cause: String },

    /// Requested natural key is absent
    #[error("Not found: {key}")]
    NotFound { key: String },

    /// Caller-supplied data is malformed or out of policy
    #[error("Invalid request: {0}")]
    Validation(String),

    /// A single store call exceeded its time bound
    #[error("Timed out after {timeout_ms}ms during {operation}")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// The caller abandoned the operation
    #[error("Cancelled during {0}")]
    Cancelled(&'static str),

    /// The backing store rejected an operation
    #[error("Store error: {0}")]
    Backend(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(key: impl Into<String>) -> Self {
        StoreError::NotFound { key: key.into() }
    }

    /// Returns true for failures confined to one item of a batch.
    ///
    /// Connection loss, timeouts and cancellation would hit every remaining
    /// item as well, so they are not recoverable at item level.
    pub fn is_item_recoverable(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound { .. } | StoreError::Validation(_) | StoreError::Backend(_)
        )
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            StoreError::Connection { .. } | StoreError::Cancelled(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::Validation(_) => StatusCode::BAD_REQUEST,
            StoreError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            StoreError::Backend(_) | StoreError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the catalog service.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let conn = StoreError::Connection {
            attempts: 3,
            cause: "refused".to_string(),
        };
        assert_eq!(conn.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            StoreError::not_found("Lima").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            StoreError::Validation("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_item_recoverable() {
        assert!(StoreError::not_found("x").is_item_recoverable());
        assert!(StoreError::Validation("x".to_string()).is_item_recoverable());
        assert!(!StoreError::Cancelled("find").is_item_recoverable());
        assert!(!StoreError::Connection {
            attempts: 1,
            cause: "down".to_string()
        }
        .is_item_recoverable());
    }

    #[test]
    fn test_connection_message_names_attempts() {
        let err = StoreError::Connection {
            attempts: 3,
            cause: "server unavailable".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempt"));
        assert!(msg.contains("server unavailable"));
    }
}
