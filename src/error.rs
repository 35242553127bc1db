//! Error types for the hierarchical cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache engine, its adapters and the HTTP surface.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A required argument was missing or empty. Raised before any I/O.
    #[error("Invalid argument: {0}")]
    Validation(String),

    /// The target of a link (or an HTTP lookup) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The record is already linked to a numeric id, or the id is taken
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The codec could not encode or decode a payload
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// The storage backend rejected or failed a transaction
    #[error("Storage failure: {0}")]
    Storage(String),

    /// The getOrCompute supplier failed
    #[error("Value supplier failed: {0:#}")]
    Supplier(anyhow::Error),
}

impl CacheError {
    /// Shorthand for a validation error on an empty string key.
    pub(crate) fn empty_key() -> Self {
        CacheError::Validation("key cannot be null or empty".to_string())
    }

    /// True for failures of the storage or codec layer, as opposed to rejected requests.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, CacheError::Storage(_) | CacheError::Serialization(_))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::Validation(_) => StatusCode::BAD_REQUEST,
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::Conflict(_) => StatusCode::CONFLICT,
            CacheError::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Supplier(_) => StatusCode::BAD_GATEWAY,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
