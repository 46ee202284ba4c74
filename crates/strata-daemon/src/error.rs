//! Error types for strata-daemon

use crate::reconciler::ReconcilerError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use strata_types::{TargetId, ValidationError};
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query error
    #[error("Query error: {0}")]
    Query(String),
}

/// Errors surfaced by the deployment flows
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed name or namespace; nothing was written
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Unknown cluster or deployment; nothing was written
    #[error("Not found: {0}")]
    NotFound(String),

    /// Name already taken
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation not legal for the deployment's current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A reconciler call failed; the surrounding transaction is rolled back
    #[error("Reconciler error: {0}")]
    Reconciler(#[from] ReconcilerError),

    /// Remote resources were created but their ids could not be stored.
    ///
    /// `compensation` holds the error of the compensating delete, if that
    /// failed too; in that case the remote resources are left behind.
    #[error(
        "Failed to persist target {target} after creating remote resources: {source}{}",
        compensation_suffix(.compensation)
    )]
    Persistence {
        target: TargetId,
        source: StorageError,
        compensation: Option<ReconcilerError>,
    },

    /// Store failure with no remote side effect to undo
    #[error("Storage error: {0}")]
    Storage(StorageError),
}

fn compensation_suffix(compensation: &Option<ReconcilerError>) -> String {
    match compensation {
        Some(err) => format!("; compensating delete also failed: {}", err),
        None => String::new(),
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => ServiceError::NotFound(what),
            StorageError::Conflict(what) => ServiceError::Conflict(what),
            other => ServiceError::Storage(other),
        }
    }
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Error from a deployment or cluster flow
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The task running a flow panicked
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Service(err) => match err {
                ServiceError::Validation(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR")
                }
                ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                ServiceError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
                ServiceError::InvalidState(_) => (StatusCode::CONFLICT, "INVALID_STATE"),
                ServiceError::Reconciler(_) => (StatusCode::BAD_GATEWAY, "RECONCILER_ERROR"),
                ServiceError::Persistence { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_ERROR")
                }
                ServiceError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            },
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for deployment and cluster flows
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
