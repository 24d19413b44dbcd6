//! API error types and conversion to tonic::Status.

use amber_index::IndexError;
use thiserror::Error;
use tonic::{Code, Status};

/// API-level errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl From<ApiError> for Status {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::InvalidArgument(msg) => Status::new(Code::InvalidArgument, msg),
            ApiError::NotFound(msg) => Status::new(Code::NotFound, msg),
            ApiError::Internal(msg) => Status::new(Code::Internal, msg),
            ApiError::Unavailable(msg) => Status::new(Code::Unavailable, msg),
        }
    }
}

impl From<IndexError> for ApiError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Closed => ApiError::Unavailable("index is closing".to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
