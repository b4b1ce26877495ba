//! Service error types.
//!
//! Every operation of the placement and autoscaling core fails with a
//! [`ServiceError`]. Only [`ServiceError::General`] is worth retrying from
//! the caller's side; the other kinds are deterministic for a given input.

use thiserror::Error;

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced by placement and autoscaling.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Unknown cluster, or an instance type/size that is not configured.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with the current state of the cluster.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Registry, database or platform failure.
    #[error("{message}")]
    General {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ServiceError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self::General {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying failure with context.
    pub fn general_with_cause<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::General {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns true if the external scheduler may retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::General { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState(_))
    }
}

impl From<crate::db::DbError> for ServiceError {
    fn from(err: crate::db::DbError) -> Self {
        Self::general_with_cause("registry operation failed", err)
    }
}
