//! Error types for Horae services

use std::fmt;

/// Result type alias using HoraeError
pub type Result<T> = std::result::Result<T, HoraeError>;

/// Main error type for Horae services
#[derive(Debug, thiserror::Error)]
pub enum HoraeError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Template spec validation failed
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Resource kind has no metric mapping
    #[error("Unsupported resource: {0}")]
    UnsupportedResource(String),

    /// Metrics backend query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Metrics backend returned something other than a matrix
    #[error("Unexpected result type: {0}")]
    UnexpectedResultType(String),

    /// Histogram construction error
    #[error("Histogram error: {0}")]
    HistogramError(String),

    /// Hourly usage estimation error
    #[error("Estimation failed: {0}")]
    EstimationFailed(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Overcommit annotation malformed
    #[error("Overcommit error: {0}")]
    OvercommitError(String),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    KubernetesError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HoraeError {
    /// Create an internal error from any error type
    pub fn internal<E: fmt::Display>(err: E) -> Self {
        HoraeError::Internal(err.to_string())
    }

    /// Get the error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            HoraeError::ConfigError(_) => "CONFIG_ERROR",
            HoraeError::ValidationFailed(_) => "VALIDATION_FAILED",
            HoraeError::UnsupportedResource(_) => "UNSUPPORTED_RESOURCE",
            HoraeError::QueryFailed(_) => "QUERY_FAILED",
            HoraeError::UnexpectedResultType(_) => "UNEXPECTED_RESULT_TYPE",
            HoraeError::HistogramError(_) => "HISTOGRAM_ERROR",
            HoraeError::EstimationFailed(_) => "ESTIMATION_FAILED",
            HoraeError::NotFound(_) => "NOT_FOUND",
            HoraeError::OvercommitError(_) => "OVERCOMMIT_ERROR",
            HoraeError::KubernetesError(_) => "KUBERNETES_ERROR",
            HoraeError::SerializationError(_) => "SERIALIZATION_ERROR",
            HoraeError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<serde_json::Error> for HoraeError {
    fn from(err: serde_json::Error) -> Self {
        HoraeError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for HoraeError {
    fn from(err: std::io::Error) -> Self {
        HoraeError::Internal(format!("IO error: {}", err))
    }
}
