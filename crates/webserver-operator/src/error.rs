//! Error types for the WebServer operator

use thiserror::Error;

/// Errors that can occur during operator operations
#[derive(Error, Debug)]
pub enum OperatorError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type for operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

impl OperatorError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, OperatorError::KubeError(_))
    }

    /// Get a suggested requeue delay for retryable errors
    pub fn requeue_delay(&self) -> Option<std::time::Duration> {
        if self.is_retryable() {
            Some(std::time::Duration::from_secs(30))
        } else {
            None
        }
    }

    /// Whether this wraps an API response with the given HTTP status code
    pub fn is_api_status(&self, code: u16) -> bool {
        matches!(self, OperatorError::KubeError(kube::Error::Api(err)) if err.code == code)
    }

    /// The API server rejected a create because the object is already there
    pub fn is_already_exists(&self) -> bool {
        self.is_api_status(409)
    }
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> OperatorError {
    OperatorError::KubeError(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("simulated {}", reason),
        reason: reason.to_string(),
        code,
    }))
}
