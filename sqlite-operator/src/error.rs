//! Error types for the SQLite Kubernetes operator.

use thiserror::Error;

/// Errors that can occur during operator operations.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Resource not found.
    #[error("Resource not found: {kind}/{name} in namespace {namespace}")]
    NotFound {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Resource namespace.
        namespace: String,
    },

    /// Resource already exists.
    #[error("Resource already exists: {kind}/{name} in namespace {namespace}")]
    AlreadyExists {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Resource namespace.
        namespace: String,
    },

    /// Optimistic concurrency check failed on update.
    #[error("Conflict updating {kind}/{name}: object has been modified")]
    Conflict {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
    },

    /// The object is already controlled by a different owner.
    #[error("{kind}/{name} is already controlled by {owner}")]
    OwnershipConflict {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Name of the existing controller.
        owner: String,
    },

    /// A spec field required by an enabled feature is missing.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// API error.
    #[error("API error: {0}")]
    ApiError(String),
}

impl OperatorError {
    /// Whether this error is a spec precondition violation rather than a store failure.
    pub fn is_precondition(&self) -> bool {
        matches!(self, OperatorError::Precondition(_))
    }
}

/// Result type for operator operations.
pub type OperatorResult<T> = Result<T, OperatorError>;

impl From<serde_json::Error> for OperatorError {
    fn from(err: serde_json::Error) -> Self {
        OperatorError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for OperatorError {
    fn from(err: serde_yaml::Error) -> Self {
        OperatorError::SerializationError(err.to_string())
    }
}
