//! Object store errors

use thiserror::Error;

/// Errors returned by an [`ObjectStore`](crate::ObjectStore)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create raced with another writer
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic concurrency failure (stale resourceVersion)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// RBAC denial or quota exceeded
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The API server rejected the object
    #[error("Invalid: {0}")]
    Invalid(String),

    /// Any other API or transport failure
    #[error("Kubernetes API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// True for `NotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// True for `Conflict`
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) => match ae.code {
                404 => StoreError::NotFound(ae.message),
                409 if ae.reason == "AlreadyExists" => StoreError::AlreadyExists(ae.message),
                409 => StoreError::Conflict(ae.message),
                403 => StoreError::Forbidden(ae.message),
                422 => StoreError::Invalid(ae.message),
                _ => StoreError::Api(format!("{} ({}): {}", ae.reason, ae.code, ae.message)),
            },
            kube::Error::SerdeError(e) => StoreError::Serialization(e.to_string()),
            other => StoreError::Api(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
