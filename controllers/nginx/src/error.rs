//! Controller-specific error types.
//!
//! Errors from the object store and the GCP client are wrapped as-is; the
//! remaining variants cover failures that originate in the controller.

use cluster_client::StoreError;
use gcp_client::GcpError;
use thiserror::Error;

/// Errors that can occur in the nginx controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Store(#[from] StoreError),

    /// Kubernetes client construction error
    #[error("Kubernetes client error: {0}")]
    Kube(#[from] kube::Error),

    /// GCP API error
    #[error("GCP error: {0}")]
    Gcp(#[from] GcpError),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Annotation filter expression could not be parsed
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    /// The generated-from annotation exists but is not a valid spec
    #[error("Corrupt fingerprint annotation on {0}")]
    CorruptFingerprint(String),

    /// A resource quantity could not be parsed
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Object is missing required metadata
    #[error("Missing metadata: {0}")]
    MissingMetadata(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}
