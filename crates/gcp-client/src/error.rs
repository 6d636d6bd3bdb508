//! GCP client errors

use thiserror::Error;

/// Errors that can occur when talking to GCP
#[derive(Debug, Error)]
pub enum GcpError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Compute API returned an error
    #[error("GCP API error: {0}")]
    Api(String),

    /// Could not obtain an access token from the metadata server
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
