//! GCP Global Address Client
//!
//! Reserves named global IPv6 addresses in GCP Compute so an Ingress can be
//! bound to them through `kubernetes.io/ingress.global-static-ip-name`.
//!
//! # Example
//!
//! ```no_run
//! use gcp_client::{GcpClient, GlobalAddressManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = GcpClient::new(
//!     "my-project".to_string(),
//!     "https://compute.googleapis.com".to_string(),
//!     "http://metadata.google.internal".to_string(),
//! )?;
//!
//! // Safe to call repeatedly: an existing address is not an error
//! client.ensure_ipv6("default-my-nginx-ipv6").await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod gcp_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::GcpClient;
pub use error::GcpError;
pub use gcp_trait::GlobalAddressManager;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockGcpClient;
