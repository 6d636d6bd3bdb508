//! Kubernetes Object Store
//!
//! A narrow, mockable view of the Kubernetes API used by the nginx operator.
//! Reconcilers only ever need to get, list, create, replace, patch the status
//! of, and delete namespaced objects, so that is all [`ObjectStore`] exposes.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{KubeObjectStore, ObjectStore};
//! use k8s_openapi::api::apps::v1::Deployment;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let deployments = KubeObjectStore::<Deployment>::new(client, "nginx-operator");
//!
//! if let Some(deployment) = deployments.get("default", "my-nginx").await? {
//!     println!("found {:?}", deployment.metadata.name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Error classification**: API failures are mapped to [`StoreError`]
//!   variants (`NotFound`, `AlreadyExists`, `Conflict`, `Forbidden`, ...)
//! - **test-util**: in-memory [`MockObjectStore`] with write counters and
//!   error injection

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeObjectStore;
pub use error::StoreError;
pub use store_trait::ObjectStore;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockObjectStore, Operation};
