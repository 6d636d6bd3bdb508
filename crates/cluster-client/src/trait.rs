//! ObjectStore trait for mocking
//!
//! Abstracts namespaced Kubernetes API access so reconcilers can be unit
//! tested against an in-memory store.

use crate::error::StoreError;

/// Namespaced Kubernetes objects of kind `K`
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ObjectStore<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    /// Fetch an object. `Ok(None)` when it does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError>;

    /// List objects, optionally filtered by a label selector
    async fn list(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<K>, StoreError>;

    /// Create an object
    async fn create(&self, namespace: &str, object: &K) -> Result<K, StoreError>;

    /// Replace an object. Fails with `Conflict` when `metadata.resourceVersion`
    /// is stale.
    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<K, StoreError>;

    /// Merge-patch the status subresource with `status`
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: serde_json::Value,
    ) -> Result<K, StoreError>;

    /// Delete an object
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}
