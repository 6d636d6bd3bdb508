//! ObjectStore backed by the Kubernetes API

use crate::error::StoreError;
use crate::store_trait::ObjectStore;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::debug;

/// [`ObjectStore`] over `kube::Api`
///
/// Writes are tagged with `field_manager` so they are attributable in
/// `managedFields`.
pub struct KubeObjectStore<K> {
    client: Client,
    field_manager: String,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeObjectStore<K> {
    /// Create a store for kind `K`
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
            _kind: PhantomData,
        }
    }
}

impl<K> std::fmt::Debug for KubeObjectStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectStore")
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

impl<K> KubeObjectStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug,
{
    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl<K> ObjectStore<K> for KubeObjectStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn list(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<K>, StoreError> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let list = self.api(namespace).list(&params).await?;
        Ok(list.items)
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        debug!("Creating {} in namespace {}", K::kind(&()), namespace);
        Ok(self.api(namespace).create(&self.post_params(), object).await?)
    }

    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<K, StoreError> {
        debug!("Replacing {} {}/{}", K::kind(&()), namespace, name);
        Ok(self
            .api(namespace)
            .replace(name, &self.post_params(), object)
            .await?)
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: serde_json::Value,
    ) -> Result<K, StoreError> {
        let patch = serde_json::json!({ "status": status });
        let params = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        Ok(self
            .api(namespace)
            .patch_status(name, &params, &Patch::Merge(&patch))
            .await?)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        debug!("Deleting {} {}/{}", K::kind(&()), namespace, name);
        self.api(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}
