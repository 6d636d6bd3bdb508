//! Test utilities for unit testing reconcilers
//!
//! Builders for test objects and a harness wiring a `Reconciler` to
//! in-memory stores.

use crate::config::ControllerConfig;
use crate::events::RecordingEventPublisher;
use crate::reconciler::Reconciler;
use async_trait::async_trait;
use cluster_client::{MockObjectStore, ObjectStore, StoreError};
use crds::{Nginx, NginxSpec, owned_labels};
use gcp_client::MockGcpClient;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, PodCondition, PodSpec, PodStatus, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Namespace used by every builder
pub const TEST_NAMESPACE: &str = "default";

/// Helper to create a test `Nginx`
pub fn test_nginx(name: &str, spec: NginxSpec) -> Nginx {
    Nginx {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            uid: Some(format!("{name}-uid")),
            generation: Some(1),
            ..Default::default()
        },
        spec,
        status: None,
    }
}

/// Helper to create a pod belonging to the `Nginx` called `owner`
pub fn test_pod(owner: &str, name: &str, ip: Option<&str>, ready: bool) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            uid: Some(format!("{name}-uid")),
            labels: Some(owned_labels(owner)),
            ..Default::default()
        },
        spec: Some(PodSpec::default()),
        status: Some(PodStatus {
            pod_ip: ip.map(str::to_string),
            host_ip: ip.map(|_| "192.168.0.1".to_string()),
            phase: Some("Running".to_string()),
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

/// A `Reconciler` backed by mock stores that stay inspectable
pub struct TestHarness {
    pub reconciler: Reconciler,
    pub nginxes: MockObjectStore<Nginx>,
    pub deployments: MockObjectStore<Deployment>,
    pub services: MockObjectStore<Service>,
    pub ingresses: MockObjectStore<Ingress>,
    pub pods: MockObjectStore<Pod>,
    pub events: Arc<RecordingEventPublisher>,
    pub gcp: MockGcpClient,
}

impl TestHarness {
    /// Default configuration with a GCP client available
    pub fn new() -> Self {
        Self::with_config(ControllerConfig::default(), true)
    }

    /// Harness with `config`; `with_gcp = false` leaves IPv6 unconfigured
    pub fn with_config(config: ControllerConfig, with_gcp: bool) -> Self {
        let nginxes = MockObjectStore::new();
        let deployments = MockObjectStore::new();
        let services = MockObjectStore::new();
        let ingresses = MockObjectStore::new();
        let pods = MockObjectStore::new();
        let events = Arc::new(RecordingEventPublisher::default());
        let gcp = MockGcpClient::new();

        let address_manager: Option<Arc<dyn gcp_client::GlobalAddressManager>> =
            with_gcp.then(|| Arc::new(gcp.clone()) as Arc<dyn gcp_client::GlobalAddressManager>);

        let reconciler = Reconciler::new(
            Arc::new(nginxes.clone()),
            Arc::new(deployments.clone()),
            Arc::new(services.clone()),
            Arc::new(ingresses.clone()),
            Arc::new(pods.clone()),
            events.clone(),
            address_manager,
            config,
        );

        Self {
            reconciler,
            nginxes,
            deployments,
            services,
            ingresses,
            pods,
            events,
            gcp,
        }
    }

    /// Store `nginx` and return the stored copy
    pub fn seed(&self, nginx: &Nginx) -> Nginx {
        self.nginxes.insert(nginx.clone());
        self.stored_nginx(nginx)
    }

    /// Current stored copy of `nginx`
    pub fn stored_nginx(&self, nginx: &Nginx) -> Nginx {
        let name = nginx.metadata.name.as_deref().unwrap();
        self.nginxes.stored(TEST_NAMESPACE, name).unwrap()
    }

    /// Replace the spec of the stored `nginx`, bumping its generation
    pub fn update_spec(&self, nginx: &Nginx, spec: NginxSpec) -> Nginx {
        let mut updated = self.stored_nginx(nginx);
        updated.spec = spec;
        updated.metadata.generation = updated.metadata.generation.map(|g| g + 1);
        self.nginxes.insert(updated);
        self.stored_nginx(nginx)
    }

    /// Writes to Deployments, Services and Ingresses
    pub fn owned_writes(&self) -> usize {
        self.deployments.writes() + self.services.writes() + self.ingresses.writes()
    }

    /// Reset every call counter
    pub fn reset_calls(&self) {
        self.nginxes.reset_calls();
        self.deployments.reset_calls();
        self.services.reset_calls();
        self.ingresses.reset_calls();
        self.pods.reset_calls();
    }
}

/// Hides the object from the first `get`, as if another writer created it
/// between our read and our create.
pub struct RacingStore<K> {
    inner: MockObjectStore<K>,
    hidden: AtomicBool,
}

impl<K> RacingStore<K> {
    /// Wrap `inner`, hiding its objects from the first `get`
    pub fn new(inner: MockObjectStore<K>) -> Self {
        Self {
            inner,
            hidden: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl<K> ObjectStore<K> for RacingStore<K>
where
    K: kube::Resource + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        if self.hidden.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.get(namespace, name).await
    }

    async fn list(&self, namespace: &str, selector: Option<&str>) -> Result<Vec<K>, StoreError> {
        self.inner.list(namespace, selector).await
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        self.inner.create(namespace, object).await
    }

    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<K, StoreError> {
        self.inner.replace(namespace, name, object).await
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: serde_json::Value,
    ) -> Result<K, StoreError> {
        self.inner.patch_status(namespace, name, status).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.inner.delete(namespace, name).await
    }
}
