//! Endpoints Controller.
//!
//! Keeps the `Endpoints` object of every Service labelled
//! `nginx.tsuru.io/managed-endpoints=true` in line with its pods. Those
//! Services have no selector, so the cluster's endpoints controller leaves
//! them alone.

pub mod builder;
pub mod tracker;


use crate::backoff::BackoffTracker;
use crate::error::ControllerError;
use crate::resources::non_empty;
use builder::{build_subsets, pod_selector};
use cluster_client::{ObjectStore, StoreError};
use k8s_openapi::api::core::v1::{Endpoints, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a reconcile did to the `Endpoints` object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointsChange {
    /// Created
    Created,
    /// Replaced with new subsets or labels
    Updated,
    /// Already current
    Unchanged,
}

/// Reconciles Endpoints for managed Services.
pub struct EndpointsReconciler {
    pub(crate) services: Arc<dyn ObjectStore<Service>>,
    pub(crate) pods: Arc<dyn ObjectStore<Pod>>,
    pub(crate) endpoints: Arc<dyn ObjectStore<Endpoints>>,
    sync_period: Duration,
    backoff: BackoffTracker,
}

impl std::fmt::Debug for EndpointsReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointsReconciler")
            .field("sync_period", &self.sync_period)
            .finish_non_exhaustive()
    }
}

impl EndpointsReconciler {
    /// Creates a new endpoints reconciler.
    pub fn new(
        services: Arc<dyn ObjectStore<Service>>,
        pods: Arc<dyn ObjectStore<Pod>>,
        endpoints: Arc<dyn ObjectStore<Endpoints>>,
        sync_period: Duration,
    ) -> Self {
        Self {
            services,
            pods,
            endpoints,
            sync_period,
            backoff: BackoffTracker::new(),
        }
    }

    /// Bring the `Endpoints` of `service` up to date.
    pub async fn reconcile(&self, service: &Service) -> Result<Action, ControllerError> {
        let namespace = service
            .namespace()
            .ok_or_else(|| ControllerError::MissingMetadata("Service without namespace".to_string()))?;
        let name = service.name_any();

        if service.meta().deletion_timestamp.is_some() {
            return Ok(Action::await_change());
        }

        self.sync(service, &namespace, &name).await?;
        self.backoff.reset(&format!("{namespace}/{name}"));
        Ok(Action::requeue(self.sync_period))
    }

    /// Requeue delay after a failed reconcile of `namespace/name`.
    pub fn error_delay(&self, key: &str) -> Duration {
        self.backoff.next_delay(key)
    }

    async fn sync(
        &self,
        service: &Service,
        namespace: &str,
        name: &str,
    ) -> Result<EndpointsChange, ControllerError> {
        let Some(selector) = pod_selector(service) else {
            warn!("Service {}/{} has no selector and no owner labels, skipping", namespace, name);
            return Ok(EndpointsChange::Unchanged);
        };

        let pods = self.pods.list(namespace, Some(&selector)).await?;
        let subsets = non_empty(build_subsets(service, &pods));
        let labels = non_empty(service.labels().clone());

        let desired = Endpoints {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: labels.clone(),
                owner_references: service.controller_owner_ref(&()).map(|r| vec![r]),
                ..Default::default()
            },
            subsets: subsets.clone(),
        };

        let current = match self.endpoints.get(namespace, name).await? {
            Some(current) => current,
            None => match self.endpoints.create(namespace, &desired).await {
                Ok(_) => {
                    info!("Created Endpoints {}/{}", namespace, name);
                    return Ok(EndpointsChange::Created);
                }
                Err(StoreError::AlreadyExists(_)) => {
                    debug!("Endpoints {}/{} appeared concurrently, updating instead", namespace, name);
                    self.endpoints
                        .get(namespace, name)
                        .await?
                        .ok_or_else(|| StoreError::NotFound(format!("{namespace}/{name}")))?
                }
                Err(e) => return Err(e.into()),
            },
        };

        let current_subsets = current.subsets.clone().filter(|s| !s.is_empty());
        let current_labels = current.metadata.labels.clone().filter(|l| !l.is_empty());
        if current_subsets == subsets && current_labels == labels {
            debug!("Endpoints {}/{} unchanged", namespace, name);
            return Ok(EndpointsChange::Unchanged);
        }

        let mut updated = current;
        updated.metadata.labels = labels;
        updated.subsets = subsets;
        if updated.metadata.owner_references.is_none() {
            updated.metadata.owner_references = desired.metadata.owner_references;
        }
        self.endpoints.replace(namespace, name, &updated).await?;
        info!("Updated Endpoints {}/{}", namespace, name);
        Ok(EndpointsChange::Updated)
    }

    /// Delete the `Endpoints` left behind by a deleted Service.
    ///
    /// Returns whether something was deleted. Does nothing while the Service
    /// still exists.
    pub async fn cleanup_orphan(&self, namespace: &str, name: &str) -> Result<bool, ControllerError> {
        if self.services.get(namespace, name).await?.is_some() {
            return Ok(false);
        }
        match self.endpoints.delete(namespace, name).await {
            Ok(()) => {
                info!("Deleted orphaned Endpoints {}/{}", namespace, name);
                Ok(true)
            }
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
