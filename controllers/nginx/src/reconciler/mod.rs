//! Reconciliation logic for `Nginx` resources.
//!
//! One reconcile converges every owned kind in order (Deployment, Service,
//! Ingress, IPv6 Ingress) and then recomputes the status:
//! - `deployment`: Deployment merge (replica count preservation)
//! - `service`: Service merge (cluster IP, node ports, network tier)
//! - `ingress`: Ingress and IPv6 Ingress, including deletion
//! - `status`: Status Aggregator

pub mod deployment;
pub mod ingress;
pub mod service;
pub mod status;

#[cfg(test)]
mod service_test;

use crate::backoff::BackoffTracker;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::events::EventPublisher;
use crate::resources::{OwnedKind, identity, synthesize};
use cluster_client::ObjectStore;
use crds::Nginx;
use gcp_client::GlobalAddressManager;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::Resource;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{debug, info};

/// Reconciles `Nginx` resources into their owned objects.
pub struct Reconciler {
    pub(crate) nginxes: Arc<dyn ObjectStore<Nginx>>,
    pub(crate) deployments: Arc<dyn ObjectStore<Deployment>>,
    pub(crate) services: Arc<dyn ObjectStore<Service>>,
    pub(crate) ingresses: Arc<dyn ObjectStore<Ingress>>,
    pub(crate) pods: Arc<dyn ObjectStore<Pod>>,
    pub(crate) events: Arc<dyn EventPublisher>,
    /// `None` when no GCP project is configured
    pub(crate) address_manager: Option<Arc<dyn GlobalAddressManager>>,
    pub(crate) config: ControllerConfig,
    backoff: BackoffTracker,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("ipv6", &self.address_manager.is_some())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler.
    #[allow(clippy::too_many_arguments, reason = "one store per watched kind")]
    pub fn new(
        nginxes: Arc<dyn ObjectStore<Nginx>>,
        deployments: Arc<dyn ObjectStore<Deployment>>,
        services: Arc<dyn ObjectStore<Service>>,
        ingresses: Arc<dyn ObjectStore<Ingress>>,
        pods: Arc<dyn ObjectStore<Pod>>,
        events: Arc<dyn EventPublisher>,
        address_manager: Option<Arc<dyn GlobalAddressManager>>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            nginxes,
            deployments,
            services,
            ingresses,
            pods,
            events,
            address_manager,
            config,
            backoff: BackoffTracker::new(),
        }
    }

    /// Converge one `Nginx`.
    ///
    /// Objects rejected by the annotation filter are left alone and looked at
    /// again after `filter_requeue`; everything else is resynced after
    /// `sync_period`.
    pub async fn reconcile(&self, nginx: &Nginx) -> Result<Action, ControllerError> {
        let (namespace, name) = identity(nginx)?;

        let annotations = nginx.meta().annotations.clone().unwrap_or_default();
        if !self.config.annotation_filter.matches(&annotations) {
            debug!("Nginx {}/{} does not match the annotation filter", namespace, name);
            return Ok(Action::requeue(self.config.filter_requeue));
        }

        if nginx.meta().deletion_timestamp.is_some() {
            debug!("Nginx {}/{} is being deleted, leaving cleanup to the garbage collector", namespace, name);
            return Ok(Action::await_change());
        }

        info!("Reconciling Nginx {}/{}", namespace, name);
        let desired = synthesize(nginx)?;

        for kind in OwnedKind::ALL {
            match kind {
                OwnedKind::Deployment => {
                    self.reconcile_deployment(nginx, desired.deployment.clone())
                        .await?;
                }
                OwnedKind::Service => {
                    self.reconcile_service(nginx, desired.service.clone()).await?;
                }
                OwnedKind::Ingress => {
                    self.reconcile_ingress(nginx, desired.ingress.clone()).await?;
                }
                OwnedKind::Ipv6Ingress => {
                    self.reconcile_ipv6_ingress(nginx).await?;
                }
            }
        }

        self.refresh_status(nginx).await?;

        self.backoff.reset(&format!("{namespace}/{name}"));
        Ok(Action::requeue(self.config.sync_period))
    }

    /// Requeue delay after a failed reconcile of `namespace/name`.
    pub fn error_delay(&self, key: &str) -> std::time::Duration {
        self.backoff.next_delay(key)
    }

    /// Event target for `nginx`
    pub(crate) fn owner_ref(nginx: &Nginx) -> k8s_openapi::api::core::v1::ObjectReference {
        nginx.object_ref(&())
    }
}
