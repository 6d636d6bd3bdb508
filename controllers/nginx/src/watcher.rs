//! Kubernetes resource watchers.
//!
//! Two `kube_runtime::Controller`s run side by side:
//! - `Nginx`, plus the Deployments/Services/Ingresses it owns and its pods
//! - managed Services and their pods, for the Endpoints controller
//!
//! Pod events pass through a [`PodRelevanceTracker`] first so status churn
//! does not cause reconciles.

use crate::config::ControllerConfig;
use crate::endpoints::EndpointsReconciler;
use crate::endpoints::tracker::PodRelevanceTracker;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{LABEL_APP, LABEL_APP_VALUE, LABEL_MANAGED_ENDPOINTS, LABEL_RESOURCE_NAME, Nginx};
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::reflector::ObjectRef;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::{self, Action, Config as RuntimeConfig};
use kube_runtime::{Controller, watcher};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Events for the same object within this window collapse into one reconcile
const DEBOUNCE: Duration = Duration::from_secs(1);

async fn reconcile_nginx(nginx: Arc<Nginx>, ctx: Arc<Reconciler>) -> Result<Action, ControllerError> {
    ctx.reconcile(&nginx).await
}

fn nginx_error_policy(nginx: Arc<Nginx>, error: &ControllerError, ctx: Arc<Reconciler>) -> Action {
    let key = format!(
        "{}/{}",
        nginx.namespace().unwrap_or_default(),
        nginx.name_any()
    );
    let delay = ctx.error_delay(&key);
    error!("Reconciliation of Nginx {} failed: {} (retrying in {:?})", key, error, delay);
    Action::requeue(delay)
}

async fn reconcile_endpoints(
    service: Arc<Service>,
    ctx: Arc<EndpointsReconciler>,
) -> Result<Action, ControllerError> {
    ctx.reconcile(&service).await
}

fn endpoints_error_policy(
    service: Arc<Service>,
    error: &ControllerError,
    ctx: Arc<EndpointsReconciler>,
) -> Action {
    let key = format!(
        "{}/{}",
        service.namespace().unwrap_or_default(),
        service.name_any()
    );
    let delay = ctx.error_delay(&key);
    error!("Reconciliation of Endpoints {} failed: {} (retrying in {:?})", key, error, delay);
    Action::requeue(delay)
}

/// Map a relevant pod event to the object named by its resource-name label.
fn pod_owner<K>(tracker: &PodRelevanceTracker, pod: &Pod) -> Option<ObjectRef<K>>
where
    K: Resource<DynamicType = ()>,
{
    if !tracker.is_relevant(pod) {
        return None;
    }
    let namespace = pod.namespace()?;
    let name = pod.labels().get(LABEL_RESOURCE_NAME)?;
    Some(ObjectRef::new(name).within(&namespace))
}

/// Watches Kubernetes resources for changes.
pub struct Watcher {
    client: Client,
    config: ControllerConfig,
    reconciler: Arc<Reconciler>,
    endpoints_reconciler: Arc<EndpointsReconciler>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        client: Client,
        config: ControllerConfig,
        reconciler: Arc<Reconciler>,
        endpoints_reconciler: Arc<EndpointsReconciler>,
    ) -> Self {
        Self {
            client,
            config,
            reconciler,
            endpoints_reconciler,
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        match &self.config.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig::default()
            .debounce(DEBOUNCE)
            .concurrency(self.config.concurrency)
    }

    /// Run the `Nginx` controller until its watch streams end.
    pub async fn watch_nginxes(&self) -> Result<(), ControllerError> {
        info!("Starting Nginx watcher");
        let owned = watcher::Config::default().labels(&format!("{LABEL_APP}={LABEL_APP_VALUE}"));
        let tracker = Arc::new(PodRelevanceTracker::new());

        Controller::new(self.api::<Nginx>(), watcher::Config::default())
            .owns(self.api::<Deployment>(), owned.clone())
            .owns(self.api::<Service>(), owned.clone())
            .owns(self.api::<Ingress>(), owned.clone())
            .watches(self.api::<Pod>(), owned, move |pod| {
                pod_owner::<Nginx>(&tracker, &pod)
            })
            .with_config(self.runtime_config())
            .run(reconcile_nginx, nginx_error_policy, Arc::clone(&self.reconciler))
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => debug!("Reconciled Nginx {}", obj),
                    Err(controller::Error::ObjectNotFound(obj)) => {
                        debug!("Nginx {} no longer exists", obj);
                    }
                    Err(e) => warn!("Nginx controller error: {}", e),
                }
            })
            .await;

        Ok(())
    }

    /// Run the Endpoints controller until its watch streams end.
    pub async fn watch_endpoints(&self) -> Result<(), ControllerError> {
        info!("Starting Endpoints watcher");
        let managed = watcher::Config::default().labels(&format!("{LABEL_MANAGED_ENDPOINTS}=true"));
        let pods = watcher::Config::default().labels(&format!("{LABEL_APP}={LABEL_APP_VALUE}"));
        let tracker = Arc::new(PodRelevanceTracker::new());
        let reconciler = Arc::clone(&self.endpoints_reconciler);

        Controller::new(self.api::<Service>(), managed)
            .watches(self.api::<Pod>(), pods, move |pod| {
                pod_owner::<Service>(&tracker, &pod)
            })
            .with_config(self.runtime_config())
            .run(reconcile_endpoints, endpoints_error_policy, Arc::clone(&self.endpoints_reconciler))
            .for_each(move |res| {
                let reconciler = Arc::clone(&reconciler);
                async move {
                    match res {
                        Ok((obj, _)) => debug!("Reconciled Endpoints {}", obj),
                        // The Service is gone; its Endpoints go with it
                        Err(controller::Error::ObjectNotFound(obj)) => {
                            let Some(namespace) = obj.namespace.as_deref() else {
                                return;
                            };
                            if let Err(e) = reconciler.cleanup_orphan(namespace, &obj.name).await {
                                warn!("Failed to clean up Endpoints {}/{}: {}", namespace, obj.name, e);
                            }
                        }
                        Err(e) => warn!("Endpoints controller error: {}", e),
                    }
                }
            })
            .await;

        Ok(())
    }
}
