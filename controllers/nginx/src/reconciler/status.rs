//! Status Aggregator.
//!
//! Rebuilds `NginxStatus` from what is actually running and writes it only
//! when it differs from the stored status, so a status write never
//! triggers another reconcile by itself.

use super::Reconciler;
use crate::error::ControllerError;
use crate::resources::identity;
use crds::{
    DeploymentSummary, IngressSummary, Nginx, NginxStatus, PodSummary, ServiceSummary,
    owned_selector,
};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use tracing::{debug, info};

/// Shown for a pod that has no IP yet
pub const PENDING_IP: &str = "<pending>";

impl Reconciler {
    /// Recompute the status of `nginx` and persist it if it changed.
    ///
    /// Returns whether a status write happened.
    pub(crate) async fn refresh_status(&self, nginx: &Nginx) -> Result<bool, ControllerError> {
        let (namespace, name) = identity(nginx)?;
        let status = self.compute_status(nginx).await?;

        // Compare against a fresh read, the watched copy may lag behind
        let Some(current) = self.nginxes.get(&namespace, &name).await? else {
            debug!("Nginx {}/{} disappeared before its status was written", namespace, name);
            return Ok(false);
        };
        if current.status.as_ref() == Some(&status) {
            debug!("Status of Nginx {}/{} unchanged", namespace, name);
            return Ok(false);
        }

        self.nginxes
            .patch_status(&namespace, &name, serde_json::to_value(&status)?)
            .await?;
        info!(
            "Updated status of Nginx {}/{}: {} replicas",
            namespace, name, status.current_replicas
        );
        Ok(true)
    }

    /// Build the status of `nginx` from the live owned objects.
    pub(crate) async fn compute_status(&self, nginx: &Nginx) -> Result<NginxStatus, ControllerError> {
        let (namespace, name) = identity(nginx)?;
        let selector = owned_selector(&name);

        let deployments = self.owned_deployments(nginx, &namespace, &selector).await?;
        let services = self.services.list(&namespace, Some(&selector)).await?;
        let ingresses = self.ingresses.list(&namespace, Some(&selector)).await?;
        let pods = self.pods.list(&namespace, Some(&selector)).await?;

        let current_replicas = deployments
            .iter()
            .filter_map(|d| d.status.as_ref()?.replicas)
            .sum();

        let mut deployment_summaries: Vec<DeploymentSummary> = deployments
            .iter()
            .map(|d| DeploymentSummary { name: d.name_any() })
            .collect();
        deployment_summaries.sort();

        let mut service_summaries: Vec<ServiceSummary> =
            services.iter().map(service_summary).collect();
        service_summaries.sort();

        let mut ingress_summaries: Vec<IngressSummary> =
            ingresses.iter().map(ingress_summary).collect();
        ingress_summaries.sort();

        let mut pod_summaries: Vec<PodSummary> = pods
            .iter()
            .filter(|p| p.metadata.deletion_timestamp.is_none())
            .map(pod_summary)
            .collect();
        pod_summaries.sort();

        Ok(NginxStatus {
            observed_generation: nginx.metadata.generation,
            current_replicas,
            pod_selector: selector,
            deployments: deployment_summaries,
            services: service_summaries,
            ingresses: ingress_summaries,
            pods: pod_summaries,
        })
    }

    /// Deployments carrying the owned labels; Deployments created before the
    /// labels existed are found by owner reference instead.
    async fn owned_deployments(
        &self,
        nginx: &Nginx,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Deployment>, ControllerError> {
        let labeled = self.deployments.list(namespace, Some(selector)).await?;
        if !labeled.is_empty() {
            return Ok(labeled);
        }

        let Some(uid) = nginx.metadata.uid.as_deref() else {
            return Ok(labeled);
        };
        let all = self.deployments.list(namespace, None).await?;
        Ok(all
            .into_iter()
            .filter(|d| d.owner_references().iter().any(|r| r.uid == uid))
            .collect())
    }
}

fn sorted_addresses<I>(entries: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = (Option<String>, Option<String>)>,
{
    let mut ips = Vec::new();
    let mut hostnames = Vec::new();
    for (ip, hostname) in entries {
        ips.extend(ip.filter(|v| !v.is_empty()));
        hostnames.extend(hostname.filter(|v| !v.is_empty()));
    }
    ips.sort();
    hostnames.sort();
    (ips, hostnames)
}

fn service_summary(service: &Service) -> ServiceSummary {
    let entries = service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.clone())
        .unwrap_or_default()
        .into_iter()
        .map(|i| (i.ip, i.hostname));
    let (ips, hostnames) = sorted_addresses(entries);
    ServiceSummary {
        name: service.name_any(),
        ips,
        hostnames,
    }
}

fn ingress_summary(ingress: &Ingress) -> IngressSummary {
    let entries = ingress
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.clone())
        .unwrap_or_default()
        .into_iter()
        .map(|i| (i.ip, i.hostname));
    let (ips, hostnames) = sorted_addresses(entries);
    IngressSummary {
        name: ingress.name_any(),
        ips,
        hostnames,
    }
}

fn pod_summary(pod: &Pod) -> PodSummary {
    let status = pod.status.as_ref();
    let ip_or_pending = |ip: Option<&String>| {
        ip.filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| PENDING_IP.to_string())
    };
    PodSummary {
        name: pod.name_any(),
        pod_ip: ip_or_pending(status.and_then(|s| s.pod_ip.as_ref())),
        host_ip: ip_or_pending(status.and_then(|s| s.host_ip.as_ref())),
    }
}
