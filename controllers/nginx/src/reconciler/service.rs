//! Service reconciliation.

use super::Reconciler;
use crate::error::ControllerError;
use crate::events::reasons;
use crate::reconcile_helpers::{
    Applied, MergeWarning, Merged, OwnerContext, copy_forward_metadata, ensure_object,
};
use crate::resources::OwnedKind;
use crds::{ANNOTATION_GCP_NETWORK_TIER, Nginx};
use k8s_openapi::api::core::v1::Service;

impl Reconciler {
    /// Create or update the Service of `nginx`.
    pub(crate) async fn reconcile_service(
        &self,
        nginx: &Nginx,
        desired: Service,
    ) -> Result<Applied<Service>, ControllerError> {
        let owner = Self::owner_ref(nginx);
        let ctx = OwnerContext {
            events: self.events.as_ref(),
            owner: &owner,
            kind: OwnedKind::Service.kind(),
        };
        ensure_object(
            self.services.as_ref(),
            &ctx,
            desired,
            &nginx.spec,
            merge_service,
        )
        .await
    }
}

/// Merge the desired Service onto the live one, keeping everything the API
/// server or a cloud controller assigned.
pub fn merge_service(live: &Service, desired: Service) -> Merged<Service> {
    let mut desired = desired;
    let mut warnings = Vec::new();

    let live_tier = live
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(ANNOTATION_GCP_NETWORK_TIER))
        .cloned();

    copy_forward_metadata(live, &mut desired);

    // Changing the tier reassigns the load balancer IP
    if let Some(live_tier) = live_tier {
        let annotations = desired.metadata.annotations.get_or_insert_default();
        let requested = annotations.get(ANNOTATION_GCP_NETWORK_TIER);
        if let Some(requested) = requested.filter(|r| **r != live_tier) {
            warnings.push(MergeWarning {
                reason: reasons::NETWORK_TIER_CHANGE_REJECTED,
                note: format!(
                    "network tier cannot change from {live_tier} to {requested}, keeping {live_tier}"
                ),
            });
        }
        annotations.insert(ANNOTATION_GCP_NETWORK_TIER.to_string(), live_tier);
    }

    let Some(live_spec) = live.spec.as_ref() else {
        return Merged {
            object: desired,
            warnings,
        };
    };

    if let Some(spec) = desired.spec.as_mut() {
        spec.cluster_ip = live_spec.cluster_ip.clone();
        spec.cluster_ips = live_spec.cluster_ips.clone();

        let service_type = spec.type_.as_deref().unwrap_or("ClusterIP");
        if service_type != "ClusterIP" {
            let live_ports = live_spec.ports.as_deref().unwrap_or_default();
            for port in spec.ports.iter_mut().flatten() {
                if let Some(live_port) = live_ports.iter().find(|p| p.port == port.port) {
                    port.node_port = live_port.node_port;
                }
            }
        }
        // Only valid on LoadBalancer Services with a Local traffic policy
        let local_traffic = spec.external_traffic_policy.as_deref() == Some("Local");
        if service_type == "LoadBalancer" && local_traffic {
            spec.health_check_node_port = live_spec.health_check_node_port;
        }
    }

    Merged {
        object: desired,
        warnings,
    }
}
