//! Ingress reconciliation, including the IPv6 variant.

use super::Reconciler;
use crate::error::ControllerError;
use crate::events::reasons;
use crate::reconcile_helpers::{
    Merged, OwnerContext, copy_forward_metadata, delete_object, ensure_object,
};
use crate::resources::OwnedKind;
use crate::resources::ingress::{ipv6_address_name, new_ipv6_ingress};
use crds::{ANNOTATION_IPV6_ENABLED, Nginx};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use kube::runtime::events::EventType;
use tracing::{info, warn};

impl Reconciler {
    fn ingress_context<'a>(
        &'a self,
        owner: &'a k8s_openapi::api::core::v1::ObjectReference,
    ) -> OwnerContext<'a> {
        OwnerContext {
            events: self.events.as_ref(),
            owner,
            kind: OwnedKind::Ingress.kind(),
        }
    }

    /// Create, update or delete the Ingress of `nginx`.
    pub(crate) async fn reconcile_ingress(
        &self,
        nginx: &Nginx,
        desired: Option<Ingress>,
    ) -> Result<(), ControllerError> {
        let owner = Self::owner_ref(nginx);
        let ctx = self.ingress_context(&owner);
        self.apply_ingress(nginx, &ctx, OwnedKind::Ingress, desired)
            .await
    }

    /// Manage the `<name>-ipv6` Ingress bound to a reserved global address.
    ///
    /// Only active when the `Nginx` opts in through its annotation and has an
    /// Ingress configured; otherwise a leftover variant is removed.
    pub(crate) async fn reconcile_ipv6_ingress(&self, nginx: &Nginx) -> Result<(), ControllerError> {
        let owner = Self::owner_ref(nginx);
        let ctx = self.ingress_context(&owner);
        let (namespace, name) = crate::resources::identity(nginx)?;

        let enabled = nginx
            .annotations()
            .get(ANNOTATION_IPV6_ENABLED)
            .is_some_and(|v| v == "true");
        if !enabled || nginx.spec.ingress.is_none() {
            return self
                .apply_ingress(nginx, &ctx, OwnedKind::Ipv6Ingress, None)
                .await;
        }

        let Some(address_manager) = &self.address_manager else {
            warn!("Nginx {}/{} requests IPv6 but no GCP project is configured", namespace, name);
            ctx.events
                .publish(
                    &owner,
                    EventType::Warning,
                    reasons::IPV6_ALLOCATION_FAILED,
                    "ReserveAddress",
                    Some("IPv6 requested but no GCP project is configured".to_string()),
                )
                .await;
            return Ok(());
        };

        let address = ipv6_address_name(&namespace, &name);
        if let Err(e) = address_manager.ensure_ipv6(&address).await {
            warn!("Failed to reserve IPv6 address {}: {}", address, e);
            ctx.events
                .publish(
                    &owner,
                    EventType::Warning,
                    reasons::IPV6_ALLOCATION_FAILED,
                    "ReserveAddress",
                    Some(format!("reserving global address {address}: {e}")),
                )
                .await;
            return Err(e.into());
        }

        let desired = new_ipv6_ingress(nginx)?;
        self.apply_ingress(nginx, &ctx, OwnedKind::Ipv6Ingress, desired)
            .await
    }

    async fn apply_ingress(
        &self,
        nginx: &Nginx,
        ctx: &OwnerContext<'_>,
        kind: OwnedKind,
        desired: Option<Ingress>,
    ) -> Result<(), ControllerError> {
        match desired {
            Some(desired) => {
                ensure_object(self.ingresses.as_ref(), ctx, desired, &nginx.spec, merge_ingress)
                    .await?;
            }
            None => {
                let (namespace, name) = crate::resources::identity(nginx)?;
                let object_name = kind.object_name(&name);
                if delete_object(self.ingresses.as_ref(), ctx, &namespace, &object_name).await? {
                    info!("Removed Ingress {}/{} no longer in spec", namespace, object_name);
                }
            }
        }
        Ok(())
    }
}

/// Merge the desired Ingress onto the live one.
pub fn merge_ingress(live: &Ingress, desired: Ingress) -> Merged<Ingress> {
    let mut desired = desired;
    copy_forward_metadata(live, &mut desired);
    Merged::clean(desired)
}
