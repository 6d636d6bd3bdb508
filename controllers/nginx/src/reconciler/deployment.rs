//! Deployment reconciliation.

use super::Reconciler;
use crate::error::ControllerError;
use crate::reconcile_helpers::{Applied, Merged, OwnerContext, copy_forward_metadata, ensure_object};
use crate::resources::OwnedKind;
use crds::Nginx;
use k8s_openapi::api::apps::v1::Deployment;

impl Reconciler {
    /// Create or update the Deployment of `nginx`.
    pub(crate) async fn reconcile_deployment(
        &self,
        nginx: &Nginx,
        desired: Deployment,
    ) -> Result<Applied<Deployment>, ControllerError> {
        let owner = Self::owner_ref(nginx);
        let ctx = OwnerContext {
            events: self.events.as_ref(),
            owner: &owner,
            kind: OwnedKind::Deployment.kind(),
        };
        ensure_object(
            self.deployments.as_ref(),
            &ctx,
            desired,
            &nginx.spec,
            merge_deployment,
        )
        .await
    }
}

/// Merge the desired Deployment onto the live one.
///
/// A nil replica count means something else (usually an HPA through the
/// scale subresource) owns it, so the live count is kept.
pub fn merge_deployment(live: &Deployment, desired: Deployment) -> Merged<Deployment> {
    let mut desired = desired;
    copy_forward_metadata(live, &mut desired);

    if let Some(spec) = desired.spec.as_mut() {
        if spec.replicas.is_none() {
            spec.replicas = live.spec.as_ref().and_then(|s| s.replicas);
        }
    }

    Merged::clean(desired)
}
