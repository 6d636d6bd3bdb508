//! Prints the `Nginx` CustomResourceDefinition as YAML.
//!
//! ```sh
//! cargo run -p crds --bin crdgen > deploy/crd.yaml
//! ```

use anyhow::{Context, Result};
use crds::Nginx;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceSubresourceScale, CustomResourceSubresources,
};
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let crd = with_scale_subresource(Nginx::crd());
    let yaml = serde_yaml::to_string(&crd).context("failed to render CRD as YAML")?;
    print!("{yaml}");
    Ok(())
}

/// Adds the scale subresource so autoscalers can drive `.spec.replicas`.
fn with_scale_subresource(mut crd: CustomResourceDefinition) -> CustomResourceDefinition {
    for version in &mut crd.spec.versions {
        let subresources = version
            .subresources
            .get_or_insert_with(CustomResourceSubresources::default);
        subresources.scale = Some(CustomResourceSubresourceScale {
            spec_replicas_path: ".spec.replicas".to_string(),
            status_replicas_path: ".status.currentReplicas".to_string(),
            label_selector_path: Some(".status.podSelector".to_string()),
        });
    }
    crd
}
