//! Resource synthesizer.
//!
//! Pure functions deriving the desired Deployment, Service and Ingress from
//! an `Nginx`. No I/O happens here: the same input always yields the same
//! objects, so the merger can reason about them without touching the API.

pub mod deployment;
pub mod ingress;
pub mod quantity;
pub mod service;


use crate::error::ControllerError;
use crds::{ANNOTATION_GENERATED_FROM, Nginx, fingerprint, owned_labels};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Kinds of objects owned by an `Nginx`, in reconcile order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnedKind {
    /// The nginx pods
    Deployment,
    /// Service exposing the pods
    Service,
    /// Ingress routing to the Service
    Ingress,
    /// Ingress bound to a reserved GCP IPv6 address
    Ipv6Ingress,
}

impl OwnedKind {
    /// Every kind, in the order a reconcile applies them
    pub const ALL: [OwnedKind; 4] = [
        OwnedKind::Deployment,
        OwnedKind::Service,
        OwnedKind::Ingress,
        OwnedKind::Ipv6Ingress,
    ];

    /// Kubernetes kind, also the prefix of event reasons
    pub fn kind(&self) -> &'static str {
        match self {
            OwnedKind::Deployment => "Deployment",
            OwnedKind::Service => "Service",
            OwnedKind::Ingress | OwnedKind::Ipv6Ingress => "Ingress",
        }
    }

    /// Name of the object of this kind owned by the `Nginx` called `nginx_name`
    pub fn object_name(&self, nginx_name: &str) -> String {
        match self {
            OwnedKind::Ipv6Ingress => format!("{nginx_name}-ipv6"),
            _ => nginx_name.to_string(),
        }
    }
}

/// Every object derived from one `Nginx`
#[derive(Debug, Clone)]
pub struct Synthesized {
    /// Desired Deployment
    pub deployment: Deployment,
    /// Desired Service
    pub service: Service,
    /// Desired Ingress, `None` when no Ingress is configured
    pub ingress: Option<Ingress>,
}

/// Derive every owned object from `nginx`.
pub fn synthesize(nginx: &Nginx) -> Result<Synthesized, ControllerError> {
    Ok(Synthesized {
        deployment: deployment::new_deployment(nginx)?,
        service: service::new_service(nginx)?,
        ingress: ingress::new_ingress(nginx)?,
    })
}

/// Namespace and name of `nginx`.
pub fn identity(nginx: &Nginx) -> Result<(String, String), ControllerError> {
    let name = nginx
        .meta()
        .name
        .clone()
        .ok_or_else(|| ControllerError::MissingMetadata("Nginx without name".to_string()))?;
    let namespace = nginx
        .namespace()
        .ok_or_else(|| ControllerError::MissingMetadata(format!("Nginx {name} without namespace")))?;
    Ok((namespace, name))
}

/// Metadata shared by every owned object: owned labels on top of `labels`,
/// `annotations` plus the spec fingerprint, and a controller owner reference.
pub(crate) fn owned_object_meta(
    nginx: &Nginx,
    name: String,
    labels: &BTreeMap<String, String>,
    annotations: &BTreeMap<String, String>,
) -> Result<ObjectMeta, ControllerError> {
    let (namespace, nginx_name) = identity(nginx)?;

    let mut all_labels = labels.clone();
    all_labels.extend(owned_labels(&nginx_name));

    let mut all_annotations = annotations.clone();
    all_annotations.insert(ANNOTATION_GENERATED_FROM.to_string(), fingerprint(&nginx.spec)?);

    Ok(ObjectMeta {
        name: Some(name),
        namespace: Some(namespace),
        labels: Some(all_labels),
        annotations: Some(all_annotations),
        owner_references: nginx.controller_owner_ref(&()).map(|r| vec![r]),
        ..Default::default()
    })
}

/// `None` for an empty collection, so optional fields stay unset.
pub(crate) fn non_empty<T: IsEmpty>(value: T) -> Option<T> {
    if value.is_empty() { None } else { Some(value) }
}

/// Collections that can be empty
pub(crate) trait IsEmpty {
    fn is_empty(&self) -> bool;
}

impl<T> IsEmpty for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

impl<K, V> IsEmpty for BTreeMap<K, V> {
    fn is_empty(&self) -> bool {
        BTreeMap::is_empty(self)
    }
}
