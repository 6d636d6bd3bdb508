//! Desired Ingress objects for an `Nginx`.

use super::{OwnedKind, non_empty, owned_object_meta};
use crate::error::ControllerError;
use crds::{ANNOTATION_GCP_STATIC_IP, Nginx};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use std::collections::BTreeMap;

/// Build the desired Ingress, `None` when the spec configures none.
pub fn new_ingress(nginx: &Nginx) -> Result<Option<Ingress>, ControllerError> {
    let (_, name) = super::identity(nginx)?;
    build(nginx, OwnedKind::Ingress.object_name(&name), BTreeMap::new())
}

/// Name of the GCP global address reserved for the IPv6 Ingress.
pub fn ipv6_address_name(namespace: &str, name: &str) -> String {
    format!("{namespace}-{name}-ipv6")
}

/// Build the IPv6 variant: the same routing, bound to the reserved global
/// address.
pub fn new_ipv6_ingress(nginx: &Nginx) -> Result<Option<Ingress>, ControllerError> {
    let (namespace, name) = super::identity(nginx)?;
    let annotations = BTreeMap::from([(
        ANNOTATION_GCP_STATIC_IP.to_string(),
        ipv6_address_name(&namespace, &name),
    )]);
    build(nginx, OwnedKind::Ipv6Ingress.object_name(&name), annotations)
}

fn build(
    nginx: &Nginx,
    object_name: String,
    extra_annotations: BTreeMap<String, String>,
) -> Result<Option<Ingress>, ControllerError> {
    let Some(ingress_spec) = &nginx.spec.ingress else {
        return Ok(None);
    };
    let (_, service_name) = super::identity(nginx)?;

    let mut annotations = ingress_spec.annotations.clone();
    annotations.extend(extra_annotations);
    let metadata = owned_object_meta(nginx, object_name, &ingress_spec.labels, &annotations)?;

    let backend = IngressBackend {
        service: Some(IngressServiceBackend {
            name: service_name,
            port: Some(ServiceBackendPort {
                name: Some("http".to_string()),
                number: None,
            }),
        }),
        resource: None,
    };

    // Every certificate gets routing: its hosts, or the wildcard host when
    // it declares none. A host shared by several certificates gets one rule.
    let mut hosts: Vec<Option<String>> = Vec::new();
    for tls in &nginx.spec.tls {
        if tls.hosts.is_empty() {
            if !hosts.contains(&None) {
                hosts.push(None);
            }
            continue;
        }
        for host in &tls.hosts {
            let host = Some(host.clone());
            if !hosts.contains(&host) {
                hosts.push(host);
            }
        }
    }

    let rules: Vec<IngressRule> = hosts
        .into_iter()
        .map(|host| IngressRule {
            host,
            http: Some(HTTPIngressRuleValue {
                paths: vec![HTTPIngressPath {
                    backend: backend.clone(),
                    path: Some("/".to_string()),
                    path_type: "Prefix".to_string(),
                }],
            }),
        })
        .collect();

    let tls: Vec<IngressTLS> = nginx
        .spec
        .tls
        .iter()
        .map(|t| IngressTLS {
            hosts: non_empty(t.hosts.clone()),
            secret_name: Some(t.secret_name.clone()),
        })
        .collect();

    // A TLS Ingress must not catch fallback traffic it has no certificate for
    let default_backend = nginx.spec.tls.is_empty().then_some(backend);

    Ok(Some(Ingress {
        metadata,
        spec: Some(IngressSpec {
            ingress_class_name: ingress_spec.ingress_class_name.clone(),
            default_backend,
            rules: non_empty(rules),
            tls: non_empty(tls),
        }),
        status: None,
    }))
}
