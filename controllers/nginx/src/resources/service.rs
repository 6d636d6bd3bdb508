//! Desired Service for an `Nginx`.

use super::owned_object_meta;
use crate::error::ControllerError;
use crds::{
    ANNOTATION_OCI_SSL_PORTS, ANNOTATION_OCI_TLS_SECRET, LABEL_MANAGED_ENDPOINTS, Nginx,
    NginxService, NginxServiceType, owned_labels,
};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// Container port name used instead of `http` when declared
pub const PROXY_PROTOCOL_HTTP_PORT: &str = "proxy-protocol-http";

/// Container port name used instead of `https` when declared
pub const PROXY_PROTOCOL_HTTPS_PORT: &str = "proxy-protocol-https";

/// Build the desired Service for `nginx`.
pub fn new_service(nginx: &Nginx) -> Result<Service, ControllerError> {
    let (_, name) = super::identity(nginx)?;
    let service_spec = nginx.spec.service.clone().unwrap_or_default();

    let mut labels = service_spec.labels.clone();
    if !service_spec.uses_pod_selector() {
        labels.insert(LABEL_MANAGED_ENDPOINTS.to_string(), "true".to_string());
    }

    let mut annotations = service_spec.annotations.clone();
    if service_spec.type_ == NginxServiceType::LoadBalancer {
        // Lexicographically first secret, so the choice is stable
        if let Some(secret) = nginx.spec.tls.iter().map(|t| t.secret_name.as_str()).min() {
            annotations
                .entry(ANNOTATION_OCI_TLS_SECRET.to_string())
                .or_insert_with(|| secret.to_string());
            annotations
                .entry(ANNOTATION_OCI_SSL_PORTS.to_string())
                .or_insert_with(|| "443".to_string());
        }
    }

    let metadata = owned_object_meta(nginx, name.clone(), &labels, &annotations)?;

    Ok(Service {
        metadata,
        spec: Some(ServiceSpec {
            type_: Some(service_spec.type_.as_str().to_string()),
            selector: service_spec
                .uses_pod_selector()
                .then(|| owned_labels(&name)),
            ports: Some(service_ports(nginx)),
            load_balancer_ip: service_spec.load_balancer_ip.clone(),
            external_traffic_policy: external_traffic_policy(&service_spec),
            ..Default::default()
        }),
        status: None,
    })
}

/// `http`/`https` on 80/443, targeting the proxy-protocol container ports
/// when the pod template declares them.
fn service_ports(nginx: &Nginx) -> Vec<ServicePort> {
    let declared = |port_name: &str| {
        nginx
            .spec
            .pod_template
            .ports
            .iter()
            .any(|p| p.name.as_deref() == Some(port_name))
    };

    [
        ("http", 80, PROXY_PROTOCOL_HTTP_PORT),
        ("https", 443, PROXY_PROTOCOL_HTTPS_PORT),
    ]
    .into_iter()
    .map(|(name, port, proxy_port)| {
        let target = if declared(proxy_port) { proxy_port } else { name };
        ServicePort {
            name: Some(name.to_string()),
            port,
            target_port: Some(IntOrString::String(target.to_string())),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }
    })
    .collect()
}

fn external_traffic_policy(service: &NginxService) -> Option<String> {
    if service.type_ == NginxServiceType::ClusterIP {
        return None;
    }
    non_empty_string(service.external_traffic_policy.clone())
}

fn non_empty_string(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

