//! Endpoint Subset Builder.
//!
//! Computes the `Endpoints` subsets of a Service from its pods the way the
//! built-in endpoints controller does: one address per pod IP, ports
//! resolved against each pod's containers, ready and not-ready addresses
//! kept apart, and addresses sharing a port list packed into one subset.

use crds::{LABEL_APP, LABEL_RESOURCE_NAME};
use k8s_openapi::api::core::v1::{
    EndpointAddress, EndpointPort, EndpointSubset, ObjectReference, Pod, Service, ServicePort,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

/// Label selector for the pods backing `service`.
///
/// A Service that opted out of the pod selector is found through the
/// owned labels it carries.
pub fn pod_selector(service: &Service) -> Option<String> {
    let selector = service
        .spec
        .as_ref()
        .and_then(|s| s.selector.clone())
        .filter(|s| !s.is_empty());
    if let Some(selector) = selector {
        return Some(
            selector
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(","),
        );
    }

    let labels = service.labels();
    let app = labels.get(LABEL_APP)?;
    let resource_name = labels.get(LABEL_RESOURCE_NAME)?;
    Some(format!("{LABEL_APP}={app},{LABEL_RESOURCE_NAME}={resource_name}"))
}

/// True when the pod's `Ready` condition is `True`.
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// A not-ready pod is still listed when its restart policy lets it become
/// ready again.
fn may_become_ready(pod: &Pod) -> bool {
    let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
    let restart_policy = pod
        .spec
        .as_ref()
        .and_then(|s| s.restart_policy.as_deref())
        .unwrap_or("Always");
    match restart_policy {
        "Never" => !matches!(phase, Some("Failed" | "Succeeded")),
        "OnFailure" => phase != Some("Succeeded"),
        _ => true,
    }
}

/// Container port backing `service_port` on `pod`, `None` if the pod does
/// not expose it.
fn resolve_port(pod: &Pod, service_port: &ServicePort) -> Option<i32> {
    match &service_port.target_port {
        None => Some(service_port.port),
        Some(IntOrString::Int(0)) => Some(service_port.port),
        Some(IntOrString::Int(port)) => Some(*port),
        Some(IntOrString::String(name)) => {
            let protocol = service_port.protocol.as_deref().unwrap_or("TCP");
            pod.spec
                .as_ref()?
                .containers
                .iter()
                .flat_map(|c| c.ports.iter().flatten())
                .find(|p| {
                    p.name.as_deref() == Some(name.as_str())
                        && p.protocol.as_deref().unwrap_or("TCP") == protocol
                })
                .map(|p| p.container_port)
        }
    }
}

fn endpoint_address(service: &Service, pod: &Pod, ip: &str) -> EndpointAddress {
    let spec = pod.spec.as_ref();
    let hostname = spec.and_then(|s| s.hostname.clone()).filter(|h| {
        !h.is_empty()
            && spec.and_then(|s| s.subdomain.as_deref()) == service.metadata.name.as_deref()
            && pod.metadata.namespace == service.metadata.namespace
    });

    EndpointAddress {
        ip: ip.to_string(),
        hostname,
        node_name: spec.and_then(|s| s.node_name.clone()),
        target_ref: Some(ObjectReference {
            kind: Some("Pod".to_string()),
            namespace: pod.metadata.namespace.clone(),
            name: pod.metadata.name.clone(),
            uid: pod.metadata.uid.clone(),
            // Left out so a pod update alone never changes the subsets
            resource_version: None,
            ..Default::default()
        }),
    }
}

struct Group {
    ready: bool,
    ports: Vec<EndpointPort>,
    addresses: Vec<EndpointAddress>,
}

/// Build the subsets of `service` from `pods`.
///
/// Ready subsets come first; addresses inside a subset are ordered by IP.
/// Terminating pods are dropped unless the Service publishes not-ready
/// addresses.
pub fn build_subsets(service: &Service, pods: &[Pod]) -> Vec<EndpointSubset> {
    let service_spec = service.spec.as_ref();
    let service_ports = service_spec
        .and_then(|s| s.ports.clone())
        .unwrap_or_default();
    let publish_not_ready = service_spec
        .and_then(|s| s.publish_not_ready_addresses)
        .unwrap_or(false);

    let mut pods: Vec<&Pod> = pods.iter().collect();
    pods.sort_by_key(|p| (p.metadata.namespace.clone(), p.metadata.name.clone()));

    let mut groups: Vec<Group> = Vec::new();
    for pod in pods {
        if pod.metadata.deletion_timestamp.is_some() && !publish_not_ready {
            continue;
        }
        let Some(ip) = pod
            .status
            .as_ref()
            .and_then(|s| s.pod_ip.as_deref())
            .filter(|ip| !ip.is_empty())
        else {
            continue;
        };

        let ready = publish_not_ready || is_pod_ready(pod);
        if !ready && !may_become_ready(pod) {
            continue;
        }

        let ports: Vec<EndpointPort> = service_ports
            .iter()
            .filter_map(|sp| {
                resolve_port(pod, sp).map(|port| EndpointPort {
                    name: sp.name.clone(),
                    port,
                    protocol: sp.protocol.clone(),
                    app_protocol: sp.app_protocol.clone(),
                })
            })
            .collect();
        if ports.is_empty() && !service_ports.is_empty() {
            continue;
        }

        let address = endpoint_address(service, pod, ip);
        match groups.iter_mut().find(|g| g.ready == ready && g.ports == ports) {
            Some(group) => group.addresses.push(address),
            None => groups.push(Group {
                ready,
                ports,
                addresses: vec![address],
            }),
        }
    }

    // Stable sort keeps first-seen order within each readiness class
    groups.sort_by_key(|g| !g.ready);

    groups
        .into_iter()
        .map(|mut group| {
            group.addresses.sort_by(|a, b| a.ip.cmp(&b.ip));
            let ports = (!group.ports.is_empty()).then_some(group.ports);
            if group.ready {
                EndpointSubset {
                    addresses: Some(group.addresses),
                    not_ready_addresses: None,
                    ports,
                }
            } else {
                EndpointSubset {
                    addresses: None,
                    not_ready_addresses: Some(group.addresses),
                    ports,
                }
            }
        })
        .collect()
}
