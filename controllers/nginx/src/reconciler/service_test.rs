//! Unit tests for Service merging

use super::service::merge_service;
use crate::resources::service::new_service;
use crate::test_utils::*;
use crds::{ANNOTATION_GCP_NETWORK_TIER, NginxService, NginxServiceType, NginxSpec};
use k8s_openapi::api::core::v1::Service;
use std::collections::BTreeMap;

fn node_port_spec(image: &str) -> NginxSpec {
    NginxSpec {
        image: image.to_string(),
        service: Some(NginxService {
            type_: NginxServiceType::NodePort,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn desired(spec: NginxSpec) -> Service {
    new_service(&test_nginx("web", spec)).unwrap()
}

/// A Service as the API server would return it
fn assigned(mut service: Service, node_ports: &[(i32, i32)]) -> Service {
    service.metadata.resource_version = Some("3".to_string());
    let spec = service.spec.as_mut().unwrap();
    spec.cluster_ip = Some("10.96.0.10".to_string());
    spec.cluster_ips = Some(vec!["10.96.0.10".to_string()]);
    spec.health_check_node_port = Some(31000);
    for port in spec.ports.iter_mut().flatten() {
        port.node_port = node_ports
            .iter()
            .find(|(p, _)| *p == port.port)
            .map(|(_, node_port)| *node_port);
    }
    service
}

fn node_ports(service: &Service) -> Vec<Option<i32>> {
    service
        .spec
        .as_ref()
        .unwrap()
        .ports
        .as_ref()
        .unwrap()
        .iter()
        .map(|p| p.node_port)
        .collect()
}

#[test]
fn test_node_ports_and_cluster_ip_are_preserved() {
    let live = assigned(desired(node_port_spec("nginx:1")), &[(80, 30666), (443, 30667)]);
    let merged = merge_service(&live, desired(node_port_spec("nginx:2"))).object;

    assert_eq!(node_ports(&merged), vec![Some(30666), Some(30667)]);
    let spec = merged.spec.unwrap();
    assert_eq!(spec.cluster_ip.as_deref(), Some("10.96.0.10"));
    // Only meaningful for LoadBalancer
    assert_eq!(spec.health_check_node_port, None);
    assert_eq!(merged.metadata.resource_version.as_deref(), Some("3"));
}

#[test]
fn test_cluster_ip_service_does_not_copy_node_ports() {
    let live = assigned(desired(NginxSpec::default()), &[(80, 30666)]);
    let merged = merge_service(&live, desired(NginxSpec::default())).object;
    assert_eq!(node_ports(&merged), vec![None, None]);
}

fn load_balancer_spec(policy: &str) -> NginxSpec {
    NginxSpec {
        service: Some(NginxService {
            type_: NginxServiceType::LoadBalancer,
            external_traffic_policy: Some(policy.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[test]
fn test_load_balancer_keeps_health_check_node_port() {
    let live = assigned(desired(load_balancer_spec("Local")), &[(80, 30666), (443, 30667)]);
    let merged = merge_service(&live, desired(load_balancer_spec("Local"))).object;
    assert_eq!(merged.spec.unwrap().health_check_node_port, Some(31000));
}

#[test]
fn test_switch_to_cluster_policy_drops_health_check_node_port() {
    let live = assigned(desired(load_balancer_spec("Local")), &[(80, 30666), (443, 30667)]);
    let merged = merge_service(&live, desired(load_balancer_spec("Cluster"))).object;

    let spec = merged.spec.unwrap();
    assert_eq!(spec.external_traffic_policy.as_deref(), Some("Cluster"));
    assert_eq!(spec.health_check_node_port, None);
}

#[test]
fn test_foreign_annotations_survive() {
    let mut live = desired(NginxSpec::default());
    live.metadata
        .annotations
        .get_or_insert_default()
        .insert("team.example/owner".to_string(), "alice".to_string());

    let merged = merge_service(&live, desired(node_port_spec("nginx:2"))).object;
    assert_eq!(merged.metadata.annotations.unwrap()["team.example/owner"], "alice");
}

#[test]
fn test_network_tier_change_is_rejected() {
    let tier = |value: &str| NginxSpec {
        service: Some(NginxService {
            type_: NginxServiceType::LoadBalancer,
            annotations: BTreeMap::from([(
                ANNOTATION_GCP_NETWORK_TIER.to_string(),
                value.to_string(),
            )]),
            ..Default::default()
        }),
        ..Default::default()
    };
    let live = desired(tier("Premium"));

    let merged = merge_service(&live, desired(tier("Standard")));
    assert_eq!(
        merged.object.metadata.annotations.unwrap()[ANNOTATION_GCP_NETWORK_TIER],
        "Premium"
    );
    assert_eq!(merged.warnings.len(), 1);
    assert_eq!(merged.warnings[0].reason, "NetworkTierChangeRejected");
}

#[test]
fn test_network_tier_unchanged_has_no_warning() {
    let mut live = desired(NginxSpec::default());
    live.metadata
        .annotations
        .get_or_insert_default()
        .insert(ANNOTATION_GCP_NETWORK_TIER.to_string(), "Premium".to_string());

    let merged = merge_service(&live, desired(NginxSpec::default()));
    assert!(merged.warnings.is_empty());
    assert_eq!(
        merged.object.metadata.annotations.unwrap()[ANNOTATION_GCP_NETWORK_TIER],
        "Premium"
    );
}

#[tokio::test]
async fn test_reconcile_preserves_node_ports_across_spec_change() {
    let harness = TestHarness::new();
    let nginx = harness.seed(&test_nginx("web", node_port_spec("nginx:1")));
    harness.reconciler.reconcile(&nginx).await.unwrap();

    let live = harness.services.stored(TEST_NAMESPACE, "web").unwrap();
    let mut live = assigned(live, &[(80, 30666), (443, 30667)]);
    live.metadata
        .annotations
        .get_or_insert_default()
        .insert("team.example/owner".to_string(), "alice".to_string());
    harness.services.insert(live);

    let nginx = harness.update_spec(&nginx, node_port_spec("nginx:2"));
    harness.reconciler.reconcile(&nginx).await.unwrap();

    let service = harness.services.stored(TEST_NAMESPACE, "web").unwrap();
    assert_eq!(node_ports(&service), vec![Some(30666), Some(30667)]);
    assert_eq!(service.metadata.annotations.unwrap()["team.example/owner"], "alice");
    assert!(harness.events.reasons().contains(&"ServiceUpdated".to_string()));
}

#[tokio::test]
async fn test_reconcile_emits_network_tier_warning() {
    let tier = |value: &str| NginxSpec {
        service: Some(NginxService {
            type_: NginxServiceType::LoadBalancer,
            annotations: BTreeMap::from([(
                ANNOTATION_GCP_NETWORK_TIER.to_string(),
                value.to_string(),
            )]),
            ..Default::default()
        }),
        ..Default::default()
    };
    let harness = TestHarness::new();
    let nginx = harness.seed(&test_nginx("web", tier("Premium")));
    harness.reconciler.reconcile(&nginx).await.unwrap();

    let nginx = harness.update_spec(&nginx, tier("Standard"));
    harness.reconciler.reconcile(&nginx).await.unwrap();

    let service = harness.services.stored(TEST_NAMESPACE, "web").unwrap();
    assert_eq!(
        service.metadata.annotations.unwrap()[ANNOTATION_GCP_NETWORK_TIER],
        "Premium"
    );
    let warnings = harness.events.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].reason, "NetworkTierChangeRejected");
}
