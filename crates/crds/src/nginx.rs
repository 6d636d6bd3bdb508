//! Nginx CRD
//!
//! Declares a managed nginx instance: the desired Deployment shape, how it
//! is exposed (Service, Ingress) and the observed state written back by the
//! controller.

use k8s_openapi::api::apps::v1::RollingUpdateDeployment;
use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, ExecAction, PodSecurityContext, ResourceRequirements,
    SecurityContext, Toleration, TopologySpreadConstraint, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Image used when the spec leaves `image` empty.
pub const DEFAULT_IMAGE: &str = "nginx:latest";

/// NginxSpec defines the desired state of an nginx instance
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "nginx.tsuru.io",
    version = "v1alpha1",
    kind = "Nginx",
    namespaced,
    status = "NginxStatus",
    shortname = "ngx",
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".status.currentReplicas"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NginxSpec {
    /// Number of desired pods. Unset means the count is managed elsewhere
    /// (e.g. an autoscaler acting through the scale subresource).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Docker image name. Defaults to `nginx:latest`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// Reference to the nginx configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigRef>,

    /// Path used by the readiness probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck_path: Option<String>,

    /// TLS certificates, each one backed by a Secret of type kubernetes.io/tls
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tls: Vec<NginxTls>,

    /// Extra files mounted from a ConfigMap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_files: Option<FilesRef>,

    /// Cache volume configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<NginxCacheSpec>,

    /// Overrides applied to the generated pod template
    #[serde(default)]
    pub pod_template: NginxPodTemplateSpec,

    /// How the pods are exposed through a Service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<NginxService>,

    /// Ingress exposing the Service. No Ingress is managed when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<NginxIngress>,

    /// Compute resources of the nginx container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Lifecycle hook overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<NginxLifecycle>,
}

impl NginxSpec {
    /// Image to run, falling back to [`DEFAULT_IMAGE`].
    pub fn image_or_default(&self) -> &str {
        if self.image.is_empty() {
            DEFAULT_IMAGE
        } else {
            &self.image
        }
    }
}

/// Reference to an nginx.conf, either in a ConfigMap or inlined
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRef {
    /// ConfigMap name (ignored for inline configs)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Where the configuration lives
    pub kind: ConfigKind,

    /// Literal nginx.conf content (only for `Inline`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Kind of configuration reference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConfigKind {
    /// nginx.conf is the `nginx.conf` key of a ConfigMap
    #[default]
    ConfigMap,

    /// nginx.conf is carried in a pod annotation
    Inline,
}

/// A TLS certificate served by nginx
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NginxTls {
    /// Secret holding `tls.crt` and `tls.key`
    pub secret_name: String,

    /// Hosts covered by the certificate
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
}

/// Extra files mounted from a ConfigMap
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FilesRef {
    /// ConfigMap name
    pub name: String,

    /// ConfigMap key -> relative path under the extra files directory
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, String>,
}

/// Cache volume configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NginxCacheSpec {
    /// Mount path of the cache volume. No cache volume is created when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    /// Back the cache with memory instead of node disk
    #[serde(default)]
    pub in_memory: bool,

    /// Cache size (the `max_size` configured in nginx)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Quantity>,
}

/// Lifecycle hooks for the nginx container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NginxLifecycle {
    /// Hook executed before the container is stopped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_stop: Option<NginxLifecycleHandler>,

    /// Hook executed after the configuration has been validated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_start: Option<NginxLifecycleHandler>,
}

/// Exec-only lifecycle handler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NginxLifecycleHandler {
    /// Command to run inside the container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecAction>,
}

/// Overrides applied to the generated pod template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NginxPodTemplateSpec {
    /// Extra pod annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Extra pod labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Pod affinity rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    /// Node selector
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Pod tolerations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    /// Run pods in the node network namespace
    #[serde(default)]
    pub host_network: bool,

    /// Container ports. `http` and `https` are added when missing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,

    /// Grace period before the pod is killed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_grace_period_seconds: Option<i64>,

    /// Extra pod volumes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,

    /// Extra mounts for the nginx container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,

    /// Security context of the nginx container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,

    /// Pod-level security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_security_context: Option<PodSecurityContext>,

    /// Service account used by the pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// Sidecar containers appended after nginx
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<Container>,

    /// Init containers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init_containers: Vec<Container>,

    /// Topology spread constraints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topology_spread_constraints: Vec<TopologySpreadConstraint>,

    /// Rolling update policy. Takes precedence over computed defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolling_update: Option<RollingUpdateDeployment>,
}

/// Service exposing the nginx pods
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NginxService {
    /// Service type
    #[serde(default, rename = "type")]
    pub type_: NginxServiceType,

    /// Requested load balancer IP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_ip: Option<String>,

    /// Service annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Service labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Whether the Service selects pods. When false the controller maintains
    /// the Endpoints object itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_pod_selector: Option<bool>,

    /// `Cluster` or `Local`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_traffic_policy: Option<String>,
}

impl NginxService {
    /// Pod selection is on unless explicitly disabled.
    pub fn uses_pod_selector(&self) -> bool {
        self.use_pod_selector.unwrap_or(true)
    }
}

/// Service types supported for nginx
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum NginxServiceType {
    /// Cluster-internal virtual IP
    #[default]
    ClusterIP,

    /// Port opened on every node
    NodePort,

    /// Cloud load balancer
    LoadBalancer,
}

impl NginxServiceType {
    /// Value of `Service.spec.type`
    pub fn as_str(&self) -> &'static str {
        match self {
            NginxServiceType::ClusterIP => "ClusterIP",
            NginxServiceType::NodePort => "NodePort",
            NginxServiceType::LoadBalancer => "LoadBalancer",
        }
    }
}

/// Ingress exposing the nginx Service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NginxIngress {
    /// IngressClass name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,

    /// Ingress annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Ingress labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// NginxStatus defines the observed state of an nginx instance
///
/// Lists are always serialized so that a merge patch replaces them wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NginxStatus {
    /// Generation of the spec the status was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Total pods targeted by the deployments
    #[serde(default)]
    pub current_replicas: i32,

    /// Label selector of the pods, used by the scale subresource
    #[serde(default)]
    pub pod_selector: String,

    /// Deployments owned by this instance, sorted by name
    #[serde(default)]
    pub deployments: Vec<DeploymentSummary>,

    /// Services owned by this instance, sorted by name
    #[serde(default)]
    pub services: Vec<ServiceSummary>,

    /// Ingresses owned by this instance, sorted by name
    #[serde(default)]
    pub ingresses: Vec<IngressSummary>,

    /// Pods of this instance, sorted by name
    #[serde(default)]
    pub pods: Vec<PodSummary>,
}

/// Deployment entry in [`NginxStatus`]
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSummary {
    /// Deployment name
    pub name: String,
}

/// Service entry in [`NginxStatus`]
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSummary {
    /// Service name
    pub name: String,

    /// Load balancer IPs, sorted
    #[serde(default)]
    pub ips: Vec<String>,

    /// Load balancer hostnames, sorted
    #[serde(default)]
    pub hostnames: Vec<String>,
}

/// Ingress entry in [`NginxStatus`]
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressSummary {
    /// Ingress name
    pub name: String,

    /// Load balancer IPs, sorted
    #[serde(default)]
    pub ips: Vec<String>,

    /// Load balancer hostnames, sorted
    #[serde(default)]
    pub hostnames: Vec<String>,
}

/// Pod entry in [`NginxStatus`]
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodSummary {
    /// Pod name
    pub name: String,

    /// Pod IP, `<pending>` until one is assigned
    #[serde(rename = "podIP")]
    pub pod_ip: String,

    /// IP of the node running the pod, `<pending>` until scheduled
    #[serde(rename = "hostIP")]
    pub host_ip: String,
}
