//! Well-known labels and annotations
//!
//! Every object the operator owns carries the [`LABEL_APP`] /
//! [`LABEL_RESOURCE_NAME`] pair. The same pair is the pod selector.

use std::collections::BTreeMap;

/// Label identifying objects created by this operator
pub const LABEL_APP: &str = "nginx.tsuru.io/app";

/// Value of [`LABEL_APP`]
pub const LABEL_APP_VALUE: &str = "nginx";

/// Label holding the name of the owning `Nginx`
pub const LABEL_RESOURCE_NAME: &str = "nginx.tsuru.io/resource-name";

/// Label on a Service whose Endpoints are maintained by the operator
pub const LABEL_MANAGED_ENDPOINTS: &str = "nginx.tsuru.io/managed-endpoints";

/// Annotation holding the canonical JSON of the spec an object was built from
pub const ANNOTATION_GENERATED_FROM: &str = "nginx.tsuru.io/generated-from";

/// Pod annotation carrying an inline nginx.conf
pub const ANNOTATION_CUSTOM_CONFIG: &str = "nginx.tsuru.io/custom-nginx-config";

/// `Nginx` annotation requesting the IPv6 Ingress variant
pub const ANNOTATION_IPV6_ENABLED: &str = "nginx.tsuru.io/ipv6-gce-enabled";

/// GCP load balancer network tier. Immutable once set.
pub const ANNOTATION_GCP_NETWORK_TIER: &str = "cloud.google.com/network-tier";

/// OCI load balancer TLS secret
pub const ANNOTATION_OCI_TLS_SECRET: &str = "service.beta.kubernetes.io/oci-load-balancer-tls-secret";

/// OCI load balancer TLS ports
pub const ANNOTATION_OCI_SSL_PORTS: &str = "service.beta.kubernetes.io/oci-load-balancer-ssl-ports";

/// GCP global static IP bound to an Ingress
pub const ANNOTATION_GCP_STATIC_IP: &str = "kubernetes.io/ingress.global-static-ip-name";

/// Labels stamped on every object owned by the `Nginx` named `name`.
pub fn owned_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_APP.to_string(), LABEL_APP_VALUE.to_string()),
        (LABEL_RESOURCE_NAME.to_string(), name.to_string()),
    ])
}

/// Label selector string matching the pods of `name`.
pub fn owned_selector(name: &str) -> String {
    format!("{LABEL_APP}={LABEL_APP_VALUE},{LABEL_RESOURCE_NAME}={name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owned_selector_matches_labels() {
        let labels = owned_labels("my-nginx");
        let rendered = labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        assert_eq!(rendered, owned_selector("my-nginx"));
        assert_eq!(
            owned_selector("my-nginx"),
            "nginx.tsuru.io/app=nginx,nginx.tsuru.io/resource-name=my-nginx"
        );
    }
}
