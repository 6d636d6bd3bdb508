//! Controller configuration.
//!
//! Read once from the environment at startup and passed down explicitly;
//! nothing below `main` reads environment variables.

use crate::annotation_filter::AnnotationFilter;
use crate::error::ControllerError;
use std::time::Duration;

/// Default compute API base URL
pub const DEFAULT_GCP_COMPUTE_ENDPOINT: &str = "https://compute.googleapis.com";

/// Default metadata server base URL
pub const DEFAULT_GCP_METADATA_ENDPOINT: &str = "http://metadata.google.internal";

/// Runtime configuration for both controllers
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace to watch, `None` for all namespaces
    pub namespace: Option<String>,
    /// Which `Nginx` objects this instance manages
    pub annotation_filter: AnnotationFilter,
    /// Requeue interval after a successful reconcile
    pub sync_period: Duration,
    /// Requeue interval for objects rejected by the filter
    pub filter_requeue: Duration,
    /// Maximum concurrent reconciles per controller
    pub concurrency: u16,
    /// Run the Endpoints controller
    pub endpoints_controller_enabled: bool,
    /// Reporting component for events and field manager for writes
    pub controller_name: String,
    /// GCP project for IPv6 global addresses
    pub gcp_project: Option<String>,
    /// GCP compute API base URL
    pub gcp_compute_endpoint: String,
    /// GCP metadata server base URL
    pub gcp_metadata_endpoint: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            annotation_filter: AnnotationFilter::default(),
            sync_period: Duration::from_secs(600),
            filter_requeue: Duration::from_secs(300),
            concurrency: 4,
            endpoints_controller_enabled: true,
            controller_name: "nginx-operator".to_string(),
            gcp_project: None,
            gcp_compute_endpoint: DEFAULT_GCP_COMPUTE_ENDPOINT.to_string(),
            gcp_metadata_endpoint: DEFAULT_GCP_METADATA_ENDPOINT.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let annotation_filter = match get("ANNOTATION_FILTER") {
            Some(expr) => AnnotationFilter::parse(&expr)?,
            None => AnnotationFilter::default(),
        };

        Ok(Self {
            namespace: get("WATCH_NAMESPACE"),
            annotation_filter,
            sync_period: match get("SYNC_PERIOD_SECONDS") {
                Some(v) => Duration::from_secs(parse_number("SYNC_PERIOD_SECONDS", &v)?),
                None => defaults.sync_period,
            },
            filter_requeue: match get("FILTER_REQUEUE_SECONDS") {
                Some(v) => Duration::from_secs(parse_number("FILTER_REQUEUE_SECONDS", &v)?),
                None => defaults.filter_requeue,
            },
            concurrency: match get("RECONCILE_CONCURRENCY") {
                Some(v) => parse_number("RECONCILE_CONCURRENCY", &v)?,
                None => defaults.concurrency,
            },
            endpoints_controller_enabled: match get("ENDPOINTS_CONTROLLER_ENABLED") {
                Some(v) => parse_bool("ENDPOINTS_CONTROLLER_ENABLED", &v)?,
                None => defaults.endpoints_controller_enabled,
            },
            controller_name: get("CONTROLLER_NAME").unwrap_or(defaults.controller_name),
            gcp_project: get("GCP_PROJECT_ID"),
            gcp_compute_endpoint: get("GCP_COMPUTE_ENDPOINT")
                .unwrap_or(defaults.gcp_compute_endpoint),
            gcp_metadata_endpoint: get("GCP_METADATA_ENDPOINT")
                .unwrap_or(defaults.gcp_metadata_endpoint),
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ControllerError> {
    value.trim().parse::<T>().map_err(|_| {
        ControllerError::InvalidConfig(format!("{key} must be a non-negative integer, got {value:?}"))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ControllerError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ControllerError::InvalidConfig(format!(
            "{key} must be a boolean, got {value:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ControllerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.namespace, None);
        assert_eq!(config.sync_period, Duration::from_secs(600));
        assert_eq!(config.filter_requeue, Duration::from_secs(300));
        assert_eq!(config.concurrency, 4);
        assert!(config.endpoints_controller_enabled);
        assert_eq!(config.controller_name, "nginx-operator");
        assert!(config.annotation_filter.is_empty());
        assert_eq!(config.gcp_compute_endpoint, DEFAULT_GCP_COMPUTE_ENDPOINT);
    }

    #[test]
    fn test_overrides() {
        let config = ControllerConfig::from_lookup(lookup(&[
            ("WATCH_NAMESPACE", "web"),
            ("ANNOTATION_FILTER", "team=edge"),
            ("SYNC_PERIOD_SECONDS", "30"),
            ("RECONCILE_CONCURRENCY", "8"),
            ("ENDPOINTS_CONTROLLER_ENABLED", "false"),
            ("GCP_PROJECT_ID", "my-project"),
        ]))
        .unwrap();
        assert_eq!(config.namespace.as_deref(), Some("web"));
        assert_eq!(config.sync_period, Duration::from_secs(30));
        assert_eq!(config.concurrency, 8);
        assert!(!config.endpoints_controller_enabled);
        assert_eq!(config.gcp_project.as_deref(), Some("my-project"));
        assert!(!config.annotation_filter.is_empty());
    }

    #[test]
    fn test_empty_value_is_unset() {
        let config = ControllerConfig::from_lookup(lookup(&[("WATCH_NAMESPACE", "")])).unwrap();
        assert_eq!(config.namespace, None);
    }

    #[test]
    fn test_invalid_number_fails() {
        let err = ControllerConfig::from_lookup(lookup(&[("SYNC_PERIOD_SECONDS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }

    #[test]
    fn test_invalid_filter_fails() {
        let err = ControllerConfig::from_lookup(lookup(&[("ANNOTATION_FILTER", "a in (b")]))
            .unwrap_err();
        assert!(matches!(err, ControllerError::InvalidSelector(_)));
    }
}
