//! Spec fingerprints
//!
//! The spec an object was generated from is stored as canonical JSON in the
//! [`ANNOTATION_GENERATED_FROM`](crate::labels::ANNOTATION_GENERATED_FROM)
//! annotation. Reading it back and comparing specs tells the controller
//! whether the live object is already up to date without diffing fields the
//! API server mutates.

use crate::nginx::NginxSpec;

/// Canonical JSON of `spec`.
///
/// Goes through `serde_json::Value`, whose object map is ordered by key, so
/// equal specs always render to the same string.
pub fn fingerprint(spec: &NginxSpec) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(spec)?;
    serde_json::to_string(&value)
}

/// Parse a stored fingerprint back into the spec it came from.
pub fn parse_fingerprint(raw: &str) -> Result<NginxSpec, serde_json::Error> {
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nginx::{NginxService, NginxServiceType};
    use std::collections::BTreeMap;

    #[test]
    fn test_fingerprint_is_key_sorted() {
        let spec = NginxSpec {
            replicas: Some(2),
            image: "nginx:1.25".to_string(),
            ..Default::default()
        };
        let fp = fingerprint(&spec).unwrap();
        assert_eq!(
            fp,
            r#"{"image":"nginx:1.25","podTemplate":{"hostNetwork":false},"replicas":2}"#
        );
    }

    #[test]
    fn test_fingerprint_stable_across_map_insertion_order() {
        let mut a = BTreeMap::new();
        a.insert("z".to_string(), "1".to_string());
        a.insert("a".to_string(), "2".to_string());
        let mut b = BTreeMap::new();
        b.insert("a".to_string(), "2".to_string());
        b.insert("z".to_string(), "1".to_string());

        let spec = |annotations| NginxSpec {
            service: Some(NginxService {
                type_: NginxServiceType::LoadBalancer,
                annotations,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(fingerprint(&spec(a)).unwrap(), fingerprint(&spec(b)).unwrap());
    }

    #[test]
    fn test_parse_fingerprint_round_trips_to_equal_spec() {
        let spec = NginxSpec {
            healthcheck_path: Some("/healthz".to_string()),
            ..Default::default()
        };
        let parsed = parse_fingerprint(&fingerprint(&spec).unwrap()).unwrap();
        assert_eq!(parsed, spec);
    }

    #[test]
    fn test_parse_fingerprint_rejects_garbage() {
        assert!(parse_fingerprint("{not json").is_err());
    }
}
