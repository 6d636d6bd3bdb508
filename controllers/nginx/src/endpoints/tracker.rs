//! Pod relevance filter for watch events.
//!
//! Pods churn constantly (status heartbeats, image digest refreshes). Only a
//! change to what decides endpoint membership or the status pod list should
//! trigger a reconcile, so each pod's relevant fields are hashed and an
//! event is forwarded only when that hash moves.

use super::builder::is_pod_ready;
use k8s_openapi::api::core::v1::Pod;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use tracing::warn;

/// Remembers the relevant state of every pod seen
#[derive(Debug, Default)]
pub struct PodRelevanceTracker {
    seen: Mutex<HashMap<(String, String), u64>>,
}

fn relevant_hash(pod: &Pod) -> u64 {
    let spec = pod.spec.as_ref();
    let status = pod.status.as_ref();
    let mut hasher = DefaultHasher::new();
    is_pod_ready(pod).hash(&mut hasher);
    spec.and_then(|s| s.hostname.as_deref()).hash(&mut hasher);
    spec.and_then(|s| s.subdomain.as_deref()).hash(&mut hasher);
    pod.metadata.labels.hash(&mut hasher);
    status.and_then(|s| s.pod_ip.as_deref()).hash(&mut hasher);
    status.and_then(|s| s.host_ip.as_deref()).hash(&mut hasher);
    hasher.finish()
}

impl PodRelevanceTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `pod` changed in a way that matters since it was last seen.
    ///
    /// A pod being deleted is always relevant and is forgotten.
    pub fn is_relevant(&self, pod: &Pod) -> bool {
        let key = (
            pod.metadata.namespace.clone().unwrap_or_default(),
            pod.metadata.name.clone().unwrap_or_default(),
        );
        let Ok(mut seen) = self.seen.lock() else {
            warn!("Pod tracker lock poisoned, forwarding event");
            return true;
        };

        if pod.metadata.deletion_timestamp.is_some() {
            seen.remove(&key);
            return true;
        }

        let hash = relevant_hash(pod);
        seen.insert(key, hash) != Some(hash)
    }
}
