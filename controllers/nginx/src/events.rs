//! Kubernetes Event recording.
//!
//! Events are the user-visible record of what the controller did to an
//! `Nginx` (`kubectl describe nginx <name>`). Publishing is fire-and-forget:
//! a failed event is logged and never fails a reconcile.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::warn;

/// Publishes Kubernetes Events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event about `resource_ref`
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Event reasons.
pub mod reasons {
    /// `<Kind>Created`
    pub fn created(kind: &str) -> String {
        format!("{kind}Created")
    }

    /// `<Kind>Updated`
    pub fn updated(kind: &str) -> String {
        format!("{kind}Updated")
    }

    /// `<Kind>Deleted`
    pub fn deleted(kind: &str) -> String {
        format!("{kind}Deleted")
    }

    /// `<Kind>CreateFailed`
    pub fn create_failed(kind: &str) -> String {
        format!("{kind}CreateFailed")
    }

    /// `<Kind>UpdateFailed`
    pub fn update_failed(kind: &str) -> String {
        format!("{kind}UpdateFailed")
    }

    /// `<Kind>QuotaExceeded`, used for any Forbidden response
    pub fn quota_exceeded(kind: &str) -> String {
        format!("{kind}QuotaExceeded")
    }

    /// A change to the GCP network tier annotation was ignored
    pub const NETWORK_TIER_CHANGE_REJECTED: &str = "NetworkTierChangeRejected";

    /// The IPv6 global address could not be reserved
    pub const IPV6_ALLOCATION_FAILED: &str = "IPv6AllocationFailed";
}

/// Records events in memory for assertions.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingEventPublisher {
    events: std::sync::Mutex<Vec<RecordedEvent>>,
}

/// A captured event
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub object: String,
    pub warning: bool,
    pub reason: String,
    pub note: Option<String>,
}

#[cfg(test)]
impl RecordingEventPublisher {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }

    pub fn warnings(&self) -> Vec<RecordedEvent> {
        self.events().into_iter().filter(|e| e.warning).collect()
    }
}

#[cfg(test)]
#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        _action: &str,
        note: Option<String>,
    ) {
        self.events.lock().unwrap().push(RecordedEvent {
            object: format!(
                "{}/{}",
                resource_ref.namespace.as_deref().unwrap_or_default(),
                resource_ref.name.as_deref().unwrap_or_default()
            ),
            warning: matches!(type_, EventType::Warning),
            reason: reason.to_string(),
            note,
        });
    }
}
