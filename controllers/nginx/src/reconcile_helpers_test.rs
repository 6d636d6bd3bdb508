//! Unit tests for reconcile_helpers module

use crate::error::ControllerError;
use crate::events::RecordingEventPublisher;
use crate::reconcile_helpers::*;
use crate::resources::deployment::new_deployment;
use crate::test_utils::*;
use cluster_client::{MockObjectStore, Operation, StoreError};
use crds::{ANNOTATION_GENERATED_FROM, NginxSpec};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ObjectReference;

fn spec(image: &str) -> NginxSpec {
    NginxSpec {
        image: image.to_string(),
        ..Default::default()
    }
}

fn desired(image: &str) -> Deployment {
    new_deployment(&test_nginx("web", spec(image))).unwrap()
}

fn owner() -> ObjectReference {
    ObjectReference {
        kind: Some("Nginx".to_string()),
        namespace: Some(TEST_NAMESPACE.to_string()),
        name: Some("web".to_string()),
        ..Default::default()
    }
}

fn keep_desired(_live: &Deployment, desired: Deployment) -> Merged<Deployment> {
    Merged::clean(desired)
}

fn with_live_version(live: &Deployment, desired: Deployment) -> Merged<Deployment> {
    let mut desired = desired;
    copy_forward_metadata(live, &mut desired);
    Merged::clean(desired)
}

#[tokio::test]
async fn test_create_when_missing() {
    let store = MockObjectStore::new();
    let events = RecordingEventPublisher::default();
    let owner = owner();
    let ctx = OwnerContext {
        events: &events,
        owner: &owner,
        kind: "Deployment",
    };

    let applied = ensure_object(&store, &ctx, desired("nginx:1"), &spec("nginx:1"), keep_desired)
        .await
        .unwrap();
    assert!(matches!(applied, Applied::Created(_)));
    assert!(applied.wrote());
    assert_eq!(events.reasons(), vec!["DeploymentCreated"]);
}

#[tokio::test]
async fn test_already_exists_falls_through_to_update() {
    let inner = MockObjectStore::new();
    inner.insert(desired("nginx:1"));
    let store = RacingStore::new(inner.clone());
    let events = RecordingEventPublisher::default();
    let owner = owner();
    let ctx = OwnerContext {
        events: &events,
        owner: &owner,
        kind: "Deployment",
    };

    let applied = ensure_object(&store, &ctx, desired("nginx:2"), &spec("nginx:2"), with_live_version)
        .await
        .unwrap();
    assert!(matches!(applied, Applied::Updated(_)));
    assert_eq!(inner.calls(Operation::Create), 1);
    assert_eq!(inner.calls(Operation::Replace), 1);
    assert!(events.warnings().is_empty());
}

#[tokio::test]
async fn test_conflict_is_retried_from_fresh_read() {
    let store = MockObjectStore::new();
    store.insert(desired("nginx:1"));
    store.fail_next(Operation::Replace, StoreError::Conflict("stale".to_string()));
    let events = RecordingEventPublisher::default();
    let owner = owner();
    let ctx = OwnerContext {
        events: &events,
        owner: &owner,
        kind: "Deployment",
    };

    let applied = ensure_object(&store, &ctx, desired("nginx:2"), &spec("nginx:2"), with_live_version)
        .await
        .unwrap();
    assert!(matches!(applied, Applied::Updated(_)));
    assert_eq!(store.calls(Operation::Replace), 2);
    assert_eq!(store.calls(Operation::Get), 2);
}

#[tokio::test]
async fn test_second_conflict_is_returned() {
    let store = MockObjectStore::new();
    store.insert(desired("nginx:1"));
    store.fail_next(Operation::Replace, StoreError::Conflict("stale".to_string()));
    store.fail_next(Operation::Replace, StoreError::Conflict("stale again".to_string()));
    let events = RecordingEventPublisher::default();
    let owner = owner();
    let ctx = OwnerContext {
        events: &events,
        owner: &owner,
        kind: "Deployment",
    };

    let err = ensure_object(&store, &ctx, desired("nginx:2"), &spec("nginx:2"), with_live_version)
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::Store(StoreError::Conflict(_))));
    assert_eq!(events.warnings()[0].reason, "DeploymentUpdateFailed");
}

#[tokio::test]
async fn test_forbidden_update_is_quota_exceeded() {
    let store = MockObjectStore::new();
    store.insert(desired("nginx:1"));
    store.fail_next(Operation::Replace, StoreError::Forbidden("quota".to_string()));
    let events = RecordingEventPublisher::default();
    let owner = owner();
    let ctx = OwnerContext {
        events: &events,
        owner: &owner,
        kind: "Deployment",
    };

    assert!(
        ensure_object(&store, &ctx, desired("nginx:2"), &spec("nginx:2"), with_live_version)
            .await
            .is_err()
    );
    assert_eq!(events.warnings()[0].reason, "DeploymentQuotaExceeded");
}

#[tokio::test]
async fn test_matching_fingerprint_skips_write() {
    let store = MockObjectStore::new();
    store.insert(desired("nginx:1"));
    let events = RecordingEventPublisher::default();
    let owner = owner();
    let ctx = OwnerContext {
        events: &events,
        owner: &owner,
        kind: "Deployment",
    };

    let applied = ensure_object(&store, &ctx, desired("nginx:1"), &spec("nginx:1"), keep_desired)
        .await
        .unwrap();
    assert!(!applied.wrote());
    assert_eq!(store.writes(), 0);
    assert!(events.events().is_empty());
}

#[tokio::test]
async fn test_delete_missing_object_is_not_an_error() {
    let store = MockObjectStore::<Deployment>::new();
    let events = RecordingEventPublisher::default();
    let owner = owner();
    let ctx = OwnerContext {
        events: &events,
        owner: &owner,
        kind: "Deployment",
    };
    assert!(!delete_object(&store, &ctx, TEST_NAMESPACE, "web").await.unwrap());
    assert_eq!(store.writes(), 0);
}

#[test]
fn test_fingerprint_missing_means_stale() {
    let mut live = desired("nginx:1");
    live.metadata.annotations = None;
    assert!(!fingerprint_matches(&live, &spec("nginx:1")).unwrap());
}

#[test]
fn test_fingerprint_detects_change() {
    let live = desired("nginx:1");
    assert!(fingerprint_matches(&live, &spec("nginx:1")).unwrap());
    assert!(!fingerprint_matches(&live, &spec("nginx:2")).unwrap());
}

#[test]
fn test_fingerprint_corrupt() {
    let mut live = desired("nginx:1");
    live.metadata
        .annotations
        .get_or_insert_default()
        .insert(ANNOTATION_GENERATED_FROM.to_string(), "{\"replicas\": \"two\"".to_string());
    let err = fingerprint_matches(&live, &spec("nginx:1")).unwrap_err();
    assert!(matches!(err, ControllerError::CorruptFingerprint(_)));
}

#[test]
fn test_copy_forward_keeps_desired_annotation_values() {
    let mut live = desired("nginx:1");
    live.metadata.resource_version = Some("9".to_string());
    live.metadata.finalizers = Some(vec!["keep".to_string()]);
    let annotations = live.metadata.annotations.get_or_insert_default();
    annotations.insert("foreign".to_string(), "x".to_string());

    let mut next = desired("nginx:2");
    copy_forward_metadata(&live, &mut next);

    let annotations = next.metadata.annotations.unwrap();
    assert_eq!(annotations["foreign"], "x");
    assert_eq!(
        annotations[ANNOTATION_GENERATED_FROM],
        crds::fingerprint(&spec("nginx:2")).unwrap()
    );
    assert_eq!(next.metadata.resource_version.as_deref(), Some("9"));
    assert_eq!(next.metadata.finalizers, Some(vec!["keep".to_string()]));
}
