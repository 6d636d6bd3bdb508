//! Helper functions for common reconciliation patterns
//!
//! Every owned kind goes through the same read-compare-write cycle:
//! create when missing, skip when the stored fingerprint matches the
//! current spec, otherwise merge desired onto live and replace. The
//! per-kind differences live in the `merge` closure passed to
//! [`ensure_object`].

use crate::error::ControllerError;
use crate::events::{EventPublisher, reasons};
use cluster_client::{ObjectStore, StoreError};
use crds::{ANNOTATION_GENERATED_FROM, NginxSpec, parse_fingerprint};
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Resource;
use kube::runtime::events::EventType;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Who an object belongs to and where events about it go
pub struct OwnerContext<'a> {
    /// Events sink
    pub events: &'a dyn EventPublisher,
    /// Reference to the owning `Nginx`
    pub owner: &'a ObjectReference,
    /// Kubernetes kind of the object, prefix of event reasons
    pub kind: &'static str,
}

impl OwnerContext<'_> {
    async fn normal(&self, reason: String, action: &str, note: String) {
        self.events
            .publish(self.owner, EventType::Normal, &reason, action, Some(note))
            .await;
    }

    async fn warning(&self, reason: &str, action: &str, note: String) {
        self.events
            .publish(self.owner, EventType::Warning, reason, action, Some(note))
            .await;
    }

    /// Forbidden is surfaced as a quota problem, everything else as a plain
    /// failure of `action`.
    async fn failure(&self, error: &StoreError, failed_reason: String, action: &str, object: &str) {
        let reason = if matches!(error, StoreError::Forbidden(_)) {
            reasons::quota_exceeded(self.kind)
        } else {
            failed_reason
        };
        self.warning(&reason, action, format!("{} {object}: {error}", self.kind))
            .await;
    }
}

/// Result of merging a desired object onto the live one
#[derive(Debug)]
pub struct Merged<K> {
    /// Object to write
    pub object: K,
    /// Warnings to surface as events on the owner
    pub warnings: Vec<MergeWarning>,
}

impl<K> Merged<K> {
    /// A merge without warnings
    pub fn clean(object: K) -> Self {
        Self {
            object,
            warnings: Vec::new(),
        }
    }
}

/// A desired change the merge refused to apply
#[derive(Debug, Clone, PartialEq)]
pub struct MergeWarning {
    /// Event reason
    pub reason: &'static str,
    /// Human readable note
    pub note: String,
}

/// What `ensure_object` did
#[derive(Debug)]
pub enum Applied<K> {
    /// The object did not exist and was created
    Created(K),
    /// The object existed with a stale fingerprint and was replaced
    Updated(K),
    /// The stored fingerprint matched; nothing was written
    Unchanged(K),
}

impl<K> Applied<K> {
    /// True when the reconcile issued a write
    pub fn wrote(&self) -> bool {
        !matches!(self, Applied::Unchanged(_))
    }
}

fn object_key<K: Resource>(object: &K) -> Result<(String, String), ControllerError> {
    let meta = object.meta();
    match (&meta.namespace, &meta.name) {
        (Some(namespace), Some(name)) => Ok((namespace.clone(), name.clone())),
        _ => Err(ControllerError::MissingMetadata(
            "desired object without namespace/name".to_string(),
        )),
    }
}

/// True when `live` was last written from `spec`.
///
/// A missing annotation means the object predates the fingerprint and must
/// be rewritten; an unparsable one is corruption and fails the reconcile.
pub fn fingerprint_matches<K: Resource>(live: &K, spec: &NginxSpec) -> Result<bool, ControllerError> {
    let Some(raw) = live
        .meta()
        .annotations
        .as_ref()
        .and_then(|a| a.get(ANNOTATION_GENERATED_FROM))
    else {
        return Ok(false);
    };
    match parse_fingerprint(raw) {
        Ok(stored) => Ok(&stored == spec),
        Err(e) => Err(ControllerError::CorruptFingerprint(format!(
            "{}/{}: {e}",
            live.meta().namespace.as_deref().unwrap_or_default(),
            live.meta().name.as_deref().unwrap_or_default()
        ))),
    }
}

/// Create `desired` or bring the live object up to date with it.
///
/// `merge(live, desired)` builds the replacement; it is called again on a
/// fresh read when the first replace hits a conflict. A second conflict is
/// returned to the caller.
pub async fn ensure_object<K, F>(
    store: &dyn ObjectStore<K>,
    ctx: &OwnerContext<'_>,
    desired: K,
    spec: &NginxSpec,
    merge: F,
) -> Result<Applied<K>, ControllerError>
where
    K: Resource + Clone + Send + Sync + 'static,
    F: Fn(&K, K) -> Merged<K>,
{
    let (namespace, name) = object_key(&desired)?;
    let object = format!("{namespace}/{name}");
    let kind = ctx.kind;

    let live = match store.get(&namespace, &name).await? {
        Some(live) => live,
        None => match store.create(&namespace, &desired).await {
            Ok(created) => {
                info!("Created {} {}", kind, object);
                ctx.normal(reasons::created(kind), "Create", format!("{kind} {object} created"))
                    .await;
                return Ok(Applied::Created(created));
            }
            Err(StoreError::AlreadyExists(_)) => {
                debug!("{} {} appeared concurrently, updating instead", kind, object);
                store
                    .get(&namespace, &name)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(object.clone()))?
            }
            Err(e) => {
                warn!("Failed to create {} {}: {}", kind, object, e);
                ctx.failure(&e, reasons::create_failed(kind), "Create", &object)
                    .await;
                return Err(e.into());
            }
        },
    };

    if fingerprint_matches(&live, spec)? {
        debug!("{} {} is up to date", kind, object);
        return Ok(Applied::Unchanged(live));
    }

    let mut live = live;
    let mut retried = false;
    loop {
        let merged = merge(&live, desired.clone());
        match store.replace(&namespace, &name, &merged.object).await {
            Ok(updated) => {
                for warning in &merged.warnings {
                    warn!("{} {}: {}", kind, object, warning.note);
                    ctx.warning(warning.reason, "Update", warning.note.clone())
                        .await;
                }
                info!("Updated {} {}", kind, object);
                ctx.normal(reasons::updated(kind), "Update", format!("{kind} {object} updated"))
                    .await;
                return Ok(Applied::Updated(updated));
            }
            Err(StoreError::Conflict(_)) if !retried => {
                debug!("Conflict updating {} {}, retrying from a fresh read", kind, object);
                retried = true;
                live = store
                    .get(&namespace, &name)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(object.clone()))?;
            }
            Err(e) => {
                warn!("Failed to update {} {}: {}", kind, object, e);
                ctx.failure(&e, reasons::update_failed(kind), "Update", &object)
                    .await;
                return Err(e.into());
            }
        }
    }
}

/// Delete an owned object that the spec no longer asks for.
///
/// Returns whether something was deleted; an already missing object is
/// not an error and costs no write.
pub async fn delete_object<K>(
    store: &dyn ObjectStore<K>,
    ctx: &OwnerContext<'_>,
    namespace: &str,
    name: &str,
) -> Result<bool, ControllerError>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    let kind = ctx.kind;
    if store.get(namespace, name).await?.is_none() {
        return Ok(false);
    }
    match store.delete(namespace, name).await {
        Ok(()) => {
            info!("Deleted {} {}/{}", kind, namespace, name);
            ctx.normal(
                reasons::deleted(kind),
                "Delete",
                format!("{kind} {namespace}/{name} deleted"),
            )
            .await;
            Ok(true)
        }
        Err(StoreError::NotFound(_)) => Ok(false),
        Err(e) => {
            warn!("Failed to delete {} {}/{}: {}", kind, namespace, name, e);
            Err(e.into())
        }
    }
}

/// Carry forward metadata owned by other actors: resourceVersion,
/// finalizers, and annotations the desired object does not declare.
pub fn copy_forward_metadata<K: Resource>(live: &K, desired: &mut K) {
    let live_meta = live.meta();
    let meta = desired.meta_mut();
    meta.resource_version = live_meta.resource_version.clone();
    meta.finalizers = live_meta.finalizers.clone();

    if let Some(live_annotations) = &live_meta.annotations {
        let annotations = meta.annotations.get_or_insert_with(BTreeMap::new);
        for (key, value) in live_annotations {
            annotations
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}
