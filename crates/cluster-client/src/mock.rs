//! Mock ObjectStore for unit testing
//!
//! An in-memory stand-in for the API server: objects are keyed by
//! namespace/name, every write bumps `resourceVersion`, stale replaces fail
//! with `Conflict`, and duplicate creates fail with `AlreadyExists`. Write
//! counters let tests assert that a reconcile was a no-op.
//!
//! `list` returns objects in reverse name order. The API server promises no
//! ordering, so callers that need sorted output must sort it themselves.

use crate::error::StoreError;
use crate::store_trait::ObjectStore;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Store operations, used for counting and error injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `get`
    Get,
    /// `list`
    List,
    /// `create`
    Create,
    /// `replace`
    Replace,
    /// `patch_status`
    PatchStatus,
    /// `delete`
    Delete,
}

/// Mock ObjectStore for testing
#[derive(Clone)]
pub struct MockObjectStore<K> {
    objects: Arc<Mutex<BTreeMap<(String, String), K>>>,
    calls: Arc<Mutex<HashMap<Operation, usize>>>,
    injected: Arc<Mutex<HashMap<Operation, Vec<StoreError>>>>,
    next_version: Arc<Mutex<u64>>,
}

impl<K> std::fmt::Debug for MockObjectStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockObjectStore").finish_non_exhaustive()
    }
}

impl<K> Default for MockObjectStore<K> {
    fn default() -> Self {
        Self {
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            calls: Arc::new(Mutex::new(HashMap::new())),
            injected: Arc::new(Mutex::new(HashMap::new())),
            next_version: Arc::new(Mutex::new(1)),
        }
    }
}

impl<K> MockObjectStore<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned,
{
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object as if it already existed in the cluster.
    /// Does not count as a write.
    pub fn insert(&self, object: K) {
        let mut object = object;
        let namespace = object.meta().namespace.clone().unwrap_or_default();
        let name = object.meta().name.clone().unwrap_or_default();
        self.stamp(&mut object);
        self.objects.lock().unwrap().insert((namespace, name), object);
    }

    /// Current stored copy of an object
    pub fn stored(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Every stored object
    pub fn all(&self) -> Vec<K> {
        self.objects.lock().unwrap().values().cloned().collect()
    }

    /// Number of calls made for `op`, including failed ones
    pub fn calls(&self, op: Operation) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    /// Total create, replace, status patch and delete calls
    pub fn writes(&self) -> usize {
        [
            Operation::Create,
            Operation::Replace,
            Operation::PatchStatus,
            Operation::Delete,
        ]
        .iter()
        .map(|op| self.calls(*op))
        .sum()
    }

    /// Reset all call counters
    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make the next call to `op` fail with `error`. Injected errors are
    /// consumed in order.
    pub fn fail_next(&self, op: Operation, error: StoreError) {
        self.injected
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push(error);
    }

    fn record(&self, op: Operation) -> Result<(), StoreError> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
        let mut injected = self.injected.lock().unwrap();
        match injected.get_mut(&op) {
            Some(errors) if !errors.is_empty() => Err(errors.remove(0)),
            _ => Ok(()),
        }
    }

    fn stamp(&self, object: &mut K) {
        let mut next = self.next_version.lock().unwrap();
        let meta = object.meta_mut();
        meta.resource_version = Some(next.to_string());
        if meta.uid.is_none() {
            meta.uid = Some(format!("uid-{next}"));
        }
        *next += 1;
    }
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

/// Equality-only selector matching (`k=v,k2=v2`), enough for owned labels.
fn matches_selector(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| {
            let (k, v) = term.split_once('=').unwrap_or((term, ""));
            labels.and_then(|l| l.get(k)).map(String::as_str) == Some(v)
        })
}

#[async_trait::async_trait]
impl<K> ObjectStore<K> for MockObjectStore<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        self.record(Operation::Get)?;
        Ok(self.stored(namespace, name))
    }

    async fn list(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<K>, StoreError> {
        self.record(Operation::List)?;
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .rev()
            .filter(|((ns, _), _)| ns == namespace)
            .filter(|(_, obj)| {
                label_selector.is_none_or(|s| matches_selector(obj.meta().labels.as_ref(), s))
            })
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        self.record(Operation::Create)?;
        let name = object.meta().name.clone().unwrap_or_default();
        if self.stored(namespace, &name).is_some() {
            return Err(StoreError::AlreadyExists(format!("{namespace}/{name}")));
        }
        let mut created = object.clone();
        created.meta_mut().namespace = Some(namespace.to_string());
        self.stamp(&mut created);
        self.objects
            .lock()
            .unwrap()
            .insert(key(namespace, &name), created.clone());
        Ok(created)
    }

    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<K, StoreError> {
        self.record(Operation::Replace)?;
        let current = self
            .stored(namespace, name)
            .ok_or_else(|| StoreError::NotFound(format!("{namespace}/{name}")))?;
        if object.meta().resource_version != current.meta().resource_version {
            return Err(StoreError::Conflict(format!(
                "{namespace}/{name}: resourceVersion {:?} is stale",
                object.meta().resource_version
            )));
        }
        let mut replaced = object.clone();
        replaced.meta_mut().namespace = Some(namespace.to_string());
        replaced.meta_mut().uid = current.meta().uid.clone();
        self.stamp(&mut replaced);
        self.objects
            .lock()
            .unwrap()
            .insert(key(namespace, name), replaced.clone());
        Ok(replaced)
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: serde_json::Value,
    ) -> Result<K, StoreError> {
        self.record(Operation::PatchStatus)?;
        let current = self
            .stored(namespace, name)
            .ok_or_else(|| StoreError::NotFound(format!("{namespace}/{name}")))?;
        let mut value = serde_json::to_value(&current)?;
        value["status"] = status;
        let mut patched: K = serde_json::from_value(value)?;
        self.stamp(&mut patched);
        self.objects
            .lock()
            .unwrap()
            .insert(key(namespace, name), patched.clone());
        Ok(patched)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.record(Operation::Delete)?;
        self.objects
            .lock()
            .unwrap()
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("{namespace}/{name}")))
    }
}
