//! Mock ClusterClient for unit testing
//!
//! Stores objects in memory and mimics the API server closely enough for
//! lifecycle workflows: label selection, merge patches, finalizers holding
//! deletion back, AlreadyExists/NotFound/Conflict and a switch that makes the
//! whole cluster unreachable.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kube::api::DynamicObject;
use serde_json::{Map, Value};

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crate::models::{ObjectKey, ResourceKind};
use crate::selector::LabelSelector;

/// Callback run after every successful merge patch, with the patched object.
/// Lets tests play the part of a controller (e.g. flip an Addon's phase).
/// Runs under the store lock, so it must not call back into the client.
pub type PatchHook = Arc<dyn Fn(&ResourceKind, &mut DynamicObject) + Send + Sync>;

type Store = BTreeMap<(ResourceKind, ObjectKey), DynamicObject>;

#[derive(Default)]
struct State {
    objects: Store,
    unserved: BTreeSet<ResourceKind>,
    failing_deletes: HashMap<(ResourceKind, String), String>,
    failing_patches: HashMap<(ResourceKind, String), String>,
    deleted: Vec<(ResourceKind, ObjectKey)>,
    patched: Vec<(ResourceKind, ObjectKey, Value)>,
    created: Vec<(ResourceKind, ObjectKey)>,
    hooks: Vec<PatchHook>,
    unreachable: bool,
    next_version: u64,
}

/// Mock ClusterClient for testing
#[derive(Clone, Default)]
pub struct MockClusterClient {
    state: Arc<Mutex<State>>,
}

impl std::fmt::Debug for MockClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MockClusterClient")
            .field("objects", &state.objects.len())
            .field("unreachable", &state.unreachable)
            .finish_non_exhaustive()
    }
}

/// Build a bare object of `kind` (test setup helper)
pub fn new_object(kind: &ResourceKind, namespace: Option<&str>, name: &str) -> DynamicObject {
    let object = DynamicObject::new(name, &kind.api_resource());
    match namespace {
        Some(ns) if kind.namespaced => object.within(ns),
        _ => object,
    }
}

/// RFC 7386 JSON merge patch
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

fn object_key(kind: &ResourceKind, namespace: Option<&str>, name: &str) -> ObjectKey {
    match namespace {
        Some(ns) if kind.namespaced => ObjectKey::namespaced(ns, name),
        _ => ObjectKey::cluster(name),
    }
}

fn has_finalizers(object: &DynamicObject) -> bool {
    object.metadata.finalizers.as_ref().is_some_and(|f| !f.is_empty())
}

impl MockClusterClient {
    /// Create an empty mock cluster
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an object to the store (for test setup)
    pub fn insert(&self, kind: &ResourceKind, object: DynamicObject) {
        let name = object.metadata.name.clone().unwrap_or_default();
        let key = object_key(kind, object.metadata.namespace.as_deref(), &name);
        self.lock().objects.insert((kind.clone(), key), object);
    }

    /// All stored objects of `kind`
    #[must_use]
    pub fn objects(&self, kind: &ResourceKind) -> Vec<DynamicObject> {
        self.lock()
            .objects
            .iter()
            .filter(|((k, _), _)| k == kind)
            .map(|(_, o)| o.clone())
            .collect()
    }

    /// Fetch one stored object
    #[must_use]
    pub fn object(&self, kind: &ResourceKind, namespace: Option<&str>, name: &str) -> Option<DynamicObject> {
        let key = object_key(kind, namespace, name);
        self.lock().objects.get(&(kind.clone(), key)).cloned()
    }

    /// Whether an object is still stored
    #[must_use]
    pub fn contains(&self, kind: &ResourceKind, namespace: Option<&str>, name: &str) -> bool {
        self.object(kind, namespace, name).is_some()
    }

    /// Deletion calls that succeeded, in order
    #[must_use]
    pub fn deleted(&self) -> Vec<(ResourceKind, ObjectKey)> {
        self.lock().deleted.clone()
    }

    /// Merge patches that succeeded, in order
    #[must_use]
    pub fn patched(&self) -> Vec<(ResourceKind, ObjectKey, Value)> {
        self.lock().patched.clone()
    }

    /// Creations that succeeded, in order
    #[must_use]
    pub fn created(&self) -> Vec<(ResourceKind, ObjectKey)> {
        self.lock().created.clone()
    }

    /// Register a hook that runs after every merge patch
    pub fn on_patch(&self, hook: impl Fn(&ResourceKind, &mut DynamicObject) + Send + Sync + 'static) {
        self.lock().hooks.push(Arc::new(hook));
    }

    /// Make `kind` behave as if its CRD is not installed
    pub fn set_unserved(&self, kind: &ResourceKind) {
        self.lock().unserved.insert(kind.clone());
    }

    /// Make deletes of `kind`/`name` fail with a 500
    pub fn fail_deletes_of(&self, kind: &ResourceKind, name: &str, message: &str) {
        self.lock()
            .failing_deletes
            .insert((kind.clone(), name.to_string()), message.to_string());
    }

    /// Make merge patches of `kind`/`name` fail with a 500
    pub fn fail_patches_of(&self, kind: &ResourceKind, name: &str, message: &str) {
        self.lock()
            .failing_patches
            .insert((kind.clone(), name.to_string()), message.to_string());
    }

    /// Drop every injected delete and patch failure
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing_deletes.clear();
        state.failing_patches.clear();
    }

    /// Make every call fail as a transport error
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    fn check(state: &State, kind: &ResourceKind) -> Result<(), ClusterError> {
        if state.unreachable {
            return Err(ClusterError::Unreachable("dial tcp: connection refused".to_string()));
        }
        if state.unserved.contains(kind) {
            return Err(ClusterError::NotFound(format!("the server could not find the requested resource ({kind})")));
        }
        Ok(())
    }

    fn check_scope(kind: &ResourceKind, namespace: Option<&str>) -> Result<(), ClusterError> {
        if kind.namespaced && namespace.is_none() {
            return Err(ClusterError::InvalidRequest(format!(
                "{kind} is namespaced but no namespace was given"
            )));
        }
        Ok(())
    }

    fn bump_version(state: &mut State, object: &mut DynamicObject) {
        state.next_version += 1;
        object.metadata.resource_version = Some(state.next_version.to_string());
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        let state = self.lock();
        Self::check(&state, kind)?;
        let namespace = namespace.filter(|_| kind.namespaced);
        Ok(state
            .objects
            .iter()
            .filter(|((k, key), _)| k == kind && (namespace.is_none() || key.namespace.as_deref() == namespace))
            .filter(|(_, o)| selector.is_none_or(|s| s.matches(o.metadata.labels.as_ref())))
            .map(|(_, o)| o.clone())
            .collect())
    }

    async fn get(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, ClusterError> {
        let state = self.lock();
        Self::check(&state, kind)?;
        Self::check_scope(kind, namespace)?;
        let key = object_key(kind, namespace, name);
        state
            .objects
            .get(&(kind.clone(), key.clone()))
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("{kind} \"{key}\" not found")))
    }

    async fn create(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        let mut state = self.lock();
        Self::check(&state, kind)?;
        Self::check_scope(kind, namespace)?;
        let name = object
            .metadata
            .name
            .clone()
            .ok_or_else(|| ClusterError::InvalidRequest("object has no metadata.name".to_string()))?;
        let key = object_key(kind, namespace, &name);
        let entry = (kind.clone(), key.clone());
        if state.objects.contains_key(&entry) {
            return Err(ClusterError::AlreadyExists(format!("{kind} \"{key}\" already exists")));
        }
        let mut created = object.clone();
        created.metadata.namespace = key.namespace.clone();
        Self::bump_version(&mut state, &mut created);
        state.objects.insert(entry, created.clone());
        state.created.push((kind.clone(), key));
        Ok(created)
    }

    async fn replace(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        let mut state = self.lock();
        Self::check(&state, kind)?;
        Self::check_scope(kind, namespace)?;
        let name = object
            .metadata
            .name
            .clone()
            .ok_or_else(|| ClusterError::InvalidRequest("object has no metadata.name".to_string()))?;
        let key = object_key(kind, namespace, &name);
        let entry = (kind.clone(), key.clone());
        let Some(existing) = state.objects.get(&entry) else {
            return Err(ClusterError::NotFound(format!("{kind} \"{key}\" not found")));
        };
        if object.metadata.resource_version.is_some()
            && object.metadata.resource_version != existing.metadata.resource_version
        {
            return Err(ClusterError::Conflict(format!(
                "{kind} \"{key}\": the object has been modified"
            )));
        }
        let mut replaced = object.clone();
        replaced.metadata.namespace = key.namespace.clone();
        Self::bump_version(&mut state, &mut replaced);
        state.objects.insert(entry, replaced.clone());
        Ok(replaced)
    }

    async fn patch_merge(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<DynamicObject, ClusterError> {
        let mut state = self.lock();
        Self::check(&state, kind)?;
        Self::check_scope(kind, namespace)?;
        if let Some(message) = state.failing_patches.get(&(kind.clone(), name.to_string())) {
            return Err(ClusterError::Api {
                code: 500,
                message: message.clone(),
            });
        }
        let key = object_key(kind, namespace, name);
        let entry = (kind.clone(), key.clone());
        let Some(existing) = state.objects.get(&entry) else {
            return Err(ClusterError::NotFound(format!("{kind} \"{key}\" not found")));
        };

        let mut doc = serde_json::to_value(existing)?;
        merge_patch(&mut doc, patch);
        let mut patched: DynamicObject = serde_json::from_value(doc)?;
        for hook in &state.hooks {
            hook(kind, &mut patched);
        }
        Self::bump_version(&mut state, &mut patched);
        state.patched.push((kind.clone(), key, patch.clone()));

        // A terminating object goes away once its last finalizer is removed
        if patched.metadata.deletion_timestamp.is_some() && !has_finalizers(&patched) {
            state.objects.remove(&entry);
        } else {
            state.objects.insert(entry, patched.clone());
        }
        Ok(patched)
    }

    async fn delete(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
        _immediate: bool,
    ) -> Result<(), ClusterError> {
        let mut state = self.lock();
        Self::check(&state, kind)?;
        Self::check_scope(kind, namespace)?;
        if let Some(message) = state.failing_deletes.get(&(kind.clone(), name.to_string())) {
            return Err(ClusterError::Api {
                code: 500,
                message: message.clone(),
            });
        }
        let key = object_key(kind, namespace, name);
        let entry = (kind.clone(), key.clone());
        let terminating_since = serde_json::from_value(Value::String("1970-01-01T00:00:00Z".to_string()))?;
        let Some(object) = state.objects.get_mut(&entry) else {
            return Err(ClusterError::NotFound(format!("{kind} \"{key}\" not found")));
        };
        if has_finalizers(object) {
            object.metadata.deletion_timestamp = Some(terminating_since);
        } else {
            state.objects.remove(&entry);
        }
        state.deleted.push((kind.clone(), key));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::kinds;
    use serde_json::json;

    #[test]
    fn test_merge_patch_rfc7386() {
        let mut doc = json!({"a": "b", "c": {"d": "e", "f": "g"}});
        merge_patch(&mut doc, &json!({"a": "z", "c": {"f": null}}));
        assert_eq!(doc, json!({"a": "z", "c": {"d": "e"}}));

        let mut doc = json!({"a": [1, 2]});
        merge_patch(&mut doc, &json!({"a": [3]}));
        assert_eq!(doc, json!({"a": [3]}));
    }

    #[tokio::test]
    async fn test_create_then_already_exists() {
        let client = MockClusterClient::new();
        let cm = new_object(&kinds::configmaps(), Some("kb-system"), "settings");
        client.create(&kinds::configmaps(), Some("kb-system"), &cm).await.unwrap();
        let err = client
            .create(&kinds::configmaps(), Some("kb-system"), &cm)
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_finalizers_hold_deletion() {
        let client = MockClusterClient::new();
        let kind = kinds::persistent_volume_claims();
        let mut pvc = new_object(&kind, Some("kb-system"), "data-0");
        pvc.metadata.finalizers = Some(vec!["kubernetes.io/pvc-protection".to_string()]);
        client.insert(&kind, pvc);

        client.delete(&kind, Some("kb-system"), "data-0", true).await.unwrap();
        assert!(client.contains(&kind, Some("kb-system"), "data-0"));

        client
            .patch_merge(&kind, Some("kb-system"), "data-0", &json!({"metadata": {"finalizers": null}}))
            .await
            .unwrap();
        assert!(!client.contains(&kind, Some("kb-system"), "data-0"));
    }

    #[tokio::test]
    async fn test_injected_failures_and_unserved_kinds() {
        let client = MockClusterClient::new();
        let kind = kinds::service_accounts();
        client.insert(&kind, new_object(&kind, Some("kb-system"), "kubeblocks"));
        client.fail_patches_of(&kind, "kubeblocks", "webhook denied");
        client.fail_deletes_of(&kind, "kubeblocks", "webhook denied");

        let err = client
            .patch_merge(&kind, Some("kb-system"), "kubeblocks", &json!({"metadata": {"labels": {"a": "b"}}}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::Api { code: 500, .. }));
        assert!(client.delete(&kind, Some("kb-system"), "kubeblocks", true).await.is_err());
        assert_eq!(client.objects(&kind).len(), 1);
        assert!(client.patched().is_empty());

        client.set_unserved(&kind);
        assert!(client.list(&kind, None, None).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unreachable() {
        let client = MockClusterClient::new();
        client.set_unreachable(true);
        let err = client.list(&kinds::deployments(), None, None).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
