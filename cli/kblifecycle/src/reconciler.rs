//! Discovery and teardown of platform-owned objects.
//!
//! Deletions run one object at a time in a stable order (by resource name).
//! Not-found is success everywhere, so a partially completed teardown can be
//! rerun. Transport failures abort; every other per-object failure is
//! collected and reported together at the end.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use cluster_client::{kinds as core_kinds, ClusterClientTrait, ClusterError, LabelSelector, ObjectKey, ResourceKind};
use crds::labels::{KEEP_POLICY, RESOURCE_POLICY_ANNOTATION};
use kube::api::DynamicObject;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::LifecycleError;
use crate::kinds;
use crate::selector::{is_platform_crd, ResourceSelector};

/// One discovered object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedObject {
    pub key: ObjectKey,
    pub finalizers: Vec<String>,
}

impl ManagedObject {
    fn from_object(object: &DynamicObject) -> Option<Self> {
        Some(Self {
            key: ObjectKey {
                namespace: object.metadata.namespace.clone(),
                name: object.metadata.name.clone()?,
            },
            finalizers: object.metadata.finalizers.clone().unwrap_or_default(),
        })
    }
}

/// Owned objects per kind, ordered by kind (resource name first) and key.
/// Built fresh for every workflow run.
pub type ManagedObjectSet = BTreeMap<ResourceKind, Vec<ManagedObject>>;

/// Which data-bearing kinds a teardown may remove. Both default to keep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub remove_pvs: bool,
    pub remove_pvcs: bool,
}

impl RetentionPolicy {
    /// Whether objects of `kind` must be left alone.
    #[must_use]
    pub fn retains(&self, kind: &ResourceKind) -> bool {
        (*kind == core_kinds::persistent_volumes() && !self.remove_pvs)
            || (*kind == core_kinds::persistent_volume_claims() && !self.remove_pvcs)
    }
}

/// A single failed object operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectFailure {
    pub operation: &'static str,
    pub kind: String,
    pub object: String,
    pub message: String,
}

/// Render failures grouped by kind, for the aggregated error message.
pub fn render_failures(failures: &[ObjectFailure]) -> String {
    let mut by_kind: BTreeMap<&str, Vec<&ObjectFailure>> = BTreeMap::new();
    for failure in failures {
        by_kind.entry(failure.kind.as_str()).or_default().push(failure);
    }
    let mut out = format!("{} object operation(s) failed:", failures.len());
    for (kind, failures) in by_kind {
        let _ = write!(out, "\n  {kind}:");
        for f in failures {
            let _ = write!(out, "\n    {} {}: {}", f.operation, f.object, f.message);
        }
    }
    out
}

/// Ordered deletion steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub steps: Vec<(ResourceKind, Vec<ManagedObject>)>,
}

impl ReconciliationPlan {
    /// Order the set by kind and drop the kinds `retention` keeps.
    #[must_use]
    pub fn build(set: &ManagedObjectSet, retention: RetentionPolicy) -> Self {
        let mut steps: Vec<(ResourceKind, Vec<ManagedObject>)> = set
            .iter()
            .filter(|(kind, objects)| !objects.is_empty() && !retention.retains(kind))
            .map(|(kind, objects)| (kind.clone(), objects.clone()))
            .collect();
        steps.sort_by(|a, b| a.0.cmp(&b.0));
        Self { steps }
    }

    #[must_use]
    pub fn object_count(&self) -> usize {
        self.steps.iter().map(|(_, objects)| objects.len()).sum()
    }
}

/// Outcome of a per-object call: fatal aborts, the rest is recorded.
fn record(
    failures: &mut Vec<ObjectFailure>,
    operation: &'static str,
    kind: &ResourceKind,
    key: &ObjectKey,
    result: Result<(), ClusterError>,
) -> Result<(), LifecycleError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => {
            debug!(%kind, object = %key, operation, "Already gone");
            Ok(())
        }
        Err(e) if e.is_fatal() => Err(LifecycleError::ClusterUnreachable(e)),
        Err(e) => {
            warn!(%kind, object = %key, operation, error = %e, "Object operation failed");
            failures.push(ObjectFailure {
                operation,
                kind: kind.to_string(),
                object: key.to_string(),
                message: e.to_string(),
            });
            Ok(())
        }
    }
}

fn into_result(failures: Vec<ObjectFailure>) -> Result<(), LifecycleError> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(LifecycleError::AggregatedDeletion { failures })
    }
}

/// Lists, labels, strips finalizers from and deletes owned objects.
#[derive(Clone, Copy)]
pub struct ResourceReconciler<'a> {
    client: &'a dyn ClusterClientTrait,
    retention: RetentionPolicy,
}

impl std::fmt::Debug for ResourceReconciler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceReconciler")
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl<'a> ResourceReconciler<'a> {
    pub fn new(client: &'a dyn ClusterClientTrait) -> Self {
        Self {
            client,
            retention: RetentionPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    async fn list_kind(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        selector: Option<&LabelSelector>,
    ) -> Result<Option<Vec<DynamicObject>>, LifecycleError> {
        match self.client.list(kind, namespace, selector).await {
            Ok(objects) => Ok(Some(objects)),
            Err(e) if e.is_not_found() => {
                debug!(%kind, "Kind not served, skipping");
                Ok(None)
            }
            Err(e) => Err(LifecycleError::cluster(format!("failed to list {kind}"), e)),
        }
    }

    /// Discover objects owned by the release and its add-ons, one list call
    /// per tracked kind and selector. Namespaced kinds are listed in
    /// `namespace`, or cluster-wide when it is `None`.
    ///
    /// # Errors
    ///
    /// Any list failure other than an unserved kind.
    pub async fn discover(
        &self,
        namespace: Option<&str>,
        selector: &ResourceSelector,
    ) -> Result<ManagedObjectSet, LifecycleError> {
        let mut set = ManagedObjectSet::new();

        for kind in kinds::tracked() {
            let mut found: BTreeMap<ObjectKey, ManagedObject> = BTreeMap::new();

            if kind == core_kinds::custom_resource_definitions() {
                if let Some(objects) = self.list_kind(&kind, None, None).await? {
                    objects
                        .iter()
                        .filter(|o| o.metadata.name.as_deref().is_some_and(is_platform_crd))
                        .filter_map(ManagedObject::from_object)
                        .for_each(|m| {
                            found.insert(m.key.clone(), m);
                        });
                }
            } else {
                let mut selectors = selector.owned_selectors();
                if kind == core_kinds::configmaps() {
                    selectors.push(ResourceSelector::config_template_selector());
                }
                for label_selector in &selectors {
                    let Some(objects) = self.list_kind(&kind, namespace, Some(label_selector)).await? else {
                        break;
                    };
                    for m in objects.iter().filter_map(ManagedObject::from_object) {
                        found.insert(m.key.clone(), m);
                    }
                }
            }

            if !found.is_empty() {
                debug!(%kind, count = found.len(), "Discovered owned objects");
                set.insert(kind, found.into_values().collect());
            }
        }

        info!(
            kinds = set.len(),
            objects = set.values().map(Vec::len).sum::<usize>(),
            "Discovered managed objects"
        );
        Ok(set)
    }

    /// Clear finalizers on custom-resource objects that still carry them.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::AggregatedDeletion`] listing objects that could not be
    /// patched; transport failures abort at once.
    pub async fn remove_finalizers(&self, set: &ManagedObjectSet) -> Result<(), LifecycleError> {
        let mut failures = Vec::new();
        let patch = json!({ "metadata": { "finalizers": null } });

        for (kind, objects) in set.iter().filter(|(kind, _)| !kind.is_builtin()) {
            for object in objects.iter().filter(|o| !o.finalizers.is_empty()) {
                debug!(%kind, object = %object.key, "Removing finalizers");
                let result = self
                    .client
                    .patch_merge(kind, object.key.namespace.as_deref(), &object.key.name, &patch)
                    .await
                    .map(|_| ());
                record(&mut failures, "remove finalizers", kind, &object.key, result)?;
            }
        }
        into_result(failures)
    }

    /// Delete `objects` immediately (zero grace period). Skips the whole
    /// kind when the retention policy keeps it. Returns how many delete
    /// calls were issued.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::AggregatedDeletion`] after attempting every object;
    /// transport failures abort at once.
    pub async fn delete(&self, kind: &ResourceKind, objects: &[ManagedObject]) -> Result<usize, LifecycleError> {
        let mut failures = Vec::new();
        let attempted = self.delete_collecting(kind, objects, &mut failures).await?;
        into_result(failures).map(|()| attempted)
    }

    async fn delete_collecting(
        &self,
        kind: &ResourceKind,
        objects: &[ManagedObject],
        failures: &mut Vec<ObjectFailure>,
    ) -> Result<usize, LifecycleError> {
        if self.retention.retains(kind) {
            info!(%kind, count = objects.len(), "Retaining objects");
            return Ok(0);
        }
        let mut attempted = 0;
        for object in objects {
            debug!(%kind, object = %object.key, "Deleting");
            let result = self
                .client
                .delete(kind, object.key.namespace.as_deref(), &object.key.name, true)
                .await;
            record(failures, "delete", kind, &object.key, result)?;
            attempted += 1;
        }
        Ok(attempted)
    }

    /// Run every step of `plan`, collecting failures across all kinds.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::AggregatedDeletion`] if any object failed.
    pub async fn execute(&self, plan: &ReconciliationPlan) -> Result<(), LifecycleError> {
        let mut failures = Vec::new();
        for (kind, objects) in &plan.steps {
            let deleted = self.delete_collecting(kind, objects, &mut failures).await?;
            info!(%kind, deleted, "Deleted objects");
        }
        into_result(failures)
    }

    /// Annotate every object of `kind` with the keep resource policy so the
    /// release manager will not prune it. Returns how many were patched.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::AggregatedDeletion`] listing objects that could not be
    /// annotated; transport failures abort at once.
    pub async fn mark_keep(&self, kind: &ResourceKind, namespace: Option<&str>) -> Result<usize, LifecycleError> {
        let Some(objects) = self.list_kind(kind, namespace, None).await? else {
            return Ok(0);
        };
        let patch = json!({ "metadata": { "annotations": { RESOURCE_POLICY_ANNOTATION: KEEP_POLICY } } });
        let mut failures = Vec::new();
        let mut patched = 0;

        for object in &objects {
            let already_kept = object
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(RESOURCE_POLICY_ANNOTATION))
                .is_some_and(|v| v == KEEP_POLICY);
            let Some(m) = ManagedObject::from_object(object) else { continue };
            if already_kept {
                continue;
            }
            let result = self
                .client
                .patch_merge(kind, m.key.namespace.as_deref(), &m.key.name, &patch)
                .await
                .map(|_| ());
            let failed_before = failures.len();
            record(&mut failures, "annotate keep", kind, &m.key, result)?;
            if failures.len() == failed_before {
                patched += 1;
            }
        }
        info!(%kind, patched, "Marked objects with keep policy");
        into_result(failures).map(|()| patched)
    }
}
