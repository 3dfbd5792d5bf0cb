//! Migration between incompatible major versions.
//!
//! Moves a running old-generation instance out of the way so the new
//! generation can be installed in another namespace. Every step can be rerun;
//! a failed step aborts the migration and leaves earlier steps applied.

use std::fmt;

use cluster_client::{ClusterClientTrait, ObjectKey, ResourceKind};
use crds::labels::{
    CRD_API_VERSION_ANNOTATION, INSTANCE_LABEL, LEGACY_API_VERSION, RELEASE_NAME_ANNOTATION,
    RELEASE_NAMESPACE_ANNOTATION,
};
use helm_client::{ReleaseManagerTrait, ReleaseRequest};
use kube::api::DynamicObject;
use semver::Version;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::OrchestratorConfig;
use crate::error::LifecycleError;
use crate::kinds;
use crate::reconciler::ResourceReconciler;
use crate::workloads::WorkloadScaler;

const GLOBAL_OBJECTS_YAML: &str = include_str!("../manifests/global-objects.yaml");

/// Values that tell the old chart to leave add-ons and global objects behind.
const KEEP_VALUES: [&str; 2] = ["keepAddons", "keepGlobalResources"];

/// The four migration steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    PreserveValues,
    ScaleDown,
    ReassignOwnership,
    AnnotateApiVersion,
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PreserveValues => "preserve add-ons and global resources",
            Self::ScaleDown => "stop old control plane",
            Self::ReassignOwnership => "reassign global object ownership",
            Self::AnnotateApiVersion => "annotate component definitions",
        })
    }
}

/// One kind's entry in the global-object manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GlobalObjectEntry {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub resource: String,
    #[serde(default)]
    pub names: Vec<String>,
    /// Every object of the kind, for kinds whose names are user-chosen
    #[serde(default)]
    pub all: bool,
}

impl GlobalObjectEntry {
    #[must_use]
    pub fn resource_kind(&self) -> ResourceKind {
        ResourceKind::new(&self.group, &self.version, &self.kind, &self.resource, false)
    }
}

/// Versioned list of cluster-scoped objects the chart ships.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GlobalObjectManifest {
    pub version: String,
    pub objects: Vec<GlobalObjectEntry>,
}

impl GlobalObjectManifest {
    /// The manifest compiled into the binary.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::InvalidConfig`] if the embedded YAML is malformed.
    pub fn embedded() -> Result<Self, LifecycleError> {
        Self::parse(GLOBAL_OBJECTS_YAML)
    }

    /// # Errors
    ///
    /// [`LifecycleError::InvalidConfig`] if `yaml` is not a manifest.
    pub fn parse(yaml: &str) -> Result<Self, LifecycleError> {
        serde_yaml::from_str(yaml).map_err(|e| LifecycleError::InvalidConfig(format!("global object manifest: {e}")))
    }
}

/// The instance being retired and where its successor goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationTarget {
    pub old_namespace: String,
    pub old_version: Version,
    pub new_namespace: String,
}

/// What a migration run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// The old release was re-released with keep values
    pub values_preserved: bool,
    pub stopped_deployments: Vec<String>,
    pub reassigned: usize,
    pub annotated: usize,
}

/// Drives the four migration steps.
pub struct MigrationCoordinator<'a> {
    client: &'a dyn ClusterClientTrait,
    releases: &'a dyn ReleaseManagerTrait,
    config: &'a OrchestratorConfig,
    manifest: GlobalObjectManifest,
}

impl fmt::Debug for MigrationCoordinator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationCoordinator")
            .field("release", &self.config.release_name)
            .field("manifest", &self.manifest.version)
            .finish_non_exhaustive()
    }
}

fn step<T>(step: MigrationStep, result: Result<T, LifecycleError>) -> Result<T, LifecycleError> {
    result.map_err(|source| LifecycleError::Migration {
        step,
        source: Box::new(source),
    })
}

fn annotation<'o>(object: &'o DynamicObject, key: &str) -> Option<&'o str> {
    object.metadata.annotations.as_ref()?.get(key).map(String::as_str)
}

impl<'a> MigrationCoordinator<'a> {
    pub fn new(
        client: &'a dyn ClusterClientTrait,
        releases: &'a dyn ReleaseManagerTrait,
        config: &'a OrchestratorConfig,
        manifest: GlobalObjectManifest,
    ) -> Self {
        Self {
            client,
            releases,
            config,
            manifest,
        }
    }

    /// Run all steps in order.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Migration`] naming the step that failed.
    pub async fn run(&self, target: &MigrationTarget) -> Result<MigrationReport, LifecycleError> {
        info!(
            from = %target.old_namespace,
            to = %target.new_namespace,
            version = %target.old_version,
            "Starting major version migration"
        );
        let mut report = MigrationReport {
            values_preserved: step(MigrationStep::PreserveValues, self.preserve_values(target).await)?,
            ..MigrationReport::default()
        };

        let scaler = WorkloadScaler::new(self.client, self.config.poll_interval, self.config.deployment_timeout);
        report.stopped_deployments = step(MigrationStep::ScaleDown, scaler.scale_down(&target.old_namespace).await)?;
        report.reassigned = step(MigrationStep::ReassignOwnership, self.reassign_ownership(target).await)?;
        report.annotated = step(MigrationStep::AnnotateApiVersion, self.annotate_api_version().await)?;

        info!(
            reassigned = report.reassigned,
            annotated = report.annotated,
            "Migration steps complete"
        );
        Ok(report)
    }

    /// Step 1: re-release the old chart with keep values and mark add-ons keep.
    /// Returns whether the release had to be changed.
    async fn preserve_values(&self, target: &MigrationTarget) -> Result<bool, LifecycleError> {
        let name = &self.config.release_name;
        let namespace = &target.old_namespace;

        let values = match self.releases.get_values(name, namespace, false).await {
            Ok(values) => Some(values),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };

        let mut changed = false;
        match values {
            None => info!(release = %name, namespace = %namespace, "Old release not found, skipping value preservation"),
            Some(values) if KEEP_VALUES.iter().all(|k| values[k] == json!(true)) => {
                debug!(release = %name, "Old release already keeps add-ons and global resources");
            }
            Some(_) => {
                let request = ReleaseRequest::new(name.as_str(), self.config.chart.as_str(), namespace.as_str())
                    .with_version(target.old_version.to_string())
                    .with_values(json!({ "keepAddons": true, "keepGlobalResources": true }))
                    .with_reuse_values(true);
                match self.releases.upgrade(&request).await {
                    Ok(_) => {
                        info!(release = %name, namespace = %namespace, "Old release now keeps add-ons and global resources");
                        changed = true;
                    }
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        ResourceReconciler::new(self.client).mark_keep(&kinds::addons(), None).await?;
        Ok(changed)
    }

    /// Step 3: point every manifest object at the new release namespace.
    async fn reassign_ownership(&self, target: &MigrationTarget) -> Result<usize, LifecycleError> {
        let release = self.config.release_name.as_str();
        let patch = json!({
            "metadata": {
                "annotations": {
                    RELEASE_NAME_ANNOTATION: release,
                    RELEASE_NAMESPACE_ANNOTATION: target.new_namespace,
                },
                "labels": { INSTANCE_LABEL: release },
            }
        });

        let mut reassigned = 0;
        for entry in &self.manifest.objects {
            let kind = entry.resource_kind();
            let objects = if entry.all {
                match self.client.list(&kind, None, None).await {
                    Ok(objects) => objects,
                    Err(e) if e.is_not_found() => Vec::new(),
                    Err(e) => return Err(LifecycleError::cluster(format!("failed to list {kind}"), e)),
                }
            } else {
                let mut objects = Vec::new();
                for name in &entry.names {
                    match self.client.get(&kind, None, name).await {
                        Ok(object) => objects.push(object),
                        Err(e) if e.is_not_found() => debug!(%kind, name, "Global object absent"),
                        Err(e) => return Err(LifecycleError::cluster(format!("failed to read {kind} {name}"), e)),
                    }
                }
                objects
            };

            for object in objects {
                let Some(name) = object.metadata.name.as_deref() else { continue };
                let owned = annotation(&object, RELEASE_NAME_ANNOTATION) == Some(release)
                    && annotation(&object, RELEASE_NAMESPACE_ANNOTATION) == Some(target.new_namespace.as_str());
                if owned {
                    continue;
                }
                match self.client.patch_merge(&kind, None, name, &patch).await {
                    Ok(_) => {
                        debug!(%kind, object = %ObjectKey::cluster(name), "Reassigned ownership");
                        reassigned += 1;
                    }
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(LifecycleError::cluster(format!("failed to reassign {kind} {name}"), e)),
                }
            }
        }
        info!(reassigned, namespace = %target.new_namespace, "Reassigned global objects");
        Ok(reassigned)
    }

    /// Step 4: mark pre-migration component definitions with their API version.
    async fn annotate_api_version(&self) -> Result<usize, LifecycleError> {
        let kind = kinds::component_definitions();
        let objects = match self.client.list(&kind, None, None).await {
            Ok(objects) => objects,
            Err(e) if e.is_not_found() => return Ok(0),
            Err(e) => return Err(LifecycleError::cluster("failed to list component definitions", e)),
        };
        let patch = json!({ "metadata": { "annotations": { CRD_API_VERSION_ANNOTATION: LEGACY_API_VERSION } } });

        let mut annotated = 0;
        for object in &objects {
            if annotation(object, CRD_API_VERSION_ANNOTATION).is_some() {
                continue;
            }
            let Some(name) = object.metadata.name.as_deref() else { continue };
            match self.client.patch_merge(&kind, None, name, &patch).await {
                Ok(_) => annotated += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(LifecycleError::cluster(format!("failed to annotate {kind} {name}"), e)),
            }
        }
        info!(annotated, "Annotated component definitions");
        Ok(annotated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_client::kinds as core_kinds;
    use cluster_client::mock::{new_object, MockClusterClient};
    use helm_client::{HelmCall, MockReleaseManager};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            poll_interval: Duration::from_secs(1),
            deployment_timeout: Duration::from_secs(10),
            ..OrchestratorConfig::default()
        }
    }

    fn target() -> MigrationTarget {
        MigrationTarget {
            old_namespace: "kb-system".to_string(),
            old_version: Version::new(0, 9, 2),
            new_namespace: "kb-new".to_string(),
        }
    }

    #[test]
    fn test_embedded_manifest() {
        let manifest = GlobalObjectManifest::embedded().unwrap();
        assert_eq!(manifest.version, "1.0");
        let resources: Vec<_> = manifest.objects.iter().map(|o| o.resource.as_str()).collect();
        assert_eq!(
            resources,
            vec!["clusterroles", "addons", "storageclasses", "storageproviders", "backuprepos"]
        );
        assert!(manifest.objects.iter().any(|o| o.names.iter().any(|n| n == "kb-default-sc")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_migration_and_rerun() {
        let client = MockClusterClient::new();
        let helm = MockReleaseManager::new();
        helm.add_release("kubeblocks", "kb-system", "0.9.2", json!({"image": {"tag": "0.9.2"}}));

        let sc = core_kinds::storage_classes();
        client.insert(&sc, new_object(&sc, None, "kb-default-sc"));
        let addons = kinds::addons();
        client.insert(&addons, new_object(&addons, None, "mysql"));
        let cmpd = kinds::component_definitions();
        client.insert(&cmpd, new_object(&cmpd, None, "mysql-8.0"));
        let mut marked = new_object(&cmpd, None, "redis-7");
        marked.metadata.annotations = Some(BTreeMap::from([(
            CRD_API_VERSION_ANNOTATION.to_string(),
            "apps.kubeblocks.io/v1".to_string(),
        )]));
        client.insert(&cmpd, marked);

        let config = config();
        let coordinator =
            MigrationCoordinator::new(&client, &helm, &config, GlobalObjectManifest::embedded().unwrap());
        let report = coordinator.run(&target()).await.unwrap();

        assert!(report.values_preserved);
        assert_eq!(report.reassigned, 2);
        assert_eq!(report.annotated, 1);
        let values = helm.values("kubeblocks", "kb-system").unwrap();
        assert_eq!(values["keepAddons"], json!(true));
        assert_eq!(values["image"]["tag"], json!("0.9.2"));
        let sc_object = client.object(&sc, None, "kb-default-sc").unwrap();
        assert_eq!(annotation(&sc_object, RELEASE_NAMESPACE_ANNOTATION), Some("kb-new"));

        // Second run changes nothing
        let report = coordinator.run(&target()).await.unwrap();
        assert_eq!(report, MigrationReport::default());
        let upgrades = helm.calls().iter().filter(|c| matches!(c, HelmCall::Upgrade(_))).count();
        assert_eq!(upgrades, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_step_is_named() {
        let client = MockClusterClient::new();
        let helm = MockReleaseManager::new();
        helm.add_release("kubeblocks", "kb-system", "0.9.2", json!({}));
        helm.fail("upgrade", "chart not found");

        let config = config();
        let coordinator =
            MigrationCoordinator::new(&client, &helm, &config, GlobalObjectManifest::embedded().unwrap());
        let err = coordinator.run(&target()).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Migration {
                step: MigrationStep::PreserveValues,
                ..
            }
        ));
    }
}
