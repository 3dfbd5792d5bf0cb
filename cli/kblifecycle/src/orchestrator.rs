//! Lifecycle Orchestrator
//!
//! Drives the three workflows (install, upgrade, uninstall) through
//! `Idle -> PreCheck -> Reconciling -> Waiting -> Done | Failed`.
//!
//! Each workflow is a one-shot client-side run. Every step is idempotent, so
//! rerunning a workflow after a failure resumes from the current cluster
//! state. Fatal errors (transport, auth, policy) abort at once; per-object
//! deletion failures are collected and reported together at the end.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cluster_client::{kinds as core_kinds, ClusterClientTrait};
use helm_client::{Release, ReleaseManagerTrait, ReleaseRequest};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::cluster_facts::{self, InstallationFacts, Instance};
use crate::config::OrchestratorConfig;
use crate::crd_source::{apply_crds, CrdSource};
use crate::describe::{self, Description, DescribeOptions};
use crate::error::LifecycleError;
use crate::kinds;
use crate::migration::{GlobalObjectManifest, MigrationCoordinator, MigrationReport, MigrationTarget};
use crate::prompt::Prompt;
use crate::reconciler::{ObjectFailure, ReconciliationPlan, ResourceReconciler, RetentionPolicy};
use crate::selector::ResourceSelector;
use crate::version_gate::{self, TransitionKind, VersionTransition, NEW_GENERATION_MAJOR};
use crate::waiter::{list_addons, AddonRecord, AggregatedAddonStatus, ConvergenceWaiter};
use crate::workloads::WorkloadScaler;

/// Default deadline for add-on convergence.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const MULTI_INSTANCE_UNINSTALL: &str =
    "only can uninstall KubeBlocks 0.9 when existing multiple KubeBlocks instances";

/// Workflow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    PreCheck,
    Reconciling,
    Waiting,
    Done,
    Failed,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "Idle",
            Self::PreCheck => "PreCheck",
            Self::Reconciling => "Reconciling",
            Self::Waiting => "Waiting",
            Self::Done => "Done",
            Self::Failed => "Failed",
        })
    }
}

/// Options for [`Orchestrator::install`].
#[derive(Debug, Clone, PartialEq)]
pub struct InstallOptions {
    pub namespace: String,
    pub version: String,
    /// Values overlay passed to the release manager
    pub values: Value,
    /// Wait for the enabled add-ons to reach Enabled
    pub wait: bool,
    pub timeout: Duration,
    pub create_namespace: bool,
}

impl InstallOptions {
    #[must_use]
    pub fn new(namespace: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            version: version.into(),
            values: json!({}),
            wait: false,
            timeout: DEFAULT_WAIT_TIMEOUT,
            create_namespace: true,
        }
    }
}

/// Options for [`Orchestrator::upgrade`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeOptions {
    /// Namespace of the running instance; the only instance when unset
    pub namespace: Option<String>,
    /// Where the new instance goes on a major migration
    pub target_namespace: Option<String>,
    pub version: String,
    pub values: Value,
    /// Skip the confirmation prompt
    pub auto_approve: bool,
    pub wait: bool,
    pub timeout: Duration,
}

impl UpgradeOptions {
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            namespace: None,
            target_namespace: None,
            version: version.into(),
            values: json!({}),
            auto_approve: false,
            wait: false,
            timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

/// Options for [`Orchestrator::uninstall`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallOptions {
    /// Namespace of the instance; the only instance when unset
    pub namespace: Option<String>,
    pub auto_approve: bool,
    pub remove_pvs: bool,
    pub remove_pvcs: bool,
    /// Delete the release namespace afterwards
    pub remove_namespace: bool,
    /// Deadline for add-ons to reach Disabled
    pub timeout: Duration,
}

impl Default for UninstallOptions {
    fn default() -> Self {
        Self {
            namespace: None,
            auto_approve: false,
            remove_pvs: false,
            remove_pvcs: false,
            remove_namespace: false,
            timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

/// What an upgrade did.
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeReport {
    pub transition: VersionTransition,
    pub migration: Option<MigrationReport>,
    /// `None` when there was nothing to change
    pub release: Option<Release>,
}

/// What an uninstall did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UninstallReport {
    pub namespace: String,
    /// Only the release was removed; shared objects stay for the other instance
    pub release_only: bool,
    pub disabled_addons: Vec<String>,
    /// Objects scheduled for deletion after retention
    pub planned_deletions: usize,
    pub release_removed: bool,
}

/// Composes the gates, the reconciler and the waiters into workflows.
pub struct Orchestrator {
    config: OrchestratorConfig,
    client: Arc<dyn ClusterClientTrait>,
    releases: Arc<dyn ReleaseManagerTrait>,
    crds: Arc<dyn CrdSource>,
    prompt: Arc<dyn Prompt>,
    history: Vec<WorkflowState>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        client: Arc<dyn ClusterClientTrait>,
        releases: Arc<dyn ReleaseManagerTrait>,
        crds: Arc<dyn CrdSource>,
        prompt: Arc<dyn Prompt>,
    ) -> Self {
        Self {
            config,
            client,
            releases,
            crds,
            prompt,
            history: vec![WorkflowState::Idle],
        }
    }

    /// States the last workflow passed through, in order.
    #[must_use]
    pub fn history(&self) -> &[WorkflowState] {
        &self.history
    }

    fn begin(&mut self, workflow: &str) {
        info!(workflow, "Starting workflow");
        self.history.clear();
        self.history.push(WorkflowState::Idle);
    }

    fn enter(&mut self, state: WorkflowState) {
        info!(%state, "Entering state");
        self.history.push(state);
    }

    fn finish<T>(&mut self, workflow: &str, result: Result<T, LifecycleError>) -> Result<T, LifecycleError> {
        match &result {
            Ok(_) => {
                self.enter(WorkflowState::Done);
                info!(workflow, "Workflow complete");
            }
            Err(e) => {
                self.enter(WorkflowState::Failed);
                error!(workflow, error = %e, retryable = e.is_retryable(), "Workflow failed");
            }
        }
        result
    }

    /// Install the control plane.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::AlreadyInstalled`] when an instance already runs
    /// - [`LifecycleError::SameNamespaceMigration`] when installing the new
    ///   generation into the namespace of an old-generation instance
    /// - release, CRD and convergence failures
    pub async fn install(&mut self, options: &InstallOptions) -> Result<Release, LifecycleError> {
        self.begin("install");
        let result = self.run_install(options).await;
        self.finish("install", result)
    }

    async fn run_install(&mut self, options: &InstallOptions) -> Result<Release, LifecycleError> {
        self.enter(WorkflowState::PreCheck);
        let client = Arc::clone(&self.client);
        let target = version_gate::parse_version(&options.version)?;
        let facts = cluster_facts::discover(client.as_ref()).await?;
        for instance in &facts.instances {
            check_install_conflict(instance, &options.namespace, &options.version)?;
        }

        self.enter(WorkflowState::Reconciling);
        self.apply_crds(&target).await?;
        self.register_repo().await?;
        let request = ReleaseRequest::new(&self.config.release_name, &self.config.chart, &options.namespace)
            .with_version(target.to_string())
            .with_values(options.values.clone())
            .with_create_namespace(options.create_namespace);
        let release = self.releases.install(&request).await?;
        info!(
            release = %release.name,
            namespace = %release.namespace,
            revision = release.revision,
            "Installed release"
        );

        if options.wait {
            self.enter(WorkflowState::Waiting);
            self.wait_enabled(options.timeout).await?;
        }
        Ok(release)
    }

    /// Upgrade (or, across the generation boundary, migrate) the control
    /// plane.
    ///
    /// # Errors
    ///
    /// - version-gate rejections and [`LifecycleError::Aborted`]
    /// - [`LifecycleError::Migration`] naming the failed migration step
    /// - scale-down, release, CRD and convergence failures
    pub async fn upgrade(&mut self, options: &UpgradeOptions) -> Result<UpgradeReport, LifecycleError> {
        self.begin("upgrade");
        let result = self.run_upgrade(options).await;
        self.finish("upgrade", result)
    }

    async fn run_upgrade(&mut self, options: &UpgradeOptions) -> Result<UpgradeReport, LifecycleError> {
        self.enter(WorkflowState::PreCheck);
        let client = Arc::clone(&self.client);
        let releases = Arc::clone(&self.releases);

        let facts = cluster_facts::discover(client.as_ref()).await?;
        let instance = resolve_instance(&facts, options.namespace.as_deref())?.clone();
        let current = self.current_version(&instance).await?;
        let transition = version_gate::classify(&current, &options.version)?;
        transition.ensure_permitted()?;
        info!(
            from = %transition.from,
            to = %transition.to,
            kind = %transition.kind,
            namespace = %instance.namespace,
            "Classified version transition"
        );

        if !transition.changes_version() && is_empty(&options.values) {
            info!(version = %transition.to, "Already at the requested version");
            return Ok(UpgradeReport {
                transition,
                migration: None,
                release: None,
            });
        }

        let namespace = target_namespace(&transition, &instance, options.target_namespace.as_deref())?;
        if !options.auto_approve && !self.prompt.confirm(&transition.describe()).await? {
            return Err(LifecycleError::Aborted);
        }

        self.enter(WorkflowState::Reconciling);
        ResourceReconciler::new(client.as_ref())
            .mark_keep(&kinds::addons(), None)
            .await?;

        let migration = if transition.kind == TransitionKind::MajorMigration {
            let coordinator = MigrationCoordinator::new(
                client.as_ref(),
                releases.as_ref(),
                &self.config,
                GlobalObjectManifest::embedded()?,
            );
            let target = MigrationTarget {
                old_namespace: instance.namespace.clone(),
                old_version: transition.from.clone(),
                new_namespace: namespace.clone(),
            };
            Some(coordinator.run(&target).await?)
        } else {
            if transition.changes_version() {
                WorkloadScaler::new(client.as_ref(), self.config.poll_interval, self.config.deployment_timeout)
                    .scale_down(&instance.namespace)
                    .await?;
            }
            None
        };

        self.apply_crds(&transition.to).await?;
        self.register_repo().await?;
        let request = ReleaseRequest::new(&self.config.release_name, &self.config.chart, &namespace)
            .with_version(transition.to.to_string())
            .with_values(options.values.clone());
        let request = if migration.is_some() {
            request.with_install_if_missing(true).with_create_namespace(true)
        } else {
            request.with_reuse_values(true)
        };
        let release = releases.upgrade(&request).await?;
        info!(
            release = %release.name,
            namespace = %release.namespace,
            revision = release.revision,
            version = %transition.to,
            "Upgraded release"
        );

        if options.wait {
            self.enter(WorkflowState::Waiting);
            self.wait_enabled(options.timeout).await?;
        }
        Ok(UpgradeReport {
            transition,
            migration,
            release: Some(release),
        })
    }

    /// Uninstall the control plane and everything it owns.
    ///
    /// With several instances running, only the old-generation release may be
    /// removed, and only the release itself: shared objects stay for the
    /// other instance.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::MultiInstanceUninstall`] and
    ///   [`LifecycleError::ClustersExist`] from the pre-checks
    /// - [`LifecycleError::AggregatedDeletion`] after every deletion was tried
    pub async fn uninstall(&mut self, options: &UninstallOptions) -> Result<UninstallReport, LifecycleError> {
        self.begin("uninstall");
        let result = self.run_uninstall(options).await;
        self.finish("uninstall", result)
    }

    async fn run_uninstall(&mut self, options: &UninstallOptions) -> Result<UninstallReport, LifecycleError> {
        self.enter(WorkflowState::PreCheck);
        let client = Arc::clone(&self.client);
        let releases = Arc::clone(&self.releases);

        let facts = cluster_facts::discover(client.as_ref()).await?;
        let namespace = match &options.namespace {
            Some(ns) => ns.clone(),
            None if facts.is_empty() => leftover_namespace(client.as_ref(), &self.config.release_name).await?,
            None => resolve_instance(&facts, None)?.namespace.clone(),
        };
        let release_only = facts.multi_instance;
        if release_only {
            check_multi_instance(&facts, &namespace)?;
            info!(%namespace, "Several instances present; removing the release only");
        } else {
            ensure_no_clusters(client.as_ref()).await?;
        }

        if !options.auto_approve {
            let message = format!("Uninstall KubeBlocks from namespace {namespace}?");
            if !self.prompt.confirm(&message).await? {
                return Err(LifecycleError::Aborted);
            }
        }

        self.enter(WorkflowState::Reconciling);
        let mut report = UninstallReport {
            namespace: namespace.clone(),
            release_only,
            ..UninstallReport::default()
        };
        let mut failures = Vec::new();

        if !release_only {
            let addons = disable_addons(client.as_ref(), &mut failures).await?;
            report.disabled_addons = addons.patched.clone();
            if !report.disabled_addons.is_empty() {
                self.enter(WorkflowState::Waiting);
                match self.wait_disabled(&report.disabled_addons, options.timeout).await {
                    Ok(_) => {}
                    Err(e @ LifecycleError::ClusterUnreachable(_)) => return Err(e),
                    Err(e) => warn!(error = %e, "Addons did not all reach Disabled; continuing cleanup"),
                }
                self.enter(WorkflowState::Reconciling);
            }

            let retention = RetentionPolicy {
                remove_pvs: options.remove_pvs,
                remove_pvcs: options.remove_pvcs,
            };
            let reconciler = ResourceReconciler::new(client.as_ref()).with_retention(retention);
            let selector = ResourceSelector::new(&self.config.release_name, addons.enabled());
            let set = reconciler.discover(Some(&namespace), &selector).await?;
            absorb(reconciler.remove_finalizers(&set).await, &mut failures)?;

            let plan = ReconciliationPlan::build(&set, retention);
            report.planned_deletions = plan.object_count();
            absorb(reconciler.execute(&plan).await, &mut failures)?;
        }

        match releases.uninstall(&self.config.release_name, &namespace).await? {
            Some(release) => {
                info!(release = %release.name, %namespace, "Uninstalled release");
                report.release_removed = true;
            }
            None => info!(%namespace, "Release already removed"),
        }

        if options.remove_namespace && !release_only {
            match client.delete(&core_kinds::namespaces(), None, &namespace, false).await {
                Ok(()) => info!(%namespace, "Deleted namespace"),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(LifecycleError::cluster(format!("failed to delete namespace {namespace}"), e)),
            }
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(LifecycleError::AggregatedDeletion { failures })
        }
    }

    /// Read-only view of the installation.
    ///
    /// # Errors
    ///
    /// Cluster and release-manager failures.
    pub async fn describe(&self, options: &DescribeOptions) -> Result<Description, LifecycleError> {
        describe::describe(self.client.as_ref(), self.releases.as_ref(), &self.config, options).await
    }

    async fn current_version(&self, instance: &Instance) -> Result<String, LifecycleError> {
        let release = self
            .releases
            .get_release(&self.config.release_name, &instance.namespace)
            .await?;
        release
            .as_ref()
            .and_then(Release::chart_version)
            .map(str::to_string)
            .or_else(|| instance.version.clone())
            .ok_or_else(|| LifecycleError::NotInstalled {
                namespace: Some(instance.namespace.clone()),
            })
    }

    async fn apply_crds(&self, version: &semver::Version) -> Result<(), LifecycleError> {
        let objects = self.crds.fetch(version).await?;
        if objects.is_empty() {
            return Ok(());
        }
        apply_crds(self.client.as_ref(), &objects).await.map(|_| ())
    }

    async fn register_repo(&self) -> Result<(), LifecycleError> {
        self.releases
            .add_repo(self.config.chart_repo_name(), &self.config.chart_repo_url)
            .await?;
        Ok(())
    }

    async fn wait_enabled(&self, timeout: Duration) -> Result<AggregatedAddonStatus, LifecycleError> {
        let client = self.client.as_ref();
        ConvergenceWaiter::new(self.config.poll_interval)
            .wait_for(|| desired_addons(client), true, timeout)
            .await
    }

    async fn wait_disabled(&self, names: &[String], timeout: Duration) -> Result<AggregatedAddonStatus, LifecycleError> {
        let client = self.client.as_ref();
        ConvergenceWaiter::new(self.config.poll_interval)
            .wait_for(|| named_addons(client, names), false, timeout)
            .await
    }
}

fn is_empty(values: &Value) -> bool {
    match values {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// An existing instance blocks install unless the new install is the next
/// generation going into a different namespace.
fn check_install_conflict(instance: &Instance, namespace: &str, requested: &str) -> Result<(), LifecycleError> {
    let already_installed = || LifecycleError::AlreadyInstalled {
        namespace: instance.namespace.clone(),
        version: instance.version.clone().unwrap_or_else(|| "unknown".to_string()),
    };
    let Some(current) = instance.version.as_deref() else {
        return Err(already_installed());
    };
    match version_gate::classify(current, requested) {
        Ok(transition) if transition.kind == TransitionKind::MajorMigration => {
            if instance.namespace == namespace {
                return Err(LifecycleError::SameNamespaceMigration {
                    namespace: namespace.to_string(),
                    from: transition.from.to_string(),
                    to: transition.to.to_string(),
                });
            }
            info!(
                existing = %instance.namespace,
                %namespace,
                "Installing next generation alongside the existing instance"
            );
            Ok(())
        }
        _ => Err(already_installed()),
    }
}

fn resolve_instance<'f>(facts: &'f InstallationFacts, namespace: Option<&str>) -> Result<&'f Instance, LifecycleError> {
    if let Some(ns) = namespace {
        return facts.in_namespace(ns).ok_or_else(|| LifecycleError::NotInstalled {
            namespace: Some(ns.to_string()),
        });
    }
    match facts.instances.as_slice() {
        [] => Err(LifecycleError::NotInstalled { namespace: None }),
        [only] => Ok(only),
        several => Err(LifecycleError::InvalidConfig(format!(
            "several KubeBlocks instances found (namespaces: {}); specify one",
            several.iter().map(|i| i.namespace.as_str()).collect::<Vec<_>>().join(", ")
        ))),
    }
}

fn target_namespace(
    transition: &VersionTransition,
    instance: &Instance,
    requested: Option<&str>,
) -> Result<String, LifecycleError> {
    if transition.kind == TransitionKind::MajorMigration {
        return match requested {
            Some(ns) if ns != instance.namespace => Ok(ns.to_string()),
            _ => Err(LifecycleError::SameNamespaceMigration {
                namespace: instance.namespace.clone(),
                from: transition.from.to_string(),
                to: transition.to.to_string(),
            }),
        };
    }
    match requested {
        Some(ns) if ns != instance.namespace => Err(LifecycleError::InvalidConfig(format!(
            "a target namespace applies only to a major migration; {} stays in {}",
            transition.to, instance.namespace
        ))),
        _ => Ok(instance.namespace.clone()),
    }
}

fn is_new_generation(instance: &Instance) -> bool {
    instance
        .version
        .as_deref()
        .and_then(|v| version_gate::parse_version(v).ok())
        .is_some_and(|v| v.major >= NEW_GENERATION_MAJOR)
}

/// With several instances running only an old-generation release may be
/// removed; the shared objects belong to the new generation.
fn check_multi_instance(facts: &InstallationFacts, namespace: &str) -> Result<(), LifecycleError> {
    if facts.in_namespace(namespace).is_some_and(is_new_generation) {
        return Err(LifecycleError::MultiInstanceUninstall(MULTI_INSTANCE_UNINSTALL.to_string()));
    }
    Ok(())
}

/// Namespace of an instance whose control plane is already gone but whose
/// objects still carry the release label.
async fn leftover_namespace(client: &dyn ClusterClientTrait, release_name: &str) -> Result<String, LifecycleError> {
    let selector = ResourceSelector::new(release_name, Vec::<String>::new()).instance_selector();
    let mut namespaces = BTreeSet::new();
    for kind in kinds::tracked().into_iter().filter(|k| k.namespaced) {
        match client.list(&kind, None, Some(&selector)).await {
            Ok(objects) => namespaces.extend(objects.into_iter().filter_map(|o| o.metadata.namespace)),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(LifecycleError::cluster(format!("failed to list {kind}"), e)),
        }
    }
    let mut found = namespaces.into_iter();
    match (found.next(), found.next()) {
        (None, _) => Err(LifecycleError::NotInstalled { namespace: None }),
        (Some(namespace), None) => {
            info!(%namespace, "No control plane found; resuming cleanup of leftover objects");
            Ok(namespace)
        }
        (Some(first), Some(second)) => {
            let all: Vec<String> = [first, second].into_iter().chain(found).collect();
            Err(LifecycleError::InvalidConfig(format!(
                "objects of release {release_name} remain in several namespaces ({}); specify one",
                all.join(", ")
            )))
        }
    }
}

async fn ensure_no_clusters(client: &dyn ClusterClientTrait) -> Result<(), LifecycleError> {
    let clusters = match client.list(&kinds::clusters(), None, None).await {
        Ok(clusters) => clusters,
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => return Err(LifecycleError::cluster("failed to list clusters", e)),
    };
    if clusters.is_empty() {
        return Ok(());
    }
    let names = clusters
        .iter()
        .map(|c| match (&c.metadata.namespace, &c.metadata.name) {
            (Some(ns), Some(name)) => format!("{ns}/{name}"),
            (None, Some(name)) => name.clone(),
            _ => "<unnamed>".to_string(),
        })
        .collect();
    Err(LifecycleError::ClustersExist {
        count: clusters.len(),
        names,
    })
}

/// Add-ons found enabled at the start of an uninstall.
#[derive(Debug, Default)]
struct DisabledAddons {
    /// Patched to disabled; only these are waited on
    patched: Vec<String>,
    /// Still enabled because the patch failed
    failed: Vec<String>,
}

impl DisabledAddons {
    /// Every add-on whose objects are cleaned up.
    fn enabled(&self) -> impl Iterator<Item = &String> {
        self.patched.iter().chain(&self.failed)
    }
}

/// Flip every enabled add-on to disabled.
async fn disable_addons(
    client: &dyn ClusterClientTrait,
    failures: &mut Vec<ObjectFailure>,
) -> Result<DisabledAddons, LifecycleError> {
    let kind = kinds::addons();
    let patch = json!({ "spec": { "install": { "enabled": false } } });
    let mut addons = DisabledAddons::default();

    for record in list_addons(client).await?.into_iter().filter(|r| r.enabled) {
        match client.patch_merge(&kind, None, &record.name, &patch).await {
            Ok(_) => {
                info!(addon = %record.name, "Disabled addon");
                addons.patched.push(record.name);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) if e.is_fatal() => return Err(LifecycleError::ClusterUnreachable(e)),
            Err(e) => {
                warn!(addon = %record.name, error = %e, "Failed to disable addon");
                failures.push(ObjectFailure {
                    operation: "disable",
                    kind: kind.to_string(),
                    object: record.name.clone(),
                    message: e.to_string(),
                });
                addons.failed.push(record.name);
            }
        }
    }
    Ok(addons)
}

/// Fold an aggregated failure into `failures`; anything else passes through.
fn absorb(result: Result<(), LifecycleError>, failures: &mut Vec<ObjectFailure>) -> Result<(), LifecycleError> {
    match result {
        Err(LifecycleError::AggregatedDeletion { failures: more }) => {
            failures.extend(more);
            Ok(())
        }
        other => other,
    }
}

async fn desired_addons(client: &dyn ClusterClientTrait) -> Result<Vec<AddonRecord>, LifecycleError> {
    let records = list_addons(client).await?;
    Ok(records.into_iter().filter(|r| r.enabled).collect())
}

async fn named_addons(client: &dyn ClusterClientTrait, names: &[String]) -> Result<Vec<AddonRecord>, LifecycleError> {
    let records = list_addons(client).await?;
    Ok(records.into_iter().filter(|r| names.contains(&r.name)).collect())
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod orchestrator_test;
