//! Lifecycle workflow errors.
//!
//! Lower layers return [`ClusterError`]/[`HelmError`]; the orchestrator maps
//! them here and decides per step whether a failure is fatal or aggregated.

use std::time::Duration;

use cluster_client::ClusterError;
use helm_client::HelmError;
use thiserror::Error;

use crate::migration::MigrationStep;
use crate::reconciler::{render_failures, ObjectFailure};
use crate::waiter::AggregatedAddonStatus;

/// Errors that can occur in a lifecycle workflow.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Version string is not a semantic version
    #[error("invalid version format: {0}")]
    InvalidVersionFormat(String),

    /// No automated migration path exists from this version
    #[error("cannot migrate from {from} to {to}: automated migration requires {floor} or later")]
    UnsupportedMigrationSource {
        from: String,
        to: String,
        floor: String,
    },

    /// Upgrade skips more than one minor version
    #[error("cannot upgrade from {from} to {to}: upgrade to {next} first, one minor version at a time")]
    CrossMajorSkip { from: String, to: String, next: String },

    /// Transport or auth failure talking to the cluster
    #[error("cluster unreachable: {0}")]
    ClusterUnreachable(#[source] ClusterError),

    /// A cluster call this workflow cannot continue without failed
    #[error("{context}: {source}")]
    Fatal {
        context: String,
        #[source]
        source: ClusterError,
    },

    /// Add-ons did not converge before the deadline
    #[error("timed out after {timeout:?} waiting for addons:\n{status}")]
    ConvergenceTimeout {
        timeout: Duration,
        status: AggregatedAddonStatus,
    },

    /// An add-on reached Failed
    #[error("addon failed:\n{status}")]
    AddonFailed { status: AggregatedAddonStatus },

    /// A deployment did not scale to zero in time
    #[error("timed out after {timeout:?} waiting for deployment {deployment} to scale down")]
    ScaleDownTimeout { deployment: String, timeout: Duration },

    /// Per-object failures collected during deletion
    #[error("{}", render_failures(.failures))]
    AggregatedDeletion { failures: Vec<ObjectFailure> },

    /// An instance already runs in the cluster
    #[error("KubeBlocks {version} is already installed in namespace {namespace}; use upgrade instead")]
    AlreadyInstalled { namespace: String, version: String },

    /// Major migration would install into the old instance's namespace
    #[error(
        "upgrading from {from} to {to} installs a new instance; it must go into a namespace other than {namespace} (set a target namespace)"
    )]
    SameNamespaceMigration {
        namespace: String,
        from: String,
        to: String,
    },

    /// No instance to act on
    #[error("KubeBlocks is not installed{}", .namespace.as_deref().map(|ns| format!(" in namespace {ns}")).unwrap_or_default())]
    NotInstalled { namespace: Option<String> },

    /// Uninstall refused while several instances coexist
    #[error("{0}")]
    MultiInstanceUninstall(String),

    /// User clusters still exist
    #[error("cannot uninstall: {count} cluster(s) still exist ({}); delete them first", .names.join(", "))]
    ClustersExist { count: usize, names: Vec<String> },

    /// Confirmation declined
    #[error("aborted by user")]
    Aborted,

    /// Bad configuration or options
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// CRD bundle could not be fetched or parsed
    #[error("CRD source error: {0}")]
    CrdSource(String),

    /// Release manager failure
    #[error("release error: {0}")]
    Release(#[from] HelmError),

    /// A migration step failed; earlier steps stay applied
    #[error("migration step '{step}' failed: {source}")]
    Migration {
        step: MigrationStep,
        #[source]
        source: Box<LifecycleError>,
    },

    /// Confirmation prompt I/O
    #[error("prompt error: {0}")]
    Prompt(#[from] std::io::Error),
}

impl LifecycleError {
    /// Map a cluster error: transport/auth become `ClusterUnreachable`,
    /// anything else `Fatal` with the given context.
    pub fn cluster(context: impl Into<String>, source: ClusterError) -> Self {
        if source.is_fatal() {
            Self::ClusterUnreachable(source)
        } else {
            Self::Fatal {
                context: context.into(),
                source,
            }
        }
    }

    /// Whether rerunning the workflow can make progress without user action
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConvergenceTimeout { .. }
                | Self::ScaleDownTimeout { .. }
                | Self::AggregatedDeletion { .. }
        )
    }
}
