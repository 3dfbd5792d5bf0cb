//! Read-only view of an installation.

use cluster_client::ClusterClientTrait;
use helm_client::ReleaseManagerTrait;
use serde::Serialize;
use serde_json::Value;

use crate::cluster_facts::{self, Instance};
use crate::config::OrchestratorConfig;
use crate::error::LifecycleError;
use crate::values::ValueNode;
use crate::waiter::{list_addons, AggregatedAddonStatus};

/// Top-level value keys shown unless `show_all` is set.
pub const DEFAULT_VALUE_KEYS: &[&str] = &[
    "image",
    "replicaCount",
    "resources",
    "addonController",
    "dataProtection",
    "featureGates",
    "keepAddons",
    "keepGlobalResources",
];

/// Per-invocation describe settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescribeOptions {
    /// Instance namespace; the only instance when unset
    pub namespace: Option<String>,
    /// Show every value key instead of the default set
    pub show_all: bool,
}

/// Release metadata worth showing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseSummary {
    pub name: String,
    pub namespace: String,
    pub revision: u32,
    pub status: String,
    pub chart_version: Option<String>,
}

/// Everything `describe` reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Description {
    pub instances: Vec<Instance>,
    pub multi_instance: bool,
    pub release: Option<ReleaseSummary>,
    pub addons: AggregatedAddonStatus,
    /// Redacted (and unless `show_all`, pruned) release values
    pub values: Value,
}

/// Redact sensitive leaves, then prune to [`DEFAULT_VALUE_KEYS`] unless
/// `show_all`.
#[must_use]
pub fn render_values(values: Value, show_all: bool) -> Value {
    let redacted = ValueNode::from(values).redact(&[]);
    if show_all {
        redacted.into()
    } else {
        redacted.prune(DEFAULT_VALUE_KEYS).into()
    }
}

/// Gather the description.
///
/// # Errors
///
/// Cluster and release-manager failures; a missing release is reported as
/// `release: None`.
pub async fn describe(
    client: &dyn ClusterClientTrait,
    releases: &dyn ReleaseManagerTrait,
    config: &OrchestratorConfig,
    options: &DescribeOptions,
) -> Result<Description, LifecycleError> {
    let facts = cluster_facts::discover(client).await?;
    let namespace = options
        .namespace
        .clone()
        .or_else(|| facts.instances.first().map(|i| i.namespace.clone()));

    let (release, values) = match namespace.as_deref() {
        None => (None, Value::Null),
        Some(ns) => {
            let release = releases.get_release(&config.release_name, ns).await?;
            let values = match &release {
                Some(_) => releases.get_values(&config.release_name, ns, false).await?,
                None => Value::Null,
            };
            (release, values)
        }
    };

    let records = list_addons(client).await?;
    Ok(Description {
        multi_instance: facts.multi_instance,
        instances: facts.instances,
        release: release.map(|r| ReleaseSummary {
            chart_version: r.chart_version().map(str::to_string),
            name: r.name,
            namespace: r.namespace,
            revision: r.revision,
            status: r.info.status,
        }),
        addons: AggregatedAddonStatus::from_records(&records),
        values: render_values(values, options.show_all),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::REDACTED;
    use cluster_client::mock::MockClusterClient;
    use helm_client::MockReleaseManager;
    use serde_json::json;

    #[test]
    fn test_render_values() {
        let values = json!({
            "image": { "tag": "1.0.0" },
            "admin": { "password": "hunter2" },
            "dataProtection": { "encryptionKeySecretKeyRef": { "name": "dp-key" } }
        });
        assert_eq!(
            render_values(values.clone(), false),
            json!({
                "image": { "tag": "1.0.0" },
                "dataProtection": { "encryptionKeySecretKeyRef": { "name": REDACTED } }
            })
        );
        let all = render_values(values, true);
        assert_eq!(all["admin"]["password"], json!(REDACTED));
    }

    #[tokio::test]
    async fn test_describe_with_explicit_namespace() {
        let client = MockClusterClient::new();
        let helm = MockReleaseManager::new();
        helm.add_release("kubeblocks", "kb-system", "1.0.0", json!({ "image": { "tag": "1.0.0" }, "extra": 1 }));

        let config = OrchestratorConfig::default();
        let options = DescribeOptions {
            namespace: Some("kb-system".to_string()),
            show_all: false,
        };
        let description = describe(&client, &helm, &config, &options).await.unwrap();
        assert!(description.instances.is_empty());
        assert_eq!(description.release.unwrap().chart_version.as_deref(), Some("1.0.0"));
        assert_eq!(description.values, json!({ "image": { "tag": "1.0.0" } }));
    }

    #[test]
    fn test_show_all_is_per_call() {
        let values = json!({ "extra": 1 });
        assert_eq!(render_values(values.clone(), true), json!({ "extra": 1 }));
        assert_eq!(render_values(values, false), json!({}));
    }
}
