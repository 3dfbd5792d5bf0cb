//! Installation facts: which control-plane instances run where.

use std::collections::BTreeSet;

use cluster_client::{kinds, ClusterClientTrait, LabelSelector};
use crds::labels::{APPS_COMPONENT, COMPONENT_LABEL, NAME_LABEL, PLATFORM_NAME, VERSION_LABEL};
use serde::Serialize;
use tracing::debug;

use crate::error::LifecycleError;

/// One control-plane deployment found in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Instance {
    pub namespace: String,
    pub deployment: String,
    /// Value of the version label; absent on hand-built deployments
    pub version: Option<String>,
}

/// Derived view of the installed instances. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallationFacts {
    pub instances: Vec<Instance>,
    /// More than one distinct instance is running
    pub multi_instance: bool,
}

impl InstallationFacts {
    /// Build from discovered instances, sorted and deduplicated.
    #[must_use]
    pub fn new(mut instances: Vec<Instance>) -> Self {
        instances.sort();
        instances.dedup_by(|a, b| a.namespace == b.namespace && a.version == b.version);
        let multi_instance = instances.len() > 1;
        Self {
            instances,
            multi_instance,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// The instance in `namespace`, if any.
    #[must_use]
    pub fn in_namespace(&self, namespace: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.namespace == namespace)
    }

    /// Distinct versions across instances.
    #[must_use]
    pub fn versions(&self) -> BTreeSet<&str> {
        self.instances.iter().filter_map(|i| i.version.as_deref()).collect()
    }
}

/// Selector matching the main control-plane deployment.
#[must_use]
pub fn control_plane_selector() -> LabelSelector {
    LabelSelector::new()
        .eq(NAME_LABEL, PLATFORM_NAME)
        .eq(COMPONENT_LABEL, APPS_COMPONENT)
}

/// List control-plane deployments cluster-wide.
///
/// # Errors
///
/// [`LifecycleError::ClusterUnreachable`] on transport/auth failure. A
/// not-found answer is the empty value, not an error.
pub async fn discover(client: &dyn ClusterClientTrait) -> Result<InstallationFacts, LifecycleError> {
    let deployments = match client
        .list(&kinds::deployments(), None, Some(&control_plane_selector()))
        .await
    {
        Ok(deployments) => deployments,
        Err(e) if e.is_not_found() => return Ok(InstallationFacts::default()),
        Err(e) => return Err(LifecycleError::cluster("failed to list control-plane deployments", e)),
    };

    let instances = deployments
        .into_iter()
        .filter_map(|d| {
            let namespace = d.metadata.namespace?;
            let deployment = d.metadata.name?;
            let version = d.metadata.labels.and_then(|mut l| l.remove(VERSION_LABEL));
            Some(Instance {
                namespace,
                deployment,
                version,
            })
        })
        .collect();

    let facts = InstallationFacts::new(instances);
    debug!(instances = facts.instances.len(), multi_instance = facts.multi_instance, "Discovered installation facts");
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_client::mock::{new_object, MockClusterClient};
    use std::collections::BTreeMap;

    fn control_plane(client: &MockClusterClient, namespace: &str, version: &str) {
        let mut deploy = new_object(&kinds::deployments(), Some(namespace), "kubeblocks");
        deploy.metadata.labels = Some(BTreeMap::from([
            (NAME_LABEL.to_string(), PLATFORM_NAME.to_string()),
            (COMPONENT_LABEL.to_string(), APPS_COMPONENT.to_string()),
            (VERSION_LABEL.to_string(), version.to_string()),
        ]));
        client.insert(&kinds::deployments(), deploy);
    }

    #[tokio::test]
    async fn test_empty_cluster() {
        let client = MockClusterClient::new();
        let facts = discover(&client).await.unwrap();
        assert!(facts.is_empty());
        assert!(!facts.multi_instance);
    }

    #[tokio::test]
    async fn test_single_and_multi_instance() {
        let client = MockClusterClient::new();
        control_plane(&client, "kb-system", "0.9.2");

        let facts = discover(&client).await.unwrap();
        assert!(!facts.multi_instance);
        assert_eq!(facts.in_namespace("kb-system").and_then(|i| i.version.as_deref()), Some("0.9.2"));

        control_plane(&client, "kb-new", "1.0.0");
        let facts = discover(&client).await.unwrap();
        assert!(facts.multi_instance);
        assert_eq!(facts.versions().into_iter().collect::<Vec<_>>(), vec!["0.9.2", "1.0.0"]);
    }

    #[tokio::test]
    async fn test_unreachable_is_fatal() {
        let client = MockClusterClient::new();
        client.set_unreachable(true);
        assert!(matches!(discover(&client).await, Err(LifecycleError::ClusterUnreachable(_))));
    }
}
