//! Versioned CRD bundles and applying them to the cluster.

use std::time::Duration;

use cluster_client::{kinds, ClusterClientTrait};
use kube::api::DynamicObject;
use reqwest::{Client, StatusCode};
use semver::Version;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::LifecycleError;

/// Where CRD manifests for a version come from.
#[async_trait::async_trait]
pub trait CrdSource: Send + Sync {
    /// CRDs for `version`. An empty list means the version ships none.
    async fn fetch(&self, version: &Version) -> Result<Vec<DynamicObject>, LifecycleError>;
}

/// Bundle URL for `version` under `base_url`.
#[must_use]
pub fn bundle_url(base_url: &str, version: &Version) -> String {
    format!("{}/v{version}/kubeblocks_crds.yaml", base_url.trim_end_matches('/'))
}

/// Split a multi-document YAML bundle into objects. Empty documents are skipped.
///
/// # Errors
///
/// [`LifecycleError::CrdSource`] on malformed YAML or a document that is
/// not a Kubernetes object.
pub fn parse_bundle(yaml: &str) -> Result<Vec<DynamicObject>, LifecycleError> {
    let mut objects = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(yaml).enumerate() {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| LifecycleError::CrdSource(format!("document {index}: {e}")))?;
        if value.is_null() {
            continue;
        }
        let json = serde_json::to_value(value)
            .map_err(|e| LifecycleError::CrdSource(format!("document {index}: {e}")))?;
        let object: DynamicObject = serde_json::from_value(json)
            .map_err(|e| LifecycleError::CrdSource(format!("document {index}: {e}")))?;
        objects.push(object);
    }
    Ok(objects)
}

/// Fetches bundles over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpCrdSource {
    client: Client,
    base_url: String,
}

impl HttpCrdSource {
    /// # Errors
    ///
    /// [`LifecycleError::CrdSource`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, LifecycleError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LifecycleError::CrdSource(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait::async_trait]
impl CrdSource for HttpCrdSource {
    async fn fetch(&self, version: &Version) -> Result<Vec<DynamicObject>, LifecycleError> {
        let url = bundle_url(&self.base_url, version);
        debug!(%url, "Fetching CRD bundle");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LifecycleError::CrdSource(format!("GET {url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            info!(%version, "No CRD bundle published for this version");
            return Ok(Vec::new());
        }
        if status != StatusCode::OK {
            return Err(LifecycleError::CrdSource(format!("GET {url}: unexpected status {status}")));
        }
        let body = response
            .text()
            .await
            .map_err(|e| LifecycleError::CrdSource(format!("GET {url}: {e}")))?;
        parse_bundle(&body)
    }
}

/// Fixed bundle, for tests.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct StaticCrdSource {
    pub objects: Vec<DynamicObject>,
}

#[cfg(test)]
#[async_trait::async_trait]
impl CrdSource for StaticCrdSource {
    async fn fetch(&self, _version: &Version) -> Result<Vec<DynamicObject>, LifecycleError> {
        Ok(self.objects.clone())
    }
}

/// Counts from [`apply_crds`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub created: usize,
    pub updated: usize,
}

/// Create missing CRDs and replace existing ones, keyed by name.
///
/// # Errors
///
/// Cluster failures other than a lost create race.
pub async fn apply_crds(
    client: &dyn ClusterClientTrait,
    objects: &[DynamicObject],
) -> Result<ApplySummary, LifecycleError> {
    let kind = kinds::custom_resource_definitions();
    let mut summary = ApplySummary::default();

    for object in objects {
        let Some(name) = object.metadata.name.as_deref() else {
            return Err(LifecycleError::CrdSource("CRD without metadata.name".to_string()));
        };
        match client.get(&kind, None, name).await {
            Ok(existing) => {
                let mut replacement = object.clone();
                replacement.metadata.resource_version = existing.metadata.resource_version;
                client
                    .replace(&kind, None, &replacement)
                    .await
                    .map_err(|e| LifecycleError::cluster(format!("failed to update CRD {name}"), e))?;
                debug!(crd = name, "Updated CRD");
                summary.updated += 1;
            }
            Err(e) if e.is_not_found() => match client.create(&kind, None, object).await {
                Ok(_) => {
                    debug!(crd = name, "Created CRD");
                    summary.created += 1;
                }
                Err(e) if e.is_already_exists() => debug!(crd = name, "CRD created concurrently"),
                Err(e) => return Err(LifecycleError::cluster(format!("failed to create CRD {name}"), e)),
            },
            Err(e) => return Err(LifecycleError::cluster(format!("failed to read CRD {name}"), e)),
        }
    }
    info!(created = summary.created, updated = summary.updated, "Applied CRDs");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_client::mock::{new_object, MockClusterClient};

    const BUNDLE: &str = r"---
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: clusters.apps.kubeblocks.io
spec:
  group: apps.kubeblocks.io
---
---
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: addons.extensions.kubeblocks.io
spec:
  group: extensions.kubeblocks.io
";

    #[test]
    fn test_parse_bundle_skips_empty_documents() {
        let objects = parse_bundle(BUNDLE).unwrap();
        let names: Vec<_> = objects.iter().filter_map(|o| o.metadata.name.as_deref()).collect();
        assert_eq!(names, vec!["clusters.apps.kubeblocks.io", "addons.extensions.kubeblocks.io"]);
        assert_eq!(objects[0].data["spec"]["group"], "apps.kubeblocks.io");
    }

    #[test]
    fn test_parse_bundle_rejects_garbage() {
        assert!(matches!(parse_bundle("- just\n- a list\n"), Err(LifecycleError::CrdSource(_))));
    }

    #[test]
    fn test_bundle_url() {
        assert_eq!(
            bundle_url("https://example.com/download/", &Version::new(1, 0, 0)),
            "https://example.com/download/v1.0.0/kubeblocks_crds.yaml"
        );
    }

    #[tokio::test]
    async fn test_apply_creates_then_updates() {
        let client = MockClusterClient::new();
        let kind = kinds::custom_resource_definitions();
        client.insert(&kind, new_object(&kind, None, "clusters.apps.kubeblocks.io"));

        let objects = parse_bundle(BUNDLE).unwrap();
        let summary = apply_crds(&client, &objects).await.unwrap();
        assert_eq!(summary, ApplySummary { created: 1, updated: 1 });

        let summary = apply_crds(&client, &objects).await.unwrap();
        assert_eq!(summary, ApplySummary { created: 0, updated: 2 });
        assert_eq!(client.created().len(), 1);
        assert_eq!(client.objects(&kind).len(), 2);
        let stored = client.object(&kind, None, "clusters.apps.kubeblocks.io").unwrap();
        assert_eq!(stored.data["spec"]["group"], "apps.kubeblocks.io");
    }
}
