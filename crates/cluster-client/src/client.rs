//! Kubernetes API implementation of [`ClusterClientTrait`]

use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crate::models::ResourceKind;
use crate::selector::LabelSelector;

/// Cluster client backed by a [`kube::Client`]
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient")
            .field("default_namespace", &self.client.default_namespace())
            .finish()
    }
}

impl KubeClusterClient {
    /// Wrap an existing kube client
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the ambient kubeconfig / in-cluster environment
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Unreachable`] when no configuration can be inferred.
    pub async fn try_default() -> Result<Self, ClusterError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    /// Api handle for listing (all namespaces when `namespace` is None)
    fn list_api(&self, kind: &ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = kind.api_resource();
        match (kind.namespaced, namespace) {
            (true, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &ar),
            _ => Api::all_with(self.client.clone(), &ar),
        }
    }

    /// Api handle for single-object operations
    fn object_api(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Api<DynamicObject>, ClusterError> {
        let ar = kind.api_resource();
        match (kind.namespaced, namespace) {
            (true, Some(ns)) => Ok(Api::namespaced_with(self.client.clone(), ns, &ar)),
            (true, None) => Err(ClusterError::InvalidRequest(format!(
                "{kind} is namespaced but no namespace was given"
            ))),
            (false, _) => Ok(Api::all_with(self.client.clone(), &ar)),
        }
    }
}

fn object_name(object: &DynamicObject) -> Result<&str, ClusterError> {
    object
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| ClusterError::InvalidRequest("object has no metadata.name".to_string()))
}

#[async_trait::async_trait]
impl ClusterClientTrait for KubeClusterClient {
    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        let api = self.list_api(kind, namespace);
        let mut params = ListParams::default();
        if let Some(selector) = selector.filter(|s| !s.is_empty()) {
            params = params.labels(&selector.to_string());
        }
        debug!(%kind, namespace = ?namespace, selector = ?params.label_selector, "Listing objects");
        let list = api.list(&params).await?;
        Ok(list.items)
    }

    async fn get(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, ClusterError> {
        let api = self.object_api(kind, namespace)?;
        Ok(api.get(name).await?)
    }

    async fn create(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        let api = self.object_api(kind, namespace)?;
        debug!(%kind, name = ?object.metadata.name, "Creating object");
        Ok(api.create(&PostParams::default(), object).await?)
    }

    async fn replace(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        let api = self.object_api(kind, namespace)?;
        let name = object_name(object)?;
        debug!(%kind, name, "Replacing object");
        Ok(api.replace(name, &PostParams::default(), object).await?)
    }

    async fn patch_merge(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<DynamicObject, ClusterError> {
        let api = self.object_api(kind, namespace)?;
        debug!(%kind, name, "Merge-patching object");
        Ok(api
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    async fn delete(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
        immediate: bool,
    ) -> Result<(), ClusterError> {
        let api = self.object_api(kind, namespace)?;
        let params = if immediate {
            DeleteParams {
                grace_period_seconds: Some(0),
                ..DeleteParams::default()
            }
        } else {
            DeleteParams::default()
        };
        debug!(%kind, name, immediate, "Deleting object");
        api.delete(name, &params).await?;
        Ok(())
    }
}
