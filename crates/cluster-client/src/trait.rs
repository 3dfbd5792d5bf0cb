//! ClusterClient trait for mocking
//!
//! The concrete [`KubeClusterClient`](crate::KubeClusterClient) implements this
//! trait against a live API server; tests use `MockClusterClient`.

use kube::api::DynamicObject;

use crate::error::ClusterError;
use crate::models::ResourceKind;
use crate::selector::LabelSelector;

/// Kind-agnostic Kubernetes operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Namespaced kinds with `namespace = None` operate across all namespaces
/// (list) or fail with [`ClusterError::InvalidRequest`] (everything else).
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    /// List objects of `kind`, optionally filtered by label selector
    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<DynamicObject>, ClusterError>;

    /// Fetch a single object
    async fn get(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, ClusterError>;

    /// Create an object. Fails with `AlreadyExists` if present.
    async fn create(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError>;

    /// Replace an object. `metadata.resourceVersion` must be current.
    async fn replace(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError>;

    /// Apply a JSON merge patch (RFC 7386)
    async fn patch_merge(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<DynamicObject, ClusterError>;

    /// Delete an object. `immediate` sets a zero grace period.
    async fn delete(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
        immediate: bool,
    ) -> Result<(), ClusterError>;
}
