//! Resource kind and object identity models

use std::fmt;

use kube::discovery::ApiResource;
use serde::{Deserialize, Serialize};

/// API groups served by Kubernetes itself. Anything else is a custom resource.
const BUILTIN_GROUPS: &[&str] = &[
    "",
    "apps",
    "batch",
    "policy",
    "autoscaling",
    "rbac.authorization.k8s.io",
    "apiextensions.k8s.io",
    "admissionregistration.k8s.io",
    "networking.k8s.io",
    "storage.k8s.io",
    "coordination.k8s.io",
    "scheduling.k8s.io",
];

/// Typed resource-kind identifier (group/version/resource).
///
/// Field order makes the derived ordering sort by resource name first, which
/// is the deterministic order deletions run in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKind {
    /// Plural resource name (e.g. "deployments")
    pub resource: String,
    /// API group ("" for core)
    pub group: String,
    /// API version
    pub version: String,
    /// Kind (e.g. "Deployment")
    pub kind: String,
    /// Whether objects of this kind live in a namespace
    pub namespaced: bool,
}

impl ResourceKind {
    /// Create a resource kind
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        resource: impl Into<String>,
        namespaced: bool,
    ) -> Self {
        Self {
            resource: resource.into(),
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            namespaced,
        }
    }

    /// `group/version`, or just `version` for the core group.
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Served by Kubernetes itself rather than defined by a CRD.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        BUILTIN_GROUPS.contains(&self.group.as_str())
    }

    /// kube `ApiResource` for building a dynamic `Api`.
    #[must_use]
    pub fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: self.kind.clone(),
            plural: self.resource.clone(),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            f.write_str(&self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

/// Namespace + name identity of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Namespace; `None` for cluster-scoped objects
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Key for a namespaced object
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Key for a cluster-scoped object
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Built-in Kubernetes kinds.
pub mod kinds {
    use super::ResourceKind;

    pub fn namespaces() -> ResourceKind {
        ResourceKind::new("", "v1", "Namespace", "namespaces", false)
    }

    pub fn configmaps() -> ResourceKind {
        ResourceKind::new("", "v1", "ConfigMap", "configmaps", true)
    }

    pub fn secrets() -> ResourceKind {
        ResourceKind::new("", "v1", "Secret", "secrets", true)
    }

    pub fn services() -> ResourceKind {
        ResourceKind::new("", "v1", "Service", "services", true)
    }

    pub fn service_accounts() -> ResourceKind {
        ResourceKind::new("", "v1", "ServiceAccount", "serviceaccounts", true)
    }

    pub fn persistent_volume_claims() -> ResourceKind {
        ResourceKind::new("", "v1", "PersistentVolumeClaim", "persistentvolumeclaims", true)
    }

    pub fn persistent_volumes() -> ResourceKind {
        ResourceKind::new("", "v1", "PersistentVolume", "persistentvolumes", false)
    }

    pub fn deployments() -> ResourceKind {
        ResourceKind::new("apps", "v1", "Deployment", "deployments", true)
    }

    pub fn stateful_sets() -> ResourceKind {
        ResourceKind::new("apps", "v1", "StatefulSet", "statefulsets", true)
    }

    pub fn roles() -> ResourceKind {
        ResourceKind::new("rbac.authorization.k8s.io", "v1", "Role", "roles", true)
    }

    pub fn role_bindings() -> ResourceKind {
        ResourceKind::new("rbac.authorization.k8s.io", "v1", "RoleBinding", "rolebindings", true)
    }

    pub fn cluster_roles() -> ResourceKind {
        ResourceKind::new("rbac.authorization.k8s.io", "v1", "ClusterRole", "clusterroles", false)
    }

    pub fn cluster_role_bindings() -> ResourceKind {
        ResourceKind::new(
            "rbac.authorization.k8s.io",
            "v1",
            "ClusterRoleBinding",
            "clusterrolebindings",
            false,
        )
    }

    pub fn custom_resource_definitions() -> ResourceKind {
        ResourceKind::new(
            "apiextensions.k8s.io",
            "v1",
            "CustomResourceDefinition",
            "customresourcedefinitions",
            false,
        )
    }

    pub fn storage_classes() -> ResourceKind {
        ResourceKind::new("storage.k8s.io", "v1", "StorageClass", "storageclasses", false)
    }

    pub fn volume_snapshot_classes() -> ResourceKind {
        ResourceKind::new(
            "snapshot.storage.k8s.io",
            "v1",
            "VolumeSnapshotClass",
            "volumesnapshotclasses",
            false,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_version_and_display() {
        let cm = kinds::configmaps();
        assert_eq!(cm.api_version(), "v1");
        assert_eq!(cm.to_string(), "configmaps");

        let deploy = kinds::deployments();
        assert_eq!(deploy.api_version(), "apps/v1");
        assert_eq!(deploy.to_string(), "deployments.apps");
        assert_eq!(deploy.api_resource().plural, "deployments");
    }

    #[test]
    fn test_builtin_detection() {
        assert!(kinds::cluster_roles().is_builtin());
        assert!(kinds::custom_resource_definitions().is_builtin());
        assert!(!kinds::volume_snapshot_classes().is_builtin());
        let addons = ResourceKind::new("extensions.kubeblocks.io", "v1alpha1", "Addon", "addons", false);
        assert!(!addons.is_builtin());
    }

    #[test]
    fn test_ordering_by_resource_name() {
        let mut kinds_list = vec![
            kinds::services(),
            kinds::cluster_roles(),
            kinds::deployments(),
            kinds::configmaps(),
        ];
        kinds_list.sort();
        let names: Vec<_> = kinds_list.iter().map(|k| k.resource.as_str()).collect();
        assert_eq!(names, vec!["clusterroles", "configmaps", "deployments", "services"]);
    }

    #[test]
    fn test_object_key_display() {
        assert_eq!(ObjectKey::namespaced("kb-system", "kubeblocks").to_string(), "kb-system/kubeblocks");
        assert_eq!(ObjectKey::cluster("kb-default-sc").to_string(), "kb-default-sc");
    }
}
