//! KubeBlocks resource kinds and the set discovered during teardown.

use cluster_client::{kinds, ResourceKind};

/// `addons.extensions.kubeblocks.io`
pub fn addons() -> ResourceKind {
    ResourceKind::new("extensions.kubeblocks.io", "v1alpha1", "Addon", "addons", false)
}

/// `backuprepos.dataprotection.kubeblocks.io`
pub fn backup_repos() -> ResourceKind {
    ResourceKind::new("dataprotection.kubeblocks.io", "v1alpha1", "BackupRepo", "backuprepos", false)
}

/// `storageproviders.dataprotection.kubeblocks.io`
pub fn storage_providers() -> ResourceKind {
    ResourceKind::new(
        "dataprotection.kubeblocks.io",
        "v1alpha1",
        "StorageProvider",
        "storageproviders",
        false,
    )
}

/// `componentdefinitions.apps.kubeblocks.io`, at the version both generations serve
pub fn component_definitions() -> ResourceKind {
    ResourceKind::new(
        "apps.kubeblocks.io",
        "v1alpha1",
        "ComponentDefinition",
        "componentdefinitions",
        false,
    )
}

/// `clusters.apps.kubeblocks.io`; user workloads that guard uninstall
pub fn clusters() -> ResourceKind {
    ResourceKind::new("apps.kubeblocks.io", "v1alpha1", "Cluster", "clusters", true)
}

/// Every kind listed when discovering platform-owned objects.
pub fn tracked() -> Vec<ResourceKind> {
    let mut tracked = vec![
        addons(),
        backup_repos(),
        kinds::cluster_role_bindings(),
        kinds::cluster_roles(),
        kinds::configmaps(),
        kinds::custom_resource_definitions(),
        kinds::deployments(),
        kinds::persistent_volume_claims(),
        kinds::persistent_volumes(),
        kinds::role_bindings(),
        kinds::roles(),
        kinds::secrets(),
        kinds::service_accounts(),
        kinds::services(),
        kinds::stateful_sets(),
        storage_providers(),
        kinds::volume_snapshot_classes(),
    ];
    tracked.sort();
    tracked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracked_kinds_sorted_and_unique() {
        let tracked = tracked();
        assert_eq!(tracked.len(), 17);
        let names: Vec<_> = tracked.iter().map(|k| k.resource.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_platform_kinds_are_custom() {
        assert!(!addons().is_builtin());
        assert!(!component_definitions().is_builtin());
        assert_eq!(clusters().to_string(), "clusters.apps.kubeblocks.io");
    }
}
