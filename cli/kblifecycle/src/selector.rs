//! Selectors for platform-owned and add-on-owned objects.

use cluster_client::LabelSelector;
use crds::labels::{ADDON_RELEASE_PREFIX, CONFIG_TEMPLATE_LABEL, INSTANCE_LABEL, NAME_LABEL};

/// Add-ons whose charts label resources with `app.kubernetes.io/name=<value>`
/// instead of the release instance label.
const ALTERNATE_LABEL_ADDONS: &[(&str, &str)] = &[
    ("snapshot-controller", "snapshot-controller"),
    ("csi-hostpath-driver", "csi-hostpath-driver"),
    ("prometheus", "prometheus"),
];

/// Suffix of every platform CRD name. CRDs carry no ownership labels.
pub const PLATFORM_CRD_SUFFIX: &str = ".kubeblocks.io";

/// Helm release name of an add-on.
#[must_use]
pub fn addon_release_name(addon: &str) -> String {
    format!("{ADDON_RELEASE_PREFIX}{addon}")
}

/// Whether a CRD name belongs to the platform.
#[must_use]
pub fn is_platform_crd(name: &str) -> bool {
    name.ends_with(PLATFORM_CRD_SUFFIX)
}

/// Builds the label selectors for one release and its enabled add-ons.
#[derive(Debug, Clone)]
pub struct ResourceSelector {
    release_name: String,
    addons: Vec<String>,
}

impl ResourceSelector {
    pub fn new<I, S>(release_name: impl Into<String>, enabled_addons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut addons: Vec<String> = enabled_addons.into_iter().map(Into::into).collect();
        addons.sort();
        addons.dedup();
        Self {
            release_name: release_name.into(),
            addons,
        }
    }

    /// `app.kubernetes.io/instance in (<release>, kb-addon-<a>, ...)`
    #[must_use]
    pub fn instance_selector(&self) -> LabelSelector {
        let values = std::iter::once(self.release_name.clone()).chain(self.addons.iter().map(|a| addon_release_name(a)));
        LabelSelector::new().in_set(INSTANCE_LABEL, values)
    }

    /// Selectors for add-ons that use an alternate labelling convention.
    #[must_use]
    pub fn alternate_selectors(&self) -> Vec<LabelSelector> {
        let names: Vec<&str> = ALTERNATE_LABEL_ADDONS
            .iter()
            .filter(|(addon, _)| self.addons.iter().any(|a| a == addon))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            return Vec::new();
        }
        vec![LabelSelector::new().in_set(NAME_LABEL, names)]
    }

    /// Every selector that marks an object as owned; results are unioned.
    #[must_use]
    pub fn owned_selectors(&self) -> Vec<LabelSelector> {
        let mut selectors = vec![self.instance_selector()];
        selectors.extend(self.alternate_selectors());
        selectors
    }

    /// ConfigMaps holding configuration templates.
    #[must_use]
    pub fn config_template_selector() -> LabelSelector {
        LabelSelector::new().exists(CONFIG_TEMPLATE_LABEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_selector() {
        let selector = ResourceSelector::new("kubeblocks", ["redis", "mysql", "mysql"]);
        assert_eq!(
            selector.instance_selector().to_string(),
            "app.kubernetes.io/instance in (kubeblocks,kb-addon-mysql,kb-addon-redis)"
        );
        assert_eq!(selector.owned_selectors().len(), 1);
    }

    #[test]
    fn test_alternate_label_addons() {
        let selector = ResourceSelector::new("kubeblocks", ["snapshot-controller", "mysql"]);
        let alternates = selector.alternate_selectors();
        assert_eq!(alternates.len(), 1);
        assert_eq!(alternates[0].to_string(), "app.kubernetes.io/name=snapshot-controller");
    }

    #[test]
    fn test_platform_crds() {
        assert!(is_platform_crd("clusters.apps.kubeblocks.io"));
        assert!(!is_platform_crd("volumesnapshots.snapshot.storage.k8s.io"));
    }
}
