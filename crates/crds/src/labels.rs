//! Well-known label and annotation keys
//!
//! Keys the KubeBlocks charts and the Helm release manager stamp on the
//! objects they own.

/// Helm release instance label; every chart-owned object carries it.
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

/// Application name label.
pub const NAME_LABEL: &str = "app.kubernetes.io/name";

/// Component label distinguishing the control-plane workloads.
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";

/// Chart version label on the control-plane deployments.
pub const VERSION_LABEL: &str = "app.kubernetes.io/version";

/// Value of [`NAME_LABEL`] on control-plane workloads.
pub const PLATFORM_NAME: &str = "kubeblocks";

/// Value of [`COMPONENT_LABEL`] on the main control-plane deployment.
pub const APPS_COMPONENT: &str = "apps";

/// Value of [`COMPONENT_LABEL`] on the data-protection deployment.
pub const DATAPROTECTION_COMPONENT: &str = "dataprotection";

/// Present on ConfigMaps that hold configuration templates.
pub const CONFIG_TEMPLATE_LABEL: &str = "config.kubeblocks.io/config-template-type";

/// Helm annotation naming the owning release.
pub const RELEASE_NAME_ANNOTATION: &str = "meta.helm.sh/release-name";

/// Helm annotation naming the owning release namespace.
pub const RELEASE_NAMESPACE_ANNOTATION: &str = "meta.helm.sh/release-namespace";

/// Helm resource policy annotation; `keep` stops Helm pruning the object.
pub const RESOURCE_POLICY_ANNOTATION: &str = "helm.sh/resource-policy";

/// Value of [`RESOURCE_POLICY_ANNOTATION`] that preserves an object.
pub const KEEP_POLICY: &str = "keep";

/// Marks which API version a component definition was authored against.
pub const CRD_API_VERSION_ANNOTATION: &str = "kubeblocks.io/crd-api-version";

/// Value written to [`CRD_API_VERSION_ANNOTATION`] on pre-1.0 objects.
pub const LEGACY_API_VERSION: &str = "apps.kubeblocks.io/v1alpha1";

/// Prefix of every add-on Helm release name.
pub const ADDON_RELEASE_PREFIX: &str = "kb-addon-";
