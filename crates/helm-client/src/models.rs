//! Release request and release metadata models

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Parameters for install/upgrade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseRequest {
    /// Release name
    pub name: String,
    /// Chart reference (`repo/chart`)
    pub chart: String,
    /// Target namespace
    pub namespace: String,
    /// Chart version; latest when unset
    pub version: Option<String>,
    /// Values overlay (a JSON object)
    pub values: serde_json::Value,
    /// Keep the release's previous values and merge `values` over them
    pub reuse_values: bool,
    /// Create the namespace if absent
    pub create_namespace: bool,
    /// `helm upgrade --install`: install when the release does not exist yet
    pub install_if_missing: bool,
    /// Wait for release resources to become ready
    pub wait: bool,
    /// helm-side timeout for `wait`
    pub timeout: Option<Duration>,
}

impl ReleaseRequest {
    /// Request with empty values and every flag off
    pub fn new(name: impl Into<String>, chart: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chart: chart.into(),
            namespace: namespace.into(),
            version: None,
            values: serde_json::Value::Object(serde_json::Map::new()),
            reuse_values: false,
            create_namespace: false,
            install_if_missing: false,
            wait: false,
            timeout: None,
        }
    }

    /// Pin the chart version
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the values overlay
    #[must_use]
    pub fn with_values(mut self, values: serde_json::Value) -> Self {
        self.values = values;
        self
    }

    /// Merge over the release's existing values
    #[must_use]
    pub fn with_reuse_values(mut self, reuse: bool) -> Self {
        self.reuse_values = reuse;
        self
    }

    /// Create the namespace if absent
    #[must_use]
    pub fn with_create_namespace(mut self, create: bool) -> Self {
        self.create_namespace = create;
        self
    }

    /// Install when no release exists (upgrade only)
    #[must_use]
    pub fn with_install_if_missing(mut self, install: bool) -> Self {
        self.install_if_missing = install;
        self
    }

    /// Wait for readiness, bounded by `timeout`
    #[must_use]
    pub fn with_wait(mut self, wait: bool, timeout: Option<Duration>) -> Self {
        self.wait = wait;
        self.timeout = timeout;
        self
    }

    /// Whether the overlay carries any values
    #[must_use]
    pub fn has_values(&self) -> bool {
        match &self.values {
            serde_json::Value::Object(map) => !map.is_empty(),
            serde_json::Value::Null => false,
            _ => true,
        }
    }
}

/// Release as reported by `helm status -o json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    /// Release name
    pub name: String,
    /// Namespace the release lives in
    pub namespace: String,
    /// Release revision
    #[serde(rename = "version")]
    pub revision: u32,
    /// Deployment info
    #[serde(default)]
    pub info: ReleaseInfo,
    /// Chart the release was rendered from
    #[serde(default)]
    pub chart: Option<Chart>,
}

impl Release {
    /// Chart version of the release, if helm reported one
    #[must_use]
    pub fn chart_version(&self) -> Option<&str> {
        self.chart.as_ref().map(|c| c.metadata.version.as_str())
    }
}

/// Release status block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    /// deployed, failed, pending-upgrade, ...
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Chart reference embedded in a release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub metadata: ChartMetadata,
}

/// Chart.yaml metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_helm_status_output() {
        let raw = json!({
            "name": "kubeblocks",
            "info": {
                "first_deployed": "2024-01-01T00:00:00Z",
                "status": "deployed",
                "description": "Upgrade complete"
            },
            "chart": {
                "metadata": {
                    "name": "kubeblocks",
                    "version": "0.9.2",
                    "appVersion": "0.9.2",
                    "apiVersion": "v2"
                }
            },
            "manifest": "---\n",
            "version": 3,
            "namespace": "kb-system"
        });
        let release: Release = serde_json::from_value(raw).unwrap();
        assert_eq!(release.revision, 3);
        assert_eq!(release.info.status, "deployed");
        assert_eq!(release.chart_version(), Some("0.9.2"));
    }

    #[test]
    fn test_has_values() {
        let request = ReleaseRequest::new("kubeblocks", "kubeblocks/kubeblocks", "kb-system");
        assert!(!request.has_values());
        assert!(request.with_values(json!({"image": {"tag": "1.0.0"}})).has_values());
    }
}
