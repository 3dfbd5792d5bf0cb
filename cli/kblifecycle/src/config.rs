//! Orchestrator configuration.
//!
//! Loaded from environment variables with defaults. Per-invocation options
//! live on the workflow option structs in [`crate::orchestrator`].

use std::time::Duration;

use crate::error::LifecycleError;

/// Process-level settings shared by every workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Release name of the control plane
    pub release_name: String,
    /// Chart reference (`repo/chart`)
    pub chart: String,
    /// Chart repository URL
    pub chart_repo_url: String,
    /// Base URL of the versioned CRD bundles
    pub crd_base_url: String,
    /// Interval between polls in every wait
    pub poll_interval: Duration,
    /// Scale-down deadline per deployment
    pub deployment_timeout: Duration,
    /// helm binary
    pub helm_bin: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            release_name: "kubeblocks".to_string(),
            chart: "kubeblocks/kubeblocks".to_string(),
            chart_repo_url: "https://apecloud.github.io/helm-charts".to_string(),
            crd_base_url: "https://github.com/apecloud/kubeblocks/releases/download".to_string(),
            poll_interval: Duration::from_secs(5),
            deployment_timeout: Duration::from_secs(300),
            helm_bin: "helm".to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::InvalidConfig`] when a numeric variable does not parse.
    pub fn from_env() -> Result<Self, LifecycleError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (the environment, or a map in tests).
    ///
    /// # Errors
    ///
    /// [`LifecycleError::InvalidConfig`] when a numeric variable does not parse
    /// or is zero.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LifecycleError> {
        let defaults = Self::default();
        let string = |key: &str, default: String| lookup(key).filter(|v| !v.is_empty()).unwrap_or(default);
        let seconds = |key: &str, default: Duration| -> Result<Duration, LifecycleError> {
            match lookup(key).filter(|v| !v.is_empty()) {
                None => Ok(default),
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(0) | Err(_) => Err(LifecycleError::InvalidConfig(format!(
                        "{key} must be a positive number of seconds, got {raw:?}"
                    ))),
                    Ok(secs) => Ok(Duration::from_secs(secs)),
                },
            }
        };

        Ok(Self {
            release_name: string("KB_RELEASE_NAME", defaults.release_name),
            chart: string("KB_CHART", defaults.chart),
            chart_repo_url: string("KB_CHART_REPO_URL", defaults.chart_repo_url),
            crd_base_url: string("KB_CRD_BASE_URL", defaults.crd_base_url),
            poll_interval: seconds("KB_POLL_INTERVAL_SECS", defaults.poll_interval)?,
            deployment_timeout: seconds("KB_DEPLOYMENT_TIMEOUT_SECS", defaults.deployment_timeout)?,
            helm_bin: string("KB_HELM_BIN", defaults.helm_bin),
        })
    }

    /// Repository alias: the part of the chart reference before `/`.
    #[must_use]
    pub fn chart_repo_name(&self) -> &str {
        self.chart.split_once('/').map_or(self.chart.as_str(), |(repo, _)| repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd_source::bundle_url;
    use semver::Version;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(config.chart_repo_name(), "kubeblocks");
        assert_eq!(
            bundle_url(&config.crd_base_url, &Version::new(1, 0, 0)),
            "https://github.com/apecloud/kubeblocks/releases/download/v1.0.0/kubeblocks_crds.yaml"
        );
    }

    #[test]
    fn test_overrides() {
        let config = OrchestratorConfig::from_lookup(lookup(&[
            ("KB_RELEASE_NAME", "kb"),
            ("KB_POLL_INTERVAL_SECS", "2"),
            ("KB_CRD_BASE_URL", "http://mirror.local/crds/"),
        ]))
        .unwrap();
        assert_eq!(config.release_name, "kb");
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(
            bundle_url(&config.crd_base_url, &Version::new(0, 9, 2)),
            "http://mirror.local/crds/v0.9.2/kubeblocks_crds.yaml"
        );
    }

    #[test]
    fn test_invalid_number() {
        let err = OrchestratorConfig::from_lookup(lookup(&[("KB_DEPLOYMENT_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidConfig(_)));
        let err = OrchestratorConfig::from_lookup(lookup(&[("KB_POLL_INTERVAL_SECS", "0")])).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidConfig(_)));
    }
}
