//! Mock ReleaseManager for unit testing
//!
//! Keeps releases and their values in memory and records every call so tests
//! can assert which helm operations a workflow issued.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

use crate::error::HelmError;
use crate::models::{Chart, ChartMetadata, Release, ReleaseInfo, ReleaseRequest};
use crate::release_trait::ReleaseManagerTrait;

/// A recorded call
#[derive(Debug, Clone, PartialEq)]
pub enum HelmCall {
    AddRepo { name: String, url: String },
    Install(ReleaseRequest),
    Upgrade(ReleaseRequest),
    Uninstall { name: String, namespace: String },
}

#[derive(Debug, Default)]
struct State {
    releases: HashMap<(String, String), (Release, Value)>,
    calls: Vec<HelmCall>,
    failing: HashMap<&'static str, String>,
}

/// Mock ReleaseManager for testing
#[derive(Debug, Clone, Default)]
pub struct MockReleaseManager {
    state: Arc<Mutex<State>>,
}

fn merge_values(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge_values(base.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

fn release_for(request: &ReleaseRequest, revision: u32, chart_version: String) -> Release {
    let chart_name = request.chart.rsplit('/').next().unwrap_or(&request.chart).to_string();
    Release {
        name: request.name.clone(),
        namespace: request.namespace.clone(),
        revision,
        info: ReleaseInfo {
            status: "deployed".to_string(),
            description: None,
            notes: None,
        },
        chart: Some(Chart {
            metadata: ChartMetadata {
                name: chart_name,
                app_version: Some(chart_version.clone()),
                version: chart_version,
                annotations: Default::default(),
            },
        }),
    }
}

impl MockReleaseManager {
    /// Create a mock with no releases
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an existing release (for test setup)
    pub fn add_release(&self, name: &str, namespace: &str, chart_version: &str, values: Value) {
        let request = ReleaseRequest::new(name, format!("repo/{name}"), namespace);
        let release = release_for(&request, 1, chart_version.to_string());
        self.lock()
            .releases
            .insert((namespace.to_string(), name.to_string()), (release, values));
    }

    /// Make the named operation ("install", "upgrade", "uninstall") fail
    pub fn fail(&self, operation: &'static str, message: &str) {
        self.lock().failing.insert(operation, message.to_string());
    }

    /// Calls in the order they were made
    #[must_use]
    pub fn calls(&self) -> Vec<HelmCall> {
        self.lock().calls.clone()
    }

    /// Stored release, if any
    #[must_use]
    pub fn release(&self, name: &str, namespace: &str) -> Option<Release> {
        self.lock()
            .releases
            .get(&(namespace.to_string(), name.to_string()))
            .map(|(r, _)| r.clone())
    }

    /// Stored user values, if the release exists
    #[must_use]
    pub fn values(&self, name: &str, namespace: &str) -> Option<Value> {
        self.lock()
            .releases
            .get(&(namespace.to_string(), name.to_string()))
            .map(|(_, v)| v.clone())
    }

    fn check(state: &State, operation: &str) -> Result<(), HelmError> {
        match state.failing.get(operation) {
            Some(message) => Err(HelmError::CommandFailed {
                command: operation.to_string(),
                status: "exit status: 1".to_string(),
                stderr: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl ReleaseManagerTrait for MockReleaseManager {
    async fn add_repo(&self, name: &str, url: &str) -> Result<(), HelmError> {
        self.lock().calls.push(HelmCall::AddRepo {
            name: name.to_string(),
            url: url.to_string(),
        });
        Ok(())
    }

    async fn install(&self, request: &ReleaseRequest) -> Result<Release, HelmError> {
        let mut state = self.lock();
        state.calls.push(HelmCall::Install(request.clone()));
        Self::check(&state, "install")?;
        let key = (request.namespace.clone(), request.name.clone());
        if state.releases.contains_key(&key) {
            return Err(HelmError::CommandFailed {
                command: "install".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "INSTALLATION FAILED: cannot re-use a name that is still in use".to_string(),
            });
        }
        let version = request.version.clone().unwrap_or_else(|| "0.0.0".to_string());
        let release = release_for(request, 1, version);
        state.releases.insert(key, (release.clone(), request.values.clone()));
        Ok(release)
    }

    async fn upgrade(&self, request: &ReleaseRequest) -> Result<Release, HelmError> {
        let mut state = self.lock();
        state.calls.push(HelmCall::Upgrade(request.clone()));
        Self::check(&state, "upgrade")?;
        let key = (request.namespace.clone(), request.name.clone());
        let (revision, previous_version, mut values) = match state.releases.get(&key) {
            Some((release, values)) => (
                release.revision + 1,
                release.chart_version().map(str::to_string),
                if request.reuse_values { values.clone() } else { Value::Object(Map::new()) },
            ),
            None if request.install_if_missing => (1, None, Value::Object(Map::new())),
            None => return Err(HelmError::NotFound(format!("\"{}\" has no deployed releases", request.name))),
        };
        merge_values(&mut values, &request.values);
        let version = request
            .version
            .clone()
            .or(previous_version)
            .unwrap_or_else(|| "0.0.0".to_string());
        let release = release_for(request, revision, version);
        state.releases.insert(key, (release.clone(), values));
        Ok(release)
    }

    async fn uninstall(&self, name: &str, namespace: &str) -> Result<Option<Release>, HelmError> {
        let mut state = self.lock();
        state.calls.push(HelmCall::Uninstall {
            name: name.to_string(),
            namespace: namespace.to_string(),
        });
        Self::check(&state, "uninstall")?;
        Ok(state
            .releases
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|(r, _)| r))
    }

    async fn get_release(&self, name: &str, namespace: &str) -> Result<Option<Release>, HelmError> {
        Ok(self.release(name, namespace))
    }

    async fn get_values(&self, name: &str, namespace: &str, _all: bool) -> Result<Value, HelmError> {
        self.values(name, namespace)
            .ok_or_else(|| HelmError::NotFound(format!("release: not found: {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_upgrade_reuses_values() {
        let helm = MockReleaseManager::new();
        helm.add_release("kubeblocks", "kb-system", "0.9.2", json!({"image": {"tag": "0.9.2"}}));

        let request = ReleaseRequest::new("kubeblocks", "kubeblocks/kubeblocks", "kb-system")
            .with_version("0.9.2")
            .with_values(json!({"keepAddons": true}))
            .with_reuse_values(true);
        let release = helm.upgrade(&request).await.unwrap();

        assert_eq!(release.revision, 2);
        assert_eq!(
            helm.values("kubeblocks", "kb-system").unwrap(),
            json!({"image": {"tag": "0.9.2"}, "keepAddons": true})
        );
    }

    #[tokio::test]
    async fn test_upgrade_missing_release() {
        let helm = MockReleaseManager::new();
        let request = ReleaseRequest::new("kubeblocks", "kubeblocks/kubeblocks", "kb-system");
        assert!(helm.upgrade(&request).await.unwrap_err().is_not_found());

        let release = helm
            .upgrade(&request.with_version("1.0.0").with_install_if_missing(true))
            .await
            .unwrap();
        assert_eq!(release.chart_version(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn test_uninstall_twice() {
        let helm = MockReleaseManager::new();
        helm.add_release("kubeblocks", "kb-system", "1.0.0", json!({}));
        assert!(helm.uninstall("kubeblocks", "kb-system").await.unwrap().is_some());
        assert!(helm.uninstall("kubeblocks", "kb-system").await.unwrap().is_none());
    }
}
