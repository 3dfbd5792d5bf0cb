//! Stopping the control-plane workloads before an upgrade or migration.

use std::time::Duration;

use cluster_client::{kinds, ClusterClientTrait, LabelSelector};
use crds::labels::{APPS_COMPONENT, COMPONENT_LABEL, DATAPROTECTION_COMPONENT, NAME_LABEL, PLATFORM_NAME};
use kube::api::DynamicObject;
use serde_json::json;
use tracing::info;

use crate::error::LifecycleError;
use crate::poll::{poll_until, PollError, Tick};

/// Ready and available replica counts from a deployment's status.
fn live_replicas(deployment: &DynamicObject) -> (i64, i64) {
    let status = &deployment.data["status"];
    (
        status["readyReplicas"].as_i64().unwrap_or(0),
        status["availableReplicas"].as_i64().unwrap_or(0),
    )
}

/// Scales the control-plane deployments of one namespace to zero.
#[derive(Clone, Copy)]
pub struct WorkloadScaler<'a> {
    client: &'a dyn ClusterClientTrait,
    interval: Duration,
    timeout: Duration,
}

impl std::fmt::Debug for WorkloadScaler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkloadScaler")
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<'a> WorkloadScaler<'a> {
    /// `timeout` bounds the wait for each deployment separately.
    pub fn new(client: &'a dyn ClusterClientTrait, interval: Duration, timeout: Duration) -> Self {
        Self {
            client,
            interval,
            timeout,
        }
    }

    /// Scale the apps and data-protection deployments in `namespace` to zero
    /// and wait until none of their replicas is ready or available. Returns
    /// the names of the deployments that were stopped.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::ScaleDownTimeout`] naming the first deployment that
    /// did not stop in time; cluster failures as usual.
    pub async fn scale_down(&self, namespace: &str) -> Result<Vec<String>, LifecycleError> {
        let mut stopped = Vec::new();
        for component in [APPS_COMPONENT, DATAPROTECTION_COMPONENT] {
            let selector = LabelSelector::new()
                .eq(NAME_LABEL, PLATFORM_NAME)
                .eq(COMPONENT_LABEL, component);
            let deployments = self
                .client
                .list(&kinds::deployments(), Some(namespace), Some(&selector))
                .await
                .map_err(|e| LifecycleError::cluster(format!("failed to list {component} deployments"), e))?;

            for name in deployments.into_iter().filter_map(|d| d.metadata.name) {
                self.stop(namespace, &name).await?;
                stopped.push(name);
            }
        }
        Ok(stopped)
    }

    async fn stop(&self, namespace: &str, name: &str) -> Result<(), LifecycleError> {
        let kind = kinds::deployments();
        info!(namespace, deployment = name, "Scaling deployment to zero");
        match self
            .client
            .patch_merge(&kind, Some(namespace), name, &json!({ "spec": { "replicas": 0 } }))
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(LifecycleError::cluster(format!("failed to scale {namespace}/{name}"), e)),
        }

        let description = format!("deployment {namespace}/{name} to stop");
        let client = self.client;
        let kind = &kind;
        let result: Result<(), PollError<(i64, i64), LifecycleError>> =
            poll_until(&description, self.timeout, self.interval, || async move {
                match client.get(kind, Some(namespace), name).await {
                    Ok(deployment) => {
                        let (ready, available) = live_replicas(&deployment);
                        if ready == 0 && available == 0 {
                            Ok(Tick::Ready(()))
                        } else {
                            Ok(Tick::Pending((ready, available)))
                        }
                    }
                    Err(e) if e.is_not_found() => Ok(Tick::Ready(())),
                    Err(e) => Err(LifecycleError::cluster(format!("failed to read {namespace}/{name}"), e)),
                }
            })
            .await;

        match result {
            Ok(()) => {
                info!(namespace, deployment = name, "Deployment stopped");
                Ok(())
            }
            Err(PollError::Failed(e)) => Err(e),
            Err(PollError::TimedOut { .. }) => Err(LifecycleError::ScaleDownTimeout {
                deployment: format!("{namespace}/{name}"),
                timeout: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_client::mock::{new_object, MockClusterClient};
    use std::collections::BTreeMap;

    fn deployment(client: &MockClusterClient, name: &str, component: &str, ready: i64) {
        let mut deploy = new_object(&kinds::deployments(), Some("kb-system"), name);
        deploy.metadata.labels = Some(BTreeMap::from([
            (NAME_LABEL.to_string(), PLATFORM_NAME.to_string()),
            (COMPONENT_LABEL.to_string(), component.to_string()),
        ]));
        deploy.data = json!({
            "spec": { "replicas": 1 },
            "status": { "readyReplicas": ready, "availableReplicas": ready }
        });
        client.insert(&kinds::deployments(), deploy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scale_down_both_components() {
        let client = MockClusterClient::new();
        deployment(&client, "kubeblocks", APPS_COMPONENT, 1);
        deployment(&client, "kubeblocks-dataprotection", DATAPROTECTION_COMPONENT, 1);
        // Stand in for the deployment controller
        client.on_patch(|_, object| {
            if object.data["spec"]["replicas"] == json!(0) {
                object.data["status"] = json!({ "readyReplicas": 0, "availableReplicas": 0 });
            }
        });

        let scaler = WorkloadScaler::new(&client, Duration::from_secs(1), Duration::from_secs(30));
        let stopped = scaler.scale_down("kb-system").await.unwrap();
        assert_eq!(stopped, vec!["kubeblocks", "kubeblocks-dataprotection"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scale_down_timeout() {
        let client = MockClusterClient::new();
        deployment(&client, "kubeblocks", APPS_COMPONENT, 1);

        let scaler = WorkloadScaler::new(&client, Duration::from_secs(1), Duration::from_secs(10));
        let err = scaler.scale_down("kb-system").await.unwrap_err();
        assert!(matches!(err, LifecycleError::ScaleDownTimeout { ref deployment, .. } if deployment == "kb-system/kubeblocks"));
    }
}
