//! Add-on convergence waiting.
//!
//! Polls the add-on set until every member reaches the phase a workflow wants
//! (Enabled on install, Disabled on uninstall), any member fails, or the
//! deadline passes.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cluster_client::ClusterClientTrait;
use crds::{Addon, AddonPhase};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::LifecycleError;
use crate::kinds;
use crate::poll::{poll_until, PollError, Tick};

/// One add-on condition, flattened for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionSummary {
    pub reason: Option<String>,
    pub message: Option<String>,
    pub transition_time: Option<DateTime<Utc>>,
    pub ok: bool,
}

/// Observed state of one add-on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddonRecord {
    pub name: String,
    /// Desired state (`spec.install.enabled`)
    pub enabled: bool,
    pub phase: Option<AddonPhase>,
    pub observed_generation: Option<i64>,
    pub conditions: Vec<ConditionSummary>,
}

impl From<Addon> for AddonRecord {
    fn from(addon: Addon) -> Self {
        let enabled = addon.desired_enabled();
        let phase = addon.phase();
        let (observed_generation, conditions) = addon
            .status
            .map(|s| {
                let conditions = s
                    .conditions
                    .into_iter()
                    .map(|c| ConditionSummary {
                        ok: c.is_ok(),
                        reason: c.reason,
                        message: c.message,
                        transition_time: c.last_transition_time,
                    })
                    .collect();
                (s.observed_generation, conditions)
            })
            .unwrap_or_default();
        Self {
            name: addon.metadata.name.unwrap_or_default(),
            enabled,
            phase,
            observed_generation,
            conditions,
        }
    }
}

impl AddonRecord {
    /// `name: Phase`, plus the most recent failing condition if there is one.
    #[must_use]
    pub fn status_line(&self) -> String {
        let phase = self.phase.map_or("Unknown", AddonPhase::as_str);
        let failing = self.conditions.iter().rev().find(|c| !c.ok);
        match failing {
            Some(c) => format!(
                "{}: {} ({}: {})",
                self.name,
                phase,
                c.reason.as_deref().unwrap_or("Unknown"),
                c.message.as_deref().unwrap_or("")
            ),
            None => format!("{}: {}", self.name, phase),
        }
    }
}

/// Summary over a set of add-on records. Recomputed every tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregatedAddonStatus {
    pub all_enabled: bool,
    pub all_disabled: bool,
    pub has_failed: bool,
    /// One line per add-on, sorted by name
    pub lines: Vec<String>,
}

impl AggregatedAddonStatus {
    #[must_use]
    pub fn from_records(records: &[AddonRecord]) -> Self {
        let mut sorted: Vec<&AddonRecord> = records.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            all_enabled: records.iter().all(|r| r.phase == Some(AddonPhase::Enabled)),
            all_disabled: records.iter().all(|r| r.phase == Some(AddonPhase::Disabled)),
            has_failed: records.iter().any(|r| r.phase == Some(AddonPhase::Failed)),
            lines: sorted.iter().map(|r| r.status_line()).collect(),
        }
    }

    /// Every member is in the terminal phase for `want_enabled`.
    #[must_use]
    pub fn all_match(&self, want_enabled: bool) -> bool {
        if want_enabled { self.all_enabled } else { self.all_disabled }
    }
}

impl fmt::Display for AggregatedAddonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lines.is_empty() {
            return f.write_str("  (no addons)");
        }
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "  {line}")?;
        }
        Ok(())
    }
}

/// Read every add-on in the cluster.
///
/// # Errors
///
/// Cluster errors mapped through [`LifecycleError::cluster`]. A cluster
/// without the Addon CRD yields an empty list.
pub async fn list_addons(client: &dyn ClusterClientTrait) -> Result<Vec<AddonRecord>, LifecycleError> {
    let objects = match client.list(&kinds::addons(), None, None).await {
        Ok(objects) => objects,
        Err(e) if e.is_not_found() => return Ok(Vec::new()),
        Err(e) => return Err(LifecycleError::cluster("failed to list addons", e)),
    };
    let mut records = Vec::with_capacity(objects.len());
    for object in objects {
        let name = object.metadata.name.clone().unwrap_or_default();
        match serde_json::to_value(object).and_then(serde_json::from_value::<Addon>) {
            Ok(addon) => records.push(AddonRecord::from(addon)),
            Err(e) => warn!(addon = %name, error = %e, "Skipping unparseable addon"),
        }
    }
    Ok(records)
}

/// Polls add-on status until convergence.
#[derive(Debug, Clone)]
pub struct ConvergenceWaiter {
    interval: Duration,
}

impl ConvergenceWaiter {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Wait until every record `fetch` returns is in the terminal phase for
    /// `want_enabled`.
    ///
    /// An empty set converges immediately. A Failed member ends the wait at
    /// once with [`LifecycleError::AddonFailed`]; a fetch error is returned
    /// as is.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::ConvergenceTimeout`] carrying the last aggregate.
    pub async fn wait_for<F, Fut>(
        &self,
        mut fetch: F,
        want_enabled: bool,
        timeout: Duration,
    ) -> Result<AggregatedAddonStatus, LifecycleError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Vec<AddonRecord>, LifecycleError>>,
    {
        let target = AddonPhase::terminal_for(want_enabled);
        info!(target = %target, ?timeout, "Waiting for addons");

        let result: Result<AggregatedAddonStatus, PollError<AggregatedAddonStatus, LifecycleError>> =
            poll_until("addon convergence", timeout, self.interval, || {
                let fetched = fetch();
                async move {
                    let records = fetched.await?;
                    let status = AggregatedAddonStatus::from_records(&records);
                    if records.is_empty() || status.all_match(want_enabled) {
                        return Ok(Tick::Ready(status));
                    }
                    if status.has_failed {
                        return Err(LifecycleError::AddonFailed { status });
                    }
                    for line in &status.lines {
                        info!("  {line}");
                    }
                    Ok(Tick::Pending(status))
                }
            })
            .await;

        match result {
            Ok(status) => {
                info!(target = %target, "Addons converged");
                Ok(status)
            }
            Err(PollError::Failed(e)) => Err(e),
            Err(PollError::TimedOut { last, .. }) => Err(LifecycleError::ConvergenceTimeout {
                timeout,
                status: last.unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn record(name: &str, phase: AddonPhase) -> AddonRecord {
        AddonRecord {
            name: name.to_string(),
            enabled: true,
            phase: Some(phase),
            observed_generation: Some(1),
            conditions: Vec::new(),
        }
    }

    #[test]
    fn test_status_lines_sorted_with_failure_reason() {
        let mut failed = record("mysql", AddonPhase::Failed);
        failed.conditions.push(ConditionSummary {
            reason: Some("InstallFailed".to_string()),
            message: Some("image pull backoff".to_string()),
            transition_time: None,
            ok: false,
        });
        let status = AggregatedAddonStatus::from_records(&[record("redis", AddonPhase::Enabled), failed]);
        assert!(status.has_failed);
        assert!(!status.all_enabled);
        assert_eq!(
            status.lines,
            vec!["mysql: Failed (InstallFailed: image pull backoff)", "redis: Enabled"]
        );
    }

    #[tokio::test]
    async fn test_list_addons_without_crd() {
        let client = cluster_client::mock::MockClusterClient::new();
        client.set_unserved(&kinds::addons());
        assert!(list_addons(&client).await.unwrap().is_empty());

        client.set_unreachable(true);
        assert!(matches!(
            list_addons(&client).await,
            Err(LifecycleError::ClusterUnreachable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_set_converges_immediately() {
        let waiter = ConvergenceWaiter::new(Duration::from_secs(5));
        for want_enabled in [true, false] {
            let status = waiter
                .wait_for(|| async { Ok(Vec::new()) }, want_enabled, Duration::from_secs(1))
                .await
                .unwrap();
            assert!(status.lines.is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_converges_when_all_match() {
        let waiter = ConvergenceWaiter::new(Duration::from_secs(5));
        let ticks = Arc::new(Mutex::new(0));
        let status = waiter
            .wait_for(
                || {
                    let ticks = Arc::clone(&ticks);
                    async move {
                        let mut n = ticks.lock().unwrap();
                        *n += 1;
                        let phase = if *n < 3 { AddonPhase::Disabling } else { AddonPhase::Disabled };
                        Ok(vec![record("mysql", phase), record("redis", AddonPhase::Disabled)])
                    }
                },
                false,
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        assert!(status.all_disabled);
        assert_eq!(*ticks.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_with_last_status() {
        let waiter = ConvergenceWaiter::new(Duration::from_secs(5));
        let err = waiter
            .wait_for(
                || async { Ok(vec![record("mysql", AddonPhase::Enabling)]) },
                true,
                Duration::from_secs(30),
            )
            .await
            .unwrap_err();
        match err {
            LifecycleError::ConvergenceTimeout { timeout, status } => {
                assert_eq!(timeout, Duration::from_secs(30));
                assert_eq!(status.lines, vec!["mysql: Enabling"]);
            }
            other => panic!("expected timeout, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_member_short_circuits() {
        let waiter = ConvergenceWaiter::new(Duration::from_secs(5));
        let start = tokio::time::Instant::now();
        let err = waiter
            .wait_for(
                || async { Ok(vec![record("mysql", AddonPhase::Enabling), record("pg", AddonPhase::Failed)]) },
                true,
                Duration::from_secs(600),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::AddonFailed { .. }));
        assert!(start.elapsed() < Duration::from_secs(600));
    }
}
