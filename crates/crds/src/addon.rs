//! Addon CRD
//!
//! An independently enabled optional component of the control plane. The
//! add-on controller owns `status`; the lifecycle tool only flips
//! `spec.install.enabled` and reads the status back.

use std::fmt;
use std::str::FromStr;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "extensions.kubeblocks.io",
    version = "v1alpha1",
    kind = "Addon",
    status = "AddonStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct AddonSpec {
    /// Addon type (Helm is the only type shipped today)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub addon_type: Option<String>,

    /// Desired install state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<AddonInstallSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddonInstallSpec {
    /// Whether the add-on should be installed
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct AddonStatus {
    /// Current phase. Unknown or empty phases deserialize as `None`.
    #[serde(
        default,
        deserialize_with = "lenient_phase",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<AddonPhase>")]
    pub phase: Option<AddonPhase>,

    /// Generation most recently observed by the add-on controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions in the order the controller reported them
    #[serde(default)]
    pub conditions: Vec<AddonCondition>,
}

/// Add-on lifecycle phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "PascalCase")]
pub enum AddonPhase {
    /// Install in progress
    Enabling,
    /// Installed and healthy
    Enabled,
    /// Uninstall in progress
    Disabling,
    /// Not installed
    Disabled,
    /// Install or uninstall failed; needs operator intervention
    Failed,
}

impl AddonPhase {
    /// The phase a workflow waits for: `Enabled` for install, `Disabled` for uninstall.
    #[must_use]
    pub fn terminal_for(want_enabled: bool) -> Self {
        if want_enabled {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }

    /// String form as written by the controller.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enabling => "Enabling",
            Self::Enabled => "Enabled",
            Self::Disabling => "Disabling",
            Self::Disabled => "Disabled",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for AddonPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a phase string is not one of the known phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPhase(pub String);

impl fmt::Display for UnknownPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown addon phase: {}", self.0)
    }
}

impl std::error::Error for UnknownPhase {}

impl FromStr for AddonPhase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Enabling" => Ok(Self::Enabling),
            "Enabled" => Ok(Self::Enabled),
            "Disabling" => Ok(Self::Disabling),
            "Disabled" => Ok(Self::Disabled),
            "Failed" => Ok(Self::Failed),
            other => Err(UnknownPhase(other.to_string())),
        }
    }
}

fn lenient_phase<'de, D>(deserializer: D) -> Result<Option<AddonPhase>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddonCondition {
    /// Condition type
    #[serde(rename = "type", default)]
    pub condition_type: String,

    /// "True", "False" or "Unknown"
    #[serde(default)]
    pub status: String,

    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// When the condition last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl AddonCondition {
    /// Whether the condition reports success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("true")
    }
}

impl Addon {
    /// Desired enabled bit from `spec.install.enabled`.
    #[must_use]
    pub fn desired_enabled(&self) -> bool {
        self.spec.install.as_ref().is_some_and(|i| i.enabled)
    }

    /// Observed phase, if the controller has reported one.
    #[must_use]
    pub fn phase(&self) -> Option<AddonPhase> {
        self.status.as_ref().and_then(|s| s.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addon_deserializes_status() {
        let addon: Addon = serde_json::from_value(serde_json::json!({
            "apiVersion": "extensions.kubeblocks.io/v1alpha1",
            "kind": "Addon",
            "metadata": { "name": "mysql" },
            "spec": { "type": "Helm", "install": { "enabled": true } },
            "status": {
                "phase": "Enabled",
                "observedGeneration": 3,
                "conditions": [
                    { "type": "Succeed", "status": "True", "reason": "Installed" }
                ]
            }
        }))
        .unwrap();

        assert!(addon.desired_enabled());
        assert_eq!(addon.phase(), Some(AddonPhase::Enabled));
        let status = addon.status.unwrap();
        assert_eq!(status.observed_generation, Some(3));
        assert!(status.conditions[0].is_ok());
    }

    #[test]
    fn test_unknown_phase_is_none() {
        let status: AddonStatus =
            serde_json::from_value(serde_json::json!({ "phase": "" })).unwrap();
        assert_eq!(status.phase, None);

        let status: AddonStatus =
            serde_json::from_value(serde_json::json!({ "phase": "Upgrading" })).unwrap();
        assert_eq!(status.phase, None);
    }

    #[test]
    fn test_missing_install_means_disabled() {
        let addon: Addon = serde_json::from_value(serde_json::json!({
            "apiVersion": "extensions.kubeblocks.io/v1alpha1",
            "kind": "Addon",
            "metadata": { "name": "llm" },
            "spec": {}
        }))
        .unwrap();
        assert!(!addon.desired_enabled());
        assert_eq!(addon.phase(), None);
    }

    #[test]
    fn test_terminal_phase() {
        assert_eq!(AddonPhase::terminal_for(true), AddonPhase::Enabled);
        assert_eq!(AddonPhase::terminal_for(false), AddonPhase::Disabled);
        assert_eq!("Failed".parse::<AddonPhase>(), Ok(AddonPhase::Failed));
    }
}
