//! Version transition classification.
//!
//! Pure functions over two version strings; no cluster access.

use std::fmt;

use semver::Version;

use crate::error::LifecycleError;

/// First major version of the new-generation control plane.
pub const NEW_GENERATION_MAJOR: u64 = 1;

/// Oldest release that can be migrated to the new generation.
pub const MIN_BRIDGE_VERSION: Version = Version::new(0, 9, 0);

/// How a requested version relates to the running one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Same version; only values may change
    SameVersion,
    /// Patch or single-minor upgrade within a major
    Upgrade,
    /// Old generation to new generation; needs the migration coordinator
    MajorMigration,
    /// Target is older; needs explicit confirmation
    Downgrade,
    /// More than one minor version ahead; rejected
    CrossMajorSkip,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SameVersion => "same version",
            Self::Upgrade => "upgrade",
            Self::MajorMigration => "major migration",
            Self::Downgrade => "downgrade",
            Self::CrossMajorSkip => "cross-version skip",
        })
    }
}

/// A classified `{from, to}` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionTransition {
    pub from: Version,
    pub to: Version,
    pub kind: TransitionKind,
}

/// Parse a version, accepting an optional leading `v`.
///
/// # Errors
///
/// [`LifecycleError::InvalidVersionFormat`] when `raw` is not semver.
pub fn parse_version(raw: &str) -> Result<Version, LifecycleError> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(trimmed).map_err(|e| LifecycleError::InvalidVersionFormat(format!("{raw:?}: {e}")))
}

/// Classify the move from `current` to `requested`.
///
/// Any change of major version into the new generation goes through
/// migration, whatever the minor delta.
///
/// # Errors
///
/// - [`LifecycleError::InvalidVersionFormat`] if either side is not semver
/// - [`LifecycleError::UnsupportedMigrationSource`] for a major change with
///   no automated path (source below [`MIN_BRIDGE_VERSION`], or a target
///   major other than [`NEW_GENERATION_MAJOR`])
pub fn classify(current: &str, requested: &str) -> Result<VersionTransition, LifecycleError> {
    let from = parse_version(current)?;
    let to = parse_version(requested)?;

    let kind = if from.major == to.major {
        if from == to {
            TransitionKind::SameVersion
        } else if to < from {
            TransitionKind::Downgrade
        } else if to.minor.saturating_sub(from.minor) > 1 {
            TransitionKind::CrossMajorSkip
        } else {
            TransitionKind::Upgrade
        }
    } else if to.major < from.major {
        TransitionKind::Downgrade
    } else if from.major < NEW_GENERATION_MAJOR && to.major == NEW_GENERATION_MAJOR && from >= MIN_BRIDGE_VERSION {
        TransitionKind::MajorMigration
    } else {
        return Err(LifecycleError::UnsupportedMigrationSource {
            from: from.to_string(),
            to: to.to_string(),
            floor: MIN_BRIDGE_VERSION.to_string(),
        });
    };

    Ok(VersionTransition { from, to, kind })
}

impl VersionTransition {
    /// Reject transitions that policy forbids outright.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::CrossMajorSkip`] naming the intermediate version to
    /// upgrade to first.
    pub fn ensure_permitted(&self) -> Result<(), LifecycleError> {
        if self.kind == TransitionKind::CrossMajorSkip {
            return Err(LifecycleError::CrossMajorSkip {
                from: self.from.to_string(),
                to: self.to.to_string(),
                next: format!("{}.{}", self.from.major, self.from.minor.saturating_add(1)),
            });
        }
        Ok(())
    }

    /// The release manager will reinstall the chart at a different version.
    #[must_use]
    pub fn changes_version(&self) -> bool {
        self.kind != TransitionKind::SameVersion
    }

    /// Text shown in the confirmation prompt.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.kind {
            TransitionKind::Downgrade => format!(
                "Downgrade KubeBlocks from {} to {}? Downgrades are not tested and may leave the cluster inconsistent.",
                self.from, self.to
            ),
            TransitionKind::MajorMigration => format!(
                "Migrate KubeBlocks from {} to {}? The old control plane will be stopped and a new one installed alongside it.",
                self.from, self.to
            ),
            _ => format!("Upgrade KubeBlocks from {} to {}?", self.from, self.to),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(from: &str, to: &str) -> TransitionKind {
        classify(from, to).unwrap().kind
    }

    #[test]
    fn test_same_and_plain_upgrades() {
        assert_eq!(kind("1.0.1", "1.0.1"), TransitionKind::SameVersion);
        assert_eq!(kind("v1.0.1", "1.0.2"), TransitionKind::Upgrade);
        for minor in 0..5 {
            let from = format!("1.{minor}.3");
            let to = format!("1.{}.0", minor + 1);
            assert_eq!(kind(&from, &to), TransitionKind::Upgrade, "{from} -> {to}");
        }
    }

    #[test]
    fn test_minor_skip_is_rejected() {
        for minor in 0..5 {
            let from = format!("0.{minor}.1");
            let to = format!("0.{}.1", minor + 2);
            let transition = classify(&from, &to).unwrap();
            assert_eq!(transition.kind, TransitionKind::CrossMajorSkip);
            let err = transition.ensure_permitted().unwrap_err();
            assert!(matches!(err, LifecycleError::CrossMajorSkip { ref next, .. } if *next == format!("0.{}", minor + 1)));
        }
    }

    #[test]
    fn test_largest_minor() {
        let max = u64::MAX;
        assert_eq!(kind(&format!("0.{max}.0"), &format!("0.{max}.1")), TransitionKind::Upgrade);
        assert_eq!(kind(&format!("1.{}.0", max - 1), &format!("1.{max}.0")), TransitionKind::Upgrade);

        let transition = classify(&format!("1.{}.0", max - 2), &format!("1.{max}.0")).unwrap();
        assert_eq!(transition.kind, TransitionKind::CrossMajorSkip);
        let err = transition.ensure_permitted().unwrap_err();
        assert!(matches!(err, LifecycleError::CrossMajorSkip { ref next, .. } if *next == format!("1.{}", max - 1)));

        // Saturates rather than overflowing when building the hint
        let at_max = VersionTransition {
            from: Version::new(0, max, 0),
            to: Version::new(0, max, 5),
            kind: TransitionKind::CrossMajorSkip,
        };
        assert!(matches!(at_max.ensure_permitted(), Err(LifecycleError::CrossMajorSkip { ref next, .. }) if *next == format!("0.{max}")));
    }

    #[test]
    fn test_major_migration() {
        assert_eq!(kind("0.9.2", "1.0.0"), TransitionKind::MajorMigration);
        // Minor delta does not matter across the bridge
        assert_eq!(kind("0.9.0", "1.3.0"), TransitionKind::MajorMigration);
        assert!(classify("0.9.2", "1.0.0").unwrap().ensure_permitted().is_ok());
    }

    #[test]
    fn test_unsupported_sources() {
        assert!(matches!(
            classify("0.8.3", "1.0.0"),
            Err(LifecycleError::UnsupportedMigrationSource { .. })
        ));
        assert!(matches!(
            classify("1.0.0", "2.0.0"),
            Err(LifecycleError::UnsupportedMigrationSource { .. })
        ));
    }

    #[test]
    fn test_downgrades() {
        assert_eq!(kind("1.0.2", "1.0.1"), TransitionKind::Downgrade);
        assert_eq!(kind("1.0.0", "0.9.2"), TransitionKind::Downgrade);
        assert!(classify("1.0.2", "1.0.1").unwrap().describe().starts_with("Downgrade"));
    }

    #[test]
    fn test_invalid_format() {
        assert!(matches!(classify("latest", "1.0.0"), Err(LifecycleError::InvalidVersionFormat(_))));
        assert!(matches!(classify("1.0", "1.0.1"), Err(LifecycleError::InvalidVersionFormat(_))));
    }
}
