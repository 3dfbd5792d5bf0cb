//! Typed label selectors
//!
//! Renders to the Kubernetes label-selector string syntax and evaluates
//! against a label map, so the mock client and the real API agree on what a
//! selector matches.

use std::collections::BTreeMap;
use std::fmt;

/// A single selector clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// `key=value`
    Equals(String, String),
    /// `key in (a,b,c)`
    In(String, Vec<String>),
    /// `key` (label present, any value)
    Exists(String),
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Self::Equals(key, value) => labels.get(key) == Some(value),
            Self::In(key, values) => labels.get(key).is_some_and(|v| values.contains(v)),
            Self::Exists(key) => labels.contains_key(key),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(key, value) => write!(f, "{key}={value}"),
            Self::In(key, values) => write!(f, "{key} in ({})", values.join(",")),
            Self::Exists(key) => f.write_str(key),
        }
    }
}

/// Conjunction of [`Requirement`]s
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Empty selector (matches everything)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `key=value` clause
    #[must_use]
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.push(Requirement::Equals(key.into(), value.into()));
        self
    }

    /// Add a `key in (...)` clause. A single value collapses to `key=value`.
    #[must_use]
    pub fn in_set<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut values: Vec<String> = values.into_iter().map(Into::into).collect();
        values.dedup();
        let key = key.into();
        if values.len() == 1 {
            self.requirements.push(Requirement::Equals(key, values.remove(0)));
        } else {
            self.requirements.push(Requirement::In(key, values));
        }
        self
    }

    /// Add a `key` existence clause
    #[must_use]
    pub fn exists(mut self, key: impl Into<String>) -> Self {
        self.requirements.push(Requirement::Exists(key.into()));
        self
    }

    /// The clauses, in insertion order
    #[must_use]
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Whether there are no clauses
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Evaluate against a label map. Missing labels are treated as empty.
    #[must_use]
    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        let empty = BTreeMap::new();
        let labels = labels.unwrap_or(&empty);
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.requirements.iter().map(ToString::to_string).collect();
        f.write_str(&rendered.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn test_render() {
        let selector = LabelSelector::new()
            .in_set("app.kubernetes.io/instance", ["kubeblocks", "kb-addon-mysql"])
            .eq("app.kubernetes.io/name", "kubeblocks")
            .exists("config.kubeblocks.io/config-template-type");
        assert_eq!(
            selector.to_string(),
            "app.kubernetes.io/instance in (kubeblocks,kb-addon-mysql),app.kubernetes.io/name=kubeblocks,config.kubeblocks.io/config-template-type"
        );
    }

    #[test]
    fn test_single_value_set_collapses() {
        let selector = LabelSelector::new().in_set("app.kubernetes.io/instance", ["kubeblocks"]);
        assert_eq!(selector.to_string(), "app.kubernetes.io/instance=kubeblocks");
    }

    #[test]
    fn test_matches() {
        let selector = LabelSelector::new()
            .in_set("app.kubernetes.io/instance", ["kubeblocks", "kb-addon-redis"])
            .exists("tier");

        assert!(selector.matches(Some(&labels(&[
            ("app.kubernetes.io/instance", "kb-addon-redis"),
            ("tier", "db"),
        ]))));
        assert!(!selector.matches(Some(&labels(&[("app.kubernetes.io/instance", "kb-addon-redis")]))));
        assert!(!selector.matches(Some(&labels(&[
            ("app.kubernetes.io/instance", "other"),
            ("tier", "db"),
        ]))));
        assert!(!selector.matches(None));
        assert!(LabelSelector::new().matches(None));
    }
}
