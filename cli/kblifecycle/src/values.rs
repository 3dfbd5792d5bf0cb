//! Release values as a closed sum type, with redaction and pruning.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Replacement text for sensitive leaves.
pub const REDACTED: &str = "******";

/// Key fragments that mark a value as sensitive (compared case-insensitively,
/// ignoring `-` and `_`).
const SENSITIVE_FRAGMENTS: &[&str] = &["password", "secret", "token", "accesskey", "credential", "privatekey"];

/// Whether a key names sensitive data.
#[must_use]
pub fn is_sensitive_key(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect();
    SENSITIVE_FRAGMENTS.iter().any(|f| normalized.contains(f))
}

/// A JSON-shaped value tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueNode {
    Object(BTreeMap<String, ValueNode>),
    Array(Vec<ValueNode>),
    /// Null, bool, number or string
    Scalar(Value),
}

impl From<Value> for ValueNode {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            scalar => Self::Scalar(scalar),
        }
    }
}

impl From<ValueNode> for Value {
    fn from(node: ValueNode) -> Self {
        match node {
            ValueNode::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect::<Map<_, _>>()),
            ValueNode::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            ValueNode::Scalar(scalar) => scalar,
        }
    }
}

impl ValueNode {
    /// Copy with every non-empty leaf under a sensitive key replaced by
    /// [`REDACTED`]. `path` is the key path of `self` within the document.
    #[must_use]
    pub fn redact(&self, path: &[String]) -> Self {
        match self {
            Self::Object(map) => Self::Object(
                map.iter()
                    .map(|(key, child)| {
                        let mut child_path = path.to_vec();
                        child_path.push(key.clone());
                        (key.clone(), child.redact(&child_path))
                    })
                    .collect(),
            ),
            Self::Array(items) => Self::Array(items.iter().map(|item| item.redact(path)).collect()),
            Self::Scalar(value) => {
                let sensitive = path.iter().any(|k| is_sensitive_key(k));
                let empty = value.is_null() || value.as_str().is_some_and(str::is_empty);
                if sensitive && !empty {
                    Self::Scalar(Value::String(REDACTED.to_string()))
                } else {
                    self.clone()
                }
            }
        }
    }

    /// Copy keeping only the allowed paths. An entry is a dotted key path
    /// (`image` keeps the subtree, `image.tag` keeps one leaf).
    #[must_use]
    pub fn prune(&self, allow: &[&str]) -> Self {
        let paths: Vec<Vec<&str>> = allow.iter().map(|p| p.split('.').collect()).collect();
        let refs: Vec<&[&str]> = paths.iter().map(Vec::as_slice).collect();
        self.prune_at(&refs)
    }

    fn prune_at(&self, allow: &[&[&str]]) -> Self {
        let Self::Object(map) = self else {
            return self.clone();
        };
        let mut kept = BTreeMap::new();
        for (key, child) in map {
            let matching: Vec<&[&str]> = allow
                .iter()
                .filter(|p| p.first() == Some(&key.as_str()))
                .map(|p| &p[1..])
                .collect();
            if matching.is_empty() {
                continue;
            }
            if matching.iter().any(|rest| rest.is_empty()) {
                kept.insert(key.clone(), child.clone());
            } else {
                let pruned = child.prune_at(&matching);
                if !matches!(&pruned, Self::Object(m) if m.is_empty()) {
                    kept.insert(key.clone(), pruned);
                }
            }
        }
        Self::Object(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sensitive_keys() {
        for key in ["password", "adminPassword", "secret_key", "API-TOKEN", "accessKey", "Credentials", "private-key"] {
            assert!(is_sensitive_key(key), "{key}");
        }
        for key in ["image", "replicas", "keepAddons", "tolerations"] {
            assert!(!is_sensitive_key(key), "{key}");
        }
    }

    #[test]
    fn test_redact() {
        let node = ValueNode::from(json!({
            "image": { "tag": "1.0.0" },
            "backupRepo": { "secrets": { "accessKeyId": "AKIA", "region": "us-east-1" }, "password": "" },
            "users": [{ "name": "root", "password": "hunter2" }]
        }));
        let redacted: Value = node.redact(&[]).into();
        assert_eq!(
            redacted,
            json!({
                "image": { "tag": "1.0.0" },
                "backupRepo": { "secrets": { "accessKeyId": REDACTED, "region": REDACTED }, "password": "" },
                "users": [{ "name": "root", "password": REDACTED }]
            })
        );
    }

    #[test]
    fn test_prune() {
        let node = ValueNode::from(json!({
            "image": { "registry": "docker.io", "tag": "1.0.0" },
            "dataProtection": { "enabled": true, "encryptionKey": "x" },
            "tolerations": [],
            "internal": { "x": 1 }
        }));
        let pruned: Value = node.prune(&["image", "dataProtection.enabled", "missing.key"]).into();
        assert_eq!(
            pruned,
            json!({
                "image": { "registry": "docker.io", "tag": "1.0.0" },
                "dataProtection": { "enabled": true }
            })
        );
    }

    #[test]
    fn test_scalar_root() {
        let node = ValueNode::from(json!(42));
        assert_eq!(node.prune(&["a"]), node);
        assert_eq!(node.redact(&["token".to_string()]), ValueNode::Scalar(json!(REDACTED)));
    }
}
