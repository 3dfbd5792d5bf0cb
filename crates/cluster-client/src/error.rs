//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to the Kubernetes API
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Object (or the whole resource kind) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create collided with an existing object
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic-concurrency conflict (stale resourceVersion)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Credentials rejected or insufficient RBAC
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// API server could not be reached
    #[error("Cluster unreachable: {0}")]
    Unreachable(String),

    /// Any other API status
    #[error("Kubernetes API error ({code}): {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Server-provided message
        message: String,
    },

    /// Object body could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid request (e.g., namespaced kind without a namespace)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ClusterError {
    /// 404 from the server.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// 409 AlreadyExists from the server.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Transport and auth failures. Retrying in-process will not help.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Unauthorized(_))
    }
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) => match ae.code {
                404 => Self::NotFound(ae.message),
                409 if ae.reason == "AlreadyExists" => Self::AlreadyExists(ae.message),
                409 => Self::Conflict(ae.message),
                401 | 403 => Self::Unauthorized(ae.message),
                code => Self::Api {
                    code,
                    message: ae.message,
                },
            },
            kube::Error::SerdeError(e) => Self::Serialization(e),
            kube::Error::Auth(e) => Self::Unauthorized(e.to_string()),
            kube::Error::HyperError(e) => Self::Unreachable(e.to_string()),
            kube::Error::Service(e) => Self::Unreachable(e.to_string()),
            other => Self::Unreachable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ClusterError::NotFound("x".into()).is_not_found());
        assert!(ClusterError::AlreadyExists("x".into()).is_already_exists());
        assert!(ClusterError::Unreachable("dial tcp".into()).is_fatal());
        assert!(ClusterError::Unauthorized("forbidden".into()).is_fatal());
        assert!(!ClusterError::Conflict("stale".into()).is_fatal());
        assert!(
            !ClusterError::Api {
                code: 500,
                message: "boom".into()
            }
            .is_fatal()
        );
    }
}
