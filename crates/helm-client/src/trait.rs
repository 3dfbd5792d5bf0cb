//! ReleaseManager trait for mocking

use crate::error::HelmError;
use crate::models::{Release, ReleaseRequest};

/// Operations on a single named release
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ReleaseManagerTrait: Send + Sync {
    /// Register (or refresh) a chart repository
    async fn add_repo(&self, name: &str, url: &str) -> Result<(), HelmError>;

    /// Install a new release
    async fn install(&self, request: &ReleaseRequest) -> Result<Release, HelmError>;

    /// Upgrade an existing release (or install it, with `install_if_missing`)
    async fn upgrade(&self, request: &ReleaseRequest) -> Result<Release, HelmError>;

    /// Uninstall a release. `None` when it was already gone.
    async fn uninstall(&self, name: &str, namespace: &str) -> Result<Option<Release>, HelmError>;

    /// Current release state. `None` when it does not exist.
    async fn get_release(&self, name: &str, namespace: &str) -> Result<Option<Release>, HelmError>;

    /// User-supplied values of a release (computed values too with `all`)
    async fn get_values(&self, name: &str, namespace: &str, all: bool) -> Result<serde_json::Value, HelmError>;
}
