//! Helm Release Manager
//!
//! Narrow adapter over the `helm` binary: install, upgrade, uninstall and
//! inspect a single named release. Callers treat helm as an opaque versioned
//! state store keyed by release name + namespace.
//!
//! # Example
//!
//! ```no_run
//! use helm_client::{HelmClient, ReleaseManagerTrait, ReleaseRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let helm = HelmClient::new("helm");
//! helm.add_repo("kubeblocks", "https://apecloud.github.io/helm-charts").await?;
//!
//! let request = ReleaseRequest::new("kubeblocks", "kubeblocks/kubeblocks", "kb-system")
//!     .with_version("1.0.0")
//!     .with_create_namespace(true);
//! let release = helm.install(&request).await?;
//! println!("{} revision {}", release.name, release.revision);
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Structured output**: every command runs with `-o json` where helm supports it
//! - **Not-found detection**: missing releases surface as [`HelmError::NotFound`]
//! - **Mocking**: `MockReleaseManager` behind the `test-util` feature

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod release_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::HelmClient;
pub use error::HelmError;
pub use models::*;
pub use release_trait::ReleaseManagerTrait;
#[cfg(feature = "test-util")]
pub use mock::{HelmCall, MockReleaseManager};
