//! Kubernetes Cluster Client
//!
//! A thin, kind-agnostic client over the Kubernetes API. Every call is keyed
//! by a [`ResourceKind`] (group/version/resource) and works on
//! [`DynamicObject`](kube::api::DynamicObject)s, so callers can list, label,
//! patch and delete arbitrary resource kinds without compile-time types.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{kinds, ClusterClientTrait, KubeClusterClient, LabelSelector};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClusterClient::try_default().await?;
//!
//! let selector = LabelSelector::new().eq("app.kubernetes.io/name", "kubeblocks");
//! let deployments = client
//!     .list(&kinds::deployments(), None, Some(&selector))
//!     .await?;
//! println!("found {} deployments", deployments.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Dynamic objects**: list/get/create/replace/merge-patch/delete on any kind
//! - **Typed selectors**: [`LabelSelector`] renders and evaluates label queries
//! - **Error classification**: not-found, already-exists and fatal transport
//!   failures are distinguishable on [`ClusterError`]
//! - **Mocking**: `MockClusterClient` behind the `test-util` feature

pub mod client;
pub mod error;
pub mod models;
pub mod selector;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeClusterClient;
pub use error::ClusterError;
pub use models::*;
pub use selector::{LabelSelector, Requirement};
pub use cluster_trait::ClusterClientTrait;
#[cfg(feature = "test-util")]
pub use mock::MockClusterClient;
