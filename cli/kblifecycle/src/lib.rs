//! KubeBlocks Lifecycle
//!
//! Install, upgrade and uninstall workflows for the KubeBlocks control plane
//! and its add-ons, including the bridge from the 0.9 generation to 1.0.
//!
//! The [`orchestrator::Orchestrator`] is a one-shot client-side driver: it
//! gates each transition ([`version_gate`], [`cluster_facts`]), mutates the
//! release through [`helm_client`], cleans up owned objects with the
//! [`reconciler`], and blocks on add-on convergence with the [`waiter`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cluster_client::KubeClusterClient;
//! use helm_client::HelmClient;
//! use kblifecycle::config::OrchestratorConfig;
//! use kblifecycle::crd_source::HttpCrdSource;
//! use kblifecycle::orchestrator::{InstallOptions, Orchestrator};
//! use kblifecycle::prompt::StdinPrompt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OrchestratorConfig::from_env()?;
//! let mut orchestrator = Orchestrator::new(
//!     config.clone(),
//!     Arc::new(KubeClusterClient::try_default().await?),
//!     Arc::new(HelmClient::new(&config.helm_bin)),
//!     Arc::new(HttpCrdSource::new(&config.crd_base_url)?),
//!     Arc::new(StdinPrompt),
//! );
//! orchestrator.install(&InstallOptions::new("kb-system", "1.0.0")).await?;
//! # Ok(())
//! # }
//! ```

pub mod cluster_facts;
pub mod config;
pub mod crd_source;
pub mod describe;
pub mod error;
pub mod kinds;
pub mod migration;
pub mod orchestrator;
pub mod poll;
pub mod prompt;
pub mod reconciler;
pub mod selector;
pub mod values;
pub mod version_gate;
pub mod waiter;
pub mod workloads;

pub use error::LifecycleError;
pub use orchestrator::Orchestrator;
