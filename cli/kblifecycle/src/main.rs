//! kblifecycle
//!
//! Command-line driver for the KubeBlocks lifecycle workflows.
//!
//! ```bash
//! kblifecycle install --version 1.0.0 --wait
//! kblifecycle upgrade --version 1.0.0 --target-namespace kb-system-v1
//! kblifecycle uninstall --namespace kb-system --remove-pvcs
//! kblifecycle describe --all
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cluster_client::KubeClusterClient;
use helm_client::HelmClient;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kblifecycle::config::OrchestratorConfig;
use kblifecycle::crd_source::HttpCrdSource;
use kblifecycle::describe::DescribeOptions;
use kblifecycle::orchestrator::{InstallOptions, Orchestrator, UninstallOptions, UpgradeOptions, DEFAULT_WAIT_TIMEOUT};
use kblifecycle::prompt::StdinPrompt;

#[derive(Debug, Parser)]
#[command(name = "kblifecycle", version, about = "Install, upgrade and uninstall KubeBlocks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Install the control plane
    Install {
        #[arg(short, long, default_value = "kb-system")]
        namespace: String,
        #[arg(long)]
        version: String,
        /// YAML or JSON values file
        #[arg(short = 'f', long)]
        values: Option<PathBuf>,
        /// Wait for enabled add-ons to become ready
        #[arg(long)]
        wait: bool,
        /// Wait timeout in seconds
        #[arg(long, default_value_t = DEFAULT_WAIT_TIMEOUT.as_secs())]
        timeout: u64,
        /// Fail if the namespace does not exist
        #[arg(long)]
        no_create_namespace: bool,
    },
    /// Upgrade, or migrate across the 1.0 boundary
    Upgrade {
        /// Namespace of the running instance
        #[arg(short, long)]
        namespace: Option<String>,
        /// Namespace for the new instance on a major migration
        #[arg(long)]
        target_namespace: Option<String>,
        #[arg(long)]
        version: String,
        #[arg(short = 'f', long)]
        values: Option<PathBuf>,
        #[arg(long)]
        auto_approve: bool,
        #[arg(long)]
        wait: bool,
        #[arg(long, default_value_t = DEFAULT_WAIT_TIMEOUT.as_secs())]
        timeout: u64,
    },
    /// Uninstall the control plane and the objects it owns
    Uninstall {
        #[arg(short, long)]
        namespace: Option<String>,
        #[arg(long)]
        auto_approve: bool,
        /// Also delete persistent volumes
        #[arg(long)]
        remove_pvs: bool,
        /// Also delete persistent volume claims
        #[arg(long)]
        remove_pvcs: bool,
        #[arg(long)]
        remove_namespace: bool,
        /// Seconds to wait for add-ons to disable
        #[arg(long, default_value_t = DEFAULT_WAIT_TIMEOUT.as_secs())]
        timeout: u64,
    },
    /// Show instances, add-on status and release values
    Describe {
        #[arg(short, long)]
        namespace: Option<String>,
        /// Show every value, not just the common keys
        #[arg(long)]
        all: bool,
    },
}

fn read_values(path: Option<&Path>) -> Result<Value> {
    let Some(path) = path else {
        return Ok(Value::Object(serde_json::Map::new()));
    };
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        tracing::debug!("rustls crypto provider already installed");
    }
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kblifecycle=info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let config = OrchestratorConfig::from_env().context("invalid configuration")?;
    info!(release = %config.release_name, chart = %config.chart, "Loaded configuration");

    let client = KubeClusterClient::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    let crds = HttpCrdSource::new(&config.crd_base_url).context("failed to create CRD source")?;
    let mut orchestrator = Orchestrator::new(
        config.clone(),
        Arc::new(client),
        Arc::new(HelmClient::new(&config.helm_bin)),
        Arc::new(crds),
        Arc::new(StdinPrompt),
    );

    match cli.command {
        Command::Install {
            namespace,
            version,
            values,
            wait,
            timeout,
            no_create_namespace,
        } => {
            let options = InstallOptions {
                values: read_values(values.as_deref())?,
                wait,
                timeout: Duration::from_secs(timeout),
                create_namespace: !no_create_namespace,
                ..InstallOptions::new(namespace, version)
            };
            let release = orchestrator.install(&options).await?;
            println!("KubeBlocks installed in namespace {} (revision {})", release.namespace, release.revision);
        }
        Command::Upgrade {
            namespace,
            target_namespace,
            version,
            values,
            auto_approve,
            wait,
            timeout,
        } => {
            let options = UpgradeOptions {
                namespace,
                target_namespace,
                values: read_values(values.as_deref())?,
                auto_approve,
                wait,
                timeout: Duration::from_secs(timeout),
                ..UpgradeOptions::new(version)
            };
            let report = orchestrator.upgrade(&options).await?;
            match report.release {
                Some(release) => println!(
                    "KubeBlocks {} ({}) in namespace {}",
                    report.transition.to, report.transition.kind, release.namespace
                ),
                None => println!("KubeBlocks is already at {}", report.transition.to),
            }
        }
        Command::Uninstall {
            namespace,
            auto_approve,
            remove_pvs,
            remove_pvcs,
            remove_namespace,
            timeout,
        } => {
            let options = UninstallOptions {
                namespace,
                auto_approve,
                remove_pvs,
                remove_pvcs,
                remove_namespace,
                timeout: Duration::from_secs(timeout),
            };
            let report = orchestrator.uninstall(&options).await?;
            println!(
                "KubeBlocks uninstalled from namespace {} ({} objects removed)",
                report.namespace, report.planned_deletions
            );
        }
        Command::Describe { namespace, all } => {
            let description = orchestrator
                .describe(&DescribeOptions {
                    namespace,
                    show_all: all,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&description)?);
        }
    }
    Ok(())
}
