//! `helm` binary implementation of [`ReleaseManagerTrait`]

use std::io::Write;

use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::HelmError;
use crate::models::{Release, ReleaseRequest};
use crate::release_trait::ReleaseManagerTrait;

/// Release manager that shells out to helm
#[derive(Debug, Clone)]
pub struct HelmClient {
    binary: String,
}

impl HelmClient {
    /// Use the given helm binary (name on PATH or absolute path)
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    async fn run(&self, command: &str, args: &[String]) -> Result<Vec<u8>, HelmError> {
        debug!(binary = %self.binary, ?args, "Running helm");
        let output = Command::new(&self.binary)
            .arg(command)
            .args(args)
            .output()
            .await?;
        if !output.status.success() {
            return Err(HelmError::from_output(command, &output.status, &output.stderr));
        }
        Ok(output.stdout)
    }

    /// Write the overlay to a file helm can read. JSON is valid YAML.
    fn values_file(values: &serde_json::Value) -> Result<NamedTempFile, HelmError> {
        let mut file = NamedTempFile::new()?;
        serde_json::to_writer(&mut file, values)?;
        file.flush()?;
        Ok(file)
    }

    fn release_args(request: &ReleaseRequest, values_file: Option<&NamedTempFile>) -> Vec<String> {
        let mut args = vec![
            request.name.clone(),
            request.chart.clone(),
            "--namespace".to_string(),
            request.namespace.clone(),
            "--output".to_string(),
            "json".to_string(),
        ];
        if let Some(version) = &request.version {
            args.extend(["--version".to_string(), version.clone()]);
        }
        if let Some(file) = values_file {
            args.extend(["--values".to_string(), file.path().display().to_string()]);
        }
        if request.create_namespace {
            args.push("--create-namespace".to_string());
        }
        if request.wait {
            args.push("--wait".to_string());
            if let Some(timeout) = request.timeout {
                args.extend(["--timeout".to_string(), format!("{}s", timeout.as_secs())]);
            }
        }
        args
    }
}

#[async_trait::async_trait]
impl ReleaseManagerTrait for HelmClient {
    async fn add_repo(&self, name: &str, url: &str) -> Result<(), HelmError> {
        self.run(
            "repo",
            &["add".to_string(), name.to_string(), url.to_string(), "--force-update".to_string()],
        )
        .await?;
        info!(repo = name, url, "Chart repository registered");
        Ok(())
    }

    async fn install(&self, request: &ReleaseRequest) -> Result<Release, HelmError> {
        let values = request.has_values().then(|| Self::values_file(&request.values)).transpose()?;
        let args = Self::release_args(request, values.as_ref());
        let stdout = self.run("install", &args).await?;
        Ok(serde_json::from_slice(&stdout)?)
    }

    async fn upgrade(&self, request: &ReleaseRequest) -> Result<Release, HelmError> {
        let values = request.has_values().then(|| Self::values_file(&request.values)).transpose()?;
        let mut args = Self::release_args(request, values.as_ref());
        if request.reuse_values {
            args.push("--reuse-values".to_string());
        }
        if request.install_if_missing {
            args.push("--install".to_string());
        }
        let stdout = self.run("upgrade", &args).await?;
        Ok(serde_json::from_slice(&stdout)?)
    }

    async fn uninstall(&self, name: &str, namespace: &str) -> Result<Option<Release>, HelmError> {
        // helm uninstall has no JSON output; capture the release first
        let Some(release) = self.get_release(name, namespace).await? else {
            return Ok(None);
        };
        match self
            .run("uninstall", &[name.to_string(), "--namespace".to_string(), namespace.to_string()])
            .await
        {
            Ok(_) => Ok(Some(release)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_release(&self, name: &str, namespace: &str) -> Result<Option<Release>, HelmError> {
        let args = [
            name.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        match self.run("status", &args).await {
            Ok(stdout) => Ok(Some(serde_json::from_slice(&stdout)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_values(&self, name: &str, namespace: &str, all: bool) -> Result<serde_json::Value, HelmError> {
        let mut args = vec![
            "values".to_string(),
            name.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        if all {
            args.push("--all".to_string());
        }
        let stdout = self.run("get", &args).await?;
        let values: serde_json::Value = serde_json::from_slice(&stdout)?;
        // A release without user values prints `null`
        if values.is_null() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_release_args() {
        let request = ReleaseRequest::new("kubeblocks", "kubeblocks/kubeblocks", "kb-system")
            .with_version("1.0.0")
            .with_create_namespace(true)
            .with_wait(true, Some(Duration::from_secs(300)));
        let args = HelmClient::release_args(&request, None);
        assert_eq!(
            args,
            vec![
                "kubeblocks",
                "kubeblocks/kubeblocks",
                "--namespace",
                "kb-system",
                "--output",
                "json",
                "--version",
                "1.0.0",
                "--create-namespace",
                "--wait",
                "--timeout",
                "300s",
            ]
        );
    }

    #[test]
    fn test_values_file_holds_json() {
        let values = serde_json::json!({"keepAddons": true});
        let file = HelmClient::values_file(&values).unwrap();
        let written = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(written, r#"{"keepAddons":true}"#);
    }
}
