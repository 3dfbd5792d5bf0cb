//! Helm adapter errors

use thiserror::Error;

/// Errors that can occur when driving helm
#[derive(Debug, Error)]
pub enum HelmError {
    /// Release does not exist
    #[error("Release not found: {0}")]
    NotFound(String),

    /// helm exited non-zero
    #[error("helm {command} failed ({status}): {stderr}")]
    CommandFailed {
        /// Subcommand that failed (e.g. "upgrade")
        command: String,
        /// Exit status as reported by the OS
        status: String,
        /// Captured stderr
        stderr: String,
    },

    /// helm could not be started, or the values file could not be written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// helm output was not the JSON we asked for
    #[error("Failed to parse helm output: {0}")]
    Parse(#[from] serde_json::Error),
}

impl HelmError {
    /// Whether the release does not exist
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Map a failed helm invocation, recognising helm's not-found wording
    pub(crate) fn from_output(command: &str, status: &std::process::ExitStatus, stderr: &[u8]) -> Self {
        let stderr = String::from_utf8_lossy(stderr).trim().to_string();
        if stderr.contains("release: not found") || stderr.contains("has no deployed releases") {
            return Self::NotFound(stderr);
        }
        Self::CommandFailed {
            command: command.to_string(),
            status: status.to_string(),
            stderr,
        }
    }
}
