//! Podman as the alternate engine.
//!
//! Podman is used when no Docker socket is present. On Linux a private
//! `podman system service` is launched; elsewhere Podman's default machine
//! connection is used.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::service::{LaunchedService, ServiceLauncher, spawn_service};
use crate::error::{EngineError, PodlinkError};

/// Boxed future returned by [`AlternateEngine::connections`].
pub type ConnectionsFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<RemoteConnection>, PodlinkError>> + Send + 'a>>;

/// Boxed future returned by [`AlternateEngine::default_connection`].
pub type DefaultConnectionFuture<'a> =
    Pin<Box<dyn Future<Output = Option<RemoteConnection>> + Send + 'a>>;

/// A connection known to the alternate engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteConnection {
    /// Connection name.
    #[serde(rename = "Name", alias = "name", default)]
    pub name: String,
    /// Engine locator, usually `ssh://…`.
    #[serde(rename = "URI", alias = "uri", alias = "Uri", default)]
    pub uri: String,
    /// SSH identity file for the connection, empty when unset.
    #[serde(rename = "Identity", alias = "identity", default)]
    pub identity: String,
    /// Whether this is the default connection.
    #[serde(rename = "Default", alias = "default", alias = "IsDefault", default)]
    pub is_default: bool,
}

/// Parse the JSON emitted by `podman system connection list --format=json`.
///
/// # Errors
///
/// Returns the `serde_json` error when the output is not a list of records.
pub fn parse_connections(json: &[u8]) -> Result<Vec<RemoteConnection>, serde_json::Error> {
    serde_json::from_slice(json)
}

/// A drop-in engine used when the primary engine is absent.
pub trait AlternateEngine: Send + Sync {
    /// The program name, for diagnostics.
    fn program(&self) -> &str;

    /// Whether the engine is installed.
    fn is_present(&self) -> bool;

    /// List the engine's known remote connections.
    fn connections(&self) -> ConnectionsFuture<'_>;

    /// The connection flagged as default, if any.
    ///
    /// Failures to list connections are logged and treated as "none".
    fn default_connection(&self) -> DefaultConnectionFuture<'_> {
        Box::pin(async move {
            match self.connections().await {
                Ok(connections) => connections.into_iter().find(|c| c.is_default),
                Err(error) => {
                    debug!(program = self.program(), %error, "could not list connections");
                    None
                }
            }
        })
    }
}

/// The `podman` command-line tool.
#[derive(Debug, Clone)]
pub struct PodmanCli {
    program: String,
}

impl Default for PodmanCli {
    fn default() -> Self {
        Self::new("podman")
    }
}

impl PodmanCli {
    /// Use `program` as the Podman executable.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The `podman system service` command serving the API on `host`
    /// without an idle timeout.
    #[must_use]
    pub fn service_command(&self, host: &str) -> Command {
        let mut command = Command::new(&self.program);
        command.args(["system", "service", host, "--time=0"]);
        command
    }

    fn list_failed(&self, message: impl Into<String>) -> PodlinkError {
        EngineError::ConnectionListFailed {
            program: self.program.clone(),
            message: message.into(),
        }
        .into()
    }
}

impl AlternateEngine for PodmanCli {
    fn program(&self) -> &str {
        &self.program
    }

    fn is_present(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    fn connections(&self) -> ConnectionsFuture<'_> {
        Box::pin(async move {
            let output = Command::new(&self.program)
                .args(["system", "connection", "list", "--format=json"])
                .output()
                .await
                .map_err(|error| self.list_failed(error.to_string()))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(self.list_failed(format!("{}: {}", output.status, stderr.trim())));
            }

            parse_connections(&output.stdout).map_err(|error| self.list_failed(error.to_string()))
        })
    }
}

impl ServiceLauncher for PodmanCli {
    fn launch(&self, host: &str) -> Result<LaunchedService, PodlinkError> {
        spawn_service(self.service_command(host)).map_err(|error| {
            EngineError::ServiceLaunchFailed {
                program: self.program.clone(),
                message: error.to_string(),
            }
            .into()
        })
    }
}
