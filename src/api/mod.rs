//! Library API behind the podlink commands.
//!
//! Each function resolves an engine (or queries the alternate engine), does
//! one thing with it and returns a report. Nothing here prints or exits the
//! process; the CLI adapter owns presentation.
//!
//! A resolved client is always closed before returning, so any service or
//! tunnel started during resolution is torn down even when the operation
//! itself fails.

use tracing::debug;

use crate::engine::{
    AlternateEngine, CloseGuardingClient, EndpointResolver, EngineClient, RemoteConnection,
    health_check_async,
};
use crate::error::{EngineError, Result as PodlinkResult};

/// Result of a successful ping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingReport {
    /// Locator for the engine from inside the remote environment.
    ///
    /// Empty for TCP endpoints.
    pub remote_host: String,
}

/// Version information reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionReport {
    /// Engine version string.
    pub version: Option<String>,
    /// Engine API version.
    pub api_version: Option<String>,
    /// Locator for the engine from inside the remote environment.
    pub remote_host: String,
}

/// Resolve an engine and check that it answers a ping.
///
/// # Errors
///
/// Returns resolution errors (including `EngineError::NoEngine`),
/// `EngineError::HealthCheckFailed` or `HealthCheckTimeout` when the ping
/// fails, or the close error when teardown fails after a successful ping.
pub async fn ping(resolver: &EndpointResolver, default_host: &str) -> PodlinkResult<PingReport> {
    let resolved = resolver.resolve(default_host).await?;
    let outcome = health_check_async(&resolved.client).await;
    finish(&resolved.client, outcome).await?;
    Ok(PingReport {
        remote_host: resolved.remote_host,
    })
}

/// Resolve an engine and query its version.
///
/// # Errors
///
/// Returns resolution errors, `EngineError::ConnectionFailed` when the
/// version query fails, or the close error when teardown fails.
pub async fn version(
    resolver: &EndpointResolver,
    default_host: &str,
) -> PodlinkResult<VersionReport> {
    let resolved = resolver.resolve(default_host).await?;
    let outcome: PodlinkResult<_> = resolved.client.version().await.map_err(|e| {
        EngineError::ConnectionFailed {
            message: e.to_string(),
        }
        .into()
    });
    let version = finish(&resolved.client, outcome).await?;
    Ok(VersionReport {
        version: version.version,
        api_version: version.api_version,
        remote_host: resolved.remote_host,
    })
}

/// List the alternate engine's known connections.
///
/// # Errors
///
/// Returns `EngineError::ConnectionListFailed` when the listing command
/// fails or prints something other than the expected JSON.
pub async fn connections(engine: &dyn AlternateEngine) -> PodlinkResult<Vec<RemoteConnection>> {
    engine.connections().await
}

/// Close `client`, then hand back `outcome`.
///
/// An operation error wins over a close error, which is only logged.
async fn finish<T>(client: &CloseGuardingClient, outcome: PodlinkResult<T>) -> PodlinkResult<T> {
    let closed = client.close().await;
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(error)) => Err(error),
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(close_error)) => {
            debug!(%close_error, "closing engine client failed after an earlier error");
            Err(error)
        }
    }
}
