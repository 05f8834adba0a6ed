//! Engine health checks.
//!
//! Async and blocking variants of a bounded ping against any
//! [`EngineClient`], whichever resolution path produced it.

use std::time::Duration;

use super::client::EngineClient;
use crate::error::{EngineError, PodlinkError};

/// Seconds allowed for a health check ping before it is abandoned.
pub const HEALTH_CHECK_TIMEOUT_SECS: u64 = 10;

/// Ping `client`, failing if no answer arrives within `timeout`.
///
/// # Errors
///
/// Returns `EngineError::HealthCheckTimeout` when the deadline passes and
/// `EngineError::HealthCheckFailed` when the engine answers with an error.
pub async fn ping_with_timeout(
    client: &dyn EngineClient,
    timeout: Duration,
) -> Result<(), PodlinkError> {
    tokio::time::timeout(timeout, client.ping())
        .await
        .map_err(|_| {
            PodlinkError::from(EngineError::HealthCheckTimeout {
                seconds: timeout.as_secs(),
            })
        })?
        .map_err(|e| {
            PodlinkError::from(EngineError::HealthCheckFailed {
                message: e.to_string(),
            })
        })
}

/// Verify the engine behind `client` is responsive.
///
/// # Errors
///
/// See [`ping_with_timeout`].
pub async fn health_check_async(client: &dyn EngineClient) -> Result<(), PodlinkError> {
    ping_with_timeout(client, Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS)).await
}

/// Blocking form of [`health_check_async`] on a dedicated runtime.
///
/// Use the async form when already inside a runtime.
///
/// # Errors
///
/// Returns `EngineError::RuntimeCreationFailed` if the runtime cannot be
/// created, otherwise as [`ping_with_timeout`].
pub fn health_check(client: &dyn EngineClient) -> Result<(), PodlinkError> {
    let rt = create_runtime()?;
    rt.block_on(health_check_async(client))
}

/// Create a tokio runtime for synchronous entry points.
///
/// # Errors
///
/// Returns `EngineError::RuntimeCreationFailed` when the runtime cannot be
/// built.
pub fn create_runtime() -> Result<tokio::runtime::Runtime, PodlinkError> {
    tokio::runtime::Runtime::new().map_err(|e| {
        PodlinkError::from(EngineError::RuntimeCreationFailed {
            message: e.to_string(),
        })
    })
}
