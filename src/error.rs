//! Semantic error types for the podlink library.
//!
//! This module defines the error hierarchy for podlink, following the principle of
//! using semantic error enums (via `thiserror`) for conditions the caller might
//! inspect or special-case, while reserving opaque errors (`eyre::Report`) for the
//! application boundary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors that can occur while resolving and talking to a container engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No usable container engine endpoint was found after every fallback.
    ///
    /// Callers match on this variant to report "no engine installed" rather
    /// than a transport failure.
    #[error("docker/podman API not available")]
    NoEngine,

    /// A host locator could not be parsed.
    #[error("invalid engine host '{host}': {reason}")]
    InvalidHost {
        /// The rejected host string.
        host: String,
        /// Why the host was rejected.
        reason: String,
    },

    /// Failed to construct a client for the container engine.
    #[error("failed to connect to container engine: {message}")]
    ConnectionFailed {
        /// A description of the connection failure.
        message: String,
    },

    /// The container engine socket was not found.
    #[error("container engine socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: PathBuf,
    },

    /// Permission denied when connecting to the container engine socket.
    #[error("permission denied accessing container socket: {path}")]
    PermissionDenied {
        /// The path to the socket.
        path: PathBuf,
    },

    /// The SSH tunnel to a remote engine could not be established.
    #[error("failed to open SSH tunnel to '{target}': {message}")]
    TunnelFailed {
        /// The SSH target the tunnel was opened for.
        target: String,
        /// A description of the tunnel failure.
        message: String,
    },

    /// The alternate engine's connection registry could not be read.
    #[error("failed to list {program} connections: {message}")]
    ConnectionListFailed {
        /// The alternate engine program that was invoked.
        program: String,
        /// A description of the failure.
        message: String,
    },

    /// The engine service subprocess could not be launched.
    #[error("failed to launch '{program}': {message}")]
    ServiceLaunchFailed {
        /// The program that failed to launch.
        program: String,
        /// The underlying operating system error.
        message: String,
    },

    /// The engine service subprocess failed before it became ready.
    #[error("failed to start the engine service (cmd out: {output:?}): {reason}")]
    ServiceFailed {
        /// Combined stdout and stderr captured from the subprocess.
        output: String,
        /// The exit error reported for the subprocess.
        reason: String,
    },

    /// The engine service subprocess exited cleanly before it became ready.
    #[error("the engine service process exited before the service came up (cmd out: {output:?})")]
    ServiceExitedEarly {
        /// Combined stdout and stderr captured from the subprocess.
        output: String,
    },

    /// The engine service did not answer a ping before the startup deadline.
    #[error("the engine service has not come up within {timeout:?}")]
    ServiceStartTimeout {
        /// The startup deadline that elapsed.
        timeout: Duration,
    },

    /// Health check failed - engine did not respond correctly.
    #[error("container engine health check failed: {message}")]
    HealthCheckFailed {
        /// A description of the health check failure.
        message: String,
    },

    /// Health check timed out.
    #[error("container engine health check timed out after {seconds} seconds")]
    HealthCheckTimeout {
        /// The timeout duration in seconds.
        seconds: u64,
    },

    /// Failed to create the async runtime for blocking callers.
    #[error("failed to create async runtime: {message}")]
    RuntimeCreationFailed {
        /// A description of the runtime failure.
        message: String,
    },
}

impl EngineError {
    /// Returns whether the error reports a service that never became ready.
    #[must_use]
    pub const fn is_service_not_ready(&self) -> bool {
        matches!(
            self,
            Self::ServiceFailed { .. }
                | Self::ServiceExitedEarly { .. }
                | Self::ServiceStartTimeout { .. }
        )
    }
}

/// Errors that can occur during filesystem operations.
#[derive(Debug, Error)]
pub enum FilesystemError {
    /// Permission denied when accessing a path.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The path that could not be accessed.
        path: PathBuf,
    },

    /// An I/O error occurred.
    #[error("I/O error at '{path}': {message}")]
    IoError {
        /// The path where the error occurred.
        path: PathBuf,
        /// A description of the I/O error.
        message: String,
    },
}

/// Top-level error type for the podlink library.
///
/// This enum aggregates all domain-specific errors into a single type that can
/// be used throughout the library. At the application boundary (main.rs),
/// these errors are converted to `eyre::Report` for human-readable reporting.
#[derive(Debug, Error)]
pub enum PodlinkError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred while resolving or talking to the engine.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// An error occurred during filesystem operations.
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

impl PodlinkError {
    /// Returns whether this is the "no usable engine endpoint" sentinel.
    #[must_use]
    pub const fn is_no_engine(&self) -> bool {
        matches!(self, Self::Engine(EngineError::NoEngine))
    }
}

/// A specialised `Result` type for podlink operations.
pub type Result<T> = std::result::Result<T, PodlinkError>;
