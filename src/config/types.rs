//! Configuration data types for podlink.

use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Alternate engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AlternateConfig {
    /// Fall back to the alternate engine when the default socket is absent.
    pub enabled: bool,

    /// Program name or path of the alternate engine CLI.
    pub program: String,
}

impl Default for AlternateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: String::from("podman"),
        }
    }
}

/// Timings for the supervised service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Milliseconds between readiness pings.
    pub poll_interval_ms: u64,

    /// Readiness pings attempted before polling gives up.
    pub poll_attempts: u32,

    /// Seconds to wait for the service before abandoning it.
    pub startup_timeout_secs: u64,

    /// Milliseconds between SIGTERM and SIGKILL during shutdown.
    pub shutdown_grace_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            poll_attempts: 40,
            startup_timeout_secs: 10,
            shutdown_grace_ms: 1000,
        }
    }
}

impl ServiceConfig {
    /// Reject timings that would make the service impossible to start.
    ///
    /// `shutdown_grace_ms` may be zero, which sends SIGKILL straight after
    /// SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first zero field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = [
            ("service.poll_interval_ms", self.poll_interval_ms == 0),
            ("service.poll_attempts", self.poll_attempts == 0),
            ("service.startup_timeout_secs", self.startup_timeout_secs == 0),
        ]
        .into_iter()
        .find_map(|(field, is_zero)| is_zero.then_some(field));

        match zero {
            Some(field) => Err(ConfigError::InvalidValue {
                field: String::from(field),
                reason: String::from("must be greater than zero"),
            }),
            None => Ok(()),
        }
    }
}

/// Root application configuration.
///
/// Loaded with layered precedence, lowest to highest: defaults,
/// configuration file, `PODLINK_*` environment variables, command-line
/// arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `PODLINK_CONFIG_PATH`
/// 2. `.podlink.toml` in the current working directory
/// 3. `.podlink.toml` in the home directory
/// 4. `~/.config/podlink/config.toml`
///
/// The engine overrides (`DOCKER_HOST` and its SSH companions) are not part
/// of this structure; see [`crate::engine::ResolverConfig`].
#[derive(Debug, Clone, Default, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "PODLINK",
    post_merge_hook,
    discovery(
        app_name = "podlink",
        env_var = "PODLINK_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".podlink.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// Default local engine host to probe.
    ///
    /// Falls back to the platform default socket when unset.
    pub default_host: Option<String>,

    /// Alternate engine configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub alternate: AlternateConfig,

    /// Supervised service timings.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub service: ServiceConfig,
}

impl AppConfig {
    /// The default host to probe, falling back to the platform default.
    #[must_use]
    pub fn default_host_or_platform(&self) -> &str {
        self.default_host
            .as_deref()
            .filter(|host| !host.is_empty())
            .unwrap_or(crate::engine::DEFAULT_HOST)
    }
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        if self.default_host.as_deref().is_some_and(str::is_empty) {
            self.default_host = None;
        }
        Ok(())
    }
}
