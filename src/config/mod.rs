//! Configuration system for podlink.
//!
//! Configuration structures, CLI definitions and the layered loader.
//! Precedence, lowest to highest: defaults, configuration file, `PODLINK_*`
//! environment variables, command-line flags.
//!
//! The configuration file is expected at `~/.config/podlink/config.toml` by
//! default.
//!
//! # Example Configuration
//!
//! ```toml
//! default_host = "unix:///run/user/1000/docker.sock"
//!
//! [alternate]
//! enabled = true
//! program = "podman"
//!
//! [service]
//! poll_interval_ms = 250
//! poll_attempts = 40
//! startup_timeout_secs = 10
//! shutdown_grace_ms = 1000
//! ```

mod cli;
mod loader;
mod types;


pub use cli::{Cli, Commands};
pub use loader::{env_var_names, load_config, load_config_with_env};
pub use types::{AlternateConfig, AppConfig, ServiceConfig};
