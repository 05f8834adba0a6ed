//! Command-line argument definitions for podlink.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Command-line interface for podlink.
#[derive(Debug, Parser)]
#[command(name = "podlink")]
#[command(
    author,
    version,
    about = "Resolve a container engine endpoint, starting Podman when needed",
    after_help = "SSH endpoints (ssh:// hosts and Podman machine connections) need an SSH \
                  tunneler supplied by a library caller; this binary reports them as tunnel \
                  failures."
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Default local engine host to probe.
    #[arg(long, global = true)]
    pub default_host: Option<String>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve an engine, ping it, and print its remote host hint.
    Ping,

    /// Resolve an engine and print its version.
    Version,

    /// List the alternate engine's known connections.
    Connections,
}
