//! `podlink` application entry point.
//!
//! Uses `eyre` for opaque error handling at the application boundary,
//! converting domain errors into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/podlink/config.toml` or `PODLINK_CONFIG_PATH`)
//! 3. Environment variables (`PODLINK_*`)
//! 4. Command-line arguments
//!
//! Logging goes to stderr and is filtered through `PODLINK_LOG`
//! (default `warn`).

use clap::Parser;
use eyre::{Report, Result as EyreResult};
use mockable::DefaultEnv;
use podlink::api;
use podlink::config::{AppConfig, Cli, Commands, load_config};
use podlink::engine::{EndpointResolver, PodmanCli, ResolverConfig, create_runtime};
use podlink::error::Result as PodlinkResult;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
const LOG_ENV: &str = "PODLINK_LOG";

fn main() -> EyreResult<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli).map_err(Report::from)?;

    run(&cli, &config).map_err(Report::from)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute the CLI command, returning domain errors.
fn run(cli: &Cli, config: &AppConfig) -> PodlinkResult<()> {
    let rt = create_runtime()?;
    match cli.command {
        Commands::Ping => rt.block_on(ping(config)),
        Commands::Version => rt.block_on(version(config)),
        Commands::Connections => rt.block_on(list_connections(config)),
    }
}

fn resolver(config: &AppConfig) -> EndpointResolver {
    EndpointResolver::from_app_config(config, ResolverConfig::from_env(&DefaultEnv::new()))
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn ping(config: &AppConfig) -> PodlinkResult<()> {
    let report = api::ping(&resolver(config), config.default_host_or_platform()).await?;
    println!("engine is responding");
    if !report.remote_host.is_empty() {
        println!("remote host: {}", report.remote_host);
    }
    Ok(())
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn version(config: &AppConfig) -> PodlinkResult<()> {
    let report = api::version(&resolver(config), config.default_host_or_platform()).await?;
    println!("version: {}", report.version.as_deref().unwrap_or("unknown"));
    println!(
        "api version: {}",
        report.api_version.as_deref().unwrap_or("unknown")
    );
    Ok(())
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn list_connections(config: &AppConfig) -> PodlinkResult<()> {
    let podman = PodmanCli::new(config.alternate.program.clone());
    for connection in api::connections(&podman).await? {
        let marker = if connection.is_default { "*" } else { " " };
        println!("{marker} {}\t{}", connection.name, connection.uri);
    }
    Ok(())
}
