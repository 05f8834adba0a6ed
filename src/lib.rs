//! Container engine endpoint resolution with a supervised Podman fallback.
//!
//! `podlink` works out which container engine a caller should talk to and
//! hands back a ready client plus the locator for that engine as seen from
//! inside the remote environment. When no Docker-compatible socket is
//! present it falls back to Podman, starting a private `podman system service`
//! on Linux or using Podman's default machine connection elsewhere, and ties
//! the lifetime of whatever it started to the returned client's `close`.
//!
//! `ssh://` endpoints, including Podman machine connections, need an
//! [`engine::SshTunneler`] supplied through
//! [`engine::TransportBuilder::with_tunneler`]. None ships with the crate, so
//! without one those endpoints fail with `EngineError::TunnelFailed`. The
//! `podlink` binary has no tunneler and cannot reach SSH endpoints.
//!
//! # Modules
//!
//! - [`api`]: Library functions behind the CLI commands
//! - [`config`]: Configuration with layered precedence (CLI > env > file > defaults)
//! - [`engine`]: Endpoint resolution, transports, supervision and clients
//! - [`error`]: Semantic error types

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
