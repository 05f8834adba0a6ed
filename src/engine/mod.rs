//! Container engine endpoint resolution.
//!
//! The [`EndpointResolver`] picks an endpoint in this order:
//!
//! 1. `DOCKER_HOST`, when set;
//! 2. the default local socket, when it exists;
//! 3. Podman: a supervised `podman system service` on Linux, or Podman's
//!    default machine connection elsewhere.
//!
//! Transports are built per scheme (local socket, TCP, or an SSH tunnel), and
//! every path hands back the same [`EngineClient`] capability behind a
//! [`CloseGuardingClient`], so callers close one handle whatever was started
//! on their behalf.

pub mod alternate;
pub mod client;
pub mod descriptor;
mod health;
pub mod resolver;
pub mod service;
pub mod transport;

pub use alternate::{AlternateEngine, PodmanCli, RemoteConnection};
pub use client::{
    BollardClient, BollardConnector, CleanupAction, ClientConnector, CloseGuardingClient,
    EngineClient, ExtraCleanupClient, SharedClient, cleanup_action,
};
pub use descriptor::{ConnectionDescriptor, HostUri, Scheme};
pub use health::{
    HEALTH_CHECK_TIMEOUT_SECS, create_runtime, health_check, health_check_async,
    ping_with_timeout,
};
pub use resolver::{AlternateStrategy, EndpointResolver, ResolvedEngine, ResolverConfig};
pub use service::{
    LaunchedService, ProcessExit, ServiceLauncher, ServiceSignaller, ServiceSupervisor,
    SupervisedEngine, SupervisorTimings,
};
pub use transport::{
    ClientDefaults, NonInteractivePrompts, SshCredentials, SshPrompts, SshTunnel, SshTunneler,
    TransportBuilder,
};

/// Default engine host for the current platform.
#[cfg(windows)]
pub const DEFAULT_HOST: &str = "npipe:////./pipe/docker_engine";

/// Default engine host for the current platform.
#[cfg(not(windows))]
pub const DEFAULT_HOST: &str = "unix:///var/run/docker.sock";

#[cfg(test)]
pub(crate) mod test_support;
