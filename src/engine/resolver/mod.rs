//! Endpoint resolution.
//!
//! [`EndpointResolver::resolve`] decides which engine endpoint to talk to:
//!
//! 1. an explicit `DOCKER_HOST` override, taken as authoritative;
//! 2. the default local socket, when it exists;
//! 3. when it does not and Podman is installed, a private Podman service on
//!    Linux or Podman's default machine connection elsewhere.
//!
//! Whatever path is taken, the returned client is wrapped in a
//! [`CloseGuardingClient`] so callers see one `close` contract.

mod probe;

use std::sync::Arc;

use camino::Utf8PathBuf;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use self::probe::{SocketProbe, probe_socket};
use super::alternate::{AlternateEngine, PodmanCli};
use super::client::CloseGuardingClient;
use super::descriptor::ConnectionDescriptor;
use super::service::{ServiceSupervisor, SupervisorTimings};
use super::transport::{ClientDefaults, TransportBuilder};
use crate::config::AppConfig;
use crate::error::{EngineError, PodlinkError};

/// Environment variable holding the explicit engine host override.
pub const DOCKER_HOST_ENV: &str = "DOCKER_HOST";

/// Environment variable holding the SSH identity file override.
pub const SSH_IDENTITY_ENV: &str = "DOCKER_HOST_SSH_IDENTITY";

/// Environment variable holding the SSH key passphrase override.
pub const SSH_PASSPHRASE_ENV: &str = "DOCKER_HOST_SSH_IDENTITY_PASSPHRASE";

/// Environment variable requesting TLS for TCP endpoints.
pub const TLS_VERIFY_ENV: &str = "DOCKER_TLS_VERIFY";

/// Environment variable naming the TLS certificate directory.
pub const CERT_PATH_ENV: &str = "DOCKER_CERT_PATH";

/// Environment variable pinning the engine API version.
pub const API_VERSION_ENV: &str = "DOCKER_API_VERSION";

/// Environment overrides consulted during resolution.
///
/// Assembled once at the entry point so resolution never reads the process
/// environment itself.
#[derive(Debug, Default)]
pub struct ResolverConfig {
    /// Explicit engine host; skips local probing when set.
    pub docker_host: Option<String>,
    /// SSH identity file that beats any discovered identity.
    pub ssh_identity: Option<Utf8PathBuf>,
    /// SSH key passphrase that beats any discovered passphrase.
    pub ssh_passphrase: Option<SecretString>,
    /// TLS certificate directory for TCP endpoints; TLS is off when unset.
    pub tls_cert_dir: Option<Utf8PathBuf>,
    /// Engine API version pinned instead of negotiated, such as `1.41`.
    pub api_version: Option<String>,
}

impl ResolverConfig {
    /// Read the overrides from `env`, ignoring empty values.
    ///
    /// TLS is enabled when `DOCKER_TLS_VERIFY` or `DOCKER_CERT_PATH` is set.
    /// Certificates come from `DOCKER_CERT_PATH`, else `$HOME/.docker`.
    #[must_use]
    pub fn from_env<E: mockable::Env>(env: &E) -> Self {
        let read = |name: &str| env.string(name).filter(|value| !value.is_empty());
        let cert_path = read(CERT_PATH_ENV).map(Utf8PathBuf::from);
        let tls_cert_dir = if read(TLS_VERIFY_ENV).is_some() || cert_path.is_some() {
            cert_path.or_else(|| read("HOME").map(|home| Utf8PathBuf::from(home).join(".docker")))
        } else {
            None
        };
        Self {
            docker_host: read(DOCKER_HOST_ENV),
            ssh_identity: read(SSH_IDENTITY_ENV).map(Utf8PathBuf::from),
            ssh_passphrase: read(SSH_PASSPHRASE_ENV).map(SecretString::from),
            tls_cert_dir,
            api_version: read(API_VERSION_ENV),
        }
    }

    /// Client settings for local and TCP endpoints.
    ///
    /// An unparseable API version is logged and ignored.
    #[must_use]
    pub fn client_defaults(&self) -> ClientDefaults {
        let api_version = self.api_version.as_deref().and_then(|raw| {
            let parsed = ClientDefaults::parse_api_version(raw);
            if parsed.is_none() {
                warn!(api_version = raw, "ignoring malformed engine API version");
            }
            parsed
        });
        ClientDefaults {
            tls_cert_dir: self.tls_cert_dir.clone(),
            api_version,
        }
    }

    fn passphrase(&self) -> Option<SecretString> {
        self.ssh_passphrase
            .as_ref()
            .map(|secret| SecretString::from(secret.expose_secret().to_owned()))
    }
}

/// How the alternate engine is used when no local socket exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlternateStrategy {
    /// Launch a private service on this host.
    SpawnService,
    /// Use the alternate engine's default remote connection.
    RemoteMachine,
}

impl AlternateStrategy {
    /// `SpawnService` on Linux, `RemoteMachine` everywhere else.
    #[must_use]
    pub const fn for_current_platform() -> Self {
        if cfg!(target_os = "linux") {
            Self::SpawnService
        } else {
            Self::RemoteMachine
        }
    }
}

/// A resolved engine client and its remote host hint.
pub struct ResolvedEngine {
    /// Client for the engine; close it when done.
    pub client: CloseGuardingClient,
    /// Locator for the same engine from inside the remote environment.
    ///
    /// Empty for TCP endpoints.
    pub remote_host: String,
}

struct Alternate {
    engine: Arc<dyn AlternateEngine>,
    supervisor: ServiceSupervisor,
}

/// Resolves which engine endpoint to use.
pub struct EndpointResolver {
    config: ResolverConfig,
    transport: TransportBuilder,
    alternate: Option<Alternate>,
    strategy: AlternateStrategy,
}

/// Outcome of looking for an engine when `DOCKER_HOST` is unset.
enum Discovery {
    Descriptor(ConnectionDescriptor),
    Supervised(ResolvedEngine),
    Nothing,
}

impl EndpointResolver {
    /// Resolver with default transports and no alternate engine.
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            transport: TransportBuilder::new(),
            alternate: None,
            strategy: AlternateStrategy::for_current_platform(),
        }
    }

    /// Resolver wired from application configuration.
    ///
    /// Podman is used as the alternate engine unless disabled. No SSH
    /// tunneler is installed, so `ssh://` endpoints fail with
    /// `EngineError::TunnelFailed` until one is added through
    /// [`with_transport`](Self::with_transport).
    #[must_use]
    pub fn from_app_config(app: &AppConfig, config: ResolverConfig) -> Self {
        let resolver = Self::new(config);
        if !app.alternate.enabled {
            return resolver;
        }
        let podman = Arc::new(PodmanCli::new(app.alternate.program.clone()));
        let supervisor = ServiceSupervisor::new(podman.clone())
            .with_timings(SupervisorTimings::from(&app.service));
        resolver.with_alternate(podman, supervisor)
    }

    /// Replace the transport builder.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportBuilder) -> Self {
        self.transport = transport;
        self
    }

    /// Fall back to `engine` when no local socket exists.
    #[must_use]
    pub fn with_alternate(
        mut self,
        engine: Arc<dyn AlternateEngine>,
        supervisor: ServiceSupervisor,
    ) -> Self {
        self.alternate = Some(Alternate { engine, supervisor });
        self
    }

    /// Override the platform's alternate engine strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: AlternateStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Resolve an engine client, probing `default_host` first.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NoEngine` when no endpoint could be found,
    /// `FilesystemError` when probing the default socket fails for any reason
    /// other than absence, service startup errors from the supervised path, and
    /// transport construction errors.
    pub async fn resolve(&self, default_host: &str) -> Result<ResolvedEngine, PodlinkError> {
        let descriptor = if let Some(host) = &self.config.docker_host {
            debug!(host = %host, "using DOCKER_HOST override");
            ConnectionDescriptor::new(host.clone())
        } else {
            match self.discover(default_host).await? {
                Discovery::Descriptor(descriptor) => descriptor,
                Discovery::Supervised(engine) => return Ok(engine),
                Discovery::Nothing => return Err(EngineError::NoEngine.into()),
            }
        };

        let descriptor = descriptor
            .override_credentials(self.config.ssh_identity.clone(), self.config.passphrase())
            .with_client_defaults(self.config.client_defaults());
        debug!(
            host = descriptor.host(),
            scheme = %descriptor.scheme(),
            "building engine transport"
        );
        let built = self.transport.build(descriptor).await?;

        Ok(ResolvedEngine {
            client: CloseGuardingClient::new(built.client),
            remote_host: built.remote_host,
        })
    }

    async fn discover(&self, default_host: &str) -> Result<Discovery, PodlinkError> {
        if probe_socket(default_host).await? == SocketProbe::Present {
            debug!(default_host, "default engine socket found");
            return Ok(Discovery::Descriptor(ConnectionDescriptor::new(default_host)));
        }

        let Some(alternate) = &self.alternate else {
            debug!(default_host, "default engine socket absent");
            return Ok(Discovery::Nothing);
        };
        if !alternate.engine.is_present() {
            debug!(
                default_host,
                program = alternate.engine.program(),
                "default engine socket absent and alternate engine not installed"
            );
            return Ok(Discovery::Nothing);
        }

        match self.strategy {
            AlternateStrategy::SpawnService => {
                info!(program = alternate.engine.program(), "starting a private engine service");
                let engine = alternate.supervisor.spawn().await?;
                Ok(Discovery::Supervised(ResolvedEngine {
                    client: CloseGuardingClient::new(engine.client),
                    remote_host: engine.host,
                }))
            }
            AlternateStrategy::RemoteMachine => {
                let connection = alternate
                    .engine
                    .default_connection()
                    .await
                    .filter(|connection| !connection.uri.is_empty());
                Ok(connection.map_or(Discovery::Nothing, |connection| {
                    debug!(name = %connection.name, "using default machine connection");
                    let identity = Some(connection.identity)
                        .filter(|identity| !identity.is_empty())
                        .map(Utf8PathBuf::from);
                    Discovery::Descriptor(
                        ConnectionDescriptor::new(connection.uri).with_ssh_identity(identity),
                    )
                }))
            }
        }
    }
}
