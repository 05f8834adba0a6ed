//! Engine client capability and its `Bollard` implementation.
//!
//! Every resolution path hands back an [`EngineClient`]. The base
//! implementation is [`BollardClient`]; the decorators in this module add
//! teardown behaviour without changing the capability surface, so callers
//! hold one handle with one `close` contract whichever path produced it.

mod decorators;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::models::SystemVersion;
use tracing::{debug, trace};

pub use self::decorators::{
    CleanupAction, CleanupFuture, CloseGuardingClient, ExtraCleanupClient, cleanup_action,
};
use super::transport::{ClientDefaults, open_docker};
use crate::error::PodlinkError;

/// Boxed future returned by [`EngineClient::ping`].
pub type PingFuture<'a> = Pin<Box<dyn Future<Output = Result<(), BollardError>> + Send + 'a>>;

/// Boxed future returned by [`EngineClient::version`].
pub type VersionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<SystemVersion, BollardError>> + Send + 'a>>;

/// Boxed future returned by [`EngineClient::close`].
pub type CloseFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PodlinkError>> + Send + 'a>>;

/// Shared engine client handle.
pub type SharedClient = Arc<dyn EngineClient>;

/// Behaviour exposed by every engine client handle.
///
/// Decorators implement this trait by holding another `EngineClient` and
/// forwarding every operation except `close`.
pub trait EngineClient: Send + Sync {
    /// Ping the engine.
    fn ping(&self) -> PingFuture<'_>;

    /// Query the engine's version information.
    fn version(&self) -> VersionFuture<'_>;

    /// Access the underlying `Bollard` client for the rest of the engine API.
    ///
    /// Returns `None` when the client has been closed or has not connected yet.
    fn docker(&self) -> Option<Docker>;

    /// Release the client and any resources attached to it.
    fn close(&self) -> CloseFuture<'_>;
}

/// Engine client backed by a `Bollard` connection.
///
/// The API version is negotiated with the engine on the first ping or
/// version call, and retried on later calls until it succeeds, unless the
/// environment pins one.
pub struct BollardClient {
    host: String,
    defaults: ClientDefaults,
    docker: RwLock<Option<Docker>>,
    negotiated: AtomicBool,
    closed: AtomicBool,
}

impl BollardClient {
    /// Connect to the engine at `host` immediately.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ConnectionFailed`, `SocketNotFound` or
    /// `PermissionDenied` when the client cannot be constructed.
    pub fn connect(host: &str) -> Result<Self, PodlinkError> {
        Self::connect_with(host, ClientDefaults::default())
    }

    /// Connect to the engine at `host` immediately, applying `defaults`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ConnectionFailed`, `SocketNotFound` or
    /// `PermissionDenied` when the client cannot be constructed, including
    /// when the TLS certificates cannot be read.
    pub fn connect_with(host: &str, defaults: ClientDefaults) -> Result<Self, PodlinkError> {
        let docker = super::transport::connect_docker(host, &defaults)?;
        let pinned = defaults.api_version.is_some();
        Ok(Self {
            host: String::from(host),
            defaults,
            docker: RwLock::new(Some(docker)),
            negotiated: AtomicBool::new(pinned),
            closed: AtomicBool::new(false),
        })
    }

    /// Create a client for `host` that connects on first use.
    ///
    /// Used for endpoints whose listener does not exist yet, such as a service
    /// that is still starting.
    #[must_use]
    pub fn deferred(host: &str) -> Self {
        Self::deferred_with(host, ClientDefaults::default())
    }

    /// Create a client for `host` that connects on first use with `defaults`.
    #[must_use]
    pub fn deferred_with(host: &str, defaults: ClientDefaults) -> Self {
        let pinned = defaults.api_version.is_some();
        Self {
            host: String::from(host),
            defaults,
            docker: RwLock::new(None),
            negotiated: AtomicBool::new(pinned),
            closed: AtomicBool::new(false),
        }
    }

    /// The host this client talks to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    fn current(&self) -> Result<Docker, BollardError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BollardError::IOError {
                err: std::io::Error::new(std::io::ErrorKind::NotConnected, "client is closed"),
            });
        }
        if let Some(docker) = self.read_docker() {
            return Ok(docker);
        }

        let docker = open_docker(&self.host, &self.defaults)?;
        let mut slot = self.docker.write().unwrap_or_else(PoisonError::into_inner);
        Ok(slot.get_or_insert(docker).clone())
    }

    fn read_docker(&self) -> Option<Docker> {
        self.docker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn negotiate_if_needed(&self, docker: Docker) {
        if self.negotiated.load(Ordering::Acquire) {
            return;
        }
        match docker.negotiate_version().await {
            Ok(negotiated) => {
                trace!(host = %self.host, "negotiated engine API version");
                let mut slot = self.docker.write().unwrap_or_else(PoisonError::into_inner);
                if slot.is_some() {
                    *slot = Some(negotiated);
                }
                self.negotiated.store(true, Ordering::Release);
            }
            Err(error) => {
                debug!(
                    host = %self.host,
                    %error,
                    "API version negotiation failed, retrying on the next call"
                );
            }
        }
    }
}

impl EngineClient for BollardClient {
    fn ping(&self) -> PingFuture<'_> {
        Box::pin(async move {
            let docker = self.current()?;
            docker.ping().await?;
            self.negotiate_if_needed(docker).await;
            Ok(())
        })
    }

    fn version(&self) -> VersionFuture<'_> {
        Box::pin(async move {
            let docker = self.current()?;
            self.negotiate_if_needed(docker).await;
            self.current()?.version().await
        })
    }

    fn docker(&self) -> Option<Docker> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        self.read_docker()
    }

    fn close(&self) -> CloseFuture<'_> {
        Box::pin(async move {
            self.closed.store(true, Ordering::Release);
            let released = self
                .docker
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            drop(released);
            Ok(())
        })
    }
}

/// Builds base clients for a host locator.
///
/// Lets the transport builder and the service supervisor be exercised without
/// a running engine.
pub trait ClientConnector: Send + Sync {
    /// Build a client for `host`.
    ///
    /// # Errors
    ///
    /// Returns an error when the client cannot be constructed.
    fn connect(&self, host: &str) -> Result<SharedClient, PodlinkError>;

    /// Build a client for `host` with environment-derived `defaults`.
    ///
    /// Connectors that have no use for the defaults fall back to
    /// [`connect`](Self::connect).
    ///
    /// # Errors
    ///
    /// Returns an error when the client cannot be constructed.
    fn connect_with(
        &self,
        host: &str,
        defaults: &ClientDefaults,
    ) -> Result<SharedClient, PodlinkError> {
        let _ = defaults;
        self.connect(host)
    }
}

/// Production [`ClientConnector`] producing [`BollardClient`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct BollardConnector {
    deferred: bool,
}

impl BollardConnector {
    /// Connector that constructs the `Bollard` client immediately.
    #[must_use]
    pub const fn eager() -> Self {
        Self { deferred: false }
    }

    /// Connector whose clients connect on first use.
    #[must_use]
    pub const fn deferred() -> Self {
        Self { deferred: true }
    }
}

impl ClientConnector for BollardConnector {
    fn connect(&self, host: &str) -> Result<SharedClient, PodlinkError> {
        if self.deferred {
            return Ok(Arc::new(BollardClient::deferred(host)));
        }
        Ok(Arc::new(BollardClient::connect(host)?))
    }

    fn connect_with(
        &self,
        host: &str,
        defaults: &ClientDefaults,
    ) -> Result<SharedClient, PodlinkError> {
        if self.deferred {
            return Ok(Arc::new(BollardClient::deferred_with(host, defaults.clone())));
        }
        Ok(Arc::new(BollardClient::connect_with(host, defaults.clone())?))
    }
}
