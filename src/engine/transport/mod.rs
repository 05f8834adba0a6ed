//! Base client construction for resolved connection descriptors.
//!
//! Local and TCP descriptors are dialled directly with the descriptor's
//! environment-derived [`ClientDefaults`]. SSH descriptors go through
//! an [`SshTunneler`]; the client talks to the tunnel's local endpoint and
//! the tunnel's release action is attached as extra cleanup.

mod connect;
mod error_classification;
mod ssh;

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

pub use self::connect::ClientDefaults;
pub(crate) use self::connect::{connect_docker, open_docker};
pub use self::ssh::{
    NonInteractivePrompts, SshCredentials, SshPrompts, SshTunnel, SshTunneler, TunnelFuture,
};
use super::client::{BollardConnector, ClientConnector, ExtraCleanupClient, SharedClient};
use super::descriptor::{ConnectionDescriptor, HostUri, Scheme};
use crate::error::{EngineError, PodlinkError};

/// A base client together with its remote host hint.
pub struct BuiltTransport {
    /// Client for the resolved engine, not yet close-guarded.
    pub client: SharedClient,
    /// Locator to use for the same engine from inside the remote environment.
    pub remote_host: String,
}

/// Builds base clients from connection descriptors.
pub struct TransportBuilder {
    connector: Arc<dyn ClientConnector>,
    tunneler: Option<Arc<dyn SshTunneler>>,
    prompts: Arc<dyn SshPrompts>,
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportBuilder {
    /// Builder using `Bollard` clients, non-interactive prompts and no SSH
    /// tunneler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connector: Arc::new(BollardConnector::eager()),
            tunneler: None,
            prompts: Arc::new(NonInteractivePrompts),
        }
    }

    /// Replace the client connector.
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn ClientConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// Enable the SSH path with `tunneler`.
    #[must_use]
    pub fn with_tunneler(mut self, tunneler: Arc<dyn SshTunneler>) -> Self {
        self.tunneler = Some(tunneler);
        self
    }

    /// Replace the prompt callbacks handed to the tunneler.
    #[must_use]
    pub fn with_prompts(mut self, prompts: Arc<dyn SshPrompts>) -> Self {
        self.prompts = prompts;
        self
    }

    /// Build the base client for `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ConnectionFailed`, `SocketNotFound` or
    /// `PermissionDenied` when the client cannot be constructed, and
    /// `EngineError::InvalidHost` or `TunnelFailed` when the SSH path fails.
    pub async fn build(
        &self,
        descriptor: ConnectionDescriptor,
    ) -> Result<BuiltTransport, PodlinkError> {
        match descriptor.scheme() {
            Scheme::Ssh => self.build_ssh(descriptor).await,
            Scheme::Tcp => Ok(BuiltTransport {
                client: self
                    .connector
                    .connect_with(descriptor.host(), descriptor.client_defaults())?,
                remote_host: String::new(),
            }),
            Scheme::Local => Ok(BuiltTransport {
                client: self
                    .connector
                    .connect_with(descriptor.host(), descriptor.client_defaults())?,
                remote_host: String::from(descriptor.host()),
            }),
        }
    }

    async fn build_ssh(
        &self,
        descriptor: ConnectionDescriptor,
    ) -> Result<BuiltTransport, PodlinkError> {
        let Some(tunneler) = &self.tunneler else {
            return Err(EngineError::TunnelFailed {
                target: String::from(descriptor.host()),
                message: String::from("no SSH tunneler is configured"),
            }
            .into());
        };

        let target = HostUri::parse(descriptor.host())?;
        let credentials = SshCredentials {
            identity: descriptor.ssh_identity().cloned(),
            passphrase: descriptor
                .ssh_passphrase()
                .map(|secret| SecretString::from(secret.expose_secret().to_owned())),
            prompts: Arc::clone(&self.prompts),
        };

        debug!(target_host = descriptor.host(), "opening SSH tunnel");
        let tunnel = tunneler.open(&target, credentials).await?;

        let client = match self.connector.connect(&tunnel.dial_endpoint) {
            Ok(client) => client,
            Err(error) => {
                if let Some(release) = tunnel.release {
                    release().await;
                }
                warn!(endpoint = %tunnel.dial_endpoint, %error, "failed to dial SSH tunnel endpoint");
                return Err(error);
            }
        };

        let client = match tunnel.release {
            Some(release) => Arc::new(ExtraCleanupClient::new(client, release)) as SharedClient,
            None => client,
        };

        Ok(BuiltTransport {
            client,
            remote_host: tunnel.remote_host,
        })
    }
}
