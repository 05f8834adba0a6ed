//! SSH tunnelling seam.
//!
//! Key exchange and channel forwarding are left to an [`SshTunneler`]
//! implementation. A tunneler forwards the remote engine socket to a local
//! endpoint that `Bollard` can dial directly, reports the socket path as seen
//! on the remote machine, and may hand back a release action that tears the
//! tunnel down.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use camino::Utf8PathBuf;
use secrecy::SecretString;

use crate::engine::client::CleanupAction;
use crate::engine::descriptor::HostUri;
use crate::error::PodlinkError;

/// Boxed future returned by [`SshTunneler::open`].
pub type TunnelFuture<'a> =
    Pin<Box<dyn Future<Output = Result<SshTunnel, PodlinkError>> + Send + 'a>>;

/// Opens SSH tunnels to remote engines.
pub trait SshTunneler: Send + Sync {
    /// Open a tunnel to the engine socket named by `target`.
    ///
    /// Prompt callbacks in `credentials` may be invoked from background tasks
    /// while the tunnel is being established.
    fn open(&self, target: &HostUri, credentials: SshCredentials) -> TunnelFuture<'_>;
}

/// An established SSH tunnel.
pub struct SshTunnel {
    /// Local endpoint forwarding to the remote engine, e.g. `unix:///tmp/x.sock`.
    pub dial_endpoint: String,
    /// Engine locator as seen from the remote machine.
    pub remote_host: String,
    /// Tears the tunnel down, when the tunneler supports it.
    pub release: Option<CleanupAction>,
}

impl fmt::Debug for SshTunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshTunnel")
            .field("dial_endpoint", &self.dial_endpoint)
            .field("remote_host", &self.remote_host)
            .field("release", &self.release.is_some())
            .finish()
    }
}

/// Interactive callbacks used while authenticating a tunnel.
pub trait SshPrompts: Send + Sync {
    /// Ask for the login password of `user` at `host`.
    fn password(&self, user: &str, host: &str) -> Option<SecretString>;

    /// Ask for the passphrase protecting the key at `identity`.
    fn passphrase(&self, identity: &str) -> Option<SecretString>;

    /// Decide whether to trust `host` presenting a key with `fingerprint`.
    fn verify_host_key(&self, host: &str, fingerprint: &str) -> bool;
}

/// Prompts that never ask and never trust unknown host keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractivePrompts;

impl SshPrompts for NonInteractivePrompts {
    fn password(&self, _user: &str, _host: &str) -> Option<SecretString> {
        None
    }

    fn passphrase(&self, _identity: &str) -> Option<SecretString> {
        None
    }

    fn verify_host_key(&self, _host: &str, _fingerprint: &str) -> bool {
        false
    }
}

/// Credential bundle handed to an [`SshTunneler`].
pub struct SshCredentials {
    /// Private key file to authenticate with.
    pub identity: Option<Utf8PathBuf>,
    /// Passphrase for `identity`.
    pub passphrase: Option<SecretString>,
    /// Callbacks for anything not supplied up front.
    pub prompts: Arc<dyn SshPrompts>,
}

impl fmt::Debug for SshCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshCredentials")
            .field("identity", &self.identity)
            .field("passphrase", &self.passphrase)
            .finish_non_exhaustive()
    }
}
