//! Host locators and resolved connection descriptors.

use std::fmt;

use camino::Utf8PathBuf;
use secrecy::SecretString;

use super::transport::ClientDefaults;
use crate::error::EngineError;

/// A host locator split into its scheme, authority and path.
///
/// Strings without `://` are treated as bare filesystem paths. The parser is
/// deliberately loose; it only rejects empty input and malformed schemes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostUri {
    scheme: Option<String>,
    authority: String,
    path: String,
}

impl HostUri {
    /// Parse a host locator such as `unix:///run/podman/podman.sock`,
    /// `tcp://127.0.0.1:2375`, `ssh://core@machine:22/run/podman.sock` or a bare
    /// socket path.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidHost` when the input is empty or the scheme
    /// contains characters other than ASCII letters, digits, `+`, `-` and `.`.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        if raw.is_empty() {
            return Err(invalid(raw, "host is empty"));
        }

        let Some((scheme, rest)) = raw.split_once("://") else {
            return Ok(Self {
                scheme: None,
                authority: String::new(),
                path: String::from(raw),
            });
        };

        if !is_valid_scheme(scheme) {
            return Err(invalid(raw, "scheme is malformed"));
        }

        let (authority, path) = rest
            .find('/')
            .map_or((rest, ""), |index| rest.split_at(index));

        Ok(Self {
            scheme: Some(scheme.to_ascii_lowercase()),
            authority: String::from(authority),
            path: String::from(path),
        })
    }

    /// The lower-cased scheme, or `None` for a bare path.
    #[must_use]
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// The authority component (`user@host:port`), empty when absent.
    #[must_use]
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// The path component, empty when absent.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The filesystem path a local endpoint lives at.
    ///
    /// Only socket and pipe schemes and bare paths have one; network schemes
    /// return `None`.
    #[must_use]
    pub fn filesystem_path(&self) -> Option<&str> {
        match self.scheme() {
            None | Some("unix" | "npipe") if !self.path.is_empty() => Some(&self.path),
            _ => None,
        }
    }
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn invalid(host: &str, reason: &str) -> EngineError {
    EngineError::InvalidHost {
        host: String::from(host),
        reason: String::from(reason),
    }
}

/// How a descriptor's host should be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Unix socket, named pipe, bare path, or anything not recognised.
    Local,
    /// Plain TCP endpoint.
    Tcp,
    /// Engine reached through an SSH tunnel.
    Ssh,
}

impl Scheme {
    /// Classify a host locator.
    ///
    /// Locators that fail to parse classify as [`Scheme::Local`] so that
    /// inconclusive scheme detection never fails resolution on its own.
    #[must_use]
    pub fn of(host: &str) -> Self {
        match HostUri::parse(host).ok().as_ref().and_then(HostUri::scheme) {
            Some("ssh") => Self::Ssh,
            Some("tcp") => Self::Tcp,
            _ => Self::Local,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Local => "local",
            Self::Tcp => "tcp",
            Self::Ssh => "ssh",
        };
        f.write_str(name)
    }
}

/// A resolved connection target.
///
/// Produced by the resolver and consumed once by the transport builder.
#[derive(Debug)]
pub struct ConnectionDescriptor {
    host: String,
    scheme: Scheme,
    ssh_identity: Option<Utf8PathBuf>,
    ssh_passphrase: Option<SecretString>,
    client_defaults: ClientDefaults,
}

impl ConnectionDescriptor {
    /// Describe `host` with no SSH credentials attached.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into();
        let scheme = Scheme::of(&host);
        Self {
            host,
            scheme,
            ssh_identity: None,
            ssh_passphrase: None,
            client_defaults: ClientDefaults::default(),
        }
    }

    /// Attach an SSH identity file.
    #[must_use]
    pub fn with_ssh_identity(mut self, identity: Option<Utf8PathBuf>) -> Self {
        self.ssh_identity = identity;
        self
    }

    /// Attach an SSH key passphrase.
    #[must_use]
    pub fn with_ssh_passphrase(mut self, passphrase: Option<SecretString>) -> Self {
        self.ssh_passphrase = passphrase;
        self
    }

    /// Attach the environment-derived client settings for local and TCP
    /// endpoints.
    #[must_use]
    pub fn with_client_defaults(mut self, defaults: ClientDefaults) -> Self {
        self.client_defaults = defaults;
        self
    }

    /// Replace the SSH credentials with any overrides that are present.
    ///
    /// Overrides always beat credentials discovered with the host.
    #[must_use]
    pub fn override_credentials(
        mut self,
        identity: Option<Utf8PathBuf>,
        passphrase: Option<SecretString>,
    ) -> Self {
        if identity.is_some() {
            self.ssh_identity = identity;
        }
        if passphrase.is_some() {
            self.ssh_passphrase = passphrase;
        }
        self
    }

    /// The host locator string.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The classified scheme.
    #[must_use]
    pub const fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// The SSH identity file, if any.
    #[must_use]
    pub fn ssh_identity(&self) -> Option<&Utf8PathBuf> {
        self.ssh_identity.as_ref()
    }

    /// The SSH key passphrase, if any.
    #[must_use]
    pub const fn ssh_passphrase(&self) -> Option<&SecretString> {
        self.ssh_passphrase.as_ref()
    }

    /// Client settings applied when dialling a local or TCP endpoint.
    #[must_use]
    pub const fn client_defaults(&self) -> &ClientDefaults {
        &self.client_defaults
    }
}
