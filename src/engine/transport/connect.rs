//! Direct `Bollard` connections for local and TCP endpoints.

use bollard::errors::Error as BollardError;
use bollard::{API_DEFAULT_VERSION, ClientVersion, Docker};
use camino::{Utf8Path, Utf8PathBuf};

use super::error_classification::classify_connection_error;
use crate::error::PodlinkError;

/// Connection timeout in seconds for engine API connections.
const CONNECTION_TIMEOUT_SECS: u64 = 120;

/// Classifies host locators by how `Bollard` must connect to them.
#[derive(Debug, PartialEq, Eq)]
enum SocketType {
    /// Unix socket or Windows named pipe with explicit scheme.
    Socket,
    /// HTTP, HTTPS, or TCP endpoint.
    Http,
    /// Bare path without scheme prefix.
    BarePath,
}

impl SocketType {
    fn classify(host: &str) -> Self {
        if host.starts_with("unix://") || host.starts_with("npipe://") {
            Self::Socket
        } else if host.starts_with("tcp://")
            || host.starts_with("http://")
            || host.starts_with("https://")
        {
            Self::Http
        } else {
            Self::BarePath
        }
    }
}

/// Normalize a bare socket path to a URI with the appropriate scheme.
///
/// Paths starting with `\\` or `//` are treated as named pipes, everything else
/// as a Unix socket. Detection is syntax-based, not platform-based.
fn normalize_bare_path(path: &str) -> String {
    if path.starts_with("\\\\") || path.starts_with("//") {
        format!("npipe://{path}")
    } else {
        format!("unix://{path}")
    }
}

/// Client settings derived from the `DOCKER_*` environment.
///
/// Applied to local and TCP endpoints only; an SSH tunnel endpoint is always
/// dialled in plain HTTP with the default API version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientDefaults {
    /// Directory holding `ca.pem`, `cert.pem` and `key.pem`.
    ///
    /// When set, TCP endpoints are dialled over TLS.
    pub tls_cert_dir: Option<Utf8PathBuf>,
    /// API version pinned by the environment. Disables negotiation.
    pub api_version: Option<ClientVersion>,
}

impl ClientDefaults {
    /// Parse a `major.minor` API version such as `1.41`.
    #[must_use]
    pub fn parse_api_version(raw: &str) -> Option<ClientVersion> {
        let (major, minor) = raw.trim().trim_start_matches('v').split_once('.')?;
        Some(ClientVersion {
            major_version: major.parse().ok()?,
            minor_version: minor.parse().ok()?,
        })
    }

    fn client_version(&self) -> &ClientVersion {
        self.api_version.as_ref().unwrap_or(API_DEFAULT_VERSION)
    }
}

/// Open a `Bollard` client for `host`.
///
/// Accepts `unix://`, `npipe://`, `tcp://`, `http://`, `https://` and bare
/// paths. HTTP-style hosts use TLS when `defaults` names a certificate
/// directory, and `https://` hosts always do.
pub(crate) fn open_docker(host: &str, defaults: &ClientDefaults) -> Result<Docker, BollardError> {
    let version = defaults.client_version();
    match SocketType::classify(host) {
        SocketType::Socket => Docker::connect_with_socket(host, CONNECTION_TIMEOUT_SECS, version),
        SocketType::Http => match &defaults.tls_cert_dir {
            Some(cert_dir) => open_tls(host, cert_dir, version),
            None if host.starts_with("https://") => Err(BollardError::IOError {
                err: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "https hosts need DOCKER_CERT_PATH or DOCKER_TLS_VERIFY",
                ),
            }),
            None => {
                let http_host = host
                    .strip_prefix("tcp://")
                    .map_or_else(|| host.to_owned(), |rest| format!("http://{rest}"));
                Docker::connect_with_http(&http_host, CONNECTION_TIMEOUT_SECS, version)
            }
        },
        SocketType::BarePath => Docker::connect_with_socket(
            &normalize_bare_path(host),
            CONNECTION_TIMEOUT_SECS,
            version,
        ),
    }
}

/// Dial `host` over TLS with the client certificates in `cert_dir`.
fn open_tls(
    host: &str,
    cert_dir: &Utf8Path,
    version: &ClientVersion,
) -> Result<Docker, BollardError> {
    let address = host.strip_prefix("http://").unwrap_or(host);
    Docker::connect_with_ssl(
        address,
        cert_dir.join("key.pem").as_std_path(),
        cert_dir.join("cert.pem").as_std_path(),
        cert_dir.join("ca.pem").as_std_path(),
        CONNECTION_TIMEOUT_SECS,
        version,
    )
}

/// Open a `Bollard` client for `host`, classifying failures.
///
/// # Errors
///
/// Returns `EngineError::SocketNotFound`, `PermissionDenied` or
/// `ConnectionFailed` depending on why the client could not be constructed.
pub(crate) fn connect_docker(
    host: &str,
    defaults: &ClientDefaults,
) -> Result<Docker, PodlinkError> {
    open_docker(host, defaults)
        .map_err(|error| PodlinkError::from(classify_connection_error(&error, host)))
}
