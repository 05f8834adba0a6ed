//! Filesystem probe for the default local endpoint.

use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::trace;

use crate::engine::descriptor::HostUri;
use crate::error::{FilesystemError, PodlinkError};

/// Whether the default endpoint's socket exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SocketProbe {
    Present,
    Absent,
}

/// Check whether the socket behind `default_host` exists.
///
/// Hosts without a filesystem path (including the empty host) are absent.
/// Only a genuine not-found result counts as absent; every other stat failure
/// is returned.
pub(super) async fn probe_socket(default_host: &str) -> Result<SocketProbe, PodlinkError> {
    if default_host.is_empty() {
        return Ok(SocketProbe::Absent);
    }

    let uri = HostUri::parse(default_host)?;
    let Some(path) = uri.filesystem_path() else {
        trace!(default_host, "default host has no socket path");
        return Ok(SocketProbe::Absent);
    };

    match tokio::fs::metadata(path).await {
        Ok(_) => Ok(SocketProbe::Present),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(SocketProbe::Absent),
        Err(error) if error.kind() == ErrorKind::PermissionDenied => {
            Err(FilesystemError::PermissionDenied {
                path: PathBuf::from(path),
            }
            .into())
        }
        Err(error) => Err(FilesystemError::IoError {
            path: PathBuf::from(path),
            message: error.to_string(),
        }
        .into()),
    }
}
