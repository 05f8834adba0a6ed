//! Classification of `Bollard` construction failures.
//!
//! Low-level errors are mapped onto semantic `EngineError` variants so callers
//! can tell a missing socket from a permission problem.

use std::io::ErrorKind;
use std::path::Path;

use crate::error::EngineError;

/// Filesystem path behind a socket or pipe URI, if it has one.
pub(super) fn extract_socket_path(host: &str) -> Option<&Path> {
    host.strip_prefix("unix://")
        .or_else(|| host.strip_prefix("npipe://"))
        .or_else(|| host.starts_with('/').then_some(host))
        .map(Path::new)
}

fn classify_io_error_kind(
    kind: ErrorKind,
    socket_path: Option<&Path>,
    message: &str,
) -> EngineError {
    match (kind, socket_path) {
        (ErrorKind::PermissionDenied, Some(path)) => EngineError::PermissionDenied {
            path: path.to_path_buf(),
        },
        (ErrorKind::NotFound, Some(path)) => EngineError::SocketNotFound {
            path: path.to_path_buf(),
        },
        _ => EngineError::ConnectionFailed {
            message: message.to_owned(),
        },
    }
}

/// Map a `Bollard` error raised while connecting to `host`.
pub(crate) fn classify_connection_error(error: &bollard::errors::Error, host: &str) -> EngineError {
    let socket_path = extract_socket_path(host);
    let message = error.to_string();

    match error {
        bollard::errors::Error::SocketNotFoundError(_) => {
            if let Some(path) = socket_path {
                return EngineError::SocketNotFound {
                    path: path.to_path_buf(),
                };
            }
        }
        bollard::errors::Error::IOError { err } => {
            let kind = io_error_kind_in_chain(err).unwrap_or_else(|| err.kind());
            return classify_io_error_kind(kind, socket_path, &message);
        }
        _ => {}
    }

    if let Some(kind) = io_error_kind_in_chain(error) {
        return classify_io_error_kind(kind, socket_path, &message);
    }

    EngineError::ConnectionFailed { message }
}

/// Walk the error source chain looking for an `io::Error` kind.
fn io_error_kind_in_chain(error: &dyn std::error::Error) -> Option<ErrorKind> {
    let mut current = error.source();
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            return Some(io_err.kind());
        }
        current = err.source();
    }
    None
}
