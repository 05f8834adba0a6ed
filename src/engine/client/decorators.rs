//! Cleanup-composing client decorators.
//!
//! [`ExtraCleanupClient`] runs an extra teardown action after the wrapped
//! client closes. [`CloseGuardingClient`] is applied outermost to every handle
//! returned to callers and makes `close` idempotent.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use bollard::Docker;

use super::{CloseFuture, EngineClient, PingFuture, SharedClient, VersionFuture};

/// Boxed future produced by a [`CleanupAction`].
pub type CleanupFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Zero-argument teardown action attached to a client.
pub type CleanupAction = Box<dyn FnOnce() -> CleanupFuture + Send>;

/// Box an async closure as a [`CleanupAction`].
pub fn cleanup_action<F, Fut>(action: F) -> CleanupAction
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move || -> CleanupFuture { Box::pin(action()) })
}

/// Client wrapper that runs an extra cleanup action on close.
///
/// The action runs after the wrapped client's own close, whatever that close
/// returned, and the wrapped client's result is what the caller sees.
pub struct ExtraCleanupClient {
    inner: SharedClient,
    cleanup: Mutex<Option<CleanupAction>>,
}

impl ExtraCleanupClient {
    /// Wrap `inner` so that `cleanup` runs when it is closed.
    #[must_use]
    pub fn new(inner: SharedClient, cleanup: CleanupAction) -> Self {
        Self {
            inner,
            cleanup: Mutex::new(Some(cleanup)),
        }
    }

    fn take_cleanup(&self) -> Option<CleanupAction> {
        self.cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl EngineClient for ExtraCleanupClient {
    fn ping(&self) -> PingFuture<'_> {
        self.inner.ping()
    }

    fn version(&self) -> VersionFuture<'_> {
        self.inner.version()
    }

    fn docker(&self) -> Option<Docker> {
        self.inner.docker()
    }

    fn close(&self) -> CloseFuture<'_> {
        Box::pin(async move {
            let result = self.inner.close().await;
            if let Some(cleanup) = self.take_cleanup() {
                cleanup().await;
            }
            result
        })
    }
}

/// Outermost client wrapper guaranteeing idempotent close.
///
/// `close` is safe to call more than once; only the first call has effect.
/// Later calls return `Ok(())` without touching the wrapped client.
pub struct CloseGuardingClient {
    inner: SharedClient,
    closed: AtomicBool,
}

impl CloseGuardingClient {
    /// Wrap `inner` with a close guard.
    #[must_use]
    pub const fn new(inner: SharedClient) -> Self {
        Self {
            inner,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl EngineClient for CloseGuardingClient {
    fn ping(&self) -> PingFuture<'_> {
        self.inner.ping()
    }

    fn version(&self) -> VersionFuture<'_> {
        self.inner.version()
    }

    fn docker(&self) -> Option<Docker> {
        self.inner.docker()
    }

    fn close(&self) -> CloseFuture<'_> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Box::pin(async { Ok(()) });
        }
        self.inner.close()
    }
}
