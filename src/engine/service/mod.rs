//! Supervised engine service process.
//!
//! [`ServiceSupervisor::spawn`] boots a private engine API service bound to a
//! socket in a fresh temporary directory, waits for it to answer pings, and
//! returns a client whose close shuts the service down again. Startup races
//! three outcomes: the service becomes ready, the process exits on its own, or
//! the startup deadline passes. Shutdown sends SIGTERM, removes the temporary
//! directory, and escalates to SIGKILL when the process outlives the grace
//! period.
//!
//! The exit signal is observed only by the startup race and by shutdown. A
//! crash while readiness is being polled is therefore noticed when the race is
//! evaluated rather than immediately; shutdown tolerates an already-dead
//! process.

mod process;

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

pub use self::process::OutputBuffer;
pub(crate) use self::process::spawn_service;
use super::client::{
    BollardConnector, ClientConnector, ExtraCleanupClient, SharedClient, cleanup_action,
};
use crate::config::ServiceConfig;
use crate::error::{EngineError, FilesystemError, PodlinkError};

/// Prefix of the temporary directory holding the private socket.
const TEMP_DIR_PREFIX: &str = "podlink-podman-";

/// File name of the private socket inside the temporary directory.
const SOCKET_NAME: &str = "podman.sock";

/// How a supervised process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    /// The process exited successfully.
    Clean,
    /// The process exited unsuccessfully or could not be waited on.
    Failed {
        /// The exit status or wait error, rendered for humans.
        reason: String,
    },
}

/// Delivers termination signals to a running service.
pub trait ServiceSignaller: Send + Sync {
    /// Ask the service to stop (SIGTERM).
    ///
    /// # Errors
    ///
    /// Returns the error reported while delivering the signal.
    fn terminate(&self) -> io::Result<()>;

    /// Stop the service forcefully (SIGKILL).
    ///
    /// # Errors
    ///
    /// Returns the error reported while delivering the signal.
    fn kill(&self) -> io::Result<()>;
}

/// A freshly launched service process.
pub struct LaunchedService {
    /// Signals the running process.
    pub signaller: Box<dyn ServiceSignaller>,
    /// Resolves once with the process exit.
    pub exit: oneshot::Receiver<ProcessExit>,
    /// Combined stdout and stderr of the process.
    pub output: OutputBuffer,
}

/// Launches the service subprocess bound to a host locator.
pub trait ServiceLauncher: Send + Sync {
    /// Start a service listening on `host`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ServiceLaunchFailed` when the process cannot be
    /// started.
    fn launch(&self, host: &str) -> Result<LaunchedService, PodlinkError>;
}

/// Timing knobs for readiness polling and shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorTimings {
    /// Delay between readiness pings.
    pub poll_interval: Duration,
    /// Maximum number of readiness pings.
    pub poll_attempts: u32,
    /// Overall deadline for the service to become ready.
    pub startup_timeout: Duration,
    /// How long shutdown waits after SIGTERM before sending SIGKILL.
    pub shutdown_grace: Duration,
}

impl Default for SupervisorTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            poll_attempts: 40,
            startup_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(1),
        }
    }
}

impl From<&ServiceConfig> for SupervisorTimings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            poll_attempts: config.poll_attempts,
            startup_timeout: Duration::from_secs(config.startup_timeout_secs),
            shutdown_grace: Duration::from_millis(config.shutdown_grace_ms),
        }
    }
}

/// A ready supervised service.
pub struct SupervisedEngine {
    /// Client for the service; closing it shuts the service down.
    pub client: SharedClient,
    /// Private `unix://` locator the service listens on.
    pub host: String,
}

/// Boots and supervises private engine services.
pub struct ServiceSupervisor {
    launcher: Arc<dyn ServiceLauncher>,
    connector: Arc<dyn ClientConnector>,
    timings: SupervisorTimings,
}

impl ServiceSupervisor {
    /// Supervisor launching services with `launcher` and default timings.
    #[must_use]
    pub fn new(launcher: Arc<dyn ServiceLauncher>) -> Self {
        Self {
            launcher,
            connector: Arc::new(BollardConnector::deferred()),
            timings: SupervisorTimings::default(),
        }
    }

    /// Replace the connector used to build the service client.
    ///
    /// The connector must not require the service to be listening yet.
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn ClientConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// Replace the timings.
    #[must_use]
    pub const fn with_timings(mut self, timings: SupervisorTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Boot a service on a private socket and wait for it to become ready.
    ///
    /// # Errors
    ///
    /// Returns `FilesystemError::IoError` when the temporary directory cannot
    /// be created, `EngineError::ServiceLaunchFailed` when the process cannot
    /// be started, `EngineError::ServiceFailed` or `ServiceExitedEarly` when
    /// it exits before becoming ready, and `EngineError::ServiceStartTimeout`
    /// when it is not ready in time. The process is stopped and the temporary
    /// directory removed before any of these is returned.
    pub async fn spawn(&self) -> Result<SupervisedEngine, PodlinkError> {
        let temp_dir = tempfile::Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .tempdir()
            .map_err(|error| FilesystemError::IoError {
                path: std::env::temp_dir(),
                message: error.to_string(),
            })?;
        let host = format!("unix://{}", temp_dir.path().join(SOCKET_NAME).display());

        info!(%host, "starting engine service");
        let LaunchedService {
            signaller,
            exit,
            output,
        } = self.launcher.launch(&host)?;

        let exit_signal: ExitSignal = exit.map(Result::ok).boxed().shared();
        let shutdown = Arc::new(ServiceShutdown {
            started: AtomicBool::new(false),
            signaller,
            temp_dir: Mutex::new(Some(temp_dir)),
            exit: exit_signal.clone(),
            grace: self.timings.shutdown_grace,
        });

        let client = match self.connector.connect(&host) {
            Ok(client) => client,
            Err(error) => {
                shutdown.run().await;
                return Err(error);
            }
        };

        let (ready_tx, mut ready_rx) = mpsc::channel(1);
        tokio::spawn(poll_readiness(
            Arc::clone(&client),
            ready_tx,
            self.timings.poll_interval,
            self.timings.poll_attempts,
        ));

        tokio::select! {
            Some(()) = ready_rx.recv() => {
                info!(%host, "engine service is ready");
                let stop = Arc::clone(&shutdown);
                let client: SharedClient = Arc::new(ExtraCleanupClient::new(
                    client,
                    cleanup_action(move || async move { stop.run().await }),
                ));
                Ok(SupervisedEngine { client, host })
            }
            exit = exit_signal.clone() => {
                shutdown.run().await;
                Err(premature_exit_error(exit, &output).into())
            }
            () = tokio::time::sleep(self.timings.startup_timeout) => {
                warn!(%host, "engine service did not become ready in time");
                shutdown.run().await;
                Err(EngineError::ServiceStartTimeout {
                    timeout: self.timings.startup_timeout,
                }
                .into())
            }
        }
    }
}

/// Shared view of the process exit, observable from several places.
type ExitSignal = Shared<BoxFuture<'static, Option<ProcessExit>>>;

fn premature_exit_error(exit: Option<ProcessExit>, output: &OutputBuffer) -> EngineError {
    let output = output.snapshot();
    match exit {
        Some(ProcessExit::Clean) => EngineError::ServiceExitedEarly { output },
        Some(ProcessExit::Failed { reason }) => EngineError::ServiceFailed { output, reason },
        None => EngineError::ServiceFailed {
            output,
            reason: String::from("the service process could not be waited on"),
        },
    }
}

/// Ping `client` until it answers or the attempt budget is spent.
///
/// The readiness send never blocks, so this task can safely outlive the
/// startup race.
async fn poll_readiness(
    client: SharedClient,
    ready: mpsc::Sender<()>,
    interval: Duration,
    attempts: u32,
) {
    for attempt in 1..=attempts {
        match client.ping().await {
            Ok(()) => {
                if ready.try_send(()).is_err() {
                    trace!("readiness is no longer awaited");
                }
                return;
            }
            Err(error) => trace!(attempt, %error, "engine service not ready yet"),
        }
        tokio::time::sleep(interval).await;
    }
    debug!(attempts, "gave up polling the engine service");
}

/// Graceful-then-forceful shutdown of one supervised service.
struct ServiceShutdown {
    started: AtomicBool,
    signaller: Box<dyn ServiceSignaller>,
    temp_dir: Mutex<Option<TempDir>>,
    exit: ExitSignal,
    grace: Duration,
}

impl ServiceShutdown {
    async fn run(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Err(error) = self.signaller.terminate() {
            debug!(%error, "failed to send SIGTERM to the engine service");
        }
        self.remove_temp_dir();

        if tokio::time::timeout(self.grace, self.exit.clone())
            .await
            .is_err()
        {
            warn!(grace = ?self.grace, "engine service ignored SIGTERM, sending SIGKILL");
            if let Err(error) = self.signaller.kill() {
                debug!(%error, "failed to send SIGKILL to the engine service");
            }
        }
    }

    fn remove_temp_dir(&self) {
        let taken = self
            .temp_dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(dir) = taken else {
            return;
        };
        let path: PathBuf = dir.path().to_path_buf();
        if let Err(error) = dir.close() {
            debug!(path = %path.display(), %error, "failed to remove engine service directory");
        }
    }
}
