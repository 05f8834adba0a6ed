//! Subprocess plumbing for supervised services.
//!
//! A spawned service has its stdout and stderr drained into one shared buffer
//! and its exit reported once on a oneshot channel. The child handle sits
//! behind a lock shared by the exit waiter and the signaller: the waiter only
//! reaps while holding it, and the signaller only signals a child that has
//! not been reaped, so a reused pid is never signalled.

use std::future::{Future, poll_fn};
use std::io;
use std::pin::pin;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::{LaunchedService, ProcessExit, ServiceSignaller};

/// How long the exit waiter lets the output drains catch up.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Combined stdout and stderr captured from a service.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl OutputBuffer {
    /// Append raw output.
    pub fn append(&self, chunk: &[u8]) {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(chunk);
    }

    /// The output captured so far, decoded lossily.
    #[must_use]
    pub fn snapshot(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            Self::Clean
        } else {
            Self::Failed {
                reason: status.to_string(),
            }
        }
    }
}

/// Spawn `command` as a supervised service.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns the operating system error when the process cannot be started.
pub(crate) fn spawn_service(mut command: Command) -> io::Result<LaunchedService> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut spawned = command.spawn()?;

    let output = OutputBuffer::default();
    let drains: Vec<JoinHandle<()>> = [
        spawned.stdout.take().map(|out| spawn_drain(out, output.clone())),
        spawned.stderr.take().map(|err| spawn_drain(err, output.clone())),
    ]
    .into_iter()
    .flatten()
    .collect();

    let child = Arc::new(Mutex::new(spawned));
    let signaller = ChildSignaller {
        child: Arc::clone(&child),
    };

    let (exit_tx, exit_rx) = oneshot::channel();
    tokio::spawn(async move {
        let status = poll_fn(|cx| {
            let mut guard = lock_child(&child);
            let wait = pin!(guard.wait());
            wait.poll(cx)
        })
        .await;
        for drain in drains {
            if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
                trace!("service output drain did not finish");
            }
        }
        let exit = match status {
            Ok(status) => ProcessExit::from(status),
            Err(error) => ProcessExit::Failed {
                reason: error.to_string(),
            },
        };
        debug!(?exit, "service process exited");
        if exit_tx.send(exit).is_err() {
            trace!("nobody is waiting for the service exit");
        }
    });

    Ok(LaunchedService {
        signaller: Box::new(signaller),
        exit: exit_rx,
        output,
    })
}

fn spawn_drain<R>(mut stream: R, output: OutputBuffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0_u8; 4096];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(read) => output.append(chunk.get(..read).unwrap_or_default()),
                Err(error) => {
                    trace!(%error, "service output stream failed");
                    break;
                }
            }
        }
    })
}

fn lock_child(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Signals a service process through its unreaped child handle.
struct ChildSignaller {
    child: Arc<Mutex<Child>>,
}

impl ChildSignaller {
    /// Run `deliver` with the pid, unless the child has been reaped.
    fn with_live_pid(
        &self,
        deliver: impl FnOnce(&mut Child, u32) -> io::Result<()>,
    ) -> io::Result<()> {
        let mut guard = lock_child(&self.child);
        let Some(pid) = guard.id() else {
            return Ok(());
        };
        deliver(&mut guard, pid)
    }
}

impl ServiceSignaller for ChildSignaller {
    #[cfg(unix)]
    fn terminate(&self) -> io::Result<()> {
        self.with_live_pid(|_, pid| {
            let raw = i32::try_from(pid)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
            nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(raw),
                nix::sys::signal::Signal::SIGTERM,
            )
            .map_err(io::Error::from)
        })
    }

    #[cfg(not(unix))]
    fn terminate(&self) -> io::Result<()> {
        self.with_live_pid(|_, _| {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "graceful termination is only supported on Unix",
            ))
        })
    }

    fn kill(&self) -> io::Result<()> {
        self.with_live_pid(|child, _| child.start_kill())
    }
}
