//! Test doubles shared by the engine module tests.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::models::SystemVersion;
use tokio::sync::oneshot;

use super::client::{
    ClientConnector, CloseFuture, EngineClient, PingFuture, SharedClient, VersionFuture,
};
use super::service::{
    LaunchedService, OutputBuffer, ProcessExit, ServiceLauncher, ServiceSignaller,
};
use super::transport::ClientDefaults;
use crate::error::{EngineError, PodlinkError};

/// Ordered record of teardown events shared between doubles.
pub(crate) type EventLog = Arc<Mutex<Vec<&'static str>>>;

pub(crate) fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn events(log: &EventLog) -> Vec<&'static str> {
    log.lock().expect("event log lock should succeed").clone()
}

pub(crate) fn refused() -> BollardError {
    BollardError::IOError {
        err: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused"),
    }
}

/// Engine client double that becomes ready after a fixed number of pings.
pub(crate) struct FakeClient {
    ready_on_attempt: usize,
    pings: AtomicUsize,
    closes: AtomicUsize,
    fail_close: bool,
    log: Option<EventLog>,
}

impl FakeClient {
    pub(crate) fn ready_on_attempt(attempt: usize) -> Self {
        Self {
            ready_on_attempt: attempt,
            pings: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            fail_close: false,
            log: None,
        }
    }

    pub(crate) fn ready() -> Self {
        Self::ready_on_attempt(1)
    }

    pub(crate) fn never_ready() -> Self {
        Self::ready_on_attempt(usize::MAX)
    }

    pub(crate) fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub(crate) fn with_log(mut self, log: EventLog) -> Self {
        self.log = Some(log);
        self
    }

    pub(crate) fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl EngineClient for FakeClient {
    fn ping(&self) -> PingFuture<'_> {
        let attempt = self.pings.fetch_add(1, Ordering::SeqCst) + 1;
        let ready = attempt >= self.ready_on_attempt;
        Box::pin(async move { if ready { Ok(()) } else { Err(refused()) } })
    }

    fn version(&self) -> VersionFuture<'_> {
        Box::pin(async {
            Ok(SystemVersion {
                version: Some(String::from("5.4.0")),
                api_version: Some(String::from("1.41")),
                ..SystemVersion::default()
            })
        })
    }

    fn docker(&self) -> Option<Docker> {
        None
    }

    fn close(&self) -> CloseFuture<'_> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock()
                .expect("event log lock should succeed")
                .push("client closed");
        }
        let fail = self.fail_close;
        Box::pin(async move {
            if fail {
                Err(PodlinkError::from(EngineError::ConnectionFailed {
                    message: String::from("close failed"),
                }))
            } else {
                Ok(())
            }
        })
    }
}

/// Counts how often a cleanup action ran.
#[derive(Clone, Default)]
pub(crate) struct CleanupSpy {
    runs: Arc<AtomicUsize>,
    log: Option<EventLog>,
}

impl CleanupSpy {
    pub(crate) fn with_log(log: EventLog) -> Self {
        Self {
            runs: Arc::new(AtomicUsize::new(0)),
            log: Some(log),
        }
    }

    pub(crate) fn action(&self) -> super::client::CleanupAction {
        let spy = self.clone();
        super::client::cleanup_action(move || async move {
            spy.runs.fetch_add(1, Ordering::SeqCst);
            if let Some(log) = &spy.log {
                log.lock()
                    .expect("event log lock should succeed")
                    .push("cleanup ran");
            }
        })
    }

    pub(crate) fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

/// Connector double that records requested hosts and hands out [`FakeClient`]s.
#[derive(Default)]
pub(crate) struct RecordingConnector {
    hosts: Mutex<Vec<String>>,
    defaults: Mutex<Vec<ClientDefaults>>,
    ready_on_attempt: Option<usize>,
    fail: bool,
}

impl RecordingConnector {
    pub(crate) fn ready_on_attempt(attempt: usize) -> Self {
        Self {
            ready_on_attempt: Some(attempt),
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn hosts(&self) -> Vec<String> {
        self.hosts
            .lock()
            .expect("host log lock should succeed")
            .clone()
    }

    /// Client defaults passed with each `connect_with` call.
    pub(crate) fn defaults(&self) -> Vec<ClientDefaults> {
        self.defaults
            .lock()
            .expect("defaults log lock should succeed")
            .clone()
    }
}

impl ClientConnector for RecordingConnector {
    fn connect(&self, host: &str) -> Result<SharedClient, PodlinkError> {
        self.hosts
            .lock()
            .expect("host log lock should succeed")
            .push(String::from(host));
        if self.fail {
            return Err(PodlinkError::from(EngineError::ConnectionFailed {
                message: format!("cannot connect to {host}"),
            }));
        }
        let client = FakeClient::ready_on_attempt(self.ready_on_attempt.unwrap_or(1));
        Ok(Arc::new(client))
    }

    fn connect_with(
        &self,
        host: &str,
        defaults: &ClientDefaults,
    ) -> Result<SharedClient, PodlinkError> {
        self.defaults
            .lock()
            .expect("defaults log lock should succeed")
            .push(defaults.clone());
        self.connect(host)
    }
}

/// How the fake process behaves.
#[derive(Clone)]
pub(crate) enum Behaviour {
    /// Keeps running until SIGTERM, then exits cleanly.
    StopsOnTerminate,
    /// Ignores SIGTERM and never exits.
    Hangs,
    /// Exits straight away with the given result.
    ExitsImmediately(ProcessExit),
}

#[derive(Default)]
struct SignalCounts {
    terminate: AtomicUsize,
    kill: AtomicUsize,
}

struct FakeSignaller {
    counts: Arc<SignalCounts>,
    exit: Mutex<Option<oneshot::Sender<ProcessExit>>>,
    stops_on_terminate: bool,
}

impl ServiceSignaller for FakeSignaller {
    fn terminate(&self) -> io::Result<()> {
        self.counts.terminate.fetch_add(1, Ordering::SeqCst);
        if self.stops_on_terminate {
            if let Some(exit) = self.exit.lock().expect("exit lock should succeed").take() {
                exit.send(ProcessExit::Clean).ok();
            }
        }
        Ok(())
    }

    fn kill(&self) -> io::Result<()> {
        self.counts.kill.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct FakeLauncher {
    behaviour: Behaviour,
    output: &'static str,
    counts: Arc<SignalCounts>,
    hosts: Mutex<Vec<String>>,
}

impl FakeLauncher {
    pub(crate) fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            output: "",
            counts: Arc::new(SignalCounts::default()),
            hosts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_output(mut self, output: &'static str) -> Self {
        self.output = output;
        self
    }

    pub(crate) fn terminations(&self) -> usize {
        self.counts.terminate.load(Ordering::SeqCst)
    }

    pub(crate) fn kills(&self) -> usize {
        self.counts.kill.load(Ordering::SeqCst)
    }

    pub(crate) fn host(&self) -> String {
        self.hosts
            .lock()
            .expect("host lock should succeed")
            .first()
            .cloned()
            .expect("service should have been launched")
    }

    /// Directory holding the private socket the service was launched on.
    pub(crate) fn temp_dir(&self) -> PathBuf {
        private_dir(&self.host())
    }
}

pub(crate) fn private_dir(host: &str) -> PathBuf {
    Path::new(host.strip_prefix("unix://").expect("host should be a unix URI"))
        .parent()
        .expect("socket should live in a directory")
        .to_path_buf()
}

impl ServiceLauncher for FakeLauncher {
    fn launch(&self, host: &str) -> Result<LaunchedService, PodlinkError> {
        self.hosts
            .lock()
            .expect("host lock should succeed")
            .push(String::from(host));

        let (exit_tx, exit_rx) = oneshot::channel();
        let output = OutputBuffer::default();
        output.append(self.output.as_bytes());

        let (held, stops_on_terminate) = match &self.behaviour {
            Behaviour::StopsOnTerminate => (Some(exit_tx), true),
            Behaviour::Hangs => (Some(exit_tx), false),
            Behaviour::ExitsImmediately(exit) => {
                exit_tx.send(exit.clone()).ok();
                (None, false)
            }
        };

        Ok(LaunchedService {
            signaller: Box::new(FakeSignaller {
                counts: Arc::clone(&self.counts),
                exit: Mutex::new(held),
                stops_on_terminate,
            }),
            exit: exit_rx,
            output,
        })
    }
}
