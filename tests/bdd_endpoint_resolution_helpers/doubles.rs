//! Test doubles built on the public engine traits.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::models::SystemVersion;
use podlink::engine::alternate::ConnectionsFuture;
use podlink::engine::client::{CloseFuture, PingFuture, VersionFuture};
use podlink::engine::service::OutputBuffer;
use podlink::engine::transport::TunnelFuture;
use podlink::engine::{
    AlternateEngine, ClientConnector, EngineClient, HostUri, LaunchedService, ProcessExit,
    RemoteConnection, ServiceLauncher, ServiceSignaller, SharedClient, SshCredentials, SshTunnel,
    SshTunneler, cleanup_action,
};
use podlink::error::PodlinkError;
use secrecy::ExposeSecret;
use tokio::sync::oneshot;

/// Engine client that answers pings when `responsive`.
struct FakeClient {
    responsive: bool,
}

impl EngineClient for FakeClient {
    fn ping(&self) -> PingFuture<'_> {
        let responsive = self.responsive;
        Box::pin(async move {
            if responsive {
                Ok(())
            } else {
                Err(BollardError::IOError {
                    err: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
                })
            }
        })
    }

    fn version(&self) -> VersionFuture<'_> {
        Box::pin(async { Ok(SystemVersion::default()) })
    }

    fn docker(&self) -> Option<Docker> {
        None
    }

    fn close(&self) -> CloseFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}

/// Connector recording every host it is asked to dial.
pub struct FakeConnector {
    responsive: bool,
    hosts: Mutex<Vec<String>>,
}

impl Default for FakeConnector {
    fn default() -> Self {
        Self {
            responsive: true,
            hosts: Mutex::new(Vec::new()),
        }
    }
}

impl FakeConnector {
    /// Connector whose clients never answer a ping.
    pub fn unresponsive() -> Self {
        Self {
            responsive: false,
            ..Self::default()
        }
    }

    /// Hosts dialled so far.
    pub fn hosts(&self) -> Vec<String> {
        self.hosts
            .lock()
            .map(|hosts| hosts.clone())
            .unwrap_or_default()
    }
}

impl ClientConnector for FakeConnector {
    fn connect(&self, host: &str) -> Result<SharedClient, PodlinkError> {
        if let Ok(mut hosts) = self.hosts.lock() {
            hosts.push(String::from(host));
        }
        Ok(Arc::new(FakeClient {
            responsive: self.responsive,
        }))
    }
}

/// How the fake Podman service process behaves once launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceBehaviour {
    /// Runs until SIGTERM.
    StopsOnTerminate,
    /// Exits with an error straight away.
    Crashes,
    /// Ignores SIGTERM.
    Hangs,
}

#[derive(Default)]
struct Signals {
    terminate: AtomicUsize,
    kill: AtomicUsize,
}

struct FakeSignaller {
    signals: Arc<Signals>,
    exit: Mutex<Option<oneshot::Sender<ProcessExit>>>,
    stops_on_terminate: bool,
}

impl ServiceSignaller for FakeSignaller {
    fn terminate(&self) -> io::Result<()> {
        self.signals.terminate.fetch_add(1, Ordering::SeqCst);
        if self.stops_on_terminate {
            if let Some(exit) = self.exit.lock().ok().and_then(|mut held| held.take()) {
                exit.send(ProcessExit::Clean).ok();
            }
        }
        Ok(())
    }

    fn kill(&self) -> io::Result<()> {
        self.signals.kill.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Podman double: an alternate engine that can also launch its service.
pub struct FakePodman {
    present: bool,
    connections: Vec<RemoteConnection>,
    behaviour: ServiceBehaviour,
    signals: Arc<Signals>,
    hosts: Mutex<Vec<String>>,
}

impl FakePodman {
    /// Podman that is not on the search path.
    pub fn absent() -> Self {
        Self::installed(ServiceBehaviour::StopsOnTerminate, Vec::new()).with_presence(false)
    }

    /// Installed Podman with the given service behaviour and connections.
    pub fn installed(behaviour: ServiceBehaviour, connections: Vec<RemoteConnection>) -> Self {
        Self {
            present: true,
            connections,
            behaviour,
            signals: Arc::new(Signals::default()),
            hosts: Mutex::new(Vec::new()),
        }
    }

    const fn with_presence(mut self, present: bool) -> Self {
        self.present = present;
        self
    }

    /// SIGTERMs sent to the service.
    pub fn terminations(&self) -> usize {
        self.signals.terminate.load(Ordering::SeqCst)
    }

    /// SIGKILLs sent to the service.
    pub fn kills(&self) -> usize {
        self.signals.kill.load(Ordering::SeqCst)
    }

    /// Directory holding the socket the service was launched on.
    pub fn service_dir(&self) -> Option<PathBuf> {
        let hosts = self.hosts.lock().ok()?;
        let socket = PathBuf::from(hosts.first()?.strip_prefix("unix://")?);
        socket.parent().map(PathBuf::from)
    }
}

impl AlternateEngine for FakePodman {
    fn program(&self) -> &str {
        "podman"
    }

    fn is_present(&self) -> bool {
        self.present
    }

    fn connections(&self) -> ConnectionsFuture<'_> {
        let connections = self.connections.clone();
        Box::pin(async move { Ok(connections) })
    }
}

impl ServiceLauncher for FakePodman {
    fn launch(&self, host: &str) -> Result<LaunchedService, PodlinkError> {
        if let Ok(mut hosts) = self.hosts.lock() {
            hosts.push(String::from(host));
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        let output = OutputBuffer::default();
        let held = if self.behaviour == ServiceBehaviour::Crashes {
            output.append(b"Error: cannot listen on the socket\n");
            exit_tx
                .send(ProcessExit::Failed {
                    reason: String::from("exit status: 125"),
                })
                .ok();
            None
        } else {
            Some(exit_tx)
        };

        Ok(LaunchedService {
            signaller: Box::new(FakeSignaller {
                signals: Arc::clone(&self.signals),
                exit: Mutex::new(held),
                stops_on_terminate: self.behaviour == ServiceBehaviour::StopsOnTerminate,
            }),
            exit: exit_rx,
            output,
        })
    }
}

/// Tunneler recording the passphrase it was given and counting releases.
#[derive(Default)]
pub struct FakeTunneler {
    passphrase: Mutex<Option<String>>,
    releases: Arc<AtomicUsize>,
}

impl FakeTunneler {
    /// Passphrase supplied to the most recent tunnel.
    pub fn passphrase(&self) -> Option<String> {
        self.passphrase.lock().ok().and_then(|held| held.clone())
    }

    /// How often a tunnel was released.
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl SshTunneler for FakeTunneler {
    fn open(&self, target: &HostUri, credentials: SshCredentials) -> TunnelFuture<'_> {
        if let Ok(mut held) = self.passphrase.lock() {
            *held = credentials
                .passphrase
                .as_ref()
                .map(|secret| String::from(secret.expose_secret()));
        }
        let releases = Arc::clone(&self.releases);
        let remote_host = String::from(target.path());
        Box::pin(async move {
            Ok(SshTunnel {
                dial_endpoint: String::from("tcp://127.0.0.1:40222"),
                remote_host,
                release: Some(cleanup_action(move || async move {
                    releases.fetch_add(1, Ordering::SeqCst);
                })),
            })
        })
    }
}
