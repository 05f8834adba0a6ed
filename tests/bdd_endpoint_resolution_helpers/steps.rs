//! Given and when steps for endpoint resolution scenarios.

use std::sync::Arc;
use std::time::Duration;

use podlink::engine::{
    AlternateStrategy, EndpointResolver, EngineClient, RemoteConnection, ResolverConfig,
    ServiceSupervisor, SupervisorTimings, TransportBuilder,
};
use podlink::error::PodlinkError;
use rstest_bdd_macros::{given, when};
use secrecy::SecretString;

use super::doubles::{FakeConnector, FakePodman, ServiceBehaviour};
use super::state::{EndpointResolutionState, FailureKind, ResolutionOutcome, StepResult};

const MISSING_SOCKET: &str = "unix:///nonexistent/podlink/docker.sock";
const MACHINE_URI: &str = "ssh://core@127.0.0.1:50163/run/user/501/podman/podman.sock";

// =============================================================================
// Given step definitions
// =============================================================================

#[given("DOCKER_HOST is set to {value}")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult for consistency"
)]
fn docker_host_is_set_to(
    endpoint_resolution_state: &EndpointResolutionState,
    value: String,
) -> StepResult<()> {
    endpoint_resolution_state.docker_host.set(value);
    Ok(())
}

#[given("the SSH key passphrase override is {value}")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult for consistency"
)]
fn passphrase_override_is(
    endpoint_resolution_state: &EndpointResolutionState,
    value: String,
) -> StepResult<()> {
    endpoint_resolution_state.passphrase.set(value);
    Ok(())
}

#[given("the default socket does not exist")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult for consistency"
)]
fn default_socket_does_not_exist(
    endpoint_resolution_state: &EndpointResolutionState,
) -> StepResult<()> {
    endpoint_resolution_state
        .default_host
        .set(String::from(MISSING_SOCKET));
    Ok(())
}

#[given("the default socket exists")]
fn default_socket_exists(endpoint_resolution_state: &EndpointResolutionState) -> StepResult<()> {
    let dir = tempfile::tempdir()
        .map_err(|error| format!("failed to create socket directory: {error}"))?;
    let socket = dir.path().join("docker.sock");
    std::fs::write(&socket, b"")
        .map_err(|error| format!("failed to create socket stand-in: {error}"))?;

    endpoint_resolution_state
        .default_host
        .set(format!("unix://{}", socket.display()));
    endpoint_resolution_state.socket_dir.set(Arc::new(dir));
    Ok(())
}

#[given("Podman is not installed")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult for consistency"
)]
fn podman_is_not_installed(endpoint_resolution_state: &EndpointResolutionState) -> StepResult<()> {
    endpoint_resolution_state
        .podman
        .set(Arc::new(FakePodman::absent()));
    Ok(())
}

#[given("Podman is installed with a service that becomes ready")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult for consistency"
)]
fn podman_with_ready_service(
    endpoint_resolution_state: &EndpointResolutionState,
) -> StepResult<()> {
    install_podman(endpoint_resolution_state, ServiceBehaviour::StopsOnTerminate);
    Ok(())
}

#[given("Podman is installed with a service that exits immediately")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult for consistency"
)]
fn podman_with_crashing_service(
    endpoint_resolution_state: &EndpointResolutionState,
) -> StepResult<()> {
    install_podman(endpoint_resolution_state, ServiceBehaviour::Crashes);
    endpoint_resolution_state
        .connector
        .set(Arc::new(FakeConnector::unresponsive()));
    Ok(())
}

#[given("Podman is installed with a service that never answers")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult for consistency"
)]
fn podman_with_silent_service(
    endpoint_resolution_state: &EndpointResolutionState,
) -> StepResult<()> {
    install_podman(endpoint_resolution_state, ServiceBehaviour::Hangs);
    endpoint_resolution_state
        .connector
        .set(Arc::new(FakeConnector::unresponsive()));
    Ok(())
}

#[given("Podman is installed with a default machine connection")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult for consistency"
)]
fn podman_with_machine_connection(
    endpoint_resolution_state: &EndpointResolutionState,
) -> StepResult<()> {
    let connection = RemoteConnection {
        name: String::from("podman-machine-default"),
        uri: String::from(MACHINE_URI),
        identity: String::from("/Users/dev/.local/share/containers/podman/machine/machine"),
        is_default: true,
    };
    endpoint_resolution_state
        .podman
        .set(Arc::new(FakePodman::installed(
            ServiceBehaviour::StopsOnTerminate,
            vec![connection],
        )));
    Ok(())
}

#[given("the platform spawns a private service")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult for consistency"
)]
fn platform_spawns_service(endpoint_resolution_state: &EndpointResolutionState) -> StepResult<()> {
    endpoint_resolution_state
        .strategy
        .set(AlternateStrategy::SpawnService);
    Ok(())
}

#[given("the platform uses the default machine connection")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult for consistency"
)]
fn platform_uses_machine(endpoint_resolution_state: &EndpointResolutionState) -> StepResult<()> {
    endpoint_resolution_state
        .strategy
        .set(AlternateStrategy::RemoteMachine);
    Ok(())
}

fn install_podman(state: &EndpointResolutionState, behaviour: ServiceBehaviour) {
    state
        .podman
        .set(Arc::new(FakePodman::installed(behaviour, Vec::new())));
}

// =============================================================================
// When step definitions
// =============================================================================

#[when("the endpoint is resolved")]
fn the_endpoint_is_resolved(endpoint_resolution_state: &EndpointResolutionState) -> StepResult<()> {
    let state = endpoint_resolution_state;
    let connector = state
        .connector
        .get()
        .ok_or("connector should be initialised")?;
    let tunneler = state
        .tunneler
        .get()
        .ok_or("tunneler should be initialised")?;
    let default_host = state
        .default_host
        .get()
        .unwrap_or_else(|| String::from(MISSING_SOCKET));

    let config = ResolverConfig {
        docker_host: state.docker_host.get(),
        ssh_passphrase: state.passphrase.get().map(SecretString::from),
        ..ResolverConfig::default()
    };
    let mut resolver = EndpointResolver::new(config).with_transport(
        TransportBuilder::new()
            .with_connector(connector.clone())
            .with_tunneler(tunneler),
    );
    if let Some(podman) = state.podman.get() {
        let supervisor = ServiceSupervisor::new(podman.clone())
            .with_connector(connector)
            .with_timings(SupervisorTimings {
                poll_interval: Duration::from_millis(10),
                poll_attempts: 40,
                startup_timeout: Duration::from_millis(300),
                shutdown_grace: Duration::from_millis(50),
            });
        resolver = resolver.with_alternate(podman, supervisor);
    }
    if let Some(strategy) = state.strategy.get() {
        resolver = resolver.with_strategy(strategy);
    }

    let rt = Arc::new(
        tokio::runtime::Runtime::new()
            .map_err(|error| format!("failed to create tokio runtime: {error}"))?,
    );
    let outcome = match rt.block_on(resolver.resolve(&default_host)) {
        Ok(engine) => ResolutionOutcome::Resolved(Arc::new(engine)),
        Err(error) => ResolutionOutcome::Failed {
            kind: classify(&error),
            message: error.to_string(),
        },
    };

    state.runtime.set(rt);
    state.outcome.set(outcome);
    Ok(())
}

fn classify(error: &PodlinkError) -> FailureKind {
    match error {
        PodlinkError::Engine(engine) if engine.is_service_not_ready() => {
            FailureKind::ServiceNotReady
        }
        _ if error.is_no_engine() => FailureKind::NoEngine,
        _ => FailureKind::Other,
    }
}

#[when("the client is closed twice")]
fn the_client_is_closed_twice(
    endpoint_resolution_state: &EndpointResolutionState,
) -> StepResult<()> {
    let engine = endpoint_resolution_state.resolved()?;
    let rt = endpoint_resolution_state.runtime()?;

    let (first, second) = rt.block_on(async {
        let first = engine.client.close().await;
        let second = engine.client.close().await;
        (first, second)
    });

    endpoint_resolution_state
        .closes_succeeded
        .set(first.is_ok() && second.is_ok());
    Ok(())
}
