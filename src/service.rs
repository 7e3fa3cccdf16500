//! Service runtime: wires configuration, pairing, input device and actuator
//! into one controller session and tears it down again.

use crate::actuator::CommandSink;
use crate::config::RoverConfig;
use crate::controller::{
    ControllerError, ControllerHandle, ControllerProfile, ControllerSettings, EventSource,
    ProfileError, ProfileRegistry, SourceError,
};
use crate::pairing::{PairingError, PairingService};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error("Pairing failed: {0}")]
    Pairing(#[from] PairingError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Controller(#[from] ControllerError),
}

/// Runs one teleoperation session to completion.
///
/// # Arguments
///
/// * `config` - Validated service configuration
/// * `pairing` - Brings the controller link up and down
/// * `open_source` - Opens the input device for the resolved profile
/// * `open_sink` - Creates the actuator transport, bound to the session token
/// * `terminate` - Resolves when the runtime asks the service to stop
///
/// # Errors
///
/// Unknown controller types, pairing and device discovery failures are
/// returned before anything is spawned. Losing the device mid-session is
/// returned after the session has been stopped. Once the controller is
/// connected it is disconnected again on every path, errors included.
pub async fn run_session<P, S, K, O, M, F>(
    config: &RoverConfig,
    pairing: &P,
    open_source: O,
    open_sink: M,
    terminate: F,
) -> Result<(), ServiceError>
where
    P: PairingService,
    S: EventSource + 'static,
    K: CommandSink + 'static,
    O: FnOnce(&ControllerProfile) -> Result<S, SourceError>,
    M: FnOnce(CancellationToken) -> K,
    F: Future<Output = ()>,
{
    let registry = ProfileRegistry::builtin()?;
    let profile = *registry.lookup(&config.controller_type)?;
    info!("Using controller profile: {}", profile.display_name);

    if config.pairing.enabled {
        pairing.connect(&config.controller_address).await?;
    } else {
        info!("Pairing disabled, expecting the controller to be connected already");
    }

    let outcome = run_connected(config, profile, open_source, open_sink, terminate).await;

    // The link is up from here on, every exit path releases it
    on_terminate(config, pairing).await;
    outcome
}

async fn run_connected<S, K, O, M, F>(
    config: &RoverConfig,
    profile: ControllerProfile,
    open_source: O,
    open_sink: M,
    terminate: F,
) -> Result<(), ServiceError>
where
    S: EventSource + 'static,
    K: CommandSink + 'static,
    O: FnOnce(&ControllerProfile) -> Result<S, SourceError>,
    M: FnOnce(CancellationToken) -> K,
    F: Future<Output = ()>,
{
    let source = open_source(&profile)?;

    let cancel = CancellationToken::new();
    let sink = open_sink(cancel.child_token());
    let handle = match ControllerHandle::spawn(
        profile,
        ControllerSettings::from(config),
        source,
        sink,
        cancel.clone(),
    ) {
        Ok(handle) => handle,
        Err(e) => {
            cancel.cancel();
            return Err(e.into());
        }
    };

    let outcome = handle.supervise(terminate).await;
    cancel.cancel();
    outcome.map_err(ServiceError::from)
}

/// Releases the controller link. Failures are logged, shutdown continues.
pub async fn on_terminate<P: PairingService>(config: &RoverConfig, pairing: &P) {
    if !config.pairing.enabled {
        return;
    }
    if let Err(e) = pairing.disconnect(&config.controller_address).await {
        error!("Failed to disconnect controller: {}", e);
    }
}
