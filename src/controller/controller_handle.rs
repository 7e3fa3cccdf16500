//! Controller Handle - lifecycle of one teleoperation session
//!
//! Spawns the event reducer and the control loop around a shared
//! [`ControlState`](super::event_reducer::ControlState) and supervises them
//! until the session ends, either by a termination request or by losing the
//! input device.

use crate::actuator::command::{CommandEmitter, CommandSink};
use crate::config::RoverConfig;
use crate::controller::control_loop::{run_control_loop, ControlLoop, LoopSettings};
use crate::controller::event_reducer::{shared_state, EventReducer, SharedControlState};
use crate::controller::event_source::{EventSource, SourceError};
use crate::controller::profile::{ControllerProfile, ProfileError};
use std::future::Future;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Settings for the session's control loop
///
/// # Examples
///
/// ```rust
/// use rovercontroller::controller::ControllerSettings;
/// use std::time::Duration;
///
/// let settings = ControllerSettings {
///     max_speed: 0.3,
///     tick_interval: Duration::from_millis(100),
/// };
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Clone, Debug)]
pub struct ControllerSettings {
    /// Symmetric throttle bound, must be positive
    pub max_speed: f64,

    /// Control loop period
    ///
    /// 100ms is fast enough for a human driver and keeps the actuator topic
    /// at a modest rate.
    pub tick_interval: Duration,
}

impl ControllerSettings {
    pub fn validate(&self) -> Result<(), ControllerError> {
        if !self.max_speed.is_finite() || self.max_speed <= 0.0 {
            return Err(ControllerError::InitializationError(format!(
                "max speed must be positive, got {}",
                self.max_speed
            )));
        }
        if self.tick_interval.is_zero() {
            return Err(ControllerError::InitializationError(
                "tick interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<&RoverConfig> for ControllerSettings {
    fn from(config: &RoverConfig) -> Self {
        Self {
            max_speed: config.max_speed,
            tick_interval: config.tick_interval(),
        }
    }
}

/// Errors that end a session or prevent it from starting
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// The controller type is not in the registry
    #[error("Profile error: {0}")]
    ProfileError(#[from] ProfileError),

    /// The input device could not be opened or went away
    ///
    /// Never retried: a severed link ends the session.
    #[error("Input device error: {0}")]
    SourceError(#[from] SourceError),

    /// A session task panicked or was aborted
    #[error("Task error: {0}")]
    TaskError(String),

    /// Invalid settings handed to [`ControllerHandle::spawn`]
    #[error("Initialization error: {0}")]
    InitializationError(String),
}

/// Handle for a running session
///
/// # Threading Model
///
/// Two tokio tasks share the control state:
/// 1. **Reducer**: waits on the input device and folds events into the state
/// 2. **Control loop**: wakes every tick, integrates velocity and emits
///
/// Both observe the same [`CancellationToken`]. The reducer owns the event
/// source, so the device handle is released when that task ends.
pub struct ControllerHandle {
    state: SharedControlState,
    reducer: JoinHandle<Result<(), SourceError>>,
    control: JoinHandle<()>,
    cancel: CancellationToken,
}

impl ControllerHandle {
    /// Spawns the reducer and the control loop
    ///
    /// # Arguments
    ///
    /// * `profile` - Event codes of the connected controller
    /// * `settings` - Control loop bounds and period
    /// * `source` - Live input events of the connected controller
    /// * `sink` - Actuator transport receiving one command per tick
    /// * `cancel` - Token that ends both tasks
    ///
    /// # Errors
    ///
    /// [`ControllerError::InitializationError`] if the settings are invalid.
    /// Nothing is spawned in that case.
    pub fn spawn<S, K>(
        profile: ControllerProfile,
        settings: ControllerSettings,
        source: S,
        sink: K,
        cancel: CancellationToken,
    ) -> Result<Self, ControllerError>
    where
        S: EventSource + 'static,
        K: CommandSink + 'static,
    {
        info!(
            "Initializing controller session for {} with settings: {:?}",
            profile.display_name, settings
        );
        settings.validate()?;

        let state = shared_state();
        debug!("Created shared control state");

        info!("Spawning event reducer");
        let reducer = EventReducer::new(profile, source, state.clone());
        let reduced = reducer.counter();
        let reducer = tokio::spawn(reducer.run(cancel.clone()));

        info!("Spawning control loop");
        let control = ControlLoop::create(
            state.clone(),
            LoopSettings {
                max_speed: settings.max_speed,
                tick_interval: settings.tick_interval,
            },
        );
        let control = tokio::spawn(run_control_loop(
            control,
            CommandEmitter::new(sink),
            reduced,
            cancel.clone(),
        ));

        info!("Controller session started");
        Ok(Self {
            state,
            reducer,
            control,
            cancel,
        })
    }

    pub fn state(&self) -> SharedControlState {
        self.state.clone()
    }

    /// Runs the session until `terminate` resolves or the device is lost.
    ///
    /// Termination is a clean exit. Device loss is returned as an error after
    /// the control loop has been stopped.
    pub async fn supervise<F>(mut self, terminate: F) -> Result<(), ControllerError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            joined = &mut self.reducer => {
                self.cancel.cancel();
                if let Err(e) = self.control.await {
                    error!("Control loop task failed: {}", e);
                }
                match joined {
                    Ok(Ok(())) => {
                        info!("Event reducer finished");
                        Ok(())
                    }
                    Ok(Err(e)) => {
                        error!("Failed to read events: {}", e);
                        Err(e.into())
                    }
                    Err(e) => Err(ControllerError::TaskError(e.to_string())),
                }
            }
            _ = terminate => {
                info!("Termination requested, stopping controller session");
                self.cancel.cancel();
                let reducer = self.reducer.await;
                let control = self.control.await;
                debug!("Input device released");
                shutdown_outcome(reducer, control)
            }
        }
    }
}

/// Folds the joined tasks of a terminated session into its result
fn shutdown_outcome(
    reducer: Result<Result<(), SourceError>, JoinError>,
    control: Result<(), JoinError>,
) -> Result<(), ControllerError> {
    match (reducer, control) {
        (Err(e), _) | (_, Err(e)) => Err(ControllerError::TaskError(e.to_string())),
        // A read error racing with cancellation no longer ends the session
        (Ok(Err(e)), Ok(())) => {
            warn!("Event reducer failed during shutdown: {}", e);
            Ok(())
        }
        (Ok(Ok(())), Ok(())) => Ok(()),
    }
}
