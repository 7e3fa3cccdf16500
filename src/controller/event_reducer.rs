//! Input event reducer
//!
//! Folds the live event stream into the shared [`ControlState`]. Runs as its
//! own task for the whole session and exits only on cancellation or when the
//! device disappears.
//!
//! # Shared state
//!
//! The reducer and the control loop share one mutex-guarded [`ControlState`].
//! A batch is applied under a single short lock, but the loop may still
//! observe a gesture half applied (intent updated, steering not yet). That is
//! accepted: every field is a scalar that is valid on its own at all times,
//! and the loop runs on a human reaction timescale.

use crate::controller::event_source::{EventSource, InputEvent, SourceError};
use crate::controller::profile::ControllerProfile;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PRESSED: i32 = 1;

/// Raw axis samples inside this band are the stick resting at center
const STEER_NEUTRAL: std::ops::RangeInclusive<i32> = 127..=128;

/// Live control state of the session
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlState {
    /// Net count of held forward (+1) and backward (-1) inputs
    pub accel_intent: i32,
    pub cruise_engaged: bool,
    /// Mirrors the brake button, not a toggle
    pub emergency_stop: bool,
    /// Steering in [-1, 1]
    pub steer: f64,
    /// Written only by the control loop
    pub velocity: f64,
}

pub type SharedControlState = Arc<Mutex<ControlState>>;

pub fn shared_state() -> SharedControlState {
    Arc::new(Mutex::new(ControlState::default()))
}

/// Events applied by the reducer, drained by the control loop's stats
pub type EventCounter = Arc<AtomicU64>;

/// Linear remap of a raw 0..=255 axis sample onto [-1, 1]
pub fn steer_from_raw(value: i32) -> f64 {
    (f64::from(value) / 128.0 - 1.0).clamp(-1.0, 1.0)
}

/// Applies one event to the state. Returns false for events the profile
/// does not use.
pub fn reduce(profile: &ControllerProfile, state: &mut ControlState, event: &InputEvent) -> bool {
    match *event {
        InputEvent::Button { code, value } if code == profile.forward_code => {
            if value == PRESSED {
                state.accel_intent += 1;
            } else {
                state.accel_intent -= 1;
            }
            info!("Accel intent: {}", state.accel_intent);
            true
        }
        InputEvent::Button { code, value } if code == profile.backward_code => {
            if value == PRESSED {
                state.accel_intent -= 1;
            } else {
                state.accel_intent += 1;
            }
            info!("Accel intent: {}", state.accel_intent);
            true
        }
        InputEvent::Button { code, value } if code == profile.cruise_code => {
            if value == PRESSED {
                state.cruise_engaged = !state.cruise_engaged;
                info!("Cruise control toggled to: {}", state.cruise_engaged);
            }
            true
        }
        InputEvent::Button { code, value } if code == profile.brake_code => {
            state.emergency_stop = value == PRESSED;
            // Any brake activity cancels cruise, press or release
            state.cruise_engaged = false;
            if state.emergency_stop {
                warn!("Emergency brake engaged");
            } else {
                info!("Emergency brake released");
            }
            true
        }
        InputEvent::Axis { code, value } if code == profile.steer_axis_code => {
            if !STEER_NEUTRAL.contains(&value) {
                debug!("Steering axis {} moved to {}", code, value);
            }
            state.steer = steer_from_raw(value);
            true
        }
        _ => false,
    }
}

/// Long-lived task that drains an [`EventSource`] into the shared state
pub struct EventReducer<S: EventSource> {
    profile: ControllerProfile,
    source: S,
    state: SharedControlState,
    reduced: EventCounter,
}

impl<S: EventSource> EventReducer<S> {
    pub fn new(profile: ControllerProfile, source: S, state: SharedControlState) -> Self {
        Self {
            profile,
            source,
            state,
            reduced: EventCounter::default(),
        }
    }

    pub fn counter(&self) -> EventCounter {
        self.reduced.clone()
    }

    /// Reduces batches until cancelled or the source fails.
    ///
    /// Returning drops the source, which releases the device handle.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), SourceError> {
        info!("Starting event reducer for {}", self.profile.display_name);
        let mut total: u64 = 0;

        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Event reducer stopped after {} events", total);
                    return Ok(());
                }
                batch = self.source.next_batch() => batch?,
            };

            let mut applied = 0;
            let mut state = self.state.lock().await;
            for event in &batch {
                if reduce(&self.profile, &mut state, event) {
                    applied += 1;
                } else {
                    debug!("Ignoring event {:?}", event);
                }
            }
            drop(state);

            total += applied;
            self.reduced.fetch_add(applied, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::event_source::testing::ScriptedSource;
    use crate::controller::profile::ProfileRegistry;

    fn dualsense() -> ControllerProfile {
        *ProfileRegistry::builtin().unwrap().lookup("dualsense").unwrap()
    }

    fn button(code: u16, value: i32) -> InputEvent {
        InputEvent::Button { code, value }
    }

    fn apply_all(events: &[InputEvent]) -> ControlState {
        let profile = dualsense();
        let mut state = ControlState::default();
        for event in events {
            reduce(&profile, &mut state, event);
        }
        state
    }

    #[test]
    fn intent_counts_held_directional_inputs() {
        let p = dualsense();

        let state = apply_all(&[button(p.forward_code, 1)]);
        assert_eq!(state.accel_intent, 1);

        let state = apply_all(&[button(p.backward_code, 1)]);
        assert_eq!(state.accel_intent, -1);

        // Both held cancel out
        let state = apply_all(&[button(p.forward_code, 1), button(p.backward_code, 1)]);
        assert_eq!(state.accel_intent, 0);

        let state = apply_all(&[
            button(p.forward_code, 1),
            button(p.backward_code, 1),
            button(p.forward_code, 0),
        ]);
        assert_eq!(state.accel_intent, -1);
    }

    #[test]
    fn press_and_release_restores_intent() {
        let p = dualsense();
        let state = apply_all(&[
            button(p.forward_code, 1),
            button(p.forward_code, 0),
            button(p.backward_code, 1),
            button(p.backward_code, 0),
        ]);
        assert_eq!(state.accel_intent, 0);
    }

    #[test]
    fn cruise_toggles_only_on_press() {
        let p = dualsense();

        let state = apply_all(&[button(p.cruise_code, 1)]);
        assert!(state.cruise_engaged);

        let state = apply_all(&[button(p.cruise_code, 1), button(p.cruise_code, 0)]);
        assert!(state.cruise_engaged);

        let state = apply_all(&[
            button(p.cruise_code, 1),
            button(p.cruise_code, 0),
            button(p.cruise_code, 1),
            button(p.cruise_code, 0),
        ]);
        assert!(!state.cruise_engaged);
    }

    #[test]
    fn brake_mirrors_button_and_clears_cruise() {
        let p = dualsense();

        let state = apply_all(&[button(p.cruise_code, 1), button(p.brake_code, 1)]);
        assert!(state.emergency_stop);
        assert!(!state.cruise_engaged);

        let state = apply_all(&[button(p.brake_code, 1), button(p.brake_code, 0)]);
        assert!(!state.emergency_stop);
    }

    #[test]
    fn brake_release_also_clears_cruise() {
        let p = dualsense();
        let state = apply_all(&[
            button(p.brake_code, 1),
            button(p.cruise_code, 1),
            button(p.brake_code, 0),
        ]);
        assert!(!state.cruise_engaged);
        assert!(!state.emergency_stop);
    }

    #[test]
    fn steering_maps_raw_axis_linearly() {
        assert_eq!(steer_from_raw(0), -1.0);
        assert_eq!(steer_from_raw(64), -0.5);
        assert_eq!(steer_from_raw(128), 0.0);
        assert_eq!(steer_from_raw(192), 0.5);
        assert!((steer_from_raw(255) - 0.9921875).abs() < 1e-12);
    }

    #[test]
    fn steering_axis_event_updates_state() {
        let p = dualsense();
        let state = apply_all(&[InputEvent::Axis {
            code: p.steer_axis_code,
            value: 32,
        }]);
        assert_eq!(state.steer, -0.75);
    }

    #[test]
    fn unrelated_events_are_ignored() {
        let p = dualsense();
        let mut state = ControlState::default();

        assert!(!reduce(&p, &mut state, &button(305, 1)));
        assert!(!reduce(&p, &mut state, &InputEvent::Axis { code: 1, value: 0 }));
        assert_eq!(state, ControlState::default());
    }

    #[test]
    fn reducer_never_touches_velocity() {
        let p = dualsense();
        let mut state = ControlState {
            velocity: 0.25,
            ..ControlState::default()
        };
        for event in [
            button(p.forward_code, 1),
            button(p.brake_code, 1),
            button(p.cruise_code, 1),
            InputEvent::Axis {
                code: p.steer_axis_code,
                value: 0,
            },
        ] {
            reduce(&p, &mut state, &event);
        }
        assert_eq!(state.velocity, 0.25);
    }

    #[tokio::test]
    async fn run_applies_batches_then_reports_device_loss() {
        let p = dualsense();
        let state = shared_state();
        let source = ScriptedSource::new(vec![
            vec![button(p.forward_code, 1), button(p.cruise_code, 1), button(305, 1)],
            vec![InputEvent::Axis {
                code: p.steer_axis_code,
                value: 255,
            }],
        ]);

        let reducer = EventReducer::new(p, source, state.clone());
        let counter = reducer.counter();
        let result = reducer.run(CancellationToken::new()).await;

        assert!(matches!(result, Err(SourceError::DeviceLost { .. })));
        assert_eq!(counter.load(Ordering::Relaxed), 3);
        let state = *state.lock().await;
        assert_eq!(state.accel_intent, 1);
        assert!(state.cruise_engaged);
        assert!(state.steer > 0.99);
    }

    #[tokio::test]
    async fn run_stops_cleanly_on_cancel() {
        let p = dualsense();
        let state = shared_state();
        let source = ScriptedSource::new(vec![vec![button(p.backward_code, 1)]]).held_open();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(EventReducer::new(p, source, state.clone()).run(cancel.clone()));
        while state.lock().await.accel_intent != -1 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();

        assert!(task.await.unwrap().is_ok());
        assert_eq!(state.lock().await.accel_intent, -1);
    }
}
