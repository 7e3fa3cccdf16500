use crate::actuator::command::{CommandEmitter, CommandSink};
use crate::controller::event_reducer::{ControlState, EventCounter, SharedControlState};
use chrono::{DateTime, Local};
use statum::{machine, state};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Velocity gained per tick for each unit of accel intent
pub const INTENT_GAIN: f64 = 0.01;

/// Coasting friction applied while no direction is held
pub const COAST_DECAY: f64 = 0.6;

/// Velocities closer to zero than this snap to exactly zero
pub const SNAP_THRESHOLD: f64 = 0.01;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

const STATS_INTERVAL_SECS: i64 = 30;

/// The control law, evaluated once per tick.
///
/// 1. Emergency stop wins over everything: velocity is 0.
/// 2. Without cruise the intent is integrated, and with no intent held the
///    velocity decays towards zero.
/// 3. With cruise the previous velocity is held.
/// 4. Anything inside the snap band becomes 0.
/// 5. The result is clamped to `[-max_speed, max_speed]`.
pub fn next_velocity(state: &ControlState, max_speed: f64) -> f64 {
    if state.emergency_stop {
        return 0.0;
    }

    let mut velocity = state.velocity;
    if !state.cruise_engaged {
        velocity += f64::from(state.accel_intent) * INTENT_GAIN;
        if state.accel_intent == 0 {
            velocity *= COAST_DECAY;
        }
    }

    if velocity.abs() < SNAP_THRESHOLD {
        velocity = 0.0;
    }

    velocity.clamp(-max_speed, max_speed)
}

#[derive(Clone, Debug)]
pub struct LoopSettings {
    pub max_speed: f64,
    pub tick_interval: Duration,
}

/// What a tick hands to the emitter
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickOutput {
    pub steer: f64,
    pub velocity: f64,
}

#[state]
#[derive(Debug, Clone)]
pub enum TickState {
    Waiting,
    Integrating(ControlState),
    Emitting(TickOutput),
}

/// One pass through the states is one tick:
/// `Waiting -> Integrating -> Emitting -> Waiting`.
#[machine]
#[derive(Debug)]
pub struct ControlLoop<S: TickState> {
    shared: SharedControlState,
    settings: LoopSettings,
}

impl<S: TickState> ControlLoop<S> {
    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }
}

impl ControlLoop<Waiting> {
    pub fn create(shared: SharedControlState, settings: LoopSettings) -> Self {
        info!(
            "Creating control loop: max speed {}, tick {}ms",
            settings.max_speed,
            settings.tick_interval.as_millis()
        );
        Self::new(shared, settings)
    }

    /// Takes a copy of the shared state for this tick
    pub async fn sample(self) -> ControlLoop<Integrating> {
        let snapshot = *self.shared.lock().await;
        self.transition_with(snapshot)
    }
}

impl ControlLoop<Integrating> {
    /// Applies the control law and stores the new velocity
    pub async fn integrate(self) -> ControlLoop<Emitting> {
        let snapshot = match self.get_state_data() {
            Some(snapshot) => *snapshot,
            None => {
                warn!("No state snapshot in Integrating state, holding still");
                ControlState::default()
            }
        };

        let velocity = next_velocity(&snapshot, self.settings.max_speed);
        self.shared.lock().await.velocity = velocity;

        debug!("SPEED: {:.4}. STEER: {:.4}.", velocity, snapshot.steer);
        self.transition_with(TickOutput {
            steer: snapshot.steer,
            velocity,
        })
    }
}

impl ControlLoop<Emitting> {
    pub fn emit<K: CommandSink>(self, emitter: &mut CommandEmitter<K>) -> ControlLoop<Waiting> {
        if let Some(output) = self.get_state_data() {
            emitter.emit(output.steer, output.velocity);
        } else {
            warn!("No tick output in Emitting state, skipping emission");
        }
        self.transition()
    }
}

/// Counters behind the periodic stats line
struct LoopStats {
    ticks: u64,
    since: DateTime<Local>,
    reduced: EventCounter,
}

impl LoopStats {
    fn new(reduced: EventCounter, now: DateTime<Local>) -> Self {
        Self {
            ticks: 0,
            since: now,
            reduced,
        }
    }

    /// Logs and resets all counters once the stats interval has passed
    fn report_if_due<K: CommandSink>(
        &mut self,
        now: DateTime<Local>,
        emitter: &mut CommandEmitter<K>,
    ) -> bool {
        let elapsed = now - self.since;
        if elapsed <= chrono::Duration::seconds(STATS_INTERVAL_SECS) {
            return false;
        }

        info!(
            "Control loop stats: {} ticks, {} events, {} emitted, {} failed in {} seconds",
            self.ticks,
            self.reduced.swap(0, Ordering::Relaxed),
            emitter.emitted(),
            emitter.failed(),
            elapsed.num_seconds()
        );
        self.ticks = 0;
        emitter.reset_counters();
        self.since = now;
        true
    }
}

/// Runs ticks until cancelled.
///
/// Missed ticks are skipped rather than replayed, so a slow emission never
/// produces a burst of catch-up commands. `reduced` is the reducer's event
/// counter, reported alongside the loop's own stats.
pub async fn run_control_loop<K: CommandSink>(
    mut control: ControlLoop<Waiting>,
    mut emitter: CommandEmitter<K>,
    reduced: EventCounter,
    cancel: CancellationToken,
) {
    let period = control.settings().tick_interval;
    info!("Starting control loop with {}ms interval", period.as_millis());

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut stats = LoopStats::new(reduced, Local::now());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Control loop stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        let integrating = control.sample().await;
        let emitting = integrating.integrate().await;
        control = emitting.emit(&mut emitter);
        stats.ticks += 1;

        stats.report_if_due(Local::now(), &mut emitter);
    }
}
