//! Vehicle command message and the emitter that hands it to a sink.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error};

/// Identifies this service as the command source on the actuator bus
pub const SENSOR_ID: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControllerOutput {
    pub steering_angle: f32,
    pub left_throttle: f32,
    pub right_throttle: f32,
    pub front_lights: bool,
}

/// Timestamped command as published to the actuator
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VehicleCommand {
    pub sensor_id: u32,
    /// Wall clock at emission, unix milliseconds
    pub timestamp: u64,
    pub controller_output: ControllerOutput,
}

impl VehicleCommand {
    /// Both throttles carry the same velocity, lights stay off
    pub fn new(steer: f64, velocity: f64, at: DateTime<Utc>) -> Self {
        Self {
            sensor_id: SENSOR_ID,
            timestamp: u64::try_from(at.timestamp_millis()).unwrap_or_default(),
            controller_output: ControllerOutput {
                steering_angle: steer as f32,
                left_throttle: velocity as f32,
                right_throttle: velocity as f32,
                front_lights: false,
            },
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, SinkError> {
        serde_json::to_vec(self).map_err(SinkError::Encode)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Transport rejected command: {0}")]
    Rejected(String),
}

/// Outbound actuator transport.
///
/// `send` must not block the tick; delivery is fire-and-forget.
pub trait CommandSink: Send {
    fn send(&mut self, command: &VehicleCommand) -> Result<(), SinkError>;
}

/// Packages tick output into commands. Failed sends are logged and dropped,
/// never retried or queued.
pub struct CommandEmitter<K: CommandSink> {
    sink: K,
    emitted: u64,
    failed: u64,
}

impl<K: CommandSink> CommandEmitter<K> {
    pub fn new(sink: K) -> Self {
        Self {
            sink,
            emitted: 0,
            failed: 0,
        }
    }

    /// Returns whether the sink accepted the command
    pub fn emit(&mut self, steer: f64, velocity: f64) -> bool {
        let command = VehicleCommand::new(steer, velocity, Utc::now());

        match self.sink.send(&command) {
            Ok(()) => {
                self.emitted += 1;
                debug!("Emitted command at {}", command.timestamp);
                true
            }
            Err(e) => {
                self.failed += 1;
                error!("Failed to send controller output: {}", e);
                false
            }
        }
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn reset_counters(&mut self) {
        self.emitted = 0;
        self.failed = 0;
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FailingSink, RecordingSink};
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn command_carries_steer_and_velocity_on_both_throttles() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let command = VehicleCommand::new(-0.5, 0.25, at);

        assert_eq!(command.sensor_id, SENSOR_ID);
        assert_eq!(command.timestamp, 1_700_000_000_123);
        assert_eq!(command.controller_output.steering_angle, -0.5);
        assert_eq!(command.controller_output.left_throttle, 0.25);
        assert_eq!(command.controller_output.right_throttle, 0.25);
        assert!(!command.controller_output.front_lights);
    }

    #[test]
    fn json_payload_shape() {
        let at = Utc.timestamp_millis_opt(42).unwrap();
        let payload = VehicleCommand::new(0.5, -0.125, at).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();

        assert_eq!(value["sensor_id"], 2);
        assert_eq!(value["timestamp"], 42);
        assert_eq!(value["controller_output"]["steering_angle"], 0.5);
        assert_eq!(value["controller_output"]["left_throttle"], -0.125);
        assert_eq!(value["controller_output"]["right_throttle"], -0.125);
        assert_eq!(value["controller_output"]["front_lights"], false);
    }

    #[test]
    fn emitter_counts_successful_sends() {
        let sink = RecordingSink::default();
        let mut emitter = CommandEmitter::new(sink.clone());

        assert!(emitter.emit(0.0, 0.1));
        assert!(emitter.emit(0.2, 0.3));

        assert_eq!(emitter.emitted(), 2);
        assert_eq!(emitter.failed(), 0);
        let recorded = sink.recorded();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[1].controller_output.steering_angle, 0.2);
    }

    #[test]
    fn emitter_survives_rejected_sends() {
        let mut emitter = CommandEmitter::new(FailingSink);

        assert!(!emitter.emit(0.0, 0.1));
        assert!(!emitter.emit(0.0, 0.1));

        assert_eq!(emitter.failed(), 2);
        emitter.reset_counters();
        assert_eq!(emitter.failed(), 0);
    }
}
