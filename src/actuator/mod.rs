//! # Actuator output
//!
//! Everything on the outbound side of the control loop:
//!
//! ```text
//! actuator/
//! ├── command.rs    - VehicleCommand, CommandSink trait, CommandEmitter
//! └── mqtt_sink.rs  - MQTT transport publishing commands as JSON
//! ```
//!
//! Delivery is fire-and-forget. A rejected command is logged and dropped
//! because a stale throttle value is worse than a missing one.

pub mod command;
pub mod mqtt_sink;

pub use command::{CommandEmitter, CommandSink, SinkError, VehicleCommand, SENSOR_ID};
pub use mqtt_sink::MqttSink;
