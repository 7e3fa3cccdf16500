//! Gamepad teleoperation for a differential-drive rover.
//!
//! Raw button/axis events from a paired controller are reduced into a shared
//! control state, integrated into a bounded velocity on a fixed tick and
//! published to the actuator as timestamped commands.

pub mod actuator;
pub mod config;
pub mod controller;
pub mod pairing;
pub mod service;
