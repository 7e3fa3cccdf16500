//! Controller subsystem: from raw gamepad input to a bounded velocity
//!
//! 1. [`profile`] - Event codes per controller type
//! 2. [`event_source`] - Raw input batches from the device
//! 3. [`event_reducer`] - Folds events into the shared control state
//! 4. [`control_loop`] - Fixed-rate control law and command emission
//! 5. [`controller_handle`] - Session lifecycle around the two tasks
//!
//! # Architecture
//!
//! ```text
//! Device ──► EventSource ──► Reducer ──► ControlState ──► ControlLoop ──► CommandSink
//!            (batches)       (task)      (mutex)          (100ms tick)
//! ```

pub mod control_loop;
pub mod controller_handle;
pub mod event_reducer;
pub mod event_source;
pub mod profile;

pub use control_loop::{next_velocity, ControlLoop, LoopSettings};
pub use controller_handle::{ControllerError, ControllerHandle, ControllerSettings};
pub use event_reducer::{
    reduce, steer_from_raw, ControlState, EventCounter, EventReducer, SharedControlState,
};
pub use event_source::{EvdevSource, EventSource, InputEvent, SourceError};
pub use profile::{ControllerProfile, ProfileError, ProfileRegistry};
