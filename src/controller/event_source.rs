//! Input event source
//!
//! [`EventSource`] yields batches of typed button/axis events in arrival
//! order. [`EvdevSource`] is the production implementation on top of the
//! Linux input subsystem; batches end at `SYN_REPORT`.

use crate::controller::profile::{ControllerProfile, EventCode};
use evdev::{AbsoluteAxisCode, EventStream, EventSummary, KeyCode, SynchronizationCode};
use std::future::Future;
use std::path::PathBuf;
use tracing::{debug, info};

// Kernel key auto-repeat, not a press or release
const KEY_REPEAT: i32 = 2;

/// Raw input event reduced to what the control core needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// value 1 = pressed, 0 = released
    Button { code: EventCode, value: i32 },
    /// value in 0..=255 for the supported profiles
    Axis { code: EventCode, value: i32 },
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("No input device matching '{match_name}' found for {profile}")]
    DeviceNotFound {
        profile: &'static str,
        match_name: &'static str,
    },

    #[error("Failed to open input device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Lost input device {path}: {source}")]
    DeviceLost {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Live stream of controller input.
///
/// `next_batch` suspends until the device reports at least one relevant
/// event. An error means the device is gone and is not retried.
pub trait EventSource: Send {
    fn next_batch(&mut self) -> impl Future<Output = Result<Vec<InputEvent>, SourceError>> + Send;
}

/// evdev backed source bound to one opened controller
pub struct EvdevSource {
    path: PathBuf,
    name: String,
    stream: EventStream,
}

impl EvdevSource {
    /// Opens the first input device whose name matches the profile
    pub fn discover(profile: &ControllerProfile) -> Result<Self, SourceError> {
        for (path, device) in evdev::enumerate() {
            let name = device.name().unwrap_or_default().to_string();
            debug!("Inspecting input device {} ({})", path.display(), name);

            if !profile.matches_device(&name) {
                continue;
            }

            info!("{} detected at {}", profile.display_name, path.display());
            let stream = device
                .into_event_stream()
                .map_err(|source| SourceError::Open {
                    path: path.clone(),
                    source,
                })?;

            return Ok(Self { path, name, stream });
        }

        Err(SourceError::DeviceNotFound {
            profile: profile.display_name,
            match_name: profile.match_name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl EventSource for EvdevSource {
    async fn next_batch(&mut self) -> Result<Vec<InputEvent>, SourceError> {
        let mut batch = Vec::new();

        loop {
            let event = self
                .stream
                .next_event()
                .await
                .map_err(|source| SourceError::DeviceLost {
                    path: self.path.clone(),
                    source,
                })?;

            match event.destructure() {
                EventSummary::Synchronization(_, SynchronizationCode::SYN_REPORT, _) => {
                    if !batch.is_empty() {
                        return Ok(batch);
                    }
                }
                EventSummary::Key(_, KeyCode(code), value) if value != KEY_REPEAT => {
                    batch.push(InputEvent::Button { code, value });
                }
                EventSummary::AbsoluteAxis(_, AbsoluteAxisCode(code), value) => {
                    batch.push(InputEvent::Axis { code, value });
                }
                _ => {}
            }
        }
    }
}
