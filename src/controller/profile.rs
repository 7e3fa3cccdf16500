//! Controller profile registry
//!
//! Maps a controller-type key to the evdev codes used for driving and the
//! name fragment used to find the device. Supporting a new controller means
//! adding one entry to [`BUILTIN_PROFILES`].

use std::collections::BTreeMap;
use tracing::debug;

/// evdev event code (`EV_KEY` button code or `EV_ABS` axis code)
pub type EventCode = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerProfile {
    pub forward_code: EventCode,
    pub backward_code: EventCode,
    pub cruise_code: EventCode,
    pub brake_code: EventCode,
    pub steer_axis_code: EventCode,

    /// Lower-case fragment of the kernel device name
    pub match_name: &'static str,
    pub display_name: &'static str,
}

impl ControllerProfile {
    /// Case-insensitive check against an input device name
    pub fn matches_device(&self, device_name: &str) -> bool {
        device_name
            .to_lowercase()
            .contains(&self.match_name.to_lowercase())
    }
}

pub const BUILTIN_PROFILES: &[(&str, ControllerProfile)] = &[(
    "dualsense",
    ControllerProfile {
        // BTN_TR2 and BTN_TL2
        forward_code: 313,
        backward_code: 312,
        // BTN_NORTH (triangle)
        cruise_code: 307,
        // BTN_SOUTH (cross)
        brake_code: 304,
        // ABS_X, left stick
        steer_axis_code: 0,
        match_name: "dualsense",
        display_name: "PlayStation 5 DualSense",
    },
)];

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProfileError {
    #[error("Unknown controller type '{requested}', known types: {known}")]
    UnknownType { requested: String, known: String },

    #[error("Controller type '{0}' is registered more than once")]
    DuplicateType(String),
}

#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: BTreeMap<&'static str, ControllerProfile>,
}

impl ProfileRegistry {
    pub fn builtin() -> Result<Self, ProfileError> {
        Self::from_entries(BUILTIN_PROFILES)
    }

    /// Builds a registry, rejecting keys that appear twice
    pub fn from_entries(
        entries: &[(&'static str, ControllerProfile)],
    ) -> Result<Self, ProfileError> {
        let mut profiles = BTreeMap::new();
        for (key, profile) in entries {
            if profiles.insert(*key, *profile).is_some() {
                return Err(ProfileError::DuplicateType(key.to_string()));
            }
        }
        debug!("Profile registry holds {} controller types", profiles.len());
        Ok(Self { profiles })
    }

    pub fn lookup(&self, controller_type: &str) -> Result<&ControllerProfile, ProfileError> {
        self.profiles
            .get(controller_type)
            .ok_or_else(|| ProfileError::UnknownType {
                requested: controller_type.to_string(),
                known: self.known_types().join(", "),
            })
    }

    /// Registered keys in sorted order
    pub fn known_types(&self) -> Vec<&'static str> {
        self.profiles.keys().copied().collect()
    }
}
