//! Service configuration loaded from a TOML file at startup.
//!
//! Every value in here is read once. A missing or invalid required value is a
//! fatal error and the control loop is never started.

use crate::controller::control_loop::DEFAULT_TICK_INTERVAL;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Environment variable that overrides the config file location
pub const CONFIG_PATH_ENV: &str = "ROVERCONTROLLER_CONFIG";

const CONFIG_DIR: &str = "rovercontroller";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No configuration directory available on this system")]
    NoConfigDir,

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Top level service configuration
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RoverConfig {
    /// Bluetooth address of the controller, opaque to everything but pairing
    pub controller_address: String,

    /// Key into the controller profile registry
    pub controller_type: String,

    /// Symmetric bound on the emitted throttle
    pub max_speed: f64,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub pairing: PairingConfig,

    #[serde(default)]
    pub actuator: ActuatorConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct PairingConfig {
    /// Wired controllers skip bluetoothctl entirely
    pub enabled: bool,

    /// Pause after pairing and connecting so the input node can appear
    pub settle_ms: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            settle_ms: 2000,
        }
    }
}

/// MQTT broker the vehicle commands are published to
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct ActuatorConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            topic: "rover/decision".to_string(),
            client_id: "rovercontroller".to_string(),
            keep_alive_secs: 5,
        }
    }
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL.as_millis() as u64
}

fn default_log_level() -> String {
    "info".to_string()
}

impl RoverConfig {
    /// Resolves the config file location.
    ///
    /// The environment override wins, otherwise the file lives in the
    /// platform config directory. Runs before logging is set up, so the
    /// caller reports the result.
    pub fn resolve_path() -> Result<PathBuf, ConfigError> {
        Self::resolve_path_from(std::env::var_os(CONFIG_PATH_ENV), dirs::config_dir())
    }

    fn resolve_path_from(
        override_path: Option<OsString>,
        config_dir: Option<PathBuf>,
    ) -> Result<PathBuf, ConfigError> {
        if let Some(path) = override_path {
            return Ok(PathBuf::from(path));
        }

        let mut path = config_dir.ok_or(ConfigError::NoConfigDir)?;
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        Ok(path)
    }

    /// Reads, parses and validates the config file
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values serde cannot express as types
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.controller_address.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "controller-address",
                reason: "must not be empty".to_string(),
            });
        }

        if self.controller_type.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "controller-type",
                reason: "must not be empty".to_string(),
            });
        }

        if !self.max_speed.is_finite() || self.max_speed <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "max-speed",
                reason: format!("must be a positive number, got {}", self.max_speed),
            });
        }

        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "tick-interval-ms",
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.actuator.topic.is_empty() {
            return Err(ConfigError::Invalid {
                key: "actuator.topic",
                reason: "must not be empty".to_string(),
            });
        }

        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<Level, ConfigError> {
        Level::from_str(&self.log_level).map_err(|e| ConfigError::Invalid {
            key: "log-level",
            reason: e.to_string(),
        })
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
