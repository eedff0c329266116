//! Console configuration stored as TOML
//!
//! The file lives at `$WHEELLY_CONFIG` or `<config dir>/wheelly/console.toml`.
//! Every field has a default, so a partial file only overrides what it names.

use crate::controller::ControllerSettings;
use crate::engine::scanner::{DEFAULT_SWEEP_BEARINGS, DEFAULT_SWEEP_INTERVAL};
use crate::engine::{
    AxisMapper, EngineType, ManualSettings, ScannerAngle, ScannerSettings, SweepPolicy,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Environment variable overriding the configuration path
pub const CONFIG_ENV: &str = "WHEELLY_CONFIG";

const CONFIG_DIR: &str = "wheelly";
const CONFIG_FILE: &str = "console.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top level console configuration
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Engine driving the robot
    pub engine: EngineType,

    /// Period of the control loop
    pub control_interval_ms: u64,

    /// Capacity of the outgoing command channel
    pub command_buffer: usize,

    pub joystick: JoystickConfig,
    pub manual: ManualConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct JoystickConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gamepad_name: Option<String>,
    pub deadzone: f32,
    pub event_buffer: usize,
    pub poll_interval_us: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ManualConfig {
    pub speed_levels: u32,
    pub max_speed: f64,
    pub sweep_interval_ms: u64,
    pub sweep_bearings: Vec<ScannerAngle>,
    pub sweep_policy: SweepPolicy,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            engine: EngineType::default(),
            control_interval_ms: 100,
            command_buffer: 100,
            joystick: JoystickConfig::default(),
            manual: ManualConfig::default(),
        }
    }
}

impl Default for JoystickConfig {
    fn default() -> Self {
        let controller = ControllerSettings::default();
        Self {
            gamepad_name: controller.gamepad_name,
            deadzone: controller.joystick_deadzone,
            event_buffer: controller.event_buffer,
            poll_interval_us: controller.poll_interval_us,
        }
    }
}

impl Default for ManualConfig {
    fn default() -> Self {
        let manual = ManualSettings::default();
        Self {
            speed_levels: manual.speed_levels,
            max_speed: manual.max_speed,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL.as_millis() as u64,
            sweep_bearings: DEFAULT_SWEEP_BEARINGS.to_vec(),
            sweep_policy: SweepPolicy::default(),
        }
    }
}

impl ConsoleConfig {
    /// Default location of the configuration file
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Reads and validates the file at `path`
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config: ConsoleConfig = toml::from_str(&content)?;
        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults
    pub async fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        if !exists {
            warn!(
                "Config file {} does not exist, using default",
                path.display()
            );
            return Ok(Self::default());
        }
        Self::load(path).await
    }

    /// Writes the configuration, creating parent directories
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Writes the defaults to `path` unless a file is already there
    pub async fn ensure_default_config(path: &Path) -> Result<(), ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        if exists {
            debug!("Config file {} already present", path.display());
            return Ok(());
        }
        info!("Creating default configuration at {}", path.display());
        Self::default().save(path).await
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "control_interval_ms must be positive".to_string(),
            ));
        }
        if self.command_buffer == 0 {
            return Err(ConfigError::Invalid(
                "command_buffer must be positive".to_string(),
            ));
        }

        let joystick = &self.joystick;
        if !(0.0..1.0).contains(&joystick.deadzone) {
            return Err(ConfigError::Invalid(format!(
                "joystick.deadzone must be in [0, 1), got {}",
                joystick.deadzone
            )));
        }
        if joystick.event_buffer == 0 {
            return Err(ConfigError::Invalid(
                "joystick.event_buffer must be positive".to_string(),
            ));
        }

        let manual = &self.manual;
        AxisMapper::new(manual.speed_levels)
            .map_err(|e| ConfigError::Invalid(format!("manual.speed_levels: {}", e)))?;
        if !manual.max_speed.is_finite() || manual.max_speed <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "manual.max_speed must be positive, got {}",
                manual.max_speed
            )));
        }
        if manual.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "manual.sweep_interval_ms must be positive".to_string(),
            ));
        }
        if manual.sweep_bearings.is_empty() {
            return Err(ConfigError::Invalid(
                "manual.sweep_bearings must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn control_interval(&self) -> Duration {
        Duration::from_millis(self.control_interval_ms)
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            joystick_deadzone: self.joystick.deadzone,
            gamepad_name: self.joystick.gamepad_name.clone(),
            event_buffer: self.joystick.event_buffer,
            poll_interval_us: self.joystick.poll_interval_us,
        }
    }

    pub fn manual_settings(&self) -> ManualSettings {
        ManualSettings {
            speed_levels: self.manual.speed_levels,
            max_speed: self.manual.max_speed,
            scanner: ScannerSettings {
                sweep_bearings: self.manual.sweep_bearings.clone(),
                sweep_interval: Duration::from_millis(self.manual.sweep_interval_ms),
                sweep_policy: self.manual.sweep_policy,
            },
        }
    }
}
