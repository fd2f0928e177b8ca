//! Runtime settings for the input mapping core.
//!
//! Settings are read from `config.toml` in the platform config directory
//! (`~/.config/padmap/config.toml` on Linux). Every field has a default, and a
//! missing or unreadable file degrades to the defaults rather than preventing
//! startup.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub timing: TimingSettings,
    pub calibration: CalibrationSettings,
    pub rumble: RumbleSettings,
    pub driver: DriverSettings,
}

/// Press, hold and repeat timing for key handlers.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TimingSettings {
    /// Hold time before a held key starts repeating
    pub hold_timeout_ms: u32,
    /// Minimum interval between two repeats
    pub repeat_timeout_ms: u32,
    /// Magnitude at which an analog input counts as pressed
    pub digital_threshold: f32,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            hold_timeout_ms: 500,
            repeat_timeout_ms: 50,
            digital_threshold: 0.5,
        }
    }
}

/// Thresholds used while learning new primitives.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Normalized axis position that counts as a deliberate activation
    pub activation_threshold: f32,
    /// Delay before an anomalous trigger activation is committed
    pub trigger_delay_ms: u64,
    /// Minimum time between two learned primitives
    pub mapping_cooldown_ms: u64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            activation_threshold: 0.75,
            trigger_delay_ms: 200,
            mapping_cooldown_ms: 50,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RumbleSettings {
    pub test_duration_ms: u64,
    pub notification_duration_ms: u64,
    pub notification_magnitude: f32,
}

impl Default for RumbleSettings {
    fn default() -> Self {
        Self {
            test_duration_ms: 1000,
            notification_duration_ms: 300,
            notification_magnitude: 1.0,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DriverSettings {
    pub poll_interval_ms: u64,
    /// Stick positions below this are reported as 0
    pub joystick_deadzone: f32,
    pub keymap_path: Option<PathBuf>,
    pub rumble_test_on_connect: bool,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            joystick_deadzone: 0.05,
            keymap_path: None,
            rumble_test_on_connect: false,
        }
    }
}

impl Settings {
    /// Default location of the settings file.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("padmap").join("config.toml"))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading settings from {}", path.display());
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Loads settings from [`Settings::config_path`], falling back to defaults.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::config_path() else {
            warn!("No config directory available, using default settings");
            return Self::default();
        };

        if !path.exists() {
            info!("No settings at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load(&path) {
            Ok(settings) => {
                info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                warn!("Unable to load settings, using defaults: {}", e);
                Self::default()
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.timing.digital_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "timing.digital_threshold must be in (0, 1], got {}",
                threshold
            )));
        }

        let activation = self.calibration.activation_threshold;
        if !(activation > 0.0 && activation <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "calibration.activation_threshold must be in (0, 1], got {}",
                activation
            )));
        }

        let deadzone = self.driver.joystick_deadzone;
        if !(0.0..1.0).contains(&deadzone) {
            return Err(ConfigError::Invalid(format!(
                "driver.joystick_deadzone must be in [0, 1), got {}",
                deadzone
            )));
        }

        if self.driver.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "driver.poll_interval_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
