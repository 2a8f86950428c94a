//! Configuration file support for fastr.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/fastr/config.toml`.

use crate::{plans, Error, Result};
use chrono::{FixedOffset, Local, Offset};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub fasting: FastingConfig,

    #[serde(default)]
    pub calendar: CalendarConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Session defaults and tick cadence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FastingConfig {
    #[serde(default = "default_plan")]
    pub default_plan: String,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for FastingConfig {
    fn default() -> Self {
        Self {
            default_plan: default_plan(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// How calendar days are decided for streaks
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct CalendarConfig {
    /// Fixed offset from UTC in minutes; the local offset when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset_minutes: Option<i32>,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".local/share"));
    base.join("fastr")
}

fn default_plan() -> String {
    "16:8".into()
}

fn default_tick_interval_ms() -> u64 {
    1000
}

/// Locations of every durable file under the data directory
#[derive(Clone, Debug, PartialEq)]
pub struct DataPaths {
    pub session: PathBuf,
    pub profile: PathBuf,
    pub context: PathBuf,
    pub journal: PathBuf,
    pub lock: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            session: data_dir.join("session.json"),
            profile: data_dir.join("profile.json"),
            context: data_dir.join("context.json"),
            journal: data_dir.join("fasts.jsonl"),
            lock: data_dir.join("fastr.lock"),
        }
    }
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
        base.join("fastr").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if plans::find_plan(&self.fasting.default_plan).is_none() {
            return Err(Error::Config(format!(
                "Unknown default plan '{}'",
                self.fasting.default_plan
            )));
        }
        if self.fasting.tick_interval_ms == 0 {
            return Err(Error::Config("tick_interval_ms must be positive".into()));
        }
        if let Some(minutes) = self.calendar.utc_offset_minutes {
            if minutes.abs() >= 24 * 60 {
                return Err(Error::Config(format!(
                    "utc_offset_minutes {} is out of range",
                    minutes
                )));
            }
        }
        Ok(())
    }

    pub fn paths(&self) -> DataPaths {
        DataPaths::new(&self.data.data_dir)
    }

    /// Offset used to decide calendar days
    pub fn calendar_offset(&self) -> FixedOffset {
        self.calendar
            .utc_offset_minutes
            .and_then(|minutes| FixedOffset::east_opt(minutes * 60))
            .unwrap_or_else(|| Local::now().offset().fix())
    }
}
