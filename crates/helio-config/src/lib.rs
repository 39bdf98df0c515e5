//! Configuration management for Helio
//!
//! Handles DDC tuning, adaptive brightness parameters, per-display ranges,
//! application offsets and daemon timing. Everything lives in one TOML file
//! and every field has a default, so a partial file is always valid.

mod adaptive;
mod daemon;
mod ddc;
mod watcher;

pub use adaptive::{
    AdaptiveConfig, AdaptiveMode, AppException, BrightnessRange, DisplaySettings, Geolocation,
};
pub use daemon::DaemonConfig;
pub use ddc::DdcConfig;
pub use watcher::{ConfigWatcher, SettingsEvent};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "HELIO_CONFIG";
pub const SYSTEM_CONFIG_DIR: &str = "/etc/helio";
pub const CONFIG_FILE: &str = "config.toml";

/// Main Helio configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelioConfig {
    #[serde(default)]
    pub ddc: DdcConfig,

    #[serde(default)]
    pub adaptive: AdaptiveConfig,

    /// Coordinates for location mode; absent until a provider supplies them
    #[serde(default)]
    pub location: Option<Geolocation>,

    #[serde(default)]
    pub displays: Vec<DisplaySettings>,

    #[serde(default)]
    pub apps: Vec<AppException>,

    #[serde(default)]
    pub daemon: DaemonConfig,
}

impl HelioConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Candidate config files, most specific first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(explicit) = std::env::var_os(CONFIG_ENV) {
            paths.push(PathBuf::from(explicit));
        }
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("helio").join(CONFIG_FILE));
        }
        if let Some(home) = std::env::var_os("HOME") {
            paths.push(PathBuf::from(home).join(".config/helio").join(CONFIG_FILE));
        }
        paths.push(Path::new(SYSTEM_CONFIG_DIR).join(CONFIG_FILE));
        paths
    }

    /// The first config file that exists
    pub fn find() -> Option<PathBuf> {
        Self::search_paths().into_iter().find(|p| p.exists())
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Some(path) = Self::find() {
            tracing::info!("Loading configuration from {}", path.display());
            return Self::load(&path);
        }

        tracing::warn!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Where settings changed at runtime are written
    pub fn user_path() -> PathBuf {
        Self::search_paths()
            .into_iter()
            .next()
            .unwrap_or_else(|| Path::new(SYSTEM_CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        tracing::info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.adaptive.validate()?;
        self.ddc.validate()?;
        if let Some(location) = &self.location {
            location.validate()?;
        }
        for display in &self.displays {
            display
                .range
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("display {}: {}", display.serial, e)))?;
        }
        Ok(())
    }

    /// Settings stored for a display serial
    pub fn display(&self, serial: &str) -> Option<&DisplaySettings> {
        self.displays.iter().find(|d| d.serial == serial)
    }

    /// Range for a display serial, falling back to the default range
    pub fn range_for(&self, serial: &str) -> BrightnessRange {
        self.display(serial)
            .map(|d| d.range)
            .unwrap_or(self.adaptive.default_range)
    }

    /// Store a range for a display, adding the display if it is new
    pub fn set_range(&mut self, serial: &str, name: &str, range: BrightnessRange) {
        match self.displays.iter_mut().find(|d| d.serial == serial) {
            Some(display) => display.range = range,
            None => self.displays.push(DisplaySettings {
                serial: serial.to_string(),
                name: name.to_string(),
                range,
            }),
        }
    }

    pub fn app(&self, identifier: &str) -> Option<&AppException> {
        self.apps.iter().find(|a| a.identifier == identifier)
    }
}

/// Helper function to merge TOML values
pub fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                if let Some(base_value) = base_table.get_mut(&key) {
                    merge_toml(base_value, value);
                } else {
                    base_table.insert(key, value);
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Apply a partial TOML document on top of a configuration
pub fn apply_overlay(config: &HelioConfig, overlay: &str) -> Result<HelioConfig, ConfigError> {
    let mut base = toml::Value::try_from(config)?;
    let overlay: toml::Value = toml::from_str(overlay)?;
    merge_toml(&mut base, overlay);
    let merged: HelioConfig = base.try_into()?;
    merged.validate()?;
    Ok(merged)
}
