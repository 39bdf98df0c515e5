//! Adaptive brightness settings
//!
//! Mode selection, curve parameters, per-display ranges, geolocation and
//! per-application offsets.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ConfigError;

/// Which algorithm produces target values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdaptiveMode {
    /// Follow the sun
    #[default]
    Location,
    /// Follow the reference display
    Sync,
    /// Whatever the user last set
    Manual,
}

impl AdaptiveMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "location" | "sun" => Some(Self::Location),
            "sync" => Some(Self::Sync),
            "manual" | "off" => Some(Self::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for AdaptiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Location => "location",
            Self::Sync => "sync",
            Self::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Interpolation codomain for one display, in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrightnessRange {
    pub min_brightness: u8,
    pub max_brightness: u8,
    pub min_contrast: u8,
    pub max_contrast: u8,
}

impl Default for BrightnessRange {
    fn default() -> Self {
        Self {
            min_brightness: 0,
            max_brightness: 100,
            min_contrast: 50,
            max_contrast: 75,
        }
    }
}

impl BrightnessRange {
    pub fn new(min_brightness: u8, max_brightness: u8, min_contrast: u8, max_contrast: u8) -> Self {
        Self {
            min_brightness,
            max_brightness,
            min_contrast,
            max_contrast,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (label, min, max) in [
            ("brightness", self.min_brightness, self.max_brightness),
            ("contrast", self.min_contrast, self.max_contrast),
        ] {
            if max > 100 {
                return Err(ConfigError::Invalid(format!("max {} {} is above 100", label, max)));
            }
            if min > max {
                return Err(ConfigError::Invalid(format!(
                    "min {} {} is above max {}",
                    label, min, max
                )));
            }
        }
        Ok(())
    }
}

/// Curve parameters and the default mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    #[serde(default)]
    pub mode: AdaptiveMode,

    /// Exponent applied to the ramp position
    #[serde(default = "default_interpolation_factor")]
    pub interpolation_factor: f64,

    /// Minutes the ramp extends past civil sunrise and sunset
    #[serde(default = "default_daylight_extension")]
    pub daylight_extension_minutes: i64,

    /// Width of the plateau around solar noon
    #[serde(default = "default_noon_duration")]
    pub noon_duration_minutes: i64,

    /// Range given to displays without settings of their own
    #[serde(default)]
    pub default_range: BrightnessRange,
}

fn default_interpolation_factor() -> f64 {
    2.0
}

fn default_daylight_extension() -> i64 {
    180
}

fn default_noon_duration() -> i64 {
    240
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            mode: AdaptiveMode::default(),
            interpolation_factor: default_interpolation_factor(),
            daylight_extension_minutes: default_daylight_extension(),
            noon_duration_minutes: default_noon_duration(),
            default_range: BrightnessRange::default(),
        }
    }
}

impl AdaptiveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.interpolation_factor.is_finite() && self.interpolation_factor > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "interpolation factor must be positive, got {}",
                self.interpolation_factor
            )));
        }
        if self.daylight_extension_minutes < 0 || self.noon_duration_minutes < 0 {
            return Err(ConfigError::Invalid(
                "daylight extension and noon duration cannot be negative".to_string(),
            ));
        }
        self.default_range.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl Geolocation {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-90.0..=90.0).contains(&self.latitude) || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ConfigError::Invalid(format!(
                "coordinates out of range: {}, {}",
                self.latitude, self.longitude
            )));
        }
        Ok(())
    }
}

/// Stored settings for one display, keyed by its serial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySettings {
    pub serial: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub range: BrightnessRange,
}

/// Offsets a running application adds on top of the adaptive values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppException {
    /// Process or desktop identifier
    pub identifier: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_brightness_offset")]
    pub brightness: i8,
    #[serde(default = "default_contrast_offset")]
    pub contrast: i8,
}

fn default_brightness_offset() -> i8 {
    30
}

fn default_contrast_offset() -> i8 {
    20
}

impl AppException {
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            brightness: default_brightness_offset(),
            contrast: default_contrast_offset(),
        }
    }
}
