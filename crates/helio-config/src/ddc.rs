//! DDC transport tuning
//!
//! Fault thresholds and severities are empirically tuned, so they are
//! settings rather than constants.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdcConfig {
    /// Global toggle; off turns every write into a no-op
    #[serde(default = "default_true")]
    pub apply: bool,

    /// "auto", "i2c", "ddcutil" or "mock"
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default = "default_amd_delay")]
    pub amd_delay_ms: u64,

    #[serde(default = "default_delay")]
    pub default_delay_ms: u64,

    #[serde(default = "default_failure_delay")]
    pub failure_delay_ms: u64,

    #[serde(default = "default_max_read_faults")]
    pub max_read_faults: u32,

    #[serde(default = "default_max_write_faults")]
    pub max_write_faults: u32,

    #[serde(default = "default_failure_severity")]
    pub failure_severity: u32,

    #[serde(default = "default_timeout_severity")]
    pub timeout_severity: u32,

    /// Consecutive faults that mark brightness or volume as failed
    #[serde(default = "default_failed_streak")]
    pub failed_streak: u32,

    #[serde(default = "default_max_read_duration")]
    pub max_read_duration_ms: u64,

    #[serde(default = "default_max_write_duration")]
    pub max_write_duration_ms: u64,

    /// Seconds to keep DDC suspended after the screens wake
    #[serde(default)]
    pub wake_hold_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_backend() -> String {
    "auto".to_string()
}

fn default_amd_delay() -> u64 {
    30
}

fn default_delay() -> u64 {
    1
}

fn default_failure_delay() -> u64 {
    100
}

fn default_max_read_faults() -> u32 {
    10
}

fn default_max_write_faults() -> u32 {
    20
}

fn default_failure_severity() -> u32 {
    1
}

fn default_timeout_severity() -> u32 {
    4
}

fn default_failed_streak() -> u32 {
    3
}

fn default_max_read_duration() -> u64 {
    1500
}

fn default_max_write_duration() -> u64 {
    2000
}

impl Default for DdcConfig {
    fn default() -> Self {
        Self {
            apply: true,
            backend: default_backend(),
            amd_delay_ms: default_amd_delay(),
            default_delay_ms: default_delay(),
            failure_delay_ms: default_failure_delay(),
            max_read_faults: default_max_read_faults(),
            max_write_faults: default_max_write_faults(),
            failure_severity: default_failure_severity(),
            timeout_severity: default_timeout_severity(),
            failed_streak: default_failed_streak(),
            max_read_duration_ms: default_max_read_duration(),
            max_write_duration_ms: default_max_write_duration(),
            wake_hold_secs: 0,
        }
    }
}

impl DdcConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_read_faults == 0 || self.max_write_faults == 0 {
            return Err(ConfigError::Invalid("fault thresholds must be at least 1".to_string()));
        }
        if self.failure_severity == 0 || self.timeout_severity == 0 {
            return Err(ConfigError::Invalid("fault severities must be at least 1".to_string()));
        }
        if !matches!(self.backend.as_str(), "auto" | "i2c" | "ddcutil" | "mock") {
            return Err(ConfigError::Invalid(format!("unknown DDC backend {:?}", self.backend)));
        }
        Ok(())
    }

    pub fn max_read_duration(&self) -> Duration {
        Duration::from_millis(self.max_read_duration_ms)
    }

    pub fn max_write_duration(&self) -> Duration {
        Duration::from_millis(self.max_write_duration_ms)
    }

    pub fn amd_delay(&self) -> Duration {
        Duration::from_millis(self.amd_delay_ms)
    }

    pub fn default_delay(&self) -> Duration {
        Duration::from_millis(self.default_delay_ms)
    }

    pub fn failure_delay(&self) -> Duration {
        Duration::from_millis(self.failure_delay_ms)
    }

    pub fn wake_hold(&self) -> Duration {
        Duration::from_secs(self.wake_hold_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_tuned_constants() {
        let ddc = DdcConfig::default();
        assert_eq!(ddc.max_read_faults, 10);
        assert_eq!(ddc.max_write_faults, 20);
        assert_eq!(ddc.timeout_severity, 4 * ddc.failure_severity);
        assert_eq!(ddc.max_read_duration(), Duration::from_millis(1500));
        assert_eq!(ddc.failure_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_validate() {
        let mut ddc = DdcConfig::default();
        assert!(ddc.validate().is_ok());
        ddc.backend = "serial".to_string();
        assert!(ddc.validate().is_err());
        ddc.backend = "mock".to_string();
        ddc.max_read_faults = 0;
        assert!(ddc.validate().is_err());
    }
}
