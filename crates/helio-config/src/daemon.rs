//! Daemon loop timing and display filters

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds between scheduled re-adaptations
    #[serde(default = "default_adapt_interval")]
    pub adapt_interval_secs: u64,

    /// Milliseconds between reference samples in sync mode
    #[serde(default = "default_sync_poll")]
    pub sync_poll_ms: u64,

    #[serde(default = "default_poll_secs")]
    pub session_poll_secs: u64,

    #[serde(default = "default_poll_secs")]
    pub topology_poll_secs: u64,

    /// Window that coalesces bursts of topology notifications
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Write settings changed at runtime back to the config file
    #[serde(default = "default_true")]
    pub persist: bool,

    #[serde(default)]
    pub include_virtual: bool,

    #[serde(default)]
    pub include_projectors: bool,

    #[serde(default)]
    pub include_airplay: bool,

    #[serde(default)]
    pub include_dummy: bool,
}

fn default_adapt_interval() -> u64 {
    60
}

fn default_sync_poll() -> u64 {
    1000
}

fn default_poll_secs() -> u64 {
    2
}

fn default_debounce() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            adapt_interval_secs: default_adapt_interval(),
            sync_poll_ms: default_sync_poll(),
            session_poll_secs: default_poll_secs(),
            topology_poll_secs: default_poll_secs(),
            debounce_ms: default_debounce(),
            persist: true,
            include_virtual: false,
            include_projectors: false,
            include_airplay: false,
            include_dummy: false,
        }
    }
}

impl DaemonConfig {
    pub fn adapt_interval(&self) -> Duration {
        Duration::from_secs(self.adapt_interval_secs.max(1))
    }

    pub fn sync_poll(&self) -> Duration {
        Duration::from_millis(self.sync_poll_ms.max(50))
    }

    pub fn session_poll(&self) -> Duration {
        Duration::from_secs(self.session_poll_secs.max(1))
    }

    pub fn topology_poll(&self) -> Duration {
        Duration::from_secs(self.topology_poll_secs.max(1))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let daemon = DaemonConfig::default();
        assert_eq!(daemon.adapt_interval(), Duration::from_secs(60));
        assert_eq!(daemon.sync_poll(), Duration::from_secs(1));
        assert_eq!(daemon.debounce(), Duration::from_secs(1));
        assert!(!daemon.include_dummy);
    }

    #[test]
    fn test_intervals_never_zero() {
        let daemon = DaemonConfig {
            adapt_interval_secs: 0,
            sync_poll_ms: 0,
            ..DaemonConfig::default()
        };
        assert!(!daemon.adapt_interval().is_zero());
        assert!(!daemon.sync_poll().is_zero());
    }
}
