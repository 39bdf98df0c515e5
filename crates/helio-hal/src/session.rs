//! Power and session state
//!
//! Whether the screens are asleep, the session is locked or the lid is
//! closed. Read from procfs, DRM sysfs and logind.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Snapshot of the power/session booleans
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub screens_asleep: bool,
    pub session_locked: bool,
    pub lid_closed: bool,
}

pub trait SessionProvider: Send + Sync {
    fn state(&self) -> SessionState;
}

/// Reads session state from the running Linux system
#[derive(Debug, Clone)]
pub struct SystemSession {
    lid_dir: PathBuf,
    drm_dir: PathBuf,
    session_id: Option<String>,
}

impl Default for SystemSession {
    fn default() -> Self {
        Self {
            lid_dir: PathBuf::from("/proc/acpi/button/lid"),
            drm_dir: PathBuf::from("/sys/class/drm"),
            session_id: std::env::var("XDG_SESSION_ID").ok(),
        }
    }
}

impl SystemSession {
    pub fn with_paths(lid_dir: impl Into<PathBuf>, drm_dir: impl Into<PathBuf>) -> Self {
        Self {
            lid_dir: lid_dir.into(),
            drm_dir: drm_dir.into(),
            session_id: None,
        }
    }

    /// True if any lid switch reports "closed"
    pub fn lid_closed(&self) -> bool {
        let Ok(entries) = fs::read_dir(&self.lid_dir) else {
            return false;
        };
        entries.flatten().any(|entry| {
            fs::read_to_string(entry.path().join("state"))
                .map(|s| s.contains("closed"))
                .unwrap_or(false)
        })
    }

    /// True if every connected output reports DPMS off
    pub fn screens_asleep(&self) -> bool {
        let Ok(entries) = fs::read_dir(&self.drm_dir) else {
            return false;
        };

        let mut connected = 0;
        let mut asleep = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_connected(&path) {
                continue;
            }
            connected += 1;
            let dpms = fs::read_to_string(path.join("dpms")).unwrap_or_default();
            if dpms.trim().eq_ignore_ascii_case("off") {
                asleep += 1;
            }
        }
        connected > 0 && connected == asleep
    }

    /// Ask logind whether the session is locked
    pub fn session_locked(&self) -> bool {
        let Some(session) = &self.session_id else {
            return false;
        };
        match Command::new("loginctl")
            .args(["show-session", session, "-p", "LockedHint", "--value"])
            .output()
        {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim() == "yes"
            }
            Ok(_) => false,
            Err(e) => {
                tracing::debug!("loginctl unavailable: {}", e);
                false
            }
        }
    }
}

fn is_connected(connector: &Path) -> bool {
    fs::read_to_string(connector.join("status"))
        .map(|s| s.trim() == "connected")
        .unwrap_or(false)
}

impl SessionProvider for SystemSession {
    fn state(&self) -> SessionState {
        SessionState {
            screens_asleep: self.screens_asleep(),
            session_locked: self.session_locked(),
            lid_closed: self.lid_closed(),
        }
    }
}
