//! Per-application offsets
//!
//! Running applications are tracked in start order. The newest one that
//! has an offset record decides the offsets.

use helio_config::AppException;

use crate::engine::Offsets;

#[derive(Debug, Clone, Default)]
pub struct RunningApps {
    /// Oldest first
    identifiers: Vec<String>,
}

impl RunningApps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the running set, keeping the start order of apps that were
    /// already running and appending new ones; returns true on change
    pub fn update<I, S>(&mut self, running: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let running: Vec<String> = running.into_iter().map(Into::into).collect();
        let mut next: Vec<String> = self
            .identifiers
            .iter()
            .filter(|id| running.contains(id))
            .cloned()
            .collect();
        for id in running {
            if !next.contains(&id) {
                next.push(id);
            }
        }
        let changed = next != self.identifiers;
        self.identifiers = next;
        changed
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    /// The app whose offsets apply right now
    pub fn active<'a>(&self, apps: &'a [AppException]) -> Option<&'a AppException> {
        self.identifiers
            .iter()
            .rev()
            .find_map(|id| apps.iter().find(|app| &app.identifier == id))
    }

    pub fn offsets(&self, apps: &[AppException]) -> Offsets {
        self.active(apps)
            .map(|app| Offsets {
                brightness: app.brightness,
                contrast: app.contrast,
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apps() -> Vec<AppException> {
        vec![
            AppException::new("mpv", "mpv"),
            AppException {
                identifier: "darktable".to_string(),
                name: "darktable".to_string(),
                brightness: -10,
                contrast: 5,
            },
        ]
    }

    #[test]
    fn test_newest_app_with_record_wins() {
        let mut running = RunningApps::new();
        running.update(["firefox", "mpv"]);
        running.update(["firefox", "mpv", "darktable", "bash"]);
        assert_eq!(
            running.offsets(&apps()),
            Offsets {
                brightness: -10,
                contrast: 5
            }
        );

        running.update(["firefox", "mpv", "bash"]);
        assert_eq!(running.offsets(&apps()).brightness, 30);
    }

    #[test]
    fn test_start_order_is_kept() {
        let mut running = RunningApps::new();
        running.update(["a", "b"]);
        assert!(running.update(["c", "b", "a"]));
        assert_eq!(running.identifiers(), ["a", "b", "c"]);
        assert!(!running.update(["a", "b", "c"]));
    }

    #[test]
    fn test_no_record_means_no_offset() {
        let mut running = RunningApps::new();
        running.update(["bash"]);
        assert_eq!(running.offsets(&apps()), Offsets::default());
        assert!(running.active(&apps()).is_none());
    }
}
