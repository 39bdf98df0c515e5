//! Config file change notification
//!
//! Watches the directory holding the config file (editors usually replace
//! the file rather than write it in place) and reports events for that file
//! only.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};

use crate::ConfigError;

/// Events the settings provider publishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsEvent {
    /// The file was written or replaced and should be reloaded
    Changed(PathBuf),
    /// The file disappeared; the last loaded settings stay in effect
    Removed(PathBuf),
}

/// Keeps the underlying watcher alive; dropping it stops notifications
pub struct ConfigWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching `path`, calling `on_event` from the watcher thread
    pub fn watch<F>(path: &Path, on_event: F) -> Result<Self, ConfigError>
    where
        F: Fn(SettingsEvent) + Send + 'static,
    {
        let target = path.to_path_buf();
        let file_name = target.file_name().map(|n| n.to_os_string());
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let reported = target.clone();
        let mut watcher: RecommendedWatcher = Watcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let touches_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if !touches_file {
                        return;
                    }
                    match event.kind {
                        EventKind::Modify(_) | EventKind::Create(_) => {
                            on_event(SettingsEvent::Changed(reported.clone()))
                        }
                        EventKind::Remove(_) => on_event(SettingsEvent::Removed(reported.clone())),
                        _ => {}
                    }
                }
                Err(e) => tracing::warn!("Config watch error: {}", e),
            },
            notify::Config::default(),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!("Watching {} for changes", target.display());

        Ok(Self {
            path: target,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn test_reports_changes_to_watched_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();

        let (tx, rx) = channel();
        let watcher = ConfigWatcher::watch(&path, move |event| {
            let _ = tx.send(event);
        })
        .unwrap();
        assert_eq!(watcher.path(), path);

        std::fs::write(dir.path().join("unrelated.txt"), "x").unwrap();
        std::fs::write(&path, "[ddc]\napply = false\n").unwrap();

        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event, SettingsEvent::Changed(path));
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let result = ConfigWatcher::watch(Path::new("/nonexistent/helio/config.toml"), |_| {});
        assert!(matches!(result, Err(ConfigError::Watch(_))));
    }
}
