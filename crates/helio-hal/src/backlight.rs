//! Reference backlight
//!
//! The built-in panel's backlight is the reference for sync mode. Its level
//! is read from sysfs and reported as a percentage.

use std::fs;
use std::path::{Path, PathBuf};

/// Something whose brightness other displays can follow
pub trait ReferenceSource: Send + Sync {
    /// Current brightness in percent, or `None` when it cannot be sampled
    fn brightness_percent(&self) -> Option<f64>;
}

/// Backlight device under `/sys/class/backlight`
#[derive(Debug, Clone)]
pub struct SysfsBacklight {
    path: PathBuf,
}

impl SysfsBacklight {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Find the first backlight device with brightness control
    pub fn detect() -> Option<Self> {
        Self::detect_in(Path::new("/sys/class/backlight"))
    }

    pub fn detect_in(dir: &Path) -> Option<Self> {
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)
            .ok()?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.join("brightness").exists())
            .collect();
        entries.sort();

        let path = entries.into_iter().next()?;
        tracing::info!("Found reference backlight at {}", path.display());
        Some(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_value(&self, file: &str) -> Option<u32> {
        fs::read_to_string(self.path.join(file))
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }
}

impl ReferenceSource for SysfsBacklight {
    fn brightness_percent(&self) -> Option<f64> {
        let max = self.read_value("max_brightness").filter(|m| *m > 0)?;
        let raw = self
            .read_value("actual_brightness")
            .or_else(|| self.read_value("brightness"))?;

        let percent = f64::from(raw) * 100.0 / f64::from(max);
        if (0.0..=100.0).contains(&percent) {
            Some(percent)
        } else {
            tracing::debug!("Ignoring backlight reading {}/{}", raw, max);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backlight(brightness: &str, max: &str) -> (tempfile::TempDir, SysfsBacklight) {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("intel_backlight");
        fs::create_dir(&device).unwrap();
        fs::write(device.join("brightness"), brightness).unwrap();
        fs::write(device.join("max_brightness"), max).unwrap();
        let found = SysfsBacklight::detect_in(dir.path()).unwrap();
        (dir, found)
    }

    #[test]
    fn test_percent() {
        let (_dir, backlight) = backlight("960\n", "1920\n");
        assert_eq!(backlight.brightness_percent(), Some(50.0));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let (_dir, backlight) = backlight("5000", "1920");
        assert_eq!(backlight.brightness_percent(), None);
    }

    #[test]
    fn test_zero_max_rejected() {
        let (_dir, backlight) = backlight("0", "0");
        assert_eq!(backlight.brightness_percent(), None);
    }

    #[test]
    fn test_detect_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SysfsBacklight::detect_in(dir.path()).is_none());
    }
}
