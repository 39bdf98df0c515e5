//! Integration tests for discovery and the fault-gated transport

use helio_hal::mock::MockBackend;
use helio_hal::{
    ControlId, Direction, DisplayDirectory, DisplayFilter, DisplayId, FaultPolicy, SysfsDisplays,
    Transport, TransportError, TransportPolicy,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Fake `/sys/class/drm` tree
struct DrmTestEnv {
    #[allow(dead_code)]
    temp_dir: TempDir,
    drm_dir: PathBuf,
}

impl DrmTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let drm_dir = temp_dir.path().join("drm");
        fs::create_dir_all(drm_dir.join("card0/device")).unwrap();
        fs::write(drm_dir.join("card0/device/vendor"), "0x8086\n").unwrap();

        Self { temp_dir, drm_dir }
    }

    fn connector(&self, name: &str, id: u32, bus: u32, edid: Option<Vec<u8>>) -> PathBuf {
        let path = self.drm_dir.join(format!("card0-{}", name));
        fs::create_dir_all(path.join(format!("i2c-{}", bus))).unwrap();
        fs::write(path.join("status"), "connected\n").unwrap();
        fs::write(path.join("connector_id"), format!("{}\n", id)).unwrap();
        if let Some(edid) = edid {
            fs::write(path.join("edid"), edid).unwrap();
        }
        path
    }

    fn disconnect(&self, connector: &Path) {
        fs::write(connector.join("status"), "disconnected\n").unwrap();
    }
}

fn descriptor(edid: &mut [u8], offset: usize, tag: u8, text: &str) {
    edid[offset..offset + 5].copy_from_slice(&[0, 0, 0, tag, 0]);
    let mut field = [0x20u8; 13];
    field[..text.len()].copy_from_slice(text.as_bytes());
    if text.len() < 13 {
        field[text.len()] = 0x0A;
    }
    edid[offset + 5..offset + 18].copy_from_slice(&field);
}

fn edid(name: &str, serial: &str) -> Vec<u8> {
    let mut edid = vec![0u8; 128];
    edid[..8].copy_from_slice(&[0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00]);
    // "GSM"
    edid[8] = 0x1E;
    edid[9] = 0x6D;
    edid[10..12].copy_from_slice(&0x5B7Fu16.to_le_bytes());
    edid[16] = 20;
    edid[17] = 31;
    edid[18] = 1;
    edid[19] = 4;
    descriptor(&mut edid, 72, 0xFC, name);
    descriptor(&mut edid, 90, 0xFF, serial);
    edid
}

fn transport(mock: &MockBackend) -> Transport {
    Transport::new(
        Arc::new(mock.clone()),
        TransportPolicy {
            default_delay: Duration::ZERO,
            failure_delay: Duration::ZERO,
            ..TransportPolicy::default()
        },
        FaultPolicy::default(),
    )
}

#[test]
fn test_sysfs_discovery_to_ddc_write() {
    let env = DrmTestEnv::new();
    env.connector("eDP-1", 80, 2, Some(edid("Built-in", "PANEL")));
    env.connector("DP-1", 90, 5, Some(edid("LG ULTRAFINE", "ABC123")));
    env.connector("HDMI-A-1", 91, 6, None);

    let mock = MockBackend::new();
    let transport = transport(&mock);
    let directory = DisplayDirectory::new(
        Arc::new(SysfsDisplays::new(&env.drm_dir)),
        DisplayFilter::default(),
    );

    let diff = directory.enumerate(&transport).unwrap();
    assert_eq!(diff.added, vec![DisplayId(90), DisplayId(91)]);

    let lg = directory.find("LG ULTRAFINE").unwrap();
    assert!(lg.serial.contains("ABC123"));
    assert_eq!(lg.i2c_bus, Some(5));

    let hdmi = directory.get(DisplayId(91)).unwrap();
    assert_eq!(hdmi.name, "HDMI-A-1");

    transport.write(lg.id, ControlId::Brightness, 35).unwrap();
    assert_eq!(mock.value(lg.id, ControlId::Brightness.code()), Some(35));
    assert_eq!(transport.displays(), vec![DisplayId(90), DisplayId(91)]);
}

#[test]
fn test_fault_storm_is_contained_to_one_display() {
    let env = DrmTestEnv::new();
    env.connector("DP-1", 1, 1, Some(edid("MONITOR A", "A1")));
    env.connector("DP-2", 2, 2, Some(edid("MONITOR B", "B2")));

    let mock = MockBackend::new();
    let transport = transport(&mock);
    let directory = DisplayDirectory::new(
        Arc::new(SysfsDisplays::new(&env.drm_dir)),
        DisplayFilter::default(),
    );
    directory.enumerate(&transport).unwrap();

    let (a, b) = (DisplayId(1), DisplayId(2));
    let code = ControlId::Brightness.code();
    transport.read(a, ControlId::Brightness).unwrap();
    mock.fail_reads(a, code, true);

    for _ in 0..11 {
        assert!(transport.read(a, ControlId::Brightness).is_err());
    }
    assert!(transport.faults().is_skipped(a, ControlId::Brightness, Direction::Read));

    let calls = mock.read_calls(a);
    assert!(matches!(
        transport.read(a, ControlId::Brightness),
        Err(TransportError::Skipped { .. })
    ));
    assert_eq!(mock.read_calls(a), calls);

    // The neighbour still works and has no recorded faults
    assert_eq!(transport.read(b, ControlId::Brightness).unwrap().current_value, 50);
    assert_eq!(transport.faults().faults(b, ControlId::Brightness, Direction::Read), 0);
    assert!(!transport.faults().flags(b).brightness_failed);

    // Reset and re-enumerate leaves the skip-set empty
    transport.faults().reset(Some(a));
    directory.enumerate(&transport).unwrap();
    assert!(!transport.faults().is_skipped(a, ControlId::Brightness, Direction::Read));
}

#[test]
fn test_unplug_and_replug() {
    let env = DrmTestEnv::new();
    let dp = env.connector("DP-1", 7, 3, Some(edid("DELL U2720Q", "XYZ")));

    let mock = MockBackend::new();
    let transport = transport(&mock);
    let directory = DisplayDirectory::new(
        Arc::new(SysfsDisplays::new(&env.drm_dir)),
        DisplayFilter::default(),
    );
    directory.enumerate(&transport).unwrap();
    let serial = directory.get(DisplayId(7)).unwrap().serial;

    env.disconnect(&dp);
    let diff = directory.enumerate(&transport).unwrap();
    assert_eq!(diff.removed, vec![DisplayId(7)]);
    assert!(matches!(
        transport.read(DisplayId(7), ControlId::Brightness),
        Err(TransportError::NoChannel(DisplayId(7)))
    ));

    env.connector("DP-1", 7, 3, Some(edid("DELL U2720Q", "XYZ")));
    let diff = directory.enumerate(&transport).unwrap();
    assert_eq!(diff.added, vec![DisplayId(7)]);
    assert_eq!(directory.by_serial(&serial).unwrap().id, DisplayId(7));
}

#[test]
fn test_edid_over_ddc_when_sysfs_has_none() {
    let env = DrmTestEnv::new();
    env.connector("DP-1", 12, 4, None);
    env.connector("DP-2", 13, 5, None);

    let mock = MockBackend::new();
    mock.add_display(DisplayId(12));
    mock.set_edid(DisplayId(12), edid("BENQ PD2700U", "PD27"));
    mock.add_display(DisplayId(13));
    mock.set_edid(DisplayId(13), edid("VIRTUAL MON", "V1"));

    let transport = transport(&mock);
    let directory = DisplayDirectory::new(
        Arc::new(SysfsDisplays::new(&env.drm_dir)),
        DisplayFilter::default(),
    );

    let diff = directory.enumerate(&transport).unwrap();
    assert_eq!(diff.added, vec![DisplayId(12)]);
    let benq = directory.get(DisplayId(12)).unwrap();
    assert_eq!(benq.name, "BENQ PD2700U");
    assert!(benq.serial.contains("PD27"));

    // The excluded output is not left registered
    assert_eq!(transport.displays(), vec![DisplayId(12)]);

    // Known outputs keep the EDID read on connection
    mock.set_edid(DisplayId(12), edid("OTHER", "X"));
    directory.enumerate(&transport).unwrap();
    assert_eq!(directory.get(DisplayId(12)).unwrap().name, "BENQ PD2700U");
}
