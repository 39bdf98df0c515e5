//! Display directory
//!
//! Enumerates connected external displays, gives each a stable serial
//! derived from its EDID and keeps the [`Transport`] targets in step with
//! the current topology.

use crate::channel::{ChannelTarget, GpuVendor};
use crate::edid::EdidInfo;
use crate::transport::Transport;
use crate::{DisplayId, HalError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

/// Vendor id placeholder used by headless dummy plugs
pub const DUMMY_VENDOR_ID: u16 = 0xF0F0;

/// Samsung's EDID vendor id; some of its panels report dummy-like names
pub const SAMSUNG_VENDOR_ID: u16 = 19501;

static DUMMY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"dummy|[^u]28e850|^28e850").expect("valid dummy name pattern")
});

/// A connected output as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDisplay {
    pub id: DisplayId,
    /// Connector name, e.g. `DP-1`
    pub connector: String,
    pub edid: Option<Vec<u8>>,
    pub builtin: bool,
    pub i2c_bus: Option<u32>,
    pub gpu_vendor: GpuVendor,
}

/// Source of connected outputs
pub trait PlatformDisplays: Send + Sync {
    fn connected(&self) -> Result<Vec<PlatformDisplay>, HalError>;
}

/// Kinds of outputs excluded unless asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Exclusion {
    Virtual,
    Projector,
    AirPlay,
    Sidecar,
    Dummy,
}

/// Which normally excluded outputs to keep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayFilter {
    pub include_virtual: bool,
    pub include_projectors: bool,
    pub include_airplay: bool,
    pub include_dummy: bool,
}

impl DisplayFilter {
    fn allows(&self, exclusion: Exclusion) -> bool {
        match exclusion {
            Exclusion::Virtual => self.include_virtual,
            Exclusion::Projector => self.include_projectors,
            Exclusion::AirPlay | Exclusion::Sidecar => self.include_airplay,
            Exclusion::Dummy => self.include_dummy,
        }
    }
}

/// Classify an output by its name, connector and EDID vendor id
pub fn classify(name: &str, connector: &str, vendor_id: Option<u16>) -> Option<Exclusion> {
    let name = name.to_lowercase();
    let connector = connector.to_lowercase();

    if name.contains("virtual")
        || name.contains("displaylink")
        || name.contains("luna display")
        || connector.starts_with("virtual")
        || connector.starts_with("writeback")
    {
        return Some(Exclusion::Virtual);
    }
    if ["crestron", "optoma", "epson", "projector"]
        .iter()
        .any(|p| name.contains(p))
    {
        return Some(Exclusion::Projector);
    }
    if name.contains("airplay") {
        return Some(Exclusion::AirPlay);
    }
    if name.contains("sidecar") || name.contains("ipad") {
        return Some(Exclusion::Sidecar);
    }

    let samsung = vendor_id == Some(SAMSUNG_VENDOR_ID);
    if !samsung && (DUMMY_NAME.is_match(&name) || vendor_id == Some(DUMMY_VENDOR_ID)) {
        return Some(Exclusion::Dummy);
    }
    None
}

/// True for connector types that are always built into the machine
pub fn is_builtin_connector(connector: &str) -> bool {
    let kind = connector.split('-').next().unwrap_or_default().to_lowercase();
    matches!(kind.as_str(), "edp" | "lvds" | "dsi")
        || connector.to_lowercase().replace('-', "").contains("builtin")
}

/// A display known to the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayRecord {
    pub id: DisplayId,
    pub serial: String,
    pub name: String,
    pub connector: String,
    pub edid: Option<EdidInfo>,
    pub i2c_bus: Option<u32>,
    pub gpu_vendor: GpuVendor,
    pub active: bool,
}

impl DisplayRecord {
    pub fn channel_target(&self) -> ChannelTarget {
        ChannelTarget {
            display: self.id,
            i2c_bus: self.i2c_bus,
            gpu_vendor: self.gpu_vendor,
        }
    }

    /// False when the display has no DDC bus and can only be controlled in software
    pub fn ddc_capable(&self) -> bool {
        self.i2c_bus.is_some()
    }
}

/// What changed in the last enumeration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyDiff {
    pub added: Vec<DisplayId>,
    pub removed: Vec<DisplayId>,
    pub kept: Vec<DisplayId>,
}

impl TopologyDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Current set of external displays
pub struct DisplayDirectory {
    platform: Arc<dyn PlatformDisplays>,
    filter: RwLock<DisplayFilter>,
    displays: RwLock<BTreeMap<DisplayId, DisplayRecord>>,
}

impl DisplayDirectory {
    pub fn new(platform: Arc<dyn PlatformDisplays>, filter: DisplayFilter) -> Self {
        Self {
            platform,
            filter: RwLock::new(filter),
            displays: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn set_filter(&self, filter: DisplayFilter) {
        *self.filter.write().unwrap_or_else(PoisonError::into_inner) = filter;
    }

    /// Re-read the platform, update transport targets and return the changes.
    ///
    /// Removed displays have their channel, pacing and fault state dropped
    /// from the transport before they are discarded.
    pub fn enumerate(&self, transport: &Transport) -> Result<TopologyDiff, HalError> {
        let filter = *self.filter.read().unwrap_or_else(PoisonError::into_inner);
        let mut records = Vec::new();
        let mut probed = Vec::new();

        for output in self.platform.connected()? {
            if output.builtin || is_builtin_connector(&output.connector) {
                continue;
            }

            let decoded = match output.edid.as_deref() {
                Some(bytes) => Some(EdidInfo::decode(bytes)),
                // Read over DDC once per connection
                None => match self.get(output.id).filter(|r| r.connector == output.connector) {
                    Some(known) => known.edid.map(Ok),
                    None => {
                        probed.push(output.id);
                        ddc_edid(transport, &output).map(|bytes| EdidInfo::decode(&bytes))
                    }
                },
            };
            let edid = match decoded {
                Some(Ok(info)) => Some(info),
                Some(Err(e)) => {
                    tracing::warn!("Ignoring EDID of {}: {}", output.connector, e);
                    None
                }
                None => None,
            };
            let name = edid
                .as_ref()
                .map(EdidInfo::printable_name)
                .unwrap_or_else(|| output.connector.clone());

            let vendor_id = edid.as_ref().map(|e| e.vendor_id);
            if let Some(exclusion) =
                classify(&name, &output.connector, vendor_id).filter(|e| !filter.allows(*e))
            {
                tracing::debug!("Skipping {} ({:?})", name, exclusion);
                continue;
            }

            let serial = edid
                .as_ref()
                .map(EdidInfo::serial_key)
                .unwrap_or_else(|| format!("{}-NO_EDID", output.connector));

            records.push(DisplayRecord {
                id: output.id,
                serial,
                name,
                connector: output.connector,
                edid,
                i2c_bus: output.i2c_bus,
                gpu_vendor: output.gpu_vendor,
                active: true,
            });
        }

        disambiguate_serials(&mut records);

        let mut displays = self.displays.write().unwrap_or_else(PoisonError::into_inner);
        let mut diff = TopologyDiff::default();

        let current: BTreeMap<DisplayId, DisplayRecord> =
            records.into_iter().map(|r| (r.id, r)).collect();

        for id in displays.keys() {
            if !current.contains_key(id) {
                transport.forget(*id);
                diff.removed.push(*id);
            }
        }
        for id in probed {
            if !current.contains_key(&id) && !displays.contains_key(&id) {
                transport.forget(id);
            }
        }
        for (id, record) in &current {
            transport.register(record.channel_target());
            if displays.contains_key(id) {
                diff.kept.push(*id);
            } else {
                tracing::info!(
                    "Display {} connected: {} ({})",
                    id,
                    record.name,
                    record.serial
                );
                diff.added.push(*id);
            }
        }
        for id in &diff.removed {
            if let Some(old) = displays.get(id) {
                tracing::info!("Display {} disconnected: {}", id, old.name);
            }
        }

        *displays = current;
        Ok(diff)
    }

    pub fn displays(&self) -> Vec<DisplayRecord> {
        self.displays
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn get(&self, id: DisplayId) -> Option<DisplayRecord> {
        self.displays
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn by_serial(&self, serial: &str) -> Option<DisplayRecord> {
        self.displays
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|r| r.serial == serial)
            .cloned()
    }

    /// Find a display by id, serial or case-insensitive name
    #[allow(clippy::collapsible_if)] // Avoid if-let chains for MSRV 1.85 compatibility
    pub fn find(&self, query: &str) -> Option<DisplayRecord> {
        if let Ok(id) = query.parse::<u32>() {
            if let Some(record) = self.get(DisplayId(id)) {
                return Some(record);
            }
        }
        let displays = self.displays.read().unwrap_or_else(PoisonError::into_inner);
        displays
            .values()
            .find(|r| r.serial == query)
            .or_else(|| displays.values().find(|r| r.name.eq_ignore_ascii_case(query)))
            .cloned()
    }
}

/// EDID over DDC, for outputs whose platform entry has none
fn ddc_edid(transport: &Transport, output: &PlatformDisplay) -> Option<Vec<u8>> {
    output.i2c_bus?;
    transport.register(ChannelTarget {
        display: output.id,
        i2c_bus: output.i2c_bus,
        gpu_vendor: output.gpu_vendor,
    });
    match transport.read_edid(output.id) {
        Ok(edid) => Some(edid),
        Err(e) => {
            tracing::debug!("No EDID over DDC for {}: {}", output.connector, e);
            None
        }
    }
}

/// Append the platform id to serials shared by identical panels
fn disambiguate_serials(records: &mut [DisplayRecord]) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for record in records.iter() {
        *counts.entry(record.serial.clone()).or_default() += 1;
    }
    for record in records.iter_mut() {
        if counts.get(&record.serial).copied().unwrap_or(0) > 1 {
            record.serial = format!("{}-{}", record.serial, record.id);
        }
    }
}

/// DRM connectors under `/sys/class/drm`
#[derive(Debug, Clone)]
pub struct SysfsDisplays {
    drm_dir: PathBuf,
}

impl Default for SysfsDisplays {
    fn default() -> Self {
        Self::new("/sys/class/drm")
    }
}

impl SysfsDisplays {
    pub fn new(drm_dir: impl Into<PathBuf>) -> Self {
        Self {
            drm_dir: drm_dir.into(),
        }
    }

    fn read_connector(&self, path: &Path, card: &str, connector: &str) -> Option<PlatformDisplay> {
        let status = fs::read_to_string(path.join("status")).ok()?;
        if status.trim() != "connected" {
            return None;
        }

        let edid = fs::read(path.join("edid")).ok().filter(|e| !e.is_empty());
        let id = fs::read_to_string(path.join("connector_id"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or_else(|| stable_hash(&format!("{}-{}", card, connector)));
        let gpu_vendor = fs::read_to_string(self.drm_dir.join(card).join("device/vendor"))
            .map(|s| GpuVendor::from_sysfs(&s))
            .unwrap_or_default();

        Some(PlatformDisplay {
            id: DisplayId(id),
            connector: connector.to_string(),
            edid,
            builtin: is_builtin_connector(connector),
            i2c_bus: i2c_bus(path),
            gpu_vendor,
        })
    }
}

impl PlatformDisplays for SysfsDisplays {
    fn connected(&self) -> Result<Vec<PlatformDisplay>, HalError> {
        let mut outputs = Vec::new();
        if !self.drm_dir.exists() {
            return Ok(outputs);
        }

        let mut entries: Vec<_> = fs::read_dir(&self.drm_dir)?.flatten().collect();
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let file_name = entry.file_name().to_string_lossy().to_string();
            // Connectors are named cardN-TYPE-M
            let Some((card, connector)) = file_name.split_once('-') else {
                continue;
            };
            if !card.starts_with("card") {
                continue;
            }
            if let Some(output) = self.read_connector(&entry.path(), card, connector) {
                outputs.push(output);
            }
        }
        Ok(outputs)
    }
}

/// Bus number from the connector's `ddc` link or an `i2c-N` child
#[allow(clippy::collapsible_if)] // Avoid if-let chains for MSRV 1.85 compatibility
fn i2c_bus(connector: &Path) -> Option<u32> {
    let parse = |name: &str| name.strip_prefix("i2c-").and_then(|n| n.parse().ok());

    if let Ok(target) = fs::read_link(connector.join("ddc")) {
        if let Some(bus) = target.file_name().and_then(|n| parse(&n.to_string_lossy())) {
            return Some(bus);
        }
    }

    fs::read_dir(connector)
        .ok()?
        .flatten()
        .find_map(|e| parse(&e.file_name().to_string_lossy()))
}

/// FNV-1a, stable across runs
fn stable_hash(text: &str) -> u32 {
    text.bytes().fold(0x811C_9DC5u32, |hash, b| {
        (hash ^ u32::from(b)).wrapping_mul(0x0100_0193)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edid::tests::sample_edid;
    use crate::faults::{Direction, FaultPolicy, Severity};
    use crate::mock::{MockBackend, MockPlatform};
    use crate::transport::TransportPolicy;
    use crate::ControlId;

    fn output(id: u32, connector: &str, edid: Option<Vec<u8>>) -> PlatformDisplay {
        PlatformDisplay {
            id: DisplayId(id),
            connector: connector.to_string(),
            edid,
            builtin: false,
            i2c_bus: Some(id),
            gpu_vendor: GpuVendor::Intel,
        }
    }

    fn transport() -> Transport {
        Transport::new(
            Arc::new(MockBackend::new()),
            TransportPolicy::default(),
            FaultPolicy::default(),
        )
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("DisplayLink Dock", "DP-1", None), Some(Exclusion::Virtual));
        assert_eq!(classify("EPSON PJ", "HDMI-A-1", None), Some(Exclusion::Projector));
        assert_eq!(classify("AirPlay TV", "DP-1", None), Some(Exclusion::AirPlay));
        assert_eq!(classify("Sidecar iPad", "DP-1", None), Some(Exclusion::Sidecar));
        assert_eq!(classify("Dummy 4K", "DP-1", None), Some(Exclusion::Dummy));
        assert_eq!(classify("HDMI", "DP-1", Some(DUMMY_VENDOR_ID)), Some(Exclusion::Dummy));
        assert_eq!(classify("28E850", "DP-1", None), Some(Exclusion::Dummy));
        assert_eq!(classify("U28E850", "DP-1", Some(SAMSUNG_VENDOR_ID)), None);
        assert_eq!(classify("LG ULTRAFINE", "DP-1", Some(7789)), None);
        assert_eq!(classify("Anything", "Virtual-1", None), Some(Exclusion::Virtual));
    }

    #[test]
    fn test_builtin_connectors() {
        assert!(is_builtin_connector("eDP-1"));
        assert!(is_builtin_connector("LVDS-1"));
        assert!(is_builtin_connector("DSI-1"));
        assert!(!is_builtin_connector("DP-1"));
        assert!(!is_builtin_connector("HDMI-A-1"));
    }

    #[test]
    fn test_enumerate_filters_and_registers() {
        let platform = MockPlatform::new();
        platform.set_outputs(vec![
            output(1, "eDP-1", Some(sample_edid("Panel", "P1"))),
            output(2, "DP-1", Some(sample_edid("DELL U2720Q", "ABC"))),
            output(3, "DP-2", Some(sample_edid("Dummy Plug", "D"))),
        ]);
        let directory = DisplayDirectory::new(Arc::new(platform), DisplayFilter::default());
        let transport = transport();

        let diff = directory.enumerate(&transport).unwrap();
        assert_eq!(diff.added, vec![DisplayId(2)]);
        assert_eq!(transport.displays(), vec![DisplayId(2)]);

        let record = directory.get(DisplayId(2)).unwrap();
        assert_eq!(record.name, "DELL U2720Q");
        assert!(record.serial.starts_with("DELL U2720Q-ABC-"));
        assert!(record.ddc_capable());
    }

    #[test]
    fn test_include_dummy_when_requested() {
        let platform = MockPlatform::new();
        platform.set_outputs(vec![output(3, "DP-2", Some(sample_edid("Dummy Plug", "D")))]);
        let directory = DisplayDirectory::new(
            Arc::new(platform),
            DisplayFilter {
                include_dummy: true,
                ..DisplayFilter::default()
            },
        );
        let diff = directory.enumerate(&transport()).unwrap();
        assert_eq!(diff.added, vec![DisplayId(3)]);
    }

    #[test]
    fn test_serial_collisions_get_platform_id() {
        let platform = MockPlatform::new();
        let edid = sample_edid("LG HDR 4K", "");
        platform.set_outputs(vec![
            output(10, "DP-1", Some(edid.clone())),
            output(11, "DP-2", Some(edid)),
        ]);
        let directory = DisplayDirectory::new(Arc::new(platform), DisplayFilter::default());
        directory.enumerate(&transport()).unwrap();

        let a = directory.get(DisplayId(10)).unwrap();
        let b = directory.get(DisplayId(11)).unwrap();
        assert_ne!(a.serial, b.serial);
        assert!(a.serial.ends_with("-10"));
        assert!(b.serial.ends_with("-11"));
    }

    #[test]
    fn test_removed_display_is_torn_down() {
        let platform = MockPlatform::new();
        platform.set_outputs(vec![
            output(2, "DP-1", Some(sample_edid("A", "1"))),
            output(4, "DP-2", Some(sample_edid("B", "2"))),
        ]);
        let directory = DisplayDirectory::new(Arc::new(platform.clone()), DisplayFilter::default());
        let transport = transport();
        directory.enumerate(&transport).unwrap();

        for _ in 0..11 {
            transport.faults().record_fault(
                DisplayId(4),
                ControlId::Brightness,
                Direction::Read,
                Severity::Failure,
            );
        }

        platform.set_outputs(vec![output(2, "DP-1", Some(sample_edid("A", "1")))]);
        let diff = directory.enumerate(&transport).unwrap();
        assert_eq!(diff.removed, vec![DisplayId(4)]);
        assert_eq!(diff.kept, vec![DisplayId(2)]);
        assert!(directory.get(DisplayId(4)).is_none());
        assert!(!transport.faults().is_skipped(DisplayId(4), ControlId::Brightness, Direction::Read));
        assert_eq!(transport.displays(), vec![DisplayId(2)]);
    }

    #[test]
    fn test_find() {
        let platform = MockPlatform::new();
        platform.set_outputs(vec![output(2, "DP-1", Some(sample_edid("DELL", "1")))]);
        let directory = DisplayDirectory::new(Arc::new(platform), DisplayFilter::default());
        directory.enumerate(&transport()).unwrap();

        assert!(directory.find("2").is_some());
        assert!(directory.find("dell").is_some());
        assert!(directory.find("nope").is_none());
    }

    #[test]
    fn test_sysfs_connectors() {
        let root = tempfile::tempdir().unwrap();
        let drm = root.path();
        fs::create_dir_all(drm.join("card0/device")).unwrap();
        fs::write(drm.join("card0/device/vendor"), "0x1002\n").unwrap();

        let dp = drm.join("card0-DP-1");
        fs::create_dir_all(dp.join("i2c-7")).unwrap();
        fs::write(dp.join("status"), "connected\n").unwrap();
        fs::write(dp.join("connector_id"), "95\n").unwrap();
        fs::write(dp.join("edid"), sample_edid("DELL", "X")).unwrap();

        let hdmi = drm.join("card0-HDMI-A-1");
        fs::create_dir_all(&hdmi).unwrap();
        fs::write(hdmi.join("status"), "disconnected\n").unwrap();

        let outputs = SysfsDisplays::new(drm).connected().unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].id, DisplayId(95));
        assert_eq!(outputs[0].connector, "DP-1");
        assert_eq!(outputs[0].i2c_bus, Some(7));
        assert_eq!(outputs[0].gpu_vendor, GpuVendor::Amd);
        assert!(!outputs[0].builtin);
    }

    #[test]
    fn test_stable_hash() {
        assert_eq!(stable_hash("card0-DP-1"), stable_hash("card0-DP-1"));
        assert_ne!(stable_hash("card0-DP-1"), stable_hash("card0-DP-2"));
    }
}
