//! Mock implementations for testing without real monitors
//!
//! Provides a DDC backend, a platform display source, a session provider
//! and a reference backlight that all keep their state in memory, so the
//! transport, directory and service layers can run on machines without DDC
//! hardware. Every mock counts its calls so tests can assert that no I/O
//! happened.
//!
//! # Usage
//!
//! ```no_run
//! use helio_hal::mock::MockBackend;
//! use helio_hal::{ControlId, DisplayId, FaultPolicy, Transport, TransportPolicy};
//! use std::sync::Arc;
//!
//! let mock = MockBackend::new();
//! mock.add_display(DisplayId(1));
//!
//! let transport = Transport::new(Arc::new(mock.clone()), TransportPolicy::default(), FaultPolicy::default());
//! transport.register(mock.target(DisplayId(1)));
//! transport.write(DisplayId(1), ControlId::Brightness, 40).unwrap();
//! assert_eq!(mock.value(DisplayId(1), ControlId::Brightness.code()), Some(40));
//! ```

use crate::backlight::ReferenceSource;
use crate::channel::{ChannelBackend, ChannelError, ChannelTarget, DdcChannel, GpuVendor};
use crate::codec::{CodecError, VcpReply};
use crate::controls::ControlId;
use crate::directory::{PlatformDisplay, PlatformDisplays};
use crate::session::{SessionProvider, SessionState};
use crate::{DisplayId, HalError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

/// State of one simulated monitor
#[derive(Debug, Clone)]
pub struct MockMonitor {
    /// Control code to (current, max)
    pub values: HashMap<u8, (u16, u16)>,
    pub edid: Option<Vec<u8>>,
    pub failing_reads: HashSet<u8>,
    pub failing_writes: HashSet<u8>,
    pub latency: Duration,
    /// Every write as (code, value, source address)
    pub writes: Vec<(u8, u16, u8)>,
    pub read_calls: u32,
    pub write_calls: u32,
}

impl Default for MockMonitor {
    fn default() -> Self {
        let values = [
            (ControlId::Brightness, 50, 100),
            (ControlId::Contrast, 50, 100),
            (ControlId::AudioSpeakerVolume, 30, 100),
            (ControlId::AudioMute, 2, 2),
            (ControlId::InputSource, 0x0F, 0),
            (ControlId::Dpms, 1, 5),
            (ControlId::RedGain, 50, 100),
            (ControlId::GreenGain, 50, 100),
            (ControlId::BlueGain, 50, 100),
        ]
        .into_iter()
        .map(|(control, current, max)| (control.code(), (current, max)))
        .collect();

        Self {
            values,
            edid: None,
            failing_reads: HashSet::new(),
            failing_writes: HashSet::new(),
            latency: Duration::ZERO,
            writes: Vec::new(),
            read_calls: 0,
            write_calls: 0,
        }
    }
}

/// Shared state behind every mock handle
#[derive(Debug, Default)]
pub struct MockState {
    pub monitors: HashMap<DisplayId, MockMonitor>,
    pub open_calls: u32,
}

/// In-memory DDC backend
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<RwLock<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend with two monitors, for running the daemon without hardware
    pub fn with_sample_monitors() -> Self {
        let mock = Self::new();
        mock.add_display(DisplayId(1));
        mock.add_display(DisplayId(2));
        mock
    }

    pub fn state(&self) -> Arc<RwLock<MockState>> {
        Arc::clone(&self.state)
    }

    /// Target that opens a channel to `display` on this backend
    pub fn target(&self, display: DisplayId) -> ChannelTarget {
        ChannelTarget {
            display,
            i2c_bus: Some(display.0),
            gpu_vendor: GpuVendor::Unknown,
        }
    }

    pub fn add_display(&self, display: DisplayId) {
        if let Ok(mut state) = self.state.write() {
            state.monitors.entry(display).or_default();
        }
    }

    fn with_monitor<T>(&self, display: DisplayId, f: impl FnOnce(&mut MockMonitor) -> T) -> Option<T> {
        self.state
            .write()
            .ok()
            .and_then(|mut state| state.monitors.get_mut(&display).map(f))
    }

    pub fn set_value(&self, display: DisplayId, code: u8, current: u16, max: u16) {
        self.with_monitor(display, |m| {
            m.values.insert(code, (current, max));
        });
    }

    pub fn value(&self, display: DisplayId, code: u8) -> Option<u16> {
        self.with_monitor(display, |m| m.values.get(&code).map(|(current, _)| *current))
            .flatten()
    }

    pub fn set_edid(&self, display: DisplayId, edid: Vec<u8>) {
        self.with_monitor(display, |m| m.edid = Some(edid));
    }

    pub fn fail_reads(&self, display: DisplayId, code: u8, fail: bool) {
        self.with_monitor(display, |m| {
            if fail {
                m.failing_reads.insert(code);
            } else {
                m.failing_reads.remove(&code);
            }
        });
    }

    pub fn fail_writes(&self, display: DisplayId, code: u8, fail: bool) {
        self.with_monitor(display, |m| {
            if fail {
                m.failing_writes.insert(code);
            } else {
                m.failing_writes.remove(&code);
            }
        });
    }

    pub fn set_latency(&self, display: DisplayId, latency: Duration) {
        self.with_monitor(display, |m| m.latency = latency);
    }

    pub fn read_calls(&self, display: DisplayId) -> u32 {
        self.with_monitor(display, |m| m.read_calls).unwrap_or(0)
    }

    pub fn write_calls(&self, display: DisplayId) -> u32 {
        self.with_monitor(display, |m| m.write_calls).unwrap_or(0)
    }

    pub fn writes(&self, display: DisplayId) -> Vec<(u8, u16, u8)> {
        self.with_monitor(display, |m| m.writes.clone())
            .unwrap_or_default()
    }

    pub fn open_calls(&self) -> u32 {
        self.state.read().map(|s| s.open_calls).unwrap_or(0)
    }
}

impl ChannelBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn open(&self, target: &ChannelTarget) -> Result<Box<dyn DdcChannel>, ChannelError> {
        if target.i2c_bus.is_none() {
            return Err(ChannelError::Unavailable(target.display));
        }
        if let Ok(mut state) = self.state.write() {
            state.open_calls += 1;
            state.monitors.entry(target.display).or_default();
        }
        tracing::debug!("[MOCK] Opened channel for display {}", target.display);
        Ok(Box::new(MockChannel {
            display: target.display,
            state: Arc::clone(&self.state),
        }))
    }
}

/// Channel to one [`MockMonitor`]
pub struct MockChannel {
    display: DisplayId,
    state: Arc<RwLock<MockState>>,
}

impl MockChannel {
    fn call<T>(
        &self,
        f: impl FnOnce(&mut MockMonitor) -> Result<T, ChannelError>,
    ) -> Result<T, ChannelError> {
        let latency = self
            .state
            .read()
            .ok()
            .and_then(|s| s.monitors.get(&self.display).map(|m| m.latency))
            .unwrap_or_default();
        if !latency.is_zero() {
            thread::sleep(latency);
        }

        let mut state = self
            .state
            .write()
            .map_err(|_| ChannelError::Command("[MOCK] state poisoned".to_string()))?;
        let monitor = state
            .monitors
            .get_mut(&self.display)
            .ok_or(ChannelError::Unavailable(self.display))?;
        f(monitor)
    }
}

impl DdcChannel for MockChannel {
    fn write_vcp(&mut self, code: u8, value: u16, source: u8) -> Result<(), ChannelError> {
        let display = self.display;
        self.call(|m| {
            m.write_calls += 1;
            if m.failing_writes.contains(&code) {
                return Err(ChannelError::Command(format!("[MOCK] write {:#04x} failed", code)));
            }
            let max = m.values.get(&code).map(|(_, max)| *max).unwrap_or(100);
            m.values.insert(code, (value, max));
            m.writes.push((code, value, source));
            let display_id = display;
            tracing::debug!("[MOCK] Display {} set {:#04x} = {}", display_id, code, value);
            Ok(())
        })
    }

    fn read_vcp(&mut self, code: u8) -> Result<VcpReply, ChannelError> {
        self.call(|m| {
            m.read_calls += 1;
            if m.failing_reads.contains(&code) {
                return Err(ChannelError::Command(format!("[MOCK] read {:#04x} failed", code)));
            }
            let (current, max) = m
                .values
                .get(&code)
                .copied()
                .ok_or(CodecError::Unsupported(code))?;
            Ok(VcpReply {
                code,
                kind: 0,
                max,
                current,
            })
        })
    }

    fn read_edid(&mut self) -> Result<Vec<u8>, ChannelError> {
        self.call(|m| m.edid.clone().ok_or(ChannelError::Unsupported("mock")))
    }
}

/// In-memory list of connected outputs
#[derive(Debug, Clone, Default)]
pub struct MockPlatform {
    outputs: Arc<RwLock<Vec<PlatformDisplay>>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform listing one external output per id
    pub fn with_outputs(ids: &[DisplayId]) -> Self {
        let platform = Self::new();
        platform.set_outputs(ids.iter().copied().map(Self::external).collect());
        platform
    }

    /// External DisplayPort output without EDID, on the bus matching
    /// [`MockBackend::target`]
    pub fn external(id: DisplayId) -> PlatformDisplay {
        PlatformDisplay {
            id,
            connector: format!("DP-{}", id),
            edid: None,
            builtin: false,
            i2c_bus: Some(id.0),
            gpu_vendor: GpuVendor::Unknown,
        }
    }

    pub fn set_outputs(&self, outputs: Vec<PlatformDisplay>) {
        if let Ok(mut current) = self.outputs.write() {
            *current = outputs;
        }
    }

    pub fn push(&self, output: PlatformDisplay) {
        if let Ok(mut current) = self.outputs.write() {
            current.push(output);
        }
    }

    pub fn remove(&self, id: DisplayId) {
        if let Ok(mut current) = self.outputs.write() {
            current.retain(|o| o.id != id);
        }
    }
}

impl PlatformDisplays for MockPlatform {
    fn connected(&self) -> Result<Vec<PlatformDisplay>, HalError> {
        Ok(self
            .outputs
            .read()
            .map(|outputs| outputs.clone())
            .unwrap_or_default())
    }
}

/// Session state set by the test
#[derive(Debug, Clone, Default)]
pub struct MockSession {
    state: Arc<RwLock<SessionState>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, state: SessionState) {
        if let Ok(mut current) = self.state.write() {
            *current = state;
        }
        tracing::debug!("[MOCK] Session state {:?}", state);
    }
}

impl SessionProvider for MockSession {
    fn state(&self) -> SessionState {
        self.state.read().map(|s| *s).unwrap_or_default()
    }
}

/// Reference brightness set by the test
#[derive(Debug, Clone, Default)]
pub struct MockReference {
    percent: Arc<RwLock<Option<f64>>>,
}

impl MockReference {
    pub fn new(percent: Option<f64>) -> Self {
        Self {
            percent: Arc::new(RwLock::new(percent)),
        }
    }

    pub fn set(&self, percent: Option<f64>) {
        if let Ok(mut current) = self.percent.write() {
            *current = percent;
        }
    }
}

impl ReferenceSource for MockReference {
    fn brightness_percent(&self) -> Option<f64> {
        self.percent.read().map(|p| *p).unwrap_or(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_channel_round_trip() {
        let mock = MockBackend::new();
        let mut channel = mock.open(&mock.target(DisplayId(1))).unwrap();
        channel.write_vcp(0x10, 80, 0x51).unwrap();
        assert_eq!(channel.read_vcp(0x10).unwrap().current, 80);
        assert_eq!(mock.read_calls(DisplayId(1)), 1);
        assert_eq!(mock.write_calls(DisplayId(1)), 1);
        assert_eq!(mock.writes(DisplayId(1)), vec![(0x10, 80, 0x51)]);
    }

    #[test]
    fn test_unsupported_control() {
        let mock = MockBackend::new();
        let mut channel = mock.open(&mock.target(DisplayId(1))).unwrap();
        assert!(matches!(
            channel.read_vcp(0x42),
            Err(ChannelError::Codec(CodecError::Unsupported(0x42)))
        ));
    }

    #[test]
    fn test_injected_failures() {
        let mock = MockBackend::new();
        mock.add_display(DisplayId(1));
        mock.fail_writes(DisplayId(1), 0x12, true);
        let mut channel = mock.open(&mock.target(DisplayId(1))).unwrap();
        assert!(channel.write_vcp(0x12, 1, 0x51).is_err());
        mock.fail_writes(DisplayId(1), 0x12, false);
        assert!(channel.write_vcp(0x12, 1, 0x51).is_ok());
    }

    #[test]
    fn test_platform_and_session() {
        let platform = MockPlatform::new();
        assert!(platform.connected().unwrap().is_empty());

        let session = MockSession::new();
        session.set(SessionState {
            lid_closed: true,
            ..SessionState::default()
        });
        assert!(session.state().lid_closed);

        let reference = MockReference::new(Some(42.0));
        assert_eq!(reference.brightness_percent(), Some(42.0));
        reference.set(None);
        assert_eq!(reference.brightness_percent(), None);
    }
}
