//! DDC transport
//!
//! Single read and write operations against a (display, control) pair,
//! gated by the fault tracker and the suspension gate, paced per bus and
//! timed against per-direction duration budgets.
//!
//! Failures never escape as panics: they are recorded in the
//! [`FaultTracker`] and returned as a [`TransportError`] value.

use crate::channel::{ChannelBackend, ChannelError, ChannelTarget, DdcChannel, GpuVendor};
use crate::codec::HOST_SOURCE;
use crate::controls::ControlId;
use crate::faults::{Direction, FaultPolicy, FaultTracker, Severity};
use crate::input::VideoInputSource;
use crate::DisplayId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why DDC I/O is currently not performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspendReason {
    Disabled,
    ScreensAsleep,
    SessionLocked,
    WakeHold,
}

impl fmt::Display for SuspendReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SuspendReason::Disabled => "DDC disabled",
            SuspendReason::ScreensAsleep => "screens asleep",
            SuspendReason::SessionLocked => "session locked",
            SuspendReason::WakeHold => "waiting after wake",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("{control} {direction:?} is skipped on display {display}")]
    Skipped {
        display: DisplayId,
        control: ControlId,
        direction: Direction,
    },

    #[error("DDC suspended: {0}")]
    Suspended(SuspendReason),

    #[error("{control} on display {display} took {elapsed_ms}ms")]
    Timeout {
        display: DisplayId,
        control: ControlId,
        elapsed_ms: u64,
    },

    #[error("{control} on display {display} failed: {reason}")]
    ProtocolFailure {
        display: DisplayId,
        control: ControlId,
        reason: String,
    },

    #[error("Display {0} has no DDC channel")]
    NoChannel(DisplayId),
}

/// What became of a write that passed the skip check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The display acknowledged the write
    Written,
    /// Nothing was sent because DDC is suspended
    Held(SuspendReason),
}

/// Result of a single VCP read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DdcReadResult {
    pub control: ControlId,
    pub max_value: u16,
    pub current_value: u16,
}

/// Timing parameters of the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportPolicy {
    pub max_read_duration: Duration,
    pub max_write_duration: Duration,
    /// Spacing after an operation on an AMD bus
    pub amd_delay: Duration,
    /// Spacing after an operation on any other bus
    pub default_delay: Duration,
    /// Spacing after a failed operation
    pub failure_delay: Duration,
    /// How long DDC stays suspended after the screens wake
    pub wake_hold: Duration,
}

impl Default for TransportPolicy {
    fn default() -> Self {
        Self {
            max_read_duration: Duration::from_millis(1500),
            max_write_duration: Duration::from_millis(2000),
            amd_delay: Duration::from_millis(30),
            default_delay: Duration::from_millis(1),
            failure_delay: Duration::from_millis(100),
            wake_hold: Duration::ZERO,
        }
    }
}

impl TransportPolicy {
    fn budget(&self, direction: Direction) -> Duration {
        match direction {
            Direction::Read => self.max_read_duration,
            Direction::Write => self.max_write_duration,
        }
    }

    fn spacing(&self, vendor: GpuVendor, succeeded: bool) -> Duration {
        if !succeeded {
            return self.failure_delay;
        }
        match vendor {
            GpuVendor::Amd => self.amd_delay,
            _ => self.default_delay,
        }
    }
}

/// System-level switch deciding whether DDC I/O may happen at all
#[derive(Debug)]
pub struct Gate {
    apply: AtomicBool,
    screens_asleep: AtomicBool,
    session_locked: AtomicBool,
    wake_hold: Duration,
    hold_until: Mutex<Option<Instant>>,
}

impl Gate {
    pub fn new(wake_hold: Duration) -> Self {
        Self {
            apply: AtomicBool::new(true),
            screens_asleep: AtomicBool::new(false),
            session_locked: AtomicBool::new(false),
            wake_hold,
            hold_until: Mutex::new(None),
        }
    }

    /// Global DDC toggle; off means dry-run
    pub fn set_apply(&self, apply: bool) {
        self.apply.store(apply, Ordering::SeqCst);
    }

    pub fn apply(&self) -> bool {
        self.apply.load(Ordering::SeqCst)
    }

    pub fn set_screens_asleep(&self, asleep: bool) {
        let was_asleep = self.screens_asleep.swap(asleep, Ordering::SeqCst);
        if was_asleep && !asleep && !self.wake_hold.is_zero() {
            let mut hold = self.hold_until.lock().unwrap_or_else(PoisonError::into_inner);
            *hold = Some(Instant::now() + self.wake_hold);
            tracing::debug!("Holding DDC for {:?} after wake", self.wake_hold);
        }
    }

    pub fn set_session_locked(&self, locked: bool) {
        self.session_locked.store(locked, Ordering::SeqCst);
    }

    /// The reason I/O is suspended right now, if any
    pub fn suspension(&self) -> Option<SuspendReason> {
        if !self.apply.load(Ordering::SeqCst) {
            return Some(SuspendReason::Disabled);
        }
        if self.screens_asleep.load(Ordering::SeqCst) {
            return Some(SuspendReason::ScreensAsleep);
        }
        if self.session_locked.load(Ordering::SeqCst) {
            return Some(SuspendReason::SessionLocked);
        }
        let mut hold = self.hold_until.lock().unwrap_or_else(PoisonError::into_inner);
        match *hold {
            Some(until) if Instant::now() < until => Some(SuspendReason::WakeHold),
            Some(_) => {
                *hold = None;
                None
            }
            None => None,
        }
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct LatencyStats {
    read: Option<Duration>,
    write: Option<Duration>,
    responsive: bool,
}

impl LatencyStats {
    fn record(&mut self, direction: Direction, sample: Duration) {
        let slot = match direction {
            Direction::Read => &mut self.read,
            Direction::Write => &mut self.write,
        };
        *slot = Some(match *slot {
            Some(average) => (average + sample) / 2,
            None => sample,
        });
    }
}

/// Per-display latency figures for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyReport {
    pub display: DisplayId,
    pub average_read_ms: Option<f64>,
    pub average_write_ms: Option<f64>,
    pub responsive: bool,
}

/// Cached channel state; `None` means opening failed and will not be retried
type ChannelSlot = Option<Box<dyn DdcChannel>>;

/// Fault-gated DDC transport shared by every caller
pub struct Transport {
    backend: Arc<dyn ChannelBackend>,
    policy: TransportPolicy,
    faults: FaultTracker,
    gate: Gate,
    targets: Mutex<HashMap<DisplayId, ChannelTarget>>,
    channels: Mutex<HashMap<DisplayId, ChannelSlot>>,
    ready_at: Mutex<HashMap<DisplayId, Instant>>,
    stats: Mutex<HashMap<DisplayId, LatencyStats>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Transport {
    pub fn new(
        backend: Arc<dyn ChannelBackend>,
        policy: TransportPolicy,
        fault_policy: FaultPolicy,
    ) -> Self {
        let gate = Gate::new(policy.wake_hold);
        Self {
            backend,
            policy,
            faults: FaultTracker::new(fault_policy),
            gate,
            targets: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            ready_at: Mutex::new(HashMap::new()),
            stats: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn faults(&self) -> &FaultTracker {
        &self.faults
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    pub fn policy(&self) -> &TransportPolicy {
        &self.policy
    }

    /// Make a display addressable. Replaces any previous target and drops its cached channel.
    pub fn register(&self, target: ChannelTarget) {
        let display = target.display;
        let mut channels = lock(&self.channels);
        let mut targets = lock(&self.targets);
        if targets.get(&display) != Some(&target) {
            channels.remove(&display);
        }
        targets.insert(display, target);
    }

    /// Tear down everything held for a display that went away
    pub fn forget(&self, display: DisplayId) {
        let mut channels = lock(&self.channels);
        channels.remove(&display);
        lock(&self.targets).remove(&display);
        lock(&self.ready_at).remove(&display);
        lock(&self.stats).remove(&display);
        drop(channels);
        self.faults.reset(Some(display));
    }

    /// Drop cached channels so they are reopened on next use
    pub fn invalidate_channels(&self) {
        lock(&self.channels).clear();
    }

    pub fn displays(&self) -> Vec<DisplayId> {
        let mut ids: Vec<DisplayId> = lock(&self.targets).keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn is_responsive(&self, display: DisplayId) -> bool {
        lock(&self.stats)
            .get(&display)
            .is_some_and(|s| s.responsive)
    }

    /// Read a control's current and maximum value
    pub fn read(&self, display: DisplayId, control: ControlId) -> Result<DdcReadResult, TransportError> {
        if self.faults.is_skipped(display, control, Direction::Read) {
            return Err(TransportError::Skipped {
                display,
                control,
                direction: Direction::Read,
            });
        }
        if let Some(reason) = self.gate.suspension() {
            return Err(TransportError::Suspended(reason));
        }

        let reply = self.perform(display, control, Direction::Read, |channel| {
            channel.read_vcp(control.code())
        })?;
        Ok(DdcReadResult {
            control,
            max_value: reply.max,
            current_value: reply.current,
        })
    }

    /// Write a control
    ///
    /// While suspended this reports success without touching hardware.
    pub fn write(&self, display: DisplayId, control: ControlId, value: u16) -> Result<(), TransportError> {
        self.deliver(display, control, value).map(|_| ())
    }

    /// Write a control and report whether it reached the display
    ///
    /// LG-specific inputs are sent through control 0xF4 from source
    /// address 0x50, but skip state and faults stay on `INPUT_SOURCE`.
    pub fn deliver(
        &self,
        display: DisplayId,
        control: ControlId,
        value: u16,
    ) -> Result<Delivery, TransportError> {
        if self.faults.is_skipped(display, control, Direction::Write) {
            return Err(TransportError::Skipped {
                display,
                control,
                direction: Direction::Write,
            });
        }
        if let Some(reason) = self.gate.suspension() {
            let display_id = display;
            tracing::debug!(
                "Not writing {}={} to display {}: {}",
                control,
                value,
                display_id,
                reason
            );
            return Ok(Delivery::Held(reason));
        }

        let (wire, source) = match VideoInputSource::from_value(value) {
            Some(input) if control == ControlId::InputSource => input.write_target(),
            _ => (control, HOST_SOURCE),
        };
        self.perform(display, control, Direction::Write, |channel| {
            channel.write_vcp(wire.code(), value, source)
        })?;
        Ok(Delivery::Written)
    }

    /// Read the raw EDID through the display's DDC channel
    pub fn read_edid(&self, display: DisplayId) -> Result<Vec<u8>, TransportError> {
        if let Some(reason) = self.gate.suspension() {
            return Err(TransportError::Suspended(reason));
        }
        let mut channels = lock(&self.channels);
        let channel = self.channel(&mut channels, display)?;
        self.wait_for_bus(display);
        let result = channel.read_edid();
        let vendor = self.vendor(display);
        self.schedule_next(display, vendor, result.is_ok());
        result.map_err(|e| TransportError::ProtocolFailure {
            display,
            control: ControlId::VcpVersion,
            reason: e.to_string(),
        })
    }

    fn channel<'a>(
        &self,
        channels: &'a mut HashMap<DisplayId, ChannelSlot>,
        display: DisplayId,
    ) -> Result<&'a mut Box<dyn DdcChannel>, TransportError> {
        if !channels.contains_key(&display) {
            let target = lock(&self.targets)
                .get(&display)
                .cloned()
                .ok_or(TransportError::NoChannel(display))?;
            let slot = match self.backend.open(&target) {
                Ok(channel) => Some(channel),
                Err(e) => {
                    let display_id = display;
                    tracing::debug!("No DDC channel for display {}: {}", display_id, e);
                    None
                }
            };
            channels.insert(display, slot);
        }

        channels
            .get_mut(&display)
            .and_then(|slot| slot.as_mut())
            .ok_or(TransportError::NoChannel(display))
    }

    fn vendor(&self, display: DisplayId) -> GpuVendor {
        lock(&self.targets)
            .get(&display)
            .map(|t| t.gpu_vendor)
            .unwrap_or_default()
    }

    fn wait_for_bus(&self, display: DisplayId) {
        let ready_at = lock(&self.ready_at).get(&display).copied();
        if let Some(ready_at) = ready_at {
            let now = Instant::now();
            if ready_at > now {
                thread::sleep(ready_at - now);
            }
        }
    }

    fn schedule_next(&self, display: DisplayId, vendor: GpuVendor, succeeded: bool) {
        let spacing = self.policy.spacing(vendor, succeeded);
        lock(&self.ready_at).insert(display, Instant::now() + spacing);
    }

    fn perform<T>(
        &self,
        display: DisplayId,
        control: ControlId,
        direction: Direction,
        op: impl FnOnce(&mut dyn DdcChannel) -> Result<T, ChannelError>,
    ) -> Result<T, TransportError> {
        let mut channels = lock(&self.channels);
        let channel = self.channel(&mut channels, display)?;

        self.wait_for_bus(display);
        let started = Instant::now();
        let result = op(channel.as_mut());
        let elapsed = started.elapsed();

        let vendor = self.vendor(display);
        self.schedule_next(display, vendor, result.is_ok());

        // A slow call is a timeout fault on top of its own outcome
        let too_slow = elapsed > self.policy.budget(direction);
        if too_slow {
            let display_id = display;
            tracing::warn!(
                "Display {}: {} took {}ms",
                display_id,
                control,
                elapsed.as_millis()
            );
            self.faults
                .record_fault(display, control, direction, Severity::Timeout);
        }

        match result {
            Ok(value) => {
                self.faults.record_success(display, control, direction);
                let mut stats = lock(&self.stats);
                let entry = stats.entry(display).or_default();
                entry.record(direction, elapsed);
                entry.responsive = true;
                Ok(value)
            }
            Err(e) => {
                if matches!(e, ChannelError::Io(_)) {
                    // Reopen the device node on the next call
                    channels.remove(&display);
                }
                let display_id = display;
                tracing::debug!("Display {}: {} {:?} failed: {}", display_id, control, direction, e);
                self.faults
                    .record_fault(display, control, direction, Severity::Failure);

                if too_slow {
                    lock(&self.stats).entry(display).or_default().responsive = false;
                    Err(TransportError::Timeout {
                        display,
                        control,
                        elapsed_ms: elapsed.as_millis() as u64,
                    })
                } else {
                    Err(TransportError::ProtocolFailure {
                        display,
                        control,
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    /// Latency averages for every display that completed an operation
    pub fn latency_report(&self) -> Vec<LatencyReport> {
        let stats = lock(&self.stats);
        let mut reports: Vec<LatencyReport> = stats
            .iter()
            .map(|(display, s)| LatencyReport {
                display: *display,
                average_read_ms: s.read.map(|d| d.as_secs_f64() * 1000.0),
                average_write_ms: s.write.map(|d| d.as_secs_f64() * 1000.0),
                responsive: s.responsive,
            })
            .collect();
        reports.sort_by_key(|r| r.display);
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    const D: DisplayId = DisplayId(1);

    fn transport(mock: &MockBackend) -> Transport {
        let transport = Transport::new(
            Arc::new(mock.clone()),
            TransportPolicy {
                failure_delay: Duration::ZERO,
                default_delay: Duration::ZERO,
                ..TransportPolicy::default()
            },
            FaultPolicy::default(),
        );
        transport.register(mock.target(D));
        transport
    }

    #[test]
    fn test_read_and_write() {
        let mock = MockBackend::new();
        mock.add_display(D);
        let transport = transport(&mock);

        transport.write(D, ControlId::Brightness, 70).unwrap();
        let result = transport.read(D, ControlId::Brightness).unwrap();
        assert_eq!(result.current_value, 70);
        assert_eq!(result.max_value, 100);
        assert!(transport.is_responsive(D));
    }

    #[test]
    fn test_skipped_read_performs_no_io() {
        let mock = MockBackend::new();
        mock.add_display(D);
        mock.fail_reads(D, ControlId::Contrast.code(), true);
        let transport = transport(&mock);

        for _ in 0..11 {
            let _ = transport.read(D, ControlId::Contrast);
        }
        assert!(transport.faults().is_skipped(D, ControlId::Contrast, Direction::Read));

        let calls = mock.read_calls(D);
        assert!(matches!(
            transport.read(D, ControlId::Contrast),
            Err(TransportError::Skipped { .. })
        ));
        assert_eq!(mock.read_calls(D), calls);
    }

    #[test]
    fn test_suspended_write_succeeds_without_io() {
        let mock = MockBackend::new();
        mock.add_display(D);
        let transport = transport(&mock);
        transport.gate().set_screens_asleep(true);

        assert!(transport.write(D, ControlId::Brightness, 10).is_ok());
        assert_eq!(mock.write_calls(D), 0);
        assert_eq!(
            transport.read(D, ControlId::Brightness),
            Err(TransportError::Suspended(SuspendReason::ScreensAsleep))
        );
        assert_eq!(mock.read_calls(D), 0);
    }

    #[test]
    fn test_suspension_reasons() {
        let gate = Gate::default();
        assert_eq!(gate.suspension(), None);
        gate.set_session_locked(true);
        assert_eq!(gate.suspension(), Some(SuspendReason::SessionLocked));
        gate.set_apply(false);
        assert_eq!(gate.suspension(), Some(SuspendReason::Disabled));
    }

    #[test]
    fn test_wake_hold() {
        let gate = Gate::new(Duration::from_secs(60));
        gate.set_screens_asleep(true);
        gate.set_screens_asleep(false);
        assert_eq!(gate.suspension(), Some(SuspendReason::WakeHold));
    }

    #[test]
    fn test_unregistered_display_has_no_channel() {
        let mock = MockBackend::new();
        let transport = transport(&mock);
        assert_eq!(
            transport.read(DisplayId(9), ControlId::Brightness),
            Err(TransportError::NoChannel(DisplayId(9)))
        );
        assert_eq!(transport.faults().faults(DisplayId(9), ControlId::Brightness, Direction::Read), 0);
    }

    #[test]
    fn test_display_without_bus_has_no_channel() {
        let mock = MockBackend::new();
        let transport = transport(&mock);
        let mut target = mock.target(DisplayId(2));
        target.i2c_bus = None;
        transport.register(target);
        assert_eq!(
            transport.write(DisplayId(2), ControlId::Brightness, 5),
            Err(TransportError::NoChannel(DisplayId(2)))
        );
    }

    #[test]
    fn test_failure_is_protocol_failure() {
        let mock = MockBackend::new();
        mock.add_display(D);
        mock.fail_writes(D, ControlId::Contrast.code(), true);
        let transport = transport(&mock);
        assert!(matches!(
            transport.write(D, ControlId::Contrast, 1),
            Err(TransportError::ProtocolFailure { .. })
        ));
        assert_eq!(transport.faults().faults(D, ControlId::Contrast, Direction::Write), 1);
    }

    fn slow_transport(mock: &MockBackend) -> Transport {
        mock.set_latency(D, Duration::from_millis(30));
        let transport = Transport::new(
            Arc::new(mock.clone()),
            TransportPolicy {
                max_read_duration: Duration::from_millis(5),
                default_delay: Duration::ZERO,
                failure_delay: Duration::ZERO,
                ..TransportPolicy::default()
            },
            FaultPolicy::default(),
        );
        transport.register(mock.target(D));
        transport
    }

    #[test]
    fn test_slow_success_counts_as_timeout_fault() {
        let mock = MockBackend::new();
        mock.add_display(D);
        let transport = slow_transport(&mock);

        // Timeout weight minus the success decrement
        assert!(transport.read(D, ControlId::Brightness).is_ok());
        assert_eq!(transport.faults().faults(D, ControlId::Brightness, Direction::Read), 3);
    }

    #[test]
    fn test_slow_failure_counts_timeout_and_failure() {
        let mock = MockBackend::new();
        mock.add_display(D);
        mock.fail_reads(D, ControlId::Brightness.code(), true);
        let transport = slow_transport(&mock);

        assert!(matches!(
            transport.read(D, ControlId::Brightness),
            Err(TransportError::Timeout { .. })
        ));
        assert_eq!(transport.faults().faults(D, ControlId::Brightness, Direction::Read), 5);
        assert!(!transport.is_responsive(D));
    }

    #[test]
    fn test_lg_input_is_tracked_as_input_source() {
        let mock = MockBackend::new();
        mock.add_display(D);
        mock.fail_writes(D, ControlId::ManufacturerSpecificF4.code(), true);
        let transport = transport(&mock);

        let lg = VideoInputSource::LgHdmi2.value();
        assert!(transport.write(D, ControlId::InputSource, lg).is_err());
        assert_eq!(transport.faults().faults(D, ControlId::InputSource, Direction::Write), 1);
        assert_eq!(
            transport.faults().faults(D, ControlId::ManufacturerSpecificF4, Direction::Write),
            0
        );

        mock.fail_writes(D, ControlId::ManufacturerSpecificF4.code(), false);
        transport.write(D, ControlId::InputSource, lg).unwrap();
        transport
            .write(D, ControlId::InputSource, VideoInputSource::Hdmi1.value())
            .unwrap();
        assert_eq!(
            mock.writes(D),
            vec![(0xF4, lg, 0x50), (ControlId::InputSource.code(), 0x11, 0x51)]
        );
    }

    #[test]
    fn test_deliver_reports_held_writes() {
        let mock = MockBackend::new();
        mock.add_display(D);
        let transport = transport(&mock);

        assert_eq!(transport.deliver(D, ControlId::Brightness, 10), Ok(Delivery::Written));
        transport.gate().set_apply(false);
        assert_eq!(
            transport.deliver(D, ControlId::Brightness, 20),
            Ok(Delivery::Held(SuspendReason::Disabled))
        );
        assert_eq!(mock.value(D, ControlId::Brightness.code()), Some(10));
    }

    #[test]
    fn test_latency_average() {
        let mut stats = LatencyStats::default();
        stats.record(Direction::Read, Duration::from_millis(10));
        stats.record(Direction::Read, Duration::from_millis(20));
        assert_eq!(stats.read, Some(Duration::from_millis(15)));
        assert_eq!(stats.write, None);
    }

    #[test]
    fn test_forget_clears_faults() {
        let mock = MockBackend::new();
        mock.add_display(D);
        mock.fail_reads(D, ControlId::Brightness.code(), true);
        let transport = transport(&mock);
        let _ = transport.read(D, ControlId::Brightness);
        transport.forget(D);
        assert_eq!(transport.faults().faults(D, ControlId::Brightness, Direction::Read), 0);
        assert!(transport.displays().is_empty());
    }
}
