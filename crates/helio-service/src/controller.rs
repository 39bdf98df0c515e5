//! Controller API
//!
//! The surface offered to the GUI, hotkey handlers and the CLI: manual
//! adjustments, value queries, adaptive mode control and re-adaptation.
//! All hardware access goes through the [`DdcQueue`]; settings and
//! adaptive state live behind short-lived locks that are never held across
//! an await point.

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, TimeZone, Utc};
use helio_adaptive::{
    AdaptiveEngine, CurveParams, CurvePoint, ModeState, MomentCache, Offsets, ReferenceHistory,
    RunningApps, Target, compute_batch, manual_value,
};
use helio_config::{AdaptiveMode, BrightnessRange, Geolocation, HelioConfig};
use helio_hal::{
    ChannelBackend, ControlId, Delivery, DisplayDirectory, DisplayId, DisplayRecord, HalError,
    PlatformDisplays, ReferenceSource, SessionProvider, SessionState, TopologyDiff, Transport,
    VideoInputSource,
};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::error::{Result, ServiceError};
use crate::policy;
use crate::queue::DdcQueue;

/// DPMS values
const POWER_ON: u16 = 1;
const POWER_OFF: u16 = 5;
/// AUDIO_MUTE values
const MUTED: u16 = 1;
const UNMUTED: u16 = 2;
/// Value written to RESET; the narrower resets take 1
const FACTORY_RESET: u16 = 100;
const PARTIAL_RESET: u16 = 1;

/// Platform collaborators the controller depends on
pub struct Providers {
    pub backend: Arc<dyn ChannelBackend>,
    pub platform: Arc<dyn PlatformDisplays>,
    pub session: Arc<dyn SessionProvider>,
    /// Display whose brightness sync mode follows
    pub reference: Option<Arc<dyn ReferenceSource>>,
}

struct AdaptiveState {
    engine: AdaptiveEngine,
    mode: ModeState,
    moments: MomentCache,
    history: ReferenceHistory,
    apps: RunningApps,
    location: Option<Geolocation>,
    session: SessionState,
}

/// What a change of session state means for the loops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionChange {
    /// Screens woke or the session was unlocked
    pub resumed: bool,
    /// The lid moved and the adaptive mode changed with it
    pub mode_changed: bool,
}

/// Values written to one display during an adaptation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedTarget {
    pub display: DisplayId,
    pub target: Target,
    /// Controls whose write did not go through
    pub failed: Vec<ControlId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdaptOutcome {
    pub mode: AdaptiveMode,
    pub applied: Vec<AppliedTarget>,
}

pub struct Controller {
    queue: DdcQueue,
    directory: Arc<DisplayDirectory>,
    platform: Arc<dyn PlatformDisplays>,
    session_provider: Arc<dyn SessionProvider>,
    reference: Option<Arc<dyn ReferenceSource>>,
    settings: RwLock<HelioConfig>,
    config_path: Option<PathBuf>,
    state: Mutex<AdaptiveState>,
    /// Last known value per control, so adjustments need no read
    values: Mutex<HashMap<(DisplayId, ControlId), u16>>,
    max_values: Mutex<HashMap<(DisplayId, ControlId), u16>>,
    /// Set on resume; the next enumeration starts every display afresh
    woke: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Controller {
    /// Build the transport, the DDC worker and the display directory
    ///
    /// Fault thresholds and transport timing are fixed for the controller's
    /// lifetime; everything else follows [`Controller::apply_settings`].
    pub fn new(settings: HelioConfig, config_path: Option<PathBuf>, providers: Providers) -> Self {
        let transport = Transport::new(
            providers.backend,
            policy::transport_policy(&settings.ddc),
            policy::fault_policy(&settings.ddc),
        );
        transport.gate().set_apply(settings.ddc.apply);

        let directory = Arc::new(DisplayDirectory::new(
            Arc::clone(&providers.platform),
            policy::display_filter(&settings.daemon),
        ));

        let state = AdaptiveState {
            engine: AdaptiveEngine::new(CurveParams::from(&settings.adaptive)),
            mode: ModeState::new(settings.adaptive.mode),
            moments: MomentCache::new(),
            history: ReferenceHistory::new(),
            apps: RunningApps::new(),
            location: settings.location,
            session: SessionState::default(),
        };

        Self {
            queue: DdcQueue::start(Arc::new(transport)),
            directory,
            platform: providers.platform,
            session_provider: providers.session,
            reference: providers.reference,
            settings: RwLock::new(settings),
            config_path,
            state: Mutex::new(state),
            values: Mutex::new(HashMap::new()),
            max_values: Mutex::new(HashMap::new()),
            woke: AtomicBool::new(false),
        }
    }

    pub fn queue(&self) -> &DdcQueue {
        &self.queue
    }

    pub fn transport(&self) -> &Arc<Transport> {
        self.queue.transport()
    }

    pub fn directory(&self) -> &Arc<DisplayDirectory> {
        &self.directory
    }

    pub fn platform(&self) -> &Arc<dyn PlatformDisplays> {
        &self.platform
    }

    pub fn session_provider(&self) -> &Arc<dyn SessionProvider> {
        &self.session_provider
    }

    pub fn settings(&self) -> HelioConfig {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn state(&self) -> MutexGuard<'_, AdaptiveState> {
        lock(&self.state)
    }

    // Displays

    pub fn displays(&self) -> Vec<DisplayRecord> {
        self.directory.displays()
    }

    /// Look a display up by id, serial or name
    pub fn find_display(&self, query: &str) -> Result<DisplayRecord> {
        self.directory
            .find(query)
            .ok_or_else(|| ServiceError::UnknownDisplay(query.to_string()))
    }

    fn record(&self, display: DisplayId) -> Result<DisplayRecord> {
        self.directory
            .get(display)
            .ok_or_else(|| ServiceError::UnknownDisplay(display.to_string()))
    }

    /// Re-enumerate displays on the DDC worker
    ///
    /// Removed displays lose their cached channel, fault state and cached
    /// values. After any change, or after a wake, every remaining display
    /// also gets fresh channels, a cleared skip-set and no cached values,
    /// since a control that failed before may work after a reconnect.
    pub async fn refresh_topology(&self) -> Result<TopologyDiff> {
        let directory = Arc::clone(&self.directory);
        let woke = self.woke.swap(false, Ordering::SeqCst);
        let diff = self
            .queue
            .run(move |t| {
                let diff = directory.enumerate(t)?;
                if woke || !diff.is_empty() {
                    t.invalidate_channels();
                    t.faults().reset(None);
                }
                Ok::<_, HalError>(diff)
            })
            .await??;

        if woke || !diff.is_empty() {
            lock(&self.values).clear();
        }
        if !diff.removed.is_empty() {
            lock(&self.max_values).retain(|(d, _), _| !diff.removed.contains(d));
        }
        if !diff.is_empty() {
            tracing::info!(
                "Topology changed: {} added, {} removed, {} kept",
                diff.added.len(),
                diff.removed.len(),
                diff.kept.len()
            );
        }
        Ok(diff)
    }

    /// Range for a display: its own settings, or the default range
    pub fn range(&self, display: DisplayId) -> Result<BrightnessRange> {
        let record = self.record(display)?;
        Ok(self
            .settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .range_for(&record.serial))
    }

    pub fn set_range(&self, display: DisplayId, range: BrightnessRange) -> Result<()> {
        range.validate()?;
        let record = self.record(display)?;
        self.update_settings(|s| s.set_range(&record.serial, &record.name, range))
    }

    fn update_settings(&self, f: impl FnOnce(&mut HelioConfig)) -> Result<()> {
        let snapshot = {
            let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut settings);
            settings.clone()
        };
        match &self.config_path {
            Some(path) if snapshot.daemon.persist => snapshot.save(path)?,
            _ => {}
        }
        Ok(())
    }

    // Manual control

    /// Set brightness from a 0-100 percentage mapped onto the display's range
    pub async fn set_brightness(&self, display: DisplayId, percent: u8) -> Result<u16> {
        let range = self.range(display)?;
        let value = percent_value(percent, range.min_brightness, range.max_brightness)?;
        self.set_value(display, ControlId::Brightness, value).await?;
        Ok(value)
    }

    pub async fn set_contrast(&self, display: DisplayId, percent: u8) -> Result<u16> {
        let range = self.range(display)?;
        let value = percent_value(percent, range.min_contrast, range.max_contrast)?;
        self.set_value(display, ControlId::Contrast, value).await?;
        Ok(value)
    }

    pub async fn set_volume(&self, display: DisplayId, percent: u8) -> Result<u16> {
        let value = percent_value(percent, 0, 100)?;
        self.set_value(display, ControlId::AudioSpeakerVolume, value)
            .await?;
        Ok(value)
    }

    /// Move brightness by `delta`, staying inside the display's range
    pub async fn adjust_brightness(&self, display: DisplayId, delta: i32) -> Result<u16> {
        let range = self.range(display)?;
        self.adjust(display, ControlId::Brightness, delta, range.min_brightness, range.max_brightness)
            .await
    }

    pub async fn adjust_contrast(&self, display: DisplayId, delta: i32) -> Result<u16> {
        let range = self.range(display)?;
        self.adjust(display, ControlId::Contrast, delta, range.min_contrast, range.max_contrast)
            .await
    }

    async fn adjust(
        &self,
        display: DisplayId,
        control: ControlId,
        delta: i32,
        min: u8,
        max: u8,
    ) -> Result<u16> {
        let current = match self.cached_value(display, control) {
            Some(value) => value,
            None => self.queue.read(display, control).await?.current_value,
        };
        let value = (i32::from(current) + delta).clamp(i32::from(min), i32::from(max)) as u16;
        self.set_value(display, control, value).await?;
        Ok(value)
    }

    pub async fn set_input(&self, display: DisplayId, source: VideoInputSource) -> Result<()> {
        if source == VideoInputSource::Unknown {
            return Err(ServiceError::InvalidArgument("unknown input source".to_string()));
        }
        self.set_value(display, ControlId::InputSource, source.value())
            .await
    }

    pub async fn set_power(&self, display: DisplayId, on: bool) -> Result<()> {
        self.set_value(display, ControlId::Dpms, if on { POWER_ON } else { POWER_OFF })
            .await
    }

    pub async fn set_muted(&self, display: DisplayId, muted: bool) -> Result<()> {
        self.set_value(display, ControlId::AudioMute, if muted { MUTED } else { UNMUTED })
            .await
    }

    /// Write one of the factory reset controls
    pub async fn reset_control(&self, display: DisplayId, control: ControlId) -> Result<()> {
        let value = match control {
            ControlId::Reset => FACTORY_RESET,
            c if ControlId::RESETS.contains(&c) => PARTIAL_RESET,
            other => {
                return Err(ServiceError::InvalidArgument(format!(
                    "{} is not a reset control",
                    other
                )));
            }
        };
        self.set_value(display, control, value).await?;
        lock(&self.values).retain(|(d, _), _| *d != display);
        Ok(())
    }

    /// Raw write of any control
    pub async fn set_value(&self, display: DisplayId, control: ControlId, value: u16) -> Result<()> {
        self.record(display)?;
        let delivery = self.queue.write(display, control, value).await?;
        self.remember_delivered(display, control, value, delivery);
        Ok(())
    }

    /// Cache a written value only if it reached the display
    fn remember_delivered(
        &self,
        display: DisplayId,
        control: ControlId,
        value: u16,
        delivery: Delivery,
    ) {
        match delivery {
            Delivery::Written => self.remember(display, control, value),
            Delivery::Held(_) => {
                lock(&self.values).remove(&(display, control));
            }
        }
    }

    fn remember(&self, display: DisplayId, control: ControlId, value: u16) {
        lock(&self.values).insert((display, control), value);
    }

    fn cached_value(&self, display: DisplayId, control: ControlId) -> Option<u16> {
        lock(&self.values).get(&(display, control)).copied()
    }

    // Queries

    /// Read a control's current value from the display
    pub async fn get_current_value(&self, display: DisplayId, control: ControlId) -> Option<u16> {
        match self.queue.read(display, control).await {
            Ok(result) => {
                self.remember(display, control, result.current_value);
                lock(&self.max_values).insert((display, control), result.max_value);
                Some(result.current_value)
            }
            Err(e) => {
                let display_ref = &display;
                tracing::debug!("Reading {} on display {} failed: {}", control, display_ref, e);
                None
            }
        }
    }

    /// Maximum value a control accepts, read once and then cached
    pub async fn get_max_value(&self, display: DisplayId, control: ControlId) -> Option<u16> {
        let cached = lock(&self.max_values).get(&(display, control)).copied();
        if cached.is_some() {
            return cached;
        }
        match self.queue.read(display, control).await {
            Ok(result) => {
                lock(&self.max_values).insert((display, control), result.max_value);
                Some(result.max_value)
            }
            Err(e) => {
                let display_ref = &display;
                tracing::debug!("Reading max {} on display {} failed: {}", control, display_ref, e);
                None
            }
        }
    }

    pub fn reset_faults(&self, display: Option<DisplayId>) {
        self.transport().faults().reset(display);
    }

    // Adaptive mode

    pub fn mode(&self) -> AdaptiveMode {
        self.state().mode.mode()
    }

    pub fn set_mode(&self, mode: AdaptiveMode) -> Result<()> {
        self.state().mode.set(mode);
        tracing::info!("Adaptive mode set to {}", mode);
        self.update_settings(|s| s.adaptive.mode = mode)
    }

    pub fn toggle_mode(&self) -> Result<AdaptiveMode> {
        let reference = self.reference_available();
        let mode = {
            let mut state = self.state();
            let lid_closed = state.session.lid_closed;
            state.mode.toggle(reference, lid_closed)
        };
        tracing::info!("Adaptive mode toggled to {}", mode);
        self.update_settings(|s| s.adaptive.mode = mode)?;
        Ok(mode)
    }

    /// Pause adaptation, remembering the mode
    pub fn disable_adaptive(&self) {
        self.state().mode.disable();
    }

    /// Resume adaptation in `mode`, or in the remembered mode
    pub fn enable_adaptive(&self, mode: Option<AdaptiveMode>) {
        self.state().mode.enable(mode);
    }

    pub fn reference_available(&self) -> bool {
        self.reference.is_some()
    }

    /// Replace the running application list; returns true if it changed
    pub fn set_running_apps(&self, identifiers: Vec<String>) -> bool {
        self.state().apps.update(identifiers)
    }

    /// Offsets of the app that currently applies
    pub fn active_offsets(&self) -> Offsets {
        let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);
        self.state().apps.offsets(&settings.apps)
    }

    pub fn set_geolocation(&self, location: Geolocation) -> Result<()> {
        location.validate()?;
        self.state().location = Some(location);
        tracing::info!(
            "Location set to {:.4}, {:.4}",
            location.latitude,
            location.longitude
        );
        self.update_settings(|s| s.location = Some(location))
    }

    pub fn geolocation(&self) -> Option<Geolocation> {
        self.state().location
    }

    /// Feed new session state into the gate and the mode state machine
    pub fn set_session_state(&self, session: SessionState) -> SessionChange {
        let gate = self.transport().gate();
        gate.set_screens_asleep(session.screens_asleep);
        gate.set_session_locked(session.session_locked);

        let mut state = self.state();
        let previous = state.session;
        state.session = session;

        let was_suspended = previous.screens_asleep || previous.session_locked;
        let is_suspended = session.screens_asleep || session.session_locked;
        if previous.screens_asleep && !session.screens_asleep {
            self.woke.store(true, Ordering::SeqCst);
        }
        let mode_changed = previous.lid_closed != session.lid_closed
            && state.mode.on_lid(session.lid_closed);

        if was_suspended != is_suspended {
            tracing::info!(
                "Session {}",
                if is_suspended { "suspended" } else { "resumed" }
            );
        }
        SessionChange {
            resumed: was_suspended && !is_suspended,
            mode_changed,
        }
    }

    pub fn session_state(&self) -> SessionState {
        self.state().session
    }

    /// Sample the reference display, recording accepted samples
    ///
    /// Nothing is sampled while the reference display's lid is closed.
    pub fn sample_reference(&self) -> Option<f64> {
        let reference = self.reference.as_ref()?;
        let mut state = self.state();
        if state.session.lid_closed {
            return None;
        }
        let percent = reference.brightness_percent()?;
        state.history.push(percent).then_some(percent)
    }

    pub fn reference_history(&self) -> Vec<u8> {
        self.state().history.samples()
    }

    // Settings

    /// Reload the config file and apply it; on error the current settings stay
    pub fn reload_settings(&self) -> Result<()> {
        let settings = match &self.config_path {
            Some(path) => HelioConfig::load(path)?,
            None => HelioConfig::load_default()?,
        };
        self.apply_settings(settings);
        tracing::info!("Settings reloaded");
        Ok(())
    }

    /// Apply settings that can change at runtime
    pub fn apply_settings(&self, settings: HelioConfig) {
        self.transport().gate().set_apply(settings.ddc.apply);
        self.directory
            .set_filter(policy::display_filter(&settings.daemon));
        {
            let mut state = self.state();
            state.engine.set_params(CurveParams::from(&settings.adaptive));
            if settings.location.is_some() {
                state.location = settings.location;
            }
            if state.mode.mode() != settings.adaptive.mode && !state.mode.in_clamshell() {
                state.mode.set(settings.adaptive.mode);
            }
        }
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    // Adaptation

    /// Recompute and write values for every active display now
    pub async fn trigger_adapt(&self) -> Result<AdaptOutcome> {
        self.adapt_at(Utc::now(), Local::now().date_naive(), None).await
    }

    /// Adapt as if it were `now` on `today`
    ///
    /// `reference_percent` overrides sampling the reference display in sync
    /// mode.
    pub async fn adapt_at(
        &self,
        now: DateTime<Utc>,
        today: NaiveDate,
        reference_percent: Option<f64>,
    ) -> Result<AdaptOutcome> {
        let displays = self.directory.displays();
        let reference = match (self.mode(), reference_percent) {
            (AdaptiveMode::Sync, None) => self.sample_reference(),
            (_, percent) => percent,
        };

        let (mode, targets) = {
            let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);
            let mut state = self.state();
            let mode = state.mode.mode();
            let moment = match (mode, state.location) {
                (AdaptiveMode::Location, Some(location)) => state.moments.get(today, location),
                _ => None,
            };
            let offsets = state.apps.offsets(&settings.apps);

            let targets: Vec<(DisplayId, Target)> = displays
                .iter()
                .filter(|d| d.active)
                .filter_map(|d| {
                    let range = settings.range_for(&d.serial);
                    state
                        .engine
                        .compute(mode, &range, moment.as_ref(), reference, now, offsets)
                        .map(|target| (d.id, target))
                })
                .collect();

            if targets.is_empty() && !displays.is_empty() {
                match mode {
                    AdaptiveMode::Location if moment.is_none() => {
                        tracing::debug!("No solar moment yet, skipping location adaptation")
                    }
                    AdaptiveMode::Sync if reference.is_none() => {
                        tracing::debug!("No reference brightness, skipping sync adaptation")
                    }
                    _ => {}
                }
            }
            (mode, targets)
        };

        let mut applied = Vec::with_capacity(targets.len());
        for (display, target) in targets {
            let flags = self.transport().faults().flags(display);
            let mut failed = Vec::new();

            if flags.brightness_failed {
                failed.push(ControlId::Brightness);
            } else if let Err(e) = self
                .adapt_write(display, ControlId::Brightness, target.brightness)
                .await
            {
                let display_ref = &display;
                tracing::debug!("Adaptive brightness on display {} failed: {}", display_ref, e);
                failed.push(ControlId::Brightness);
            }
            if let Err(e) = self
                .adapt_write(display, ControlId::Contrast, target.contrast)
                .await
            {
                let display_ref = &display;
                tracing::debug!("Adaptive contrast on display {} failed: {}", display_ref, e);
                failed.push(ControlId::Contrast);
            }

            applied.push(AppliedTarget {
                display,
                target,
                failed,
            });
        }

        Ok(AdaptOutcome { mode, applied })
    }

    /// Write unless the display already has this value
    async fn adapt_write(&self, display: DisplayId, control: ControlId, value: u8) -> Result<()> {
        let value = u16::from(value);
        if self.cached_value(display, control) == Some(value) {
            return Ok(());
        }
        let delivery = self.queue.write(display, control, value).await?;
        self.remember_delivered(display, control, value, delivery);
        Ok(())
    }

    /// One sync-mode poll: adapt only when the reference moved
    pub async fn sync_tick(&self) -> Result<Option<AdaptOutcome>> {
        if self.mode() != AdaptiveMode::Sync {
            return Ok(None);
        }
        let Some(percent) = self.sample_reference() else {
            return Ok(None);
        };
        let changed = self.state().history.changed();
        if !changed {
            return Ok(None);
        }
        tracing::debug!("Reference brightness now {:.0}%", percent);
        let outcome = self
            .adapt_at(Utc::now(), Local::now().date_naive(), Some(percent))
            .await?;
        Ok(Some(outcome))
    }

    /// Location-mode curve for a display over the local day `today`,
    /// sampled every `step`
    pub fn curve_preview(
        &self,
        display: DisplayId,
        today: NaiveDate,
        step: ChronoDuration,
    ) -> Result<Option<Vec<CurvePoint>>> {
        self.curve_preview_in(display, today, &Local, step)
    }

    /// Curve over `today` as a calendar day in `zone`
    pub fn curve_preview_in<Tz: TimeZone>(
        &self,
        display: DisplayId,
        today: NaiveDate,
        zone: &Tz,
        step: ChronoDuration,
    ) -> Result<Option<Vec<CurvePoint>>> {
        let range = self.range(display)?;
        let mut state = self.state();
        let Some(location) = state.location else {
            return Ok(None);
        };
        let Some(moment) = state.moments.get(today, location) else {
            return Ok(None);
        };
        let Some(midnight) = today.and_hms_opt(0, 0, 0) else {
            return Ok(None);
        };
        let Some(day_start) = zone.from_local_datetime(&midnight).earliest() else {
            return Ok(None);
        };
        let day_start = day_start.with_timezone(&Utc);
        let params = *state.engine.params();
        Ok(Some(compute_batch(
            day_start,
            step,
            &moment,
            &params,
            &range,
            Offsets::default(),
        )))
    }
}

/// Validate a percentage and map it onto `[min, max]`
fn percent_value(percent: u8, min: u8, max: u8) -> Result<u16> {
    if percent > 100 {
        return Err(ServiceError::InvalidArgument(format!(
            "{}% is not a percentage",
            percent
        )));
    }
    Ok(u16::from(manual_value(f64::from(percent), min, max)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_value() {
        assert_eq!(percent_value(50, 20, 80).unwrap(), 50);
        assert_eq!(percent_value(0, 20, 80).unwrap(), 20);
        assert_eq!(percent_value(100, 0, 100).unwrap(), 100);
        assert!(matches!(
            percent_value(101, 0, 100),
            Err(ServiceError::InvalidArgument(_))
        ));
    }
}
