//! Brightness and contrast computation
//!
//! Location mode interpolates between the night minimum and the midday
//! maximum of a display's range over the solar day. Sync mode maps the
//! reference display's percentage linearly onto the range. Manual mode
//! computes nothing.

use chrono::{DateTime, Duration, Utc};
use helio_config::{AdaptiveConfig, AdaptiveMode, BrightnessRange};
use serde::Serialize;

use crate::solar::Moment;

/// Shape of the location-mode curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveParams {
    /// Exponent applied to the ramp position
    pub factor: f64,
    /// How far the ramps reach past civil sunrise and sunset
    pub daylight_extension: Duration,
    /// Width of the plateau centred on solar noon
    pub noon_duration: Duration,
}

impl Default for CurveParams {
    fn default() -> Self {
        Self::from(&AdaptiveConfig::default())
    }
}

impl From<&AdaptiveConfig> for CurveParams {
    fn from(config: &AdaptiveConfig) -> Self {
        Self {
            factor: config.interpolation_factor,
            daylight_extension: Duration::minutes(config.daylight_extension_minutes),
            noon_duration: Duration::minutes(config.noon_duration_minutes),
        }
    }
}

/// Signed offsets a foreground application adds before clamping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Offsets {
    pub brightness: i8,
    pub contrast: i8,
}

/// Values to write to one display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Target {
    pub brightness: u8,
    pub contrast: u8,
}

/// One point of a day's curve preview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CurvePoint {
    pub time: DateTime<Utc>,
    pub brightness: u8,
    pub contrast: u8,
}

/// Position of `now` on the location-mode curve
#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Night,
    Plateau,
    /// Ramp position in `[0, 1]`
    Rising(f64),
    Falling(f64),
}

fn phase(now: DateTime<Utc>, moment: &Moment, params: &CurveParams) -> Phase {
    let start = moment.civil_sunrise - params.daylight_extension;
    let end = moment.civil_sunset + params.daylight_extension;
    let half_noon = params.noon_duration / 2;
    let noon_start = moment.solar_noon - half_noon;
    let noon_end = moment.solar_noon + half_noon;

    if now < start || now > end {
        return Phase::Night;
    }
    if now >= noon_start && now <= noon_end {
        return Phase::Plateau;
    }

    if now < noon_start {
        match position(now - start, noon_start - start) {
            Some(f) => Phase::Rising(f),
            None => Phase::Plateau,
        }
    } else {
        match position(now - noon_end, end - noon_end) {
            Some(f) => Phase::Falling(f),
            None => Phase::Plateau,
        }
    }
}

/// Elapsed fraction of a ramp window; an empty window has no ramp
fn position(elapsed: Duration, window: Duration) -> Option<f64> {
    let window = window.num_milliseconds();
    if window <= 0 {
        return None;
    }
    Some((elapsed.num_milliseconds() as f64 / window as f64).clamp(0.0, 1.0))
}

fn interpolate(phase: Phase, factor: f64, min: u8, max: u8) -> f64 {
    let (min, max) = (f64::from(min), f64::from(max));
    let ramp = |f: f64| min + f.powf(factor) * (max - min);
    match phase {
        Phase::Night => min,
        Phase::Plateau => max,
        Phase::Rising(f) => ramp(f),
        Phase::Falling(f) => max + min - ramp(f),
    }
}

/// Round, add the offset and keep the result inside `[min, max]`
fn finish(value: f64, offset: i8, min: u8, max: u8) -> u8 {
    let value = value.round() as i32 + i32::from(offset);
    value.clamp(i32::from(min), i32::from(max)) as u8
}

/// Location-mode values at `now`
pub fn compute_location(
    now: DateTime<Utc>,
    moment: &Moment,
    params: &CurveParams,
    range: &BrightnessRange,
    offsets: Offsets,
) -> Target {
    let phase = phase(now, moment, params);
    Target {
        brightness: finish(
            interpolate(phase, params.factor, range.min_brightness, range.max_brightness),
            offsets.brightness,
            range.min_brightness,
            range.max_brightness,
        ),
        contrast: finish(
            interpolate(phase, params.factor, range.min_contrast, range.max_contrast),
            offsets.contrast,
            range.min_contrast,
            range.max_contrast,
        ),
    }
}

/// Sync-mode values for a reference percentage, `None` if it is not a
/// percentage
pub fn compute_sync(percent: f64, range: &BrightnessRange, offsets: Offsets) -> Option<Target> {
    if !(0.0..=100.0).contains(&percent) {
        return None;
    }
    let map = |min: u8, max: u8, offset: i8| {
        let span = f64::from(max) - f64::from(min);
        finish(f64::from(min) + (percent / 100.0 * span).round(), offset, min, max)
    };
    Some(Target {
        brightness: map(range.min_brightness, range.max_brightness, offsets.brightness),
        contrast: map(range.min_contrast, range.max_contrast, offsets.contrast),
    })
}

/// Map a user-facing percentage onto `[min, max]`
pub fn manual_value(percent: f64, min: u8, max: u8) -> u8 {
    let percent = if percent.is_nan() { 0.0 } else { percent.clamp(0.0, 100.0) };
    let span = f64::from(max) - f64::from(min);
    finish(percent / 100.0 * span + f64::from(min), 0, min, max)
}

/// Location-mode curve for a day, sampled every `step`
pub fn compute_batch(
    day_start: DateTime<Utc>,
    step: Duration,
    moment: &Moment,
    params: &CurveParams,
    range: &BrightnessRange,
    offsets: Offsets,
) -> Vec<CurvePoint> {
    if step <= Duration::zero() {
        return Vec::new();
    }
    let day_end = day_start + Duration::days(1);
    let mut points = Vec::new();
    let mut time = day_start;
    while time < day_end {
        let target = compute_location(time, moment, params, range, offsets);
        points.push(CurvePoint {
            time,
            brightness: target.brightness,
            contrast: target.contrast,
        });
        time += step;
    }
    points
}

/// Chooses the algorithm for the active mode
#[derive(Debug, Clone, Default)]
pub struct AdaptiveEngine {
    params: CurveParams,
}

impl AdaptiveEngine {
    pub fn new(params: CurveParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &CurveParams {
        &self.params
    }

    pub fn set_params(&mut self, params: CurveParams) {
        self.params = params;
    }

    /// Values for one display, `None` when nothing should be written
    ///
    /// Location mode needs a moment and sync mode needs a reference
    /// percentage; without them the engine leaves the display alone.
    pub fn compute(
        &self,
        mode: AdaptiveMode,
        range: &BrightnessRange,
        moment: Option<&Moment>,
        reference_percent: Option<f64>,
        now: DateTime<Utc>,
        offsets: Offsets,
    ) -> Option<Target> {
        match mode {
            AdaptiveMode::Location => {
                let moment = moment?;
                Some(compute_location(now, moment, &self.params, range, offsets))
            }
            AdaptiveMode::Sync => compute_sync(reference_percent?, range, offsets),
            AdaptiveMode::Manual => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
    }

    fn moment() -> Moment {
        Moment {
            sunrise: at(6, 30),
            sunset: at(17, 30),
            solar_noon: at(12, 0),
            civil_sunrise: at(6, 0),
            civil_sunset: at(18, 0),
        }
    }

    fn linear() -> CurveParams {
        CurveParams {
            factor: 1.0,
            daylight_extension: Duration::zero(),
            noon_duration: Duration::zero(),
        }
    }

    fn range(min: u8, max: u8) -> BrightnessRange {
        BrightnessRange::new(min, max, min, max)
    }

    fn brightness(now: DateTime<Utc>, params: &CurveParams, r: &BrightnessRange) -> u8 {
        compute_location(now, &moment(), params, r, Offsets::default()).brightness
    }

    #[test]
    fn test_location_linear_boundaries() {
        let r = range(10, 100);
        assert_eq!(brightness(at(6, 0), &linear(), &r), 10);
        assert_eq!(brightness(at(12, 0), &linear(), &r), 100);
        assert_eq!(brightness(at(9, 0), &linear(), &r), 55);
    }

    #[test]
    fn test_location_night() {
        let r = range(10, 100);
        assert_eq!(brightness(at(5, 59), &linear(), &r), 10);
        assert_eq!(brightness(at(18, 1), &linear(), &r), 10);
        assert_eq!(brightness(at(23, 0), &linear(), &r), 10);
    }

    #[test]
    fn test_location_ramp_down_mirrors() {
        let r = range(10, 100);
        assert_eq!(brightness(at(15, 0), &linear(), &r), 55);
        assert_eq!(brightness(at(18, 0), &linear(), &r), 10);

        let curved = CurveParams {
            factor: 2.0,
            ..linear()
        };
        // Rising slowly at first, falling slowly at first
        assert_eq!(brightness(at(9, 0), &curved, &r), 33);
        assert_eq!(brightness(at(15, 0), &curved, &r), 78);
    }

    #[test]
    fn test_location_plateau_and_extension() {
        let params = CurveParams {
            factor: 1.0,
            daylight_extension: Duration::minutes(60),
            noon_duration: Duration::minutes(120),
        };
        let r = range(0, 100);
        assert_eq!(brightness(at(11, 0), &params, &r), 100);
        assert_eq!(brightness(at(13, 0), &params, &r), 100);
        // Ramp from 05:00 to 11:00
        assert_eq!(brightness(at(5, 0), &params, &r), 0);
        assert_eq!(brightness(at(8, 0), &params, &r), 50);
        assert_eq!(brightness(at(4, 59), &params, &r), 0);
    }

    #[test]
    fn test_location_empty_ramp_is_plateau() {
        let params = CurveParams {
            factor: 1.0,
            daylight_extension: Duration::zero(),
            noon_duration: Duration::hours(14),
        };
        assert_eq!(brightness(at(6, 30), &params, &range(0, 100)), 100);
    }

    #[test]
    fn test_contrast_uses_its_own_range() {
        let r = BrightnessRange::new(0, 100, 50, 70);
        let target = compute_location(at(9, 0), &moment(), &linear(), &r, Offsets::default());
        assert_eq!(target.brightness, 50);
        assert_eq!(target.contrast, 60);
    }

    #[test]
    fn test_offsets_are_clamped() {
        let r = range(10, 90);
        let boost = Offsets {
            brightness: 30,
            contrast: -30,
        };
        let target = compute_location(at(12, 0), &moment(), &linear(), &r, boost);
        assert_eq!(target.brightness, 90);
        assert_eq!(target.contrast, 60);
    }

    #[test]
    fn test_sync_mapping() {
        let r = range(20, 80);
        assert_eq!(compute_sync(0.0, &r, Offsets::default()).unwrap().brightness, 20);
        assert_eq!(compute_sync(100.0, &r, Offsets::default()).unwrap().brightness, 80);
        assert_eq!(compute_sync(50.0, &r, Offsets::default()).unwrap().brightness, 50);
        assert!(compute_sync(101.0, &r, Offsets::default()).is_none());
        assert!(compute_sync(-0.5, &r, Offsets::default()).is_none());
        assert!(compute_sync(f64::NAN, &r, Offsets::default()).is_none());
    }

    #[test]
    fn test_manual_value() {
        assert_eq!(manual_value(50.0, 20, 80), 50);
        assert_eq!(manual_value(0.0, 20, 80), 20);
        assert_eq!(manual_value(150.0, 20, 80), 80);
        assert_eq!(manual_value(-10.0, 20, 80), 20);
    }

    #[test]
    fn test_engine_no_ops() {
        let engine = AdaptiveEngine::new(linear());
        let r = range(0, 100);
        let now = at(9, 0);
        assert!(engine.compute(AdaptiveMode::Location, &r, None, None, now, Offsets::default()).is_none());
        assert!(engine.compute(AdaptiveMode::Sync, &r, None, None, now, Offsets::default()).is_none());
        assert!(engine
            .compute(AdaptiveMode::Manual, &r, Some(&moment()), Some(40.0), now, Offsets::default())
            .is_none());
        assert_eq!(
            engine.compute(AdaptiveMode::Sync, &r, None, Some(40.0), now, Offsets::default()),
            Some(Target {
                brightness: 40,
                contrast: 40
            })
        );
        assert_eq!(
            engine
                .compute(AdaptiveMode::Location, &r, Some(&moment()), None, now, Offsets::default())
                .map(|t| t.brightness),
            Some(50)
        );
    }

    #[test]
    fn test_batch_covers_day() {
        let points = compute_batch(
            at(0, 0),
            Duration::minutes(30),
            &moment(),
            &linear(),
            &range(0, 100),
            Offsets::default(),
        );
        assert_eq!(points.len(), 48);
        assert_eq!(points[0].brightness, 0);
        assert_eq!(points[24].time, at(12, 0));
        assert_eq!(points[24].brightness, 100);
        assert!(compute_batch(at(0, 0), Duration::zero(), &moment(), &linear(), &range(0, 100), Offsets::default()).is_empty());
    }
}
