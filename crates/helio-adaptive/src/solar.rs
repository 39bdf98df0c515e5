//! Solar event times
//!
//! NOAA's general solar position equations (fractional-year series for the
//! equation of time and declination). Accurate to a minute or two at
//! temperate latitudes.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use helio_config::Geolocation;
use serde::Serialize;
use std::f64::consts::PI;

/// Sunrise/sunset zenith including refraction and the solar disc
const OFFICIAL_ZENITH: f64 = 90.833;
/// Civil twilight: sun 6 degrees below the horizon
const CIVIL_ZENITH: f64 = 96.0;

/// Solar events for one calendar day at one place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Moment {
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
    pub solar_noon: DateTime<Utc>,
    pub civil_sunrise: DateTime<Utc>,
    pub civil_sunset: DateTime<Utc>,
}

impl Moment {
    /// Solar events on `date`, or `None` during polar day or night
    ///
    /// Where the sun never dips 6 degrees below the horizon the civil
    /// times fall back to sunrise and sunset.
    pub fn compute(date: NaiveDate, location: Geolocation) -> Option<Self> {
        let sun = SunPosition::on(date);
        let noon = sun.noon_minutes(location.longitude);

        let hour_angle = sun.hour_angle(location.latitude, OFFICIAL_ZENITH)?;
        let sunrise = noon - 4.0 * hour_angle;
        let sunset = noon + 4.0 * hour_angle;

        let (civil_sunrise, civil_sunset) = match sun.hour_angle(location.latitude, CIVIL_ZENITH) {
            Some(civil) => (noon - 4.0 * civil, noon + 4.0 * civil),
            None => (sunrise, sunset),
        };

        Some(Self {
            sunrise: at_minutes(date, sunrise)?,
            sunset: at_minutes(date, sunset)?,
            solar_noon: at_minutes(date, noon)?,
            civil_sunrise: at_minutes(date, civil_sunrise)?,
            civil_sunset: at_minutes(date, civil_sunset)?,
        })
    }

    pub fn day_length(&self) -> Duration {
        self.sunset - self.sunrise
    }
}

struct SunPosition {
    /// Equation of time in minutes
    eqtime: f64,
    /// Declination in radians
    declination: f64,
}

impl SunPosition {
    fn on(date: NaiveDate) -> Self {
        let days_in_year = if NaiveDate::from_ymd_opt(date.year(), 2, 29).is_some() {
            366.0
        } else {
            365.0
        };
        // Fractional year at local noon
        let g = 2.0 * PI / days_in_year * (f64::from(date.ordinal()) - 1.0);

        let eqtime = 229.18
            * (0.000075 + 0.001868 * g.cos()
                - 0.032077 * g.sin()
                - 0.014615 * (2.0 * g).cos()
                - 0.040849 * (2.0 * g).sin());

        let declination = 0.006918 - 0.399912 * g.cos() + 0.070257 * g.sin()
            - 0.006758 * (2.0 * g).cos()
            + 0.000907 * (2.0 * g).sin()
            - 0.002697 * (3.0 * g).cos()
            + 0.00148 * (3.0 * g).sin();

        Self { eqtime, declination }
    }

    /// Minutes after UTC midnight of solar noon
    fn noon_minutes(&self, longitude: f64) -> f64 {
        720.0 - 4.0 * longitude - self.eqtime
    }

    /// Hour angle in degrees at which the sun crosses `zenith`
    fn hour_angle(&self, latitude: f64, zenith: f64) -> Option<f64> {
        let lat = latitude.to_radians();
        let cos_h = zenith.to_radians().cos() / (lat.cos() * self.declination.cos())
            - lat.tan() * self.declination.tan();
        if !(-1.0..=1.0).contains(&cos_h) {
            return None;
        }
        Some(cos_h.acos().to_degrees())
    }
}

fn at_minutes(date: NaiveDate, minutes: f64) -> Option<DateTime<Utc>> {
    let midnight = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
    Some(midnight + Duration::seconds((minutes * 60.0).round() as i64))
}
