//! Daily cache of the solar moment

use chrono::NaiveDate;
use helio_config::Geolocation;

use crate::solar::Moment;

#[derive(Debug, Clone, Copy)]
struct Entry {
    date: NaiveDate,
    location: Geolocation,
    moment: Option<Moment>,
}

/// Today's [`Moment`], recomputed when the day or the location changes
#[derive(Debug, Default)]
pub struct MomentCache {
    entry: Option<Entry>,
    computations: u32,
}

impl MomentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moment for `today` at `location`
    ///
    /// A polar day is cached too, so it is not recomputed on every tick.
    pub fn get(&mut self, today: NaiveDate, location: Geolocation) -> Option<Moment> {
        match self.entry {
            Some(entry) if entry.date == today && entry.location == location => entry.moment,
            _ => {
                let moment = Moment::compute(today, location);
                self.computations += 1;
                match &moment {
                    Some(m) => tracing::debug!(
                        "Computed moment for {}: civil sunrise {}, noon {}, civil sunset {}",
                        today,
                        m.civil_sunrise,
                        m.solar_noon,
                        m.civil_sunset
                    ),
                    None => tracing::info!("No sunrise or sunset on {} at this latitude", today),
                }
                self.entry = Some(Entry {
                    date: today,
                    location,
                    moment,
                });
                moment
            }
        }
    }

    /// Last computed moment without recomputing
    pub fn current(&self) -> Option<Moment> {
        self.entry.and_then(|e| e.moment)
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// How many times a moment has been computed
    pub fn computations(&self) -> u32 {
        self.computations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARIS: Geolocation = Geolocation {
        latitude: 48.85,
        longitude: 2.35,
    };

    #[test]
    fn test_cached_for_same_day_and_place() {
        let mut cache = MomentCache::new();
        let day = NaiveDate::from_ymd_opt(2024, 4, 10).unwrap();
        let first = cache.get(day, PARIS);
        let second = cache.get(day, PARIS);
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(cache.computations(), 1);
    }

    #[test]
    fn test_recomputed_on_new_day_or_location() {
        let mut cache = MomentCache::new();
        let day = NaiveDate::from_ymd_opt(2024, 4, 10).unwrap();
        cache.get(day, PARIS);
        cache.get(day.succ_opt().unwrap(), PARIS);
        assert_eq!(cache.computations(), 2);

        cache.get(
            day.succ_opt().unwrap(),
            Geolocation {
                latitude: 40.4,
                longitude: -3.7,
            },
        );
        assert_eq!(cache.computations(), 3);
    }

    #[test]
    fn test_polar_result_is_cached() {
        let mut cache = MomentCache::new();
        let day = NaiveDate::from_ymd_opt(2024, 12, 21).unwrap();
        let arctic = Geolocation {
            latitude: 80.0,
            longitude: 0.0,
        };
        assert!(cache.get(day, arctic).is_none());
        assert!(cache.get(day, arctic).is_none());
        assert_eq!(cache.computations(), 1);
        assert!(cache.current().is_none());
    }
}
