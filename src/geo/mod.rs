//! Sunrise/sunset lookup for the solar schedule.
//!
//! The schedule only needs to know whether "now" lies between sunset and the
//! following sunrise, so this module exposes a small provider trait and one
//! implementation backed by the `sunrise` crate for fixed coordinates.

use chrono::{DateTime, Local, NaiveDate};

/// Sunrise and sunset for one local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolarTimes {
    pub sunrise: DateTime<Local>,
    pub sunset: DateTime<Local>,
}

impl SolarTimes {
    /// Night is everything at or after sunset and at or before sunrise.
    ///
    /// When the provider returns a pair that is not in sunrise-then-sunset
    /// order (polar edge cases, far-off coordinates), the window between the
    /// two instants is treated as night instead.
    pub fn is_night(&self, now: DateTime<Local>) -> bool {
        let sunrise = self.sunrise.time();
        let sunset = self.sunset.time();
        let current = now.time();

        if sunrise < sunset {
            current >= sunset || current <= sunrise
        } else {
            current >= sunset && current <= sunrise
        }
    }
}

/// Source of solar event times. Solar mode is never active without one.
pub trait SolarTimeProvider: Send {
    fn solar_times(&self, date: NaiveDate) -> Option<SolarTimes>;
}

/// Astronomical sunrise/sunset at fixed coordinates.
#[derive(Debug, Clone, Copy)]
pub struct SunriseProvider {
    latitude: f64,
    longitude: f64,
}

impl SunriseProvider {
    /// Returns `None` for coordinates outside the valid range.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        sunrise::Coordinates::new(latitude, longitude)?;
        Some(Self {
            latitude,
            longitude,
        })
    }
}

impl SolarTimeProvider for SunriseProvider {
    fn solar_times(&self, date: NaiveDate) -> Option<SolarTimes> {
        use sunrise::{Coordinates, SolarDay, SolarEvent};

        let coord = Coordinates::new(self.latitude, self.longitude)?;
        let solar_day = SolarDay::new(coord, date);
        let sunrise_utc = solar_day.event_time(SolarEvent::Sunrise);
        let sunset_utc = solar_day.event_time(SolarEvent::Sunset);

        Some(SolarTimes {
            sunrise: sunrise_utc.with_timezone(&Local),
            sunset: sunset_utc.with_timezone(&Local),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::source::local_time;

    #[test]
    fn test_is_night_regular_day() {
        let times = SolarTimes {
            sunrise: local_time(2024, 6, 1, 5, 45),
            sunset: local_time(2024, 6, 1, 21, 10),
        };
        assert!(times.is_night(local_time(2024, 6, 1, 22, 0)));
        assert!(times.is_night(local_time(2024, 6, 1, 4, 0)));
        assert!(times.is_night(local_time(2024, 6, 1, 21, 10)));
        assert!(!times.is_night(local_time(2024, 6, 1, 13, 0)));
    }

    #[test]
    fn test_invalid_coordinates_rejected() {
        assert!(SunriseProvider::new(91.0, 0.0).is_none());
        assert!(SunriseProvider::new(0.0, 181.0).is_none());
        assert!(SunriseProvider::new(52.52, 13.405).is_some());
    }

    #[test]
    fn test_sunrise_precedes_sunset_at_mid_latitude() {
        let provider = SunriseProvider::new(48.8566, 2.3522).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let times = provider.solar_times(date).unwrap();
        let span = times.sunset - times.sunrise;
        assert!(span > chrono::Duration::hours(11));
        assert!(span < chrono::Duration::hours(13));
    }
}
