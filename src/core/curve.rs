//! Circadian color curve: a pure mapping from wall-clock time to a target
//! color temperature.
//!
//! The day is split into three phases relative to the next bedtime:
//!
//! ```text
//!   Daylight           │  Evening             │  DeepNight      │ bedtime
//!   daylight_kelvin    │  daylight → evening  │  evening → deep │
//! ─────────────────────┼──────────────────────┼─────────────────┼────────▶
//!               bedtime - evening_lead  bedtime - deep_night_lead
//! ```
//!
//! Interpolation inside Evening and DeepNight is linear, so the kelvin value
//! is continuous at both phase boundaries.

use chrono::{DateTime, Local, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::common::constants::{
    DEFAULT_DAYLIGHT_TEMP, DEFAULT_DEEP_NIGHT_LEAD_MINUTES, DEFAULT_DEEP_NIGHT_TEMP,
    DEFAULT_EVENING_LEAD_MINUTES, DEFAULT_EVENING_TEMP,
};
use crate::core::schedule::TimeOfDay;

/// Segment of the circadian curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Daylight,
    Evening,
    DeepNight,
}

impl Phase {
    pub fn display_name(&self) -> &'static str {
        match self {
            Phase::Daylight => "Daylight",
            Phase::Evening => "Evening",
            Phase::DeepNight => "Deep night",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Shape of the circadian curve.
///
/// Expected, but not enforced here: `evening_lead >= deep_night_lead` and
/// kelvin values non-increasing from daylight to deep night.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircadianCurveConfig {
    pub bedtime: TimeOfDay,
    pub daylight_kelvin: u32,
    pub evening_kelvin: u32,
    pub deep_night_kelvin: u32,
    #[serde(with = "duration_minutes")]
    pub evening_lead: Duration,
    #[serde(with = "duration_minutes")]
    pub deep_night_lead: Duration,
}

impl Default for CircadianCurveConfig {
    fn default() -> Self {
        Self {
            bedtime: TimeOfDay { hour: 23, minute: 0 },
            daylight_kelvin: DEFAULT_DAYLIGHT_TEMP,
            evening_kelvin: DEFAULT_EVENING_TEMP,
            deep_night_kelvin: DEFAULT_DEEP_NIGHT_TEMP,
            evening_lead: Duration::from_secs(DEFAULT_EVENING_LEAD_MINUTES * 60),
            deep_night_lead: Duration::from_secs(DEFAULT_DEEP_NIGHT_LEAD_MINUTES * 60),
        }
    }
}

/// Lead times are stored as whole minutes.
mod duration_minutes {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs() / 60)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let minutes = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(minutes.saturating_mul(60)))
    }
}

/// Result of evaluating the curve at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveTarget {
    pub phase: Phase,
    pub kelvin: u32,
    /// Position inside the current phase, in `[0, 1]`.
    pub progress: f64,
}

/// Evaluate the curve at `at`.
///
/// Works on the naive local wall clock so a DST change between now and
/// bedtime never yields a negative or doubled span.
pub fn target(at: DateTime<Local>, config: &CircadianCurveConfig) -> CurveTarget {
    target_for_seconds_until_bedtime(seconds_until_bedtime(at.naive_local(), config), config)
}

/// Seconds from `at` to the next bedtime at or after it.
pub fn seconds_until_bedtime(at: NaiveDateTime, config: &CircadianCurveConfig) -> f64 {
    let mut bedtime = at.date().and_time(config.bedtime.to_naive());
    if bedtime < at {
        bedtime += TimeDelta::days(1);
    }
    (bedtime - at).num_milliseconds() as f64 / 1000.0
}

/// Curve evaluation once the distance to bedtime is known.
pub fn target_for_seconds_until_bedtime(
    seconds_until_bedtime: f64,
    config: &CircadianCurveConfig,
) -> CurveTarget {
    let evening_lead = config.evening_lead.as_secs_f64();
    let deep_night_lead = config.deep_night_lead.as_secs_f64();

    if seconds_until_bedtime > evening_lead {
        return CurveTarget {
            phase: Phase::Daylight,
            kelvin: config.daylight_kelvin,
            progress: 0.0,
        };
    }

    if seconds_until_bedtime > deep_night_lead {
        let span = evening_lead - deep_night_lead;
        let progress = if span <= 0.0 {
            1.0
        } else {
            ((evening_lead - seconds_until_bedtime) / span).clamp(0.0, 1.0)
        };
        return CurveTarget {
            phase: Phase::Evening,
            kelvin: lerp_kelvin(config.daylight_kelvin, config.evening_kelvin, progress),
            progress,
        };
    }

    let progress = ((deep_night_lead - seconds_until_bedtime) / deep_night_lead.max(1.0))
        .clamp(0.0, 1.0);
    CurveTarget {
        phase: Phase::DeepNight,
        kelvin: lerp_kelvin(config.evening_kelvin, config.deep_night_kelvin, progress),
        progress,
    }
}

fn lerp_kelvin(from: u32, to: u32, progress: f64) -> u32 {
    let from = f64::from(from);
    let to = f64::from(to);
    (from + (to - from) * progress).round().max(0.0) as u32
}

/// Map a kelvin value onto display intensity: 0 at daylight, 1 at deep night.
pub fn intensity_for_kelvin(kelvin: u32, config: &CircadianCurveConfig) -> f32 {
    let range = f64::from(config.daylight_kelvin) - f64::from(config.deep_night_kelvin);
    if range <= 0.0 {
        return 0.0;
    }
    let intensity = (f64::from(config.daylight_kelvin) - f64::from(kelvin)) / range;
    intensity.clamp(0.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::source::local_time;

    fn reference_config() -> CircadianCurveConfig {
        CircadianCurveConfig {
            bedtime: TimeOfDay::new(23, 0).unwrap(),
            daylight_kelvin: 6500,
            evening_kelvin: 4500,
            deep_night_kelvin: 3200,
            evening_lead: Duration::from_secs(2 * 3600),
            deep_night_lead: Duration::from_secs(45 * 60),
        }
    }

    #[test]
    fn test_daylight_before_evening_lead() {
        let t = target(local_time(2024, 3, 12, 20, 30), &reference_config());
        assert_eq!(t.phase, Phase::Daylight);
        assert_eq!(t.kelvin, 6500);
        assert_eq!(t.progress, 0.0);
    }

    #[test]
    fn test_evening_interpolation() {
        let t = target(local_time(2024, 3, 12, 21, 30), &reference_config());
        assert_eq!(t.phase, Phase::Evening);
        assert!((t.progress - 0.4).abs() < 1e-9);
        assert_eq!(t.kelvin, 5700);
    }

    #[test]
    fn test_deep_night_interpolation() {
        let t = target(local_time(2024, 3, 12, 22, 20), &reference_config());
        assert_eq!(t.phase, Phase::DeepNight);
        assert!((t.progress - 5.0 / 45.0).abs() < 1e-9);
        assert_eq!(t.kelvin, 4356);
    }

    #[test]
    fn test_bedtime_itself_is_end_of_deep_night() {
        let t = target(local_time(2024, 3, 12, 23, 0), &reference_config());
        assert_eq!(t.phase, Phase::DeepNight);
        assert_eq!(t.kelvin, 3200);
        assert_eq!(t.progress, 1.0);
    }

    #[test]
    fn test_after_bedtime_uses_tomorrow() {
        // 23:01 is almost a full day away from the next bedtime
        let t = target(local_time(2024, 3, 12, 23, 1), &reference_config());
        assert_eq!(t.phase, Phase::Daylight);
        assert_eq!(t.kelvin, 6500);
    }

    #[test]
    fn test_boundaries_are_continuous() {
        let config = reference_config();
        let evening = config.evening_lead.as_secs_f64();
        let deep = config.deep_night_lead.as_secs_f64();

        let at_evening = target_for_seconds_until_bedtime(evening, &config);
        let before_evening = target_for_seconds_until_bedtime(evening + 1.0, &config);
        assert_eq!(at_evening.kelvin, before_evening.kelvin);

        let at_deep = target_for_seconds_until_bedtime(deep, &config);
        let before_deep = target_for_seconds_until_bedtime(deep + 0.001, &config);
        assert_eq!(at_deep.phase, Phase::DeepNight);
        assert_eq!(before_deep.phase, Phase::Evening);
        assert_eq!(at_deep.kelvin, before_deep.kelvin);
    }

    #[test]
    fn test_zero_evening_span_jumps_to_evening_kelvin() {
        let config = CircadianCurveConfig {
            evening_lead: Duration::from_secs(1800),
            deep_night_lead: Duration::from_secs(1800),
            ..reference_config()
        };
        // Evening is empty, so everything inside the lead is deep night
        let t = target_for_seconds_until_bedtime(1800.0, &config);
        assert_eq!(t.phase, Phase::DeepNight);
        assert_eq!(t.kelvin, 4500);
    }

    #[test]
    fn test_zero_deep_night_lead() {
        let config = CircadianCurveConfig {
            deep_night_lead: Duration::ZERO,
            ..reference_config()
        };
        let t = target_for_seconds_until_bedtime(0.0, &config);
        assert_eq!(t.phase, Phase::DeepNight);
        assert_eq!(t.kelvin, 4500);
    }

    #[test]
    fn test_intensity_mapping() {
        let config = reference_config();
        assert_eq!(intensity_for_kelvin(6500, &config), 0.0);
        assert_eq!(intensity_for_kelvin(3200, &config), 1.0);
        assert_eq!(intensity_for_kelvin(9000, &config), 0.0);
        assert_eq!(intensity_for_kelvin(1000, &config), 1.0);
        let mid = intensity_for_kelvin(4850, &config);
        assert!((mid - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_intensity_with_flat_range() {
        let config = CircadianCurveConfig {
            deep_night_kelvin: 6500,
            ..reference_config()
        };
        assert_eq!(intensity_for_kelvin(5000, &config), 0.0);
    }

    #[test]
    fn test_config_lead_serializes_as_minutes() {
        let json = serde_json::to_value(reference_config()).unwrap();
        assert_eq!(json["evening_lead"], 120);
        assert_eq!(json["deep_night_lead"], 45);
        let back: CircadianCurveConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, reference_config());
    }
}
