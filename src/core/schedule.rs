//! Time-of-day schedules deciding whether night shift "should be on now".
//!
//! A schedule is either off, solar (night between sunset and sunrise), or a
//! custom wall-clock window that may wrap past midnight.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::geo::SolarTimeProvider;

/// Hour and minute on the wall clock, without a date.
///
/// Deserializing rejects out-of-range components, so a stored value is
/// always a real wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimeOfDay")]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

#[derive(Deserialize)]
struct RawTimeOfDay {
    hour: u8,
    minute: u8,
}

impl TryFrom<RawTimeOfDay> for TimeOfDay {
    type Error = String;

    fn try_from(raw: RawTimeOfDay) -> std::result::Result<Self, Self::Error> {
        Self::new(raw.hour, raw.minute)
            .ok_or_else(|| format!("time of day {}:{} is out of range", raw.hour, raw.minute))
    }
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn from_time(time: NaiveTime) -> Self {
        // NaiveTime components are always in range
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    pub fn to_naive(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour.into(), self.minute.into(), 0).unwrap_or_default()
    }

    /// Minutes since midnight.
    pub fn minutes(self) -> u32 {
        u32::from(self.hour) * 60 + u32::from(self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = anyhow::Error;

    /// Accepts `HH:MM` and `HH:MM:SS` (seconds are dropped).
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let time = NaiveTime::parse_from_str(trimmed, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
            .with_context(|| format!("Invalid time of day '{trimmed}' (expected HH:MM)"))?;
        Ok(Self::from_time(time))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Which schedule drives automatic enablement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScheduleMode {
    #[default]
    Off,
    Solar,
    Custom { start: TimeOfDay, end: TimeOfDay },
}

impl FromStr for ScheduleMode {
    type Err = anyhow::Error;

    /// Parse `off`, `solar`, or a custom window written `HH:MM-HH:MM`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "solar" | "sunset" => Ok(Self::Solar),
            window => {
                let (start, end) = window.split_once('-').with_context(|| {
                    format!("Invalid schedule '{window}' (expected off, solar or HH:MM-HH:MM)")
                })?;
                Ok(Self::Custom {
                    start: start.parse()?,
                    end: end.parse()?,
                })
            }
        }
    }
}

impl fmt::Display for ScheduleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Solar => write!(f, "solar"),
            Self::Custom { start, end } => write!(f, "{start}-{end}"),
        }
    }
}

/// Check whether `time` falls inside `[start, end)`, wrapping past midnight
/// when `end < start`. An empty window (`start == end`) never matches.
pub fn is_time_in_window(time: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if end > start {
        time >= start && time < end
    } else if end < start {
        time >= start || time < end
    } else {
        false
    }
}

/// Evaluate the schedule's "should be enabled now" predicate.
///
/// Solar mode without a provider, or with a provider that cannot compute
/// today's times, is never active.
pub fn scheduled_state(
    mode: &ScheduleMode,
    now: DateTime<Local>,
    solar: Option<&dyn SolarTimeProvider>,
) -> bool {
    match mode {
        ScheduleMode::Off => false,
        ScheduleMode::Custom { start, end } => {
            is_time_in_window(now.time(), start.to_naive(), end.to_naive())
        }
        ScheduleMode::Solar => solar
            .and_then(|provider| provider.solar_times(now.date_naive()))
            .is_some_and(|times| times.is_night(now)),
    }
}
